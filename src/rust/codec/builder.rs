use std::sync::Arc;

use log::info;

use super::error::CodecError;
use super::model::FeatureCodec;
use super::output::{OutputDecoder, OutputMap};
use super::scaler::{ColumnSource, Scaler};
use super::schema::FeatureSchema;

/// A builder for constructing a FeatureCodec with a fluent interface.
///
/// Threshold and output map have no defaults: both belong to a specific
/// trained artifact and must be stated for every deployment.
#[derive(Default, Debug)]
pub struct FeatureCodecBuilder {
    name: Option<String>,
    version: Option<String>,
    schema: Option<FeatureSchema>,
    scaler: Option<Scaler>,
    threshold: Option<f64>,
    output_map: Option<OutputMap>,
}

impl FeatureCodecBuilder {
    /// Creates a new empty FeatureCodecBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Names the deployment this codec serves, used in logs and `info()`
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the feature schema
    ///
    /// # Returns
    /// * `Result<Self, CodecError>` - The builder instance, or a `BuildError`
    ///   if a schema was already set
    pub fn with_schema(mut self, schema: FeatureSchema) -> Result<Self, CodecError> {
        if self.schema.is_some() {
            return Err(CodecError::BuildError("Schema already set".to_string()));
        }
        self.schema = Some(schema);
        Ok(self)
    }

    /// Sets the probability threshold used when the model emits one value per
    /// record. Values at or above it decode as class 1.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_output_map(mut self, output_map: OutputMap) -> Self {
        self.output_map = Some(output_map);
        self
    }

    /// Applies a fitted scaler after encoding
    pub fn with_scaler(mut self, scaler: Scaler) -> Self {
        self.scaler = Some(scaler);
        self
    }

    /// Builds and returns the final FeatureCodec instance
    ///
    /// # Returns
    /// * `Result<FeatureCodec, CodecError>` - The codec, or an error if:
    ///   - No schema, threshold or output map was set
    ///   - The threshold is outside `[0, 1]`
    ///   - The scaler's parameters are malformed or do not cover the schema
    pub fn build(self) -> Result<FeatureCodec, CodecError> {
        let schema = self
            .schema
            .ok_or_else(|| CodecError::BuildError("Schema must be set".to_string()))?;
        let threshold = self.threshold.ok_or_else(|| {
            CodecError::BuildError("Threshold must be set for every deployed model".to_string())
        })?;
        let output_map = self
            .output_map
            .ok_or_else(|| CodecError::BuildError("Output map must be set".to_string()))?;
        let decoder = OutputDecoder::new(threshold, output_map)?;

        let columns = match &self.scaler {
            Some(scaler) => scaler.plan(&schema)?,
            None => (0..schema.len()).map(ColumnSource::Feature).collect(),
        };

        let name = self.name.unwrap_or_else(|| "unnamed".to_string());
        let version = self.version.unwrap_or_else(|| "0".to_string());
        info!(
            "Built codec '{}' {} with {} features, threshold {}{}",
            name,
            version,
            schema.len(),
            threshold,
            if self.scaler.is_some() { ", scaled" } else { "" }
        );

        Ok(FeatureCodec {
            name,
            version,
            schema: Arc::new(schema),
            scaler: self.scaler.map(Arc::new),
            decoder,
            columns,
        })
    }
}
