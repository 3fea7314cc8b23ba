use serde::Serialize;

mod error;
mod model;
mod output;
mod record;
mod scaler;
pub mod builder;
pub mod schema;
mod utils;

pub use builder::FeatureCodecBuilder;
pub use error::{CodeConflict, CodecError, InvalidNumeric, MissingFields, UnmappedField};
pub use model::{FeatureCodec, InferenceModel};
pub use output::{OutputDecoder, OutputMap};
pub use record::{FieldValue, PredictionResult, RawOutput, Record};
pub use scaler::Scaler;
pub use schema::{
    tb_default_schema, DiabetesCoding, FeatureSchema, FieldKind, FieldSpec, DEFAULT_IDENTIFIER_COLUMNS,
};

/// Information about the configuration of a codec
#[derive(Debug, Clone, Serialize)]
pub struct CodecInfo {
    /// Deployment name
    pub name: String,
    /// Deployment version
    pub version: String,
    /// SHA-256 over schema, scaler, threshold and output map
    pub fingerprint: String,
    /// Feature names in model input order, before scaling
    pub feature_order: Vec<String>,
    /// Column names of the encoded matrix
    pub output_columns: Vec<String>,
    /// Probability threshold for single-value outputs
    pub threshold: f64,
    /// Whether a fitted scaler is applied
    pub scaled: bool,
    /// Class index to label
    pub output_labels: Vec<(usize, String)>,
}
