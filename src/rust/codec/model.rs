use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::debug;
use ndarray::{Array2, ArrayView2};
use sha2::{Digest, Sha256};

use super::error::{CodecError, InvalidNumeric, MissingFields, UnmappedField};
use super::output::OutputDecoder;
use super::record::{PredictionResult, RawOutput, Record};
use super::scaler::{ColumnSource, Scaler};
use super::schema::{lookup_code, numeric_value, FeatureSchema, FieldKind};

/// The only coupling to a trained artifact: something that maps an encoded
/// batch to one output row per record.
///
/// Each output row is either a single probability or a vector of class scores.
pub trait InferenceModel {
    type Error: std::fmt::Display;

    fn infer(&self, input: ArrayView2<'_, f32>) -> Result<Array2<f32>, Self::Error>;
}

/// Encodes records into the numeric matrix a deployed model expects and
/// decodes its output into labels.
///
/// The codec is immutable once built, so a single instance can be shared
/// across threads with `Arc` and used without locking.
///
/// ```
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use tbcodec::{FeatureCodec, FeatureSchema, FieldSpec, OutputMap, Record, RawOutput};
///
/// let codec = FeatureCodec::builder()
///     .with_schema(FeatureSchema::new(vec![
///         FieldSpec::numeric("Age"),
///         FieldSpec::categorical("Gender", [("Female", 0), ("Male", 1)]),
///     ])?)?
///     .with_threshold(0.6)
///     .with_output_map(OutputMap::new([(0, "default"), (1, "not-default")]))
///     .build()?;
///
/// let matrix = codec.encode(&[Record::new().with("Age", 32).with("Gender", "Female")])?;
/// assert_eq!(matrix.row(0).to_vec(), vec![32.0, 0.0]);
/// assert_eq!(codec.decode(&RawOutput::Scalar(0.6)), "not-default");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FeatureCodec {
    pub name: String,
    pub version: String,
    pub(crate) schema: Arc<FeatureSchema>,
    pub(crate) scaler: Option<Arc<Scaler>>,
    pub(crate) decoder: OutputDecoder,
    /// Source of every output column, in output order
    pub(crate) columns: Vec<ColumnSource>,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<FeatureCodec>();
    }
};

impl FeatureCodec {
    /// Creates a new FeatureCodecBuilder for fluent construction
    pub fn builder() -> super::builder::FeatureCodecBuilder {
        super::builder::FeatureCodecBuilder::new()
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn scaler(&self) -> Option<&Scaler> {
        self.scaler.as_deref()
    }

    pub fn decoder(&self) -> &OutputDecoder {
        &self.decoder
    }

    pub fn threshold(&self) -> f64 {
        self.decoder.threshold
    }

    /// Every field a record must carry: the feature order followed by any
    /// extra columns the scaler reads directly.
    pub fn required_fields(&self) -> Vec<&str> {
        self.schema
            .required_fields()
            .iter()
            .map(String::as_str)
            .chain(self.columns.iter().filter_map(|c| match c {
                ColumnSource::Passthrough(name) => Some(name.as_str()),
                ColumnSource::Feature(_) => None,
            }))
            .collect()
    }

    /// Names of the matrix columns produced by [`encode`](Self::encode)
    pub fn output_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(|c| output_column_name(&self.schema, c))
            .collect()
    }

    /// Returns information about the codec's configuration
    pub fn info(&self) -> super::CodecInfo {
        super::CodecInfo {
            name: self.name.clone(),
            version: self.version.clone(),
            fingerprint: self.fingerprint(),
            feature_order: self.schema.required_fields().to_vec(),
            output_columns: self.output_columns().into_iter().map(String::from).collect(),
            threshold: self.decoder.threshold,
            scaled: self.scaler.is_some(),
            output_labels: self
                .decoder
                .output_map
                .iter()
                .map(|(idx, label)| (idx, label.to_string()))
                .collect(),
        }
    }

    /// Encodes a batch into a `(records, columns)` matrix.
    ///
    /// Validation covers the whole batch before failing: every missing field of
    /// every record is reported together, then every unmapped value of every
    /// categorical field, then every unparseable number. No partial matrix is
    /// ever returned. Row order matches record order.
    pub fn encode(&self, records: &[Record]) -> Result<Array2<f32>, CodecError> {
        let required = self.required_fields();
        let missing: Vec<MissingFields> = records
            .iter()
            .enumerate()
            .filter_map(|(row, record)| {
                let fields: Vec<String> = required
                    .iter()
                    .filter(|field| record.get(field).is_none())
                    .map(|field| field.to_string())
                    .collect();
                (!fields.is_empty()).then_some(MissingFields { row, fields })
            })
            .collect();
        if !missing.is_empty() {
            return Err(CodecError::MissingField(missing));
        }

        let fields = self.schema.fields();
        let mut frame = Array2::<f64>::zeros((records.len(), self.columns.len()));
        let passthrough = FieldKind::Numeric;
        let mut unmapped: BTreeMap<usize, BTreeSet<String>> = BTreeMap::new();
        let mut invalid = Vec::new();

        for (row, record) in records.iter().enumerate() {
            for (col, source) in self.columns.iter().enumerate() {
                let (name, kind) = match source {
                    ColumnSource::Feature(idx) => (fields[*idx].name.as_str(), &fields[*idx].kind),
                    ColumnSource::Passthrough(name) => (name.as_str(), &passthrough),
                };
                let Some(value) = record.get(name) else {
                    continue;
                };
                match kind {
                    FieldKind::Categorical { values } => {
                        let surface = value.to_string();
                        match lookup_code(values, &surface) {
                            Some(code) => frame[[row, col]] = code as f64,
                            None => {
                                unmapped.entry(col).or_default().insert(surface);
                            }
                        }
                    }
                    FieldKind::Numeric => match numeric_value(value) {
                        Some(number) => frame[[row, col]] = number,
                        None => invalid.push(InvalidNumeric {
                            row,
                            field: name.to_string(),
                            value: value.to_string(),
                        }),
                    },
                }
            }
        }

        if !unmapped.is_empty() {
            return Err(CodecError::UnmappedValue(
                unmapped
                    .into_iter()
                    .map(|(col, values)| UnmappedField {
                        field: output_column_name(&self.schema, &self.columns[col]).to_string(),
                        values,
                    })
                    .collect(),
            ));
        }
        if !invalid.is_empty() {
            return Err(CodecError::InvalidNumeric(invalid));
        }

        if let Some(scaler) = &self.scaler {
            scaler.transform(&mut frame);
        }
        debug!(
            "Encoded {} records into {} columns for '{}' {}",
            records.len(),
            self.columns.len(),
            self.name,
            self.version
        );
        Ok(frame.mapv(|v| v as f32))
    }

    /// Encodes a single record into a `(1, columns)` matrix
    pub fn encode_one(&self, record: &Record) -> Result<Array2<f32>, CodecError> {
        self.encode(std::slice::from_ref(record))
    }

    /// Decodes one raw model output into a label. Never fails.
    pub fn decode(&self, raw: &RawOutput) -> String {
        self.decoder.decode(raw)
    }

    /// Decodes every row of a batch output. A single column is read as a
    /// probability per record, several columns as class scores.
    pub fn decode_batch(&self, output: &Array2<f32>) -> Vec<String> {
        output
            .rows()
            .into_iter()
            .map(|row| {
                let values: Vec<f64> = row.iter().map(|&v| v as f64).collect();
                self.decoder
                    .decode_slice(&values)
                    .unwrap_or_else(|| RawOutput::Vector(values).to_string())
            })
            .collect()
    }

    /// Encodes the batch, runs the model once over all rows and decodes each
    /// output row, keeping each record's identity.
    pub fn predict<M: InferenceModel + ?Sized>(
        &self,
        model: &M,
        records: &[Record],
    ) -> Result<Vec<PredictionResult>, CodecError> {
        let input = self.encode(records)?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let output = model
            .infer(input.view())
            .map_err(|e| CodecError::PredictionError(e.to_string()))?;
        if output.nrows() != records.len() {
            return Err(CodecError::PredictionError(format!(
                "Model returned {} output rows for {} records",
                output.nrows(),
                records.len()
            )));
        }

        Ok(records
            .iter()
            .zip(output.rows())
            .map(|(record, row)| {
                let raw_output = RawOutput::Vector(row.iter().map(|&v| v as f64).collect());
                PredictionResult {
                    record_identity: record.identity().map(String::from),
                    label: self.decoder.decode(&raw_output),
                    raw_output,
                }
            })
            .collect())
    }

    /// SHA-256 over everything that affects encoding and decoding: schema,
    /// scaler, threshold and output map.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        self.schema.feed(&mut hasher);
        if let Some(scaler) = &self.scaler {
            hasher.update(b"scaler");
            for (i, name) in scaler.feature_order.iter().enumerate() {
                hasher.update(name.as_bytes());
                hasher.update([0u8]);
                hasher.update(scaler.mean[i].to_le_bytes());
                hasher.update(scaler.scale[i].to_le_bytes());
            }
        }
        hasher.update(b"threshold");
        hasher.update(self.decoder.threshold.to_le_bytes());
        for (idx, label) in self.decoder.output_map.iter() {
            hasher.update((idx as u64).to_le_bytes());
            hasher.update(label.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }
}

fn output_column_name<'a>(schema: &'a FeatureSchema, source: &'a ColumnSource) -> &'a str {
    match source {
        ColumnSource::Feature(idx) => schema.required_fields()[*idx].as_str(),
        ColumnSource::Passthrough(name) => name.as_str(),
    }
}
