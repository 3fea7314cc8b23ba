use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single value entered for a field, either in a form or in one cell of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    /// An explicitly empty value; treated exactly like an absent field
    Missing,
}

impl FieldValue {
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Missing => true,
            Self::Text(text) => text.trim().is_empty(),
            Self::Number(_) => false,
        }
    }
}

impl fmt::Display for FieldValue {
    /// Renders the value in its canonical surface form. Whole numbers print
    /// without a fractional part so that `0.0` looks up as `"0"`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(text) => f.write_str(text),
            Self::Missing => Ok(()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Number(value as f64)
    }
}

/// One subject's field to value mapping.
///
/// Field order inside a record carries no meaning; the codec always reads values
/// by name in the schema's feature order. Fields the schema does not declare are
/// ignored, so identifier columns may ride along. In JSON the identity sits
/// under the reserved `_id` key and every other key is a field.
///
/// ```
/// use tbcodec::Record;
///
/// let record = Record::new()
///     .with_identity("P-001")
///     .with("Age", 32)
///     .with("Gender", "Female");
/// assert_eq!(record.identity(), Some("P-001"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(flatten)]
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a field value
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Sets the identity reported back alongside this record's prediction
    pub fn with_identity(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn identity(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns the value for `field`, treating empty values as absent
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field).filter(|value| !value.is_missing())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            id: None,
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Raw per-record output of a model, in whatever shape the artifact produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawOutput {
    /// A single probability
    Scalar(f64),
    /// Either a one-element probability or a vector of class scores
    Vector(Vec<f64>),
    /// A value that arrived as text and has not been interpreted yet
    Text(String),
}

impl fmt::Display for RawOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(value) => write!(f, "{}", value),
            Self::Vector(values) => {
                write!(f, "[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "]")
            }
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<f64> for RawOutput {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<f32> for RawOutput {
    fn from(value: f32) -> Self {
        Self::Scalar(value as f64)
    }
}

impl From<Vec<f64>> for RawOutput {
    fn from(values: Vec<f64>) -> Self {
        Self::Vector(values)
    }
}

impl From<&[f32]> for RawOutput {
    fn from(values: &[f32]) -> Self {
        Self::Vector(values.iter().map(|&v| v as f64).collect())
    }
}

impl From<&str> for RawOutput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// The decoded outcome for one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub record_identity: Option<String>,
    pub label: String,
    pub raw_output: RawOutput,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_display_is_canonical() {
        assert_eq!(FieldValue::Number(0.0).to_string(), "0");
        assert_eq!(FieldValue::Number(32.0).to_string(), "32");
        assert_eq!(FieldValue::Number(0.5).to_string(), "0.5");
    }

    #[test]
    fn test_blank_text_counts_as_missing() {
        let record = Record::new().with("Gender", "  ").with("Age", 30);
        assert!(record.get("Gender").is_none());
        assert!(record.get("Age").is_some());
    }

    #[test]
    fn test_record_from_json() {
        let record: Record = serde_json::from_str(
            r#"{"_id": "P-7", "id": 12, "Age": 41, "Gender": "Male", "Weight": null}"#,
        )
        .unwrap();
        assert_eq!(record.identity(), Some("P-7"));
        assert_eq!(record.get("id"), Some(&FieldValue::Number(12.0)));
        assert_eq!(record.get("Age"), Some(&FieldValue::Number(41.0)));
        assert_eq!(record.get("Gender"), Some(&FieldValue::Text("Male".into())));
        assert!(record.get("Weight").is_none());
    }

    #[test]
    fn test_raw_output_display() {
        assert_eq!(RawOutput::Vector(vec![0.25, 0.75]).to_string(), "[0.25, 0.75]");
        assert_eq!(RawOutput::Vector(vec![]).to_string(), "[]");
    }
}
