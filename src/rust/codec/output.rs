use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::CodecError;
use super::record::RawOutput;
use super::utils::argmax;

/// Mapping from class index to label. Must match the polarity the model was
/// trained with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputMap(BTreeMap<usize, String>);

impl OutputMap {
    pub fn new<S: Into<String>>(entries: impl IntoIterator<Item = (usize, S)>) -> Self {
        Self(entries.into_iter().map(|(k, v)| (k, v.into())).collect())
    }

    /// The label for `index`, or the index itself when the map has no entry
    pub fn label(&self, index: usize) -> String {
        self.0.get(&index).cloned().unwrap_or_else(|| index.to_string())
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(&index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Turns raw model output into labels. Decoding never fails: anything it
/// cannot interpret comes back as its own string form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DecoderParts")]
pub struct OutputDecoder {
    pub(crate) threshold: f64,
    pub(crate) output_map: OutputMap,
}

#[derive(Deserialize)]
struct DecoderParts {
    threshold: f64,
    output_map: OutputMap,
}

impl TryFrom<DecoderParts> for OutputDecoder {
    type Error = CodecError;

    fn try_from(parts: DecoderParts) -> Result<Self, Self::Error> {
        Self::new(parts.threshold, parts.output_map)
    }
}

impl OutputDecoder {
    pub fn new(threshold: f64, output_map: OutputMap) -> Result<Self, CodecError> {
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(CodecError::ValidationError(format!(
                "Threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        if output_map.is_empty() {
            return Err(CodecError::ValidationError("Output map cannot be empty".into()));
        }
        Ok(Self { threshold, output_map })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn output_map(&self) -> &OutputMap {
        &self.output_map
    }

    pub fn decode(&self, raw: &RawOutput) -> String {
        match raw {
            RawOutput::Scalar(value) => self.decode_scalar(*value).unwrap_or_else(|| raw.to_string()),
            RawOutput::Vector(values) => self.decode_slice(values).unwrap_or_else(|| raw.to_string()),
            RawOutput::Text(text) => match text.trim().parse::<f64>() {
                Ok(value) => self.decode_scalar(value).unwrap_or_else(|| text.clone()),
                Err(_) => text.clone(),
            },
        }
    }

    pub(crate) fn decode_slice(&self, values: &[f64]) -> Option<String> {
        match values {
            [] => None,
            [value] => self.decode_scalar(*value),
            _ => argmax(values).map(|idx| self.output_map.label(idx)),
        }
    }

    /// Inclusive: a probability equal to the threshold is class 1
    fn decode_scalar(&self, value: f64) -> Option<String> {
        if !value.is_finite() {
            return None;
        }
        let class = if value >= self.threshold { 1 } else { 0 };
        Some(self.output_map.label(class))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder(threshold: f64) -> OutputDecoder {
        OutputDecoder::new(threshold, OutputMap::new([(0, "default"), (1, "not-default")])).unwrap()
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let d = decoder(0.6);
        assert_eq!(d.decode(&RawOutput::Scalar(0.6)), "not-default");
        assert_eq!(d.decode(&RawOutput::Scalar(0.59999)), "default");
        assert_eq!(d.decode(&RawOutput::Vector(vec![0.6])), "not-default");
    }

    #[test]
    fn test_one_ulp_below_threshold() {
        let d = decoder(0.61);
        let below = f64::from_bits(0.61f64.to_bits() - 1);
        assert_eq!(d.decode(&RawOutput::Scalar(0.61)), "not-default");
        assert_eq!(d.decode(&RawOutput::Scalar(below)), "default");
    }

    #[test]
    fn test_argmax_fallback_to_index() {
        let d = OutputDecoder::new(0.6, OutputMap::new([(0, "default"), (2, "other")])).unwrap();
        assert_eq!(d.decode(&RawOutput::Vector(vec![0.1, 0.7, 0.2])), "1");
        assert_eq!(d.decode(&RawOutput::Vector(vec![0.5, 0.5])), "default");
    }

    #[test]
    fn test_text_and_degenerate_inputs() {
        let d = decoder(0.6);
        assert_eq!(d.decode(&RawOutput::Text("0.9".into())), "not-default");
        assert_eq!(d.decode(&RawOutput::Text("garbage".into())), "garbage");
        assert_eq!(d.decode(&RawOutput::Vector(vec![])), "[]");
        assert_eq!(d.decode(&RawOutput::Scalar(f64::NAN)), "NaN");
        assert_eq!(d.decode(&RawOutput::Vector(vec![f64::NAN, f64::NAN])), "[NaN, NaN]");
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let map = OutputMap::new([(0, "default")]);
        assert!(OutputDecoder::new(1.5, map.clone()).is_err());
        assert!(OutputDecoder::new(f64::NAN, map).is_err());
        assert!(OutputDecoder::new(0.5, OutputMap::new(Vec::<(usize, String)>::new())).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let d: OutputDecoder =
            serde_json::from_str(r#"{"threshold": 0.6, "output_map": {"0": "default", "1": "not-default"}}"#)
                .unwrap();
        assert_eq!(d, decoder(0.6));
        let bad = serde_json::from_str::<OutputDecoder>(r#"{"threshold": 60, "output_map": {"0": "default"}}"#);
        assert!(bad.is_err());
        let empty = serde_json::from_str::<OutputDecoder>(r#"{"threshold": 0.5, "output_map": {}}"#);
        assert!(empty.is_err());
    }

    #[test]
    fn test_output_map_json_keys() {
        let map: OutputMap = serde_json::from_str(r#"{"0": "default", "1": "not-default"}"#).unwrap();
        assert_eq!(map.get(1), Some("not-default"));
    }
}
