use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use super::error::CodecError;
use super::schema::FeatureSchema;

/// A previously fitted per-column affine transform, `(x - mean) / scale`.
///
/// The scaler carries its own column order. It must cover every column of the
/// schema's feature order and may list extra numeric columns, which are then
/// read straight from the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub feature_order: Vec<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// Where each scaler column takes its input from.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ColumnSource {
    /// Index into the schema's feature order
    Feature(usize),
    /// A numeric column that only the scaler knows about
    Passthrough(String),
}

impl Scaler {
    pub fn new(feature_order: Vec<String>, mean: Vec<f64>, scale: Vec<f64>) -> Self {
        Self {
            feature_order,
            mean,
            scale,
        }
    }

    /// Checks the fitted parameters and reconciles the scaler's column order
    /// with the schema, returning the source of every output column.
    pub(crate) fn plan(&self, schema: &FeatureSchema) -> Result<Vec<ColumnSource>, CodecError> {
        let n = self.feature_order.len();
        if self.mean.len() != n || self.scale.len() != n {
            return Err(CodecError::BuildError(format!(
                "Scaler has {} columns but {} means and {} scales",
                n,
                self.mean.len(),
                self.scale.len()
            )));
        }
        for (i, name) in self.feature_order.iter().enumerate() {
            if !self.mean[i].is_finite() {
                return Err(CodecError::BuildError(format!("Scaler mean for '{}' is not finite", name)));
            }
            if !self.scale[i].is_finite() || self.scale[i] == 0.0 {
                return Err(CodecError::BuildError(format!(
                    "Scaler scale for '{}' must be finite and non-zero, got {}",
                    name, self.scale[i]
                )));
            }
            if self.feature_order[..i].contains(name) {
                return Err(CodecError::BuildError(format!("Scaler lists column '{}' twice", name)));
            }
        }

        let uncovered: Vec<&str> = schema
            .required_fields()
            .iter()
            .filter(|f| !self.feature_order.contains(f))
            .map(String::as_str)
            .collect();
        if !uncovered.is_empty() {
            return Err(CodecError::BuildError(format!(
                "Scaler does not cover schema columns {:?}",
                uncovered
            )));
        }

        Ok(self
            .feature_order
            .iter()
            .map(|name| match schema.position(name) {
                Some(idx) => ColumnSource::Feature(idx),
                None => ColumnSource::Passthrough(name.clone()),
            })
            .collect())
    }

    /// Applies the transform in place to a frame already in the scaler's order
    pub(crate) fn transform(&self, frame: &mut Array2<f64>) {
        let mean = ArrayView1::from(&self.mean[..]);
        let scale = ArrayView1::from(&self.scale[..]);
        for mut row in frame.rows_mut() {
            row -= &mean;
            row /= &scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::schema::FieldSpec;
    use ndarray::array;

    fn schema() -> FeatureSchema {
        FeatureSchema::new(vec![
            FieldSpec::numeric("Age"),
            FieldSpec::categorical("Gender", [("Female", 0), ("Male", 1)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_plan_permutation_and_superset() {
        let scaler = Scaler::new(
            vec!["Gender".into(), "Height".into(), "Age".into()],
            vec![0.0, 0.0, 0.0],
            vec![1.0, 1.0, 1.0],
        );
        let plan = scaler.plan(&schema()).unwrap();
        assert_eq!(
            plan,
            vec![
                ColumnSource::Feature(1),
                ColumnSource::Passthrough("Height".into()),
                ColumnSource::Feature(0),
            ]
        );
    }

    #[test]
    fn test_plan_rejects_uncovered_and_zero_scale() {
        let missing_age = Scaler::new(vec!["Gender".into()], vec![0.0], vec![1.0]);
        assert!(matches!(missing_age.plan(&schema()), Err(CodecError::BuildError(_))));

        let zero = Scaler::new(vec!["Age".into(), "Gender".into()], vec![0.0, 0.0], vec![0.0, 1.0]);
        assert!(matches!(zero.plan(&schema()), Err(CodecError::BuildError(_))));

        let ragged = Scaler::new(vec!["Age".into(), "Gender".into()], vec![0.0], vec![1.0, 1.0]);
        assert!(matches!(ragged.plan(&schema()), Err(CodecError::BuildError(_))));
    }

    #[test]
    fn test_transform() {
        let scaler = Scaler::new(vec!["Age".into(), "Gender".into()], vec![30.0, 0.5], vec![10.0, 0.5]);
        let mut frame = array![[40.0, 1.0], [20.0, 0.0]];
        scaler.transform(&mut frame);
        assert_eq!(frame, array![[1.0, 1.0], [-1.0, -1.0]]);
    }
}
