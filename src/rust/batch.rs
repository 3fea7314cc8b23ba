//! Missing-value screening for uploaded batches.
//!
//! Encoding always rejects a batch with missing values. A batch driver that
//! prefers to drop incomplete rows screens the batch first with
//! [`MissingValuePolicy::DropAndWarn`] and reports what it dropped.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::codec::{CodecError, FeatureCodec, MissingFields, Record};

/// What a batch driver does with rows that lack required values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingValuePolicy {
    /// Fail the whole batch, naming every incomplete row and field
    #[default]
    Reject,
    /// Drop incomplete rows and report them alongside the result
    DropAndWarn,
}

/// Outcome of screening a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Screened {
    /// Rows that carry every required field, in their original order
    pub kept: Vec<Record>,
    /// Original index of each kept row
    pub kept_rows: Vec<usize>,
    /// Rows left out, with the fields each one lacked
    pub dropped: Vec<MissingFields>,
}

/// Splits `records` into complete and incomplete rows according to `policy`.
pub fn screen(
    codec: &FeatureCodec,
    records: Vec<Record>,
    policy: MissingValuePolicy,
) -> Result<Screened, CodecError> {
    let required = codec.required_fields();
    let mut screened = Screened {
        kept: Vec::with_capacity(records.len()),
        kept_rows: Vec::with_capacity(records.len()),
        dropped: Vec::new(),
    };

    for (row, record) in records.into_iter().enumerate() {
        let fields: Vec<String> = required
            .iter()
            .filter(|field| record.get(field).is_none())
            .map(|field| field.to_string())
            .collect();
        if fields.is_empty() {
            screened.kept.push(record);
            screened.kept_rows.push(row);
        } else {
            screened.dropped.push(MissingFields { row, fields });
        }
    }

    if screened.dropped.is_empty() {
        return Ok(screened);
    }
    match policy {
        MissingValuePolicy::Reject => Err(CodecError::MissingField(screened.dropped)),
        MissingValuePolicy::DropAndWarn => {
            for dropped in &screened.dropped {
                warn!("Dropping row {}: missing {:?}", dropped.row, dropped.fields);
            }
            Ok(screened)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FeatureSchema, FieldSpec, OutputMap};

    fn codec() -> FeatureCodec {
        FeatureCodec::builder()
            .with_schema(
                FeatureSchema::new(vec![
                    FieldSpec::numeric("Age"),
                    FieldSpec::categorical("Gender", [("Female", 0), ("Male", 1)]),
                ])
                .unwrap(),
            )
            .unwrap()
            .with_threshold(0.6)
            .with_output_map(OutputMap::new([(0, "default"), (1, "not-default")]))
            .build()
            .unwrap()
    }

    fn batch() -> Vec<Record> {
        vec![
            Record::new().with("Age", 30).with("Gender", "Male"),
            Record::new().with("Gender", "Female"),
            Record::new().with("Age", 41).with("Gender", "Female"),
            Record::new().with("Age", 52),
        ]
    }

    #[test]
    fn test_reject_reports_every_row() {
        match screen(&codec(), batch(), MissingValuePolicy::Reject).unwrap_err() {
            CodecError::MissingField(missing) => {
                assert_eq!(missing.len(), 2);
                assert_eq!(missing[0], MissingFields { row: 1, fields: vec!["Age".into()] });
                assert_eq!(missing[1], MissingFields { row: 3, fields: vec!["Gender".into()] });
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_drop_and_warn_keeps_order() {
        let screened = screen(&codec(), batch(), MissingValuePolicy::DropAndWarn).unwrap();
        assert_eq!(screened.kept_rows, vec![0, 2]);
        assert_eq!(screened.kept.len(), 2);
        assert_eq!(screened.dropped.len(), 2);
        assert!(codec().encode(&screened.kept).is_ok());
    }

    #[test]
    fn test_complete_batch_passes_any_policy() {
        let records = vec![Record::new().with("Age", 30).with("Gender", "Male")];
        let screened = screen(&codec(), records, MissingValuePolicy::Reject).unwrap();
        assert!(screened.dropped.is_empty());
    }
}
