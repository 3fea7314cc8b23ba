//! CSV interchange for batch drivers: uploaded record tables, raw model
//! outputs, encoded matrices and input templates.

use std::fs::File;
use std::io;
use std::path::Path;

use ndarray::Array2;

use crate::codec::{FeatureSchema, FieldValue, RawOutput, Record};

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Expected {expected} model outputs, got {actual}")]
    RowCountMismatch { expected: usize, actual: usize },
    #[error("Invalid row mapping: {0}")]
    RowMapping(String),
}

/// A header row plus string cells, exactly as read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Reads a CSV with a header row. Cells are kept verbatim, without
    /// trimming, so categorical values match the schema exactly.
    pub fn read_csv<R: io::Read>(reader: R) -> Result<Self, TableError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let headers = reader.headers()?.iter().map(String::from).collect();
        let mut rows: Vec<Vec<String>> = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(String::from).collect());
        }
        Ok(Self { headers, rows })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, TableError> {
        Self::read_csv(File::open(path)?)
    }

    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), TableError> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Turns every row into a record. Empty cells become missing values and
    /// `identity_column`, if given, becomes the record identity.
    pub fn to_records(&self, identity_column: Option<&str>) -> Vec<Record> {
        let identity = identity_column.and_then(|name| self.column(name));
        self.rows
            .iter()
            .map(|row| {
                let mut record = Record::new();
                for (header, cell) in self.headers.iter().zip(row.iter()) {
                    let value = if cell.trim().is_empty() {
                        FieldValue::Missing
                    } else {
                        FieldValue::Text(cell.clone())
                    };
                    record.insert(header.clone(), value);
                }
                match identity.and_then(|idx| row.get(idx)) {
                    Some(id) if !id.is_empty() => record.with_identity(id.clone()),
                    _ => record,
                }
            })
            .collect()
    }

    /// Reads each row as one model output. A single cell stays text for the
    /// decoder to interpret; several cells form a score vector if they all
    /// parse, otherwise the joined text.
    pub fn raw_outputs(&self) -> Vec<RawOutput> {
        self.rows
            .iter()
            .map(|row| match row.as_slice() {
                [cell] => RawOutput::Text(cell.clone()),
                cells => cells
                    .iter()
                    .map(|c| c.trim().parse::<f64>())
                    .collect::<Result<Vec<_>, _>>()
                    .map(RawOutput::Vector)
                    .unwrap_or_else(|_| RawOutput::Text(cells.join(","))),
            })
            .collect()
    }

    /// Appends a column, e.g. `Prediction`, one value per row. Short rows are
    /// padded first so the value lands under its header.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<String>) {
        let width = self.headers.len();
        self.headers.push(name.into());
        for (row, value) in self.rows.iter_mut().zip(values) {
            if row.len() < width {
                row.resize(width, String::new());
            }
            row.push(value);
        }
    }

    /// Appends the `Prediction` column.
    ///
    /// Without `kept_rows` there must be exactly one label per row. With it,
    /// `kept_rows[i]` is the row that `labels[i]` belongs to (as written by the
    /// encoder after screening), and rows that were dropped get an empty
    /// prediction. Nothing is changed when the labels don't line up.
    pub fn push_predictions(&mut self, labels: Vec<String>, kept_rows: Option<&[usize]>) -> Result<(), TableError> {
        let expected = kept_rows.map_or(self.rows.len(), <[usize]>::len);
        if labels.len() != expected {
            return Err(TableError::RowCountMismatch {
                expected,
                actual: labels.len(),
            });
        }

        let column = match kept_rows {
            None => labels,
            Some(kept) => {
                let mut column = vec![String::new(); self.rows.len()];
                let mut previous: Option<usize> = None;
                for (&row, label) in kept.iter().zip(labels) {
                    if row >= self.rows.len() {
                        return Err(TableError::RowMapping(format!(
                            "row {} is past the end of a {}-row table",
                            row,
                            self.rows.len()
                        )));
                    }
                    if previous.is_some_and(|p| p >= row) {
                        return Err(TableError::RowMapping(format!("row {} is out of order", row)));
                    }
                    column[row] = label;
                    previous = Some(row);
                }
                column
            }
        };
        self.push_column("Prediction", column);
        Ok(())
    }
}

/// Writes the original row index (0-based, header excluded) of every encoded
/// row, one per line under a `row` header.
pub fn write_row_indices<W: io::Write>(rows: &[usize], writer: W) -> Result<(), TableError> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(["row"])?;
    for row in rows {
        writer.write_record([row.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_row_indices<R: io::Read>(reader: R) -> Result<Vec<usize>, TableError> {
    let table = Table::read_csv(reader)?;
    table
        .rows
        .iter()
        .map(|row| {
            let cell = row.first().map(String::as_str).unwrap_or("");
            cell.trim()
                .parse::<usize>()
                .map_err(|_| TableError::RowMapping(format!("'{}' is not a row index", cell)))
        })
        .collect()
}

/// Writes an encoded matrix with its column names as header
pub fn write_matrix<W: io::Write>(columns: &[&str], matrix: &Array2<f32>, writer: W) -> Result<(), TableError> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(columns)?;
    for row in matrix.rows() {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes an empty input template: identifier columns, then the features.
pub fn write_template<W: io::Write, S: AsRef<str>>(
    schema: &FeatureSchema,
    identifier_columns: &[S],
    writer: W,
) -> Result<(), TableError> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(writer);
    writer.write_record(schema.template_columns(identifier_columns))?;
    writer.flush()?;
    Ok(())
}

/// Writes the accepted values of every categorical column as `field,value`
/// rows, for building dropdown validations.
pub fn write_template_options<W: io::Write>(schema: &FeatureSchema, writer: W) -> Result<(), TableError> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(["field", "value"])?;
    for (field, values) in schema.template_options() {
        for value in values {
            writer.write_record([field, value])?;
        }
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FieldSpec;
    use ndarray::array;

    const UPLOAD: &str = "PatientName,PatientID,Age,Gender\n\
                          Asha,P1,32,Female\n\
                          Ravi,P2,,Male\n";

    #[test]
    fn test_records_from_csv() {
        let table = Table::read_csv(UPLOAD.as_bytes()).unwrap();
        let records = table.to_records(Some("PatientID"));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identity(), Some("P1"));
        assert_eq!(records[0].get("Gender"), Some(&FieldValue::Text("Female".into())));
        assert!(records[1].get("Age").is_none());
    }

    #[test]
    fn test_push_prediction_column() {
        let mut table = Table::read_csv(UPLOAD.as_bytes()).unwrap();
        table.push_column("Prediction", vec!["default".into(), "not-default".into()]);
        let mut out = Vec::new();
        table.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("PatientName,PatientID,Age,Gender,Prediction\n"));
        assert!(text.contains("Asha,P1,32,Female,default"));
    }

    #[test]
    fn test_predictions_follow_kept_rows() {
        let mut table = Table::read_csv(UPLOAD.as_bytes()).unwrap();
        table.push_predictions(vec!["default".into()], Some(&[1][..])).unwrap();
        assert_eq!(table.rows[0].last().map(String::as_str), Some(""));
        assert_eq!(table.rows[1].last().map(String::as_str), Some("default"));
    }

    #[test]
    fn test_misaligned_predictions_rejected() {
        let mut table = Table::read_csv(UPLOAD.as_bytes()).unwrap();
        let before = table.clone();
        assert!(matches!(
            table.push_predictions(vec!["default".into()], None),
            Err(TableError::RowCountMismatch { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            table.push_predictions(vec!["a".into(), "b".into(), "c".into()], None),
            Err(TableError::RowCountMismatch { expected: 2, actual: 3 })
        ));
        assert!(matches!(
            table.push_predictions(vec!["a".into()], Some(&[5][..])),
            Err(TableError::RowMapping(_))
        ));
        assert!(matches!(
            table.push_predictions(vec!["a".into(), "b".into()], Some(&[1, 0][..])),
            Err(TableError::RowMapping(_))
        ));
        assert_eq!(table, before);
    }

    #[test]
    fn test_short_rows_padded() {
        let mut table = Table::read_csv("a,b,c\n1\n".as_bytes()).unwrap();
        table.push_column("Prediction", vec!["x".into()]);
        assert_eq!(table.rows[0], vec!["1", "", "", "x"]);
    }

    #[test]
    fn test_row_indices() {
        let mut out = Vec::new();
        write_row_indices(&[0, 2, 7], &mut out).unwrap();
        assert_eq!(String::from_utf8(out.clone()).unwrap(), "row\n0\n2\n7\n");
        assert_eq!(read_row_indices(out.as_slice()).unwrap(), vec![0, 2, 7]);
        assert!(matches!(read_row_indices("row\nx\n".as_bytes()), Err(TableError::RowMapping(_))));
    }

    #[test]
    fn test_raw_outputs() {
        let table = Table::read_csv("p\n0.7\nabc\n".as_bytes()).unwrap();
        assert_eq!(
            table.raw_outputs(),
            vec![RawOutput::Text("0.7".into()), RawOutput::Text("abc".into())]
        );
        let scores = Table::read_csv("a,b\n0.2,0.8\n".as_bytes()).unwrap();
        assert_eq!(scores.raw_outputs(), vec![RawOutput::Vector(vec![0.2, 0.8])]);
    }

    #[test]
    fn test_matrix_and_template_output() {
        let mut out = Vec::new();
        write_matrix(&["Age", "Gender"], &array![[32.0f32, 0.0]], &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Age,Gender\n32,0\n");

        let schema = FeatureSchema::new(vec![
            FieldSpec::numeric("Age"),
            FieldSpec::categorical("Gender", [("Female", 0), ("Male", 1)]),
        ])
        .unwrap();
        let mut out = Vec::new();
        write_template(&schema, &["PatientID"], &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "PatientID,Age,Gender\n");

        let mut out = Vec::new();
        write_template_options(&schema, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "field,value\nGender,Female\nGender,Male\n");
    }
}
