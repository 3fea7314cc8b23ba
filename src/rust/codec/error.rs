use std::collections::BTreeSet;
use std::fmt;

/// A record in a batch that lacks one or more required fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingFields {
    /// Zero-based index of the record within the batch
    pub row: usize,
    /// Names of the required fields that were absent or empty
    pub fields: Vec<String>,
}

/// All unrecognised surface values seen for a single categorical field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmappedField {
    pub field: String,
    pub values: BTreeSet<String>,
}

/// A numeric field whose value could not be parsed as a finite number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidNumeric {
    pub row: usize,
    pub field: String,
    pub value: String,
}

/// A surface value whose code differs between two schema versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeConflict {
    pub field: String,
    pub value: String,
    /// Code assigned by the previous schema
    pub previous: u32,
    /// Code assigned by the new schema, `None` if the value was removed
    pub current: Option<u32>,
}

/// Represents the different types of errors that can occur while encoding records
/// or assembling a codec.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    /// One or more required fields are absent, across every record of the batch
    #[error("Missing required fields: {}", DisplayMissing(.0))]
    MissingField(Vec<MissingFields>),
    /// Categorical values not present in the field's value map
    #[error("Unmapped values: {}. Update the field's value map", DisplayUnmapped(.0))]
    UnmappedValue(Vec<UnmappedField>),
    /// Numeric fields that failed to parse
    #[error("Invalid numeric values: {}", DisplayInvalid(.0))]
    InvalidNumeric(Vec<InvalidNumeric>),
    /// A field name that the schema does not declare
    #[error("Unknown field '{0}'")]
    UnknownField(String),
    /// A schema change that alters or drops existing codes
    #[error("Incompatible schema change: {}", DisplayConflicts(.0))]
    Incompatible(Vec<CodeConflict>),
    /// Error occurred during the build phase
    #[error("Build error: {0}")]
    BuildError(String),
    /// Error occurred due to invalid configuration parameters
    #[error("Validation error: {0}")]
    ValidationError(String),
    /// Error occurred while running or interpreting model inference
    #[error("Prediction error: {0}")]
    PredictionError(String),
}

struct DisplayMissing<'a>(&'a [MissingFields]);

impl fmt::Display for DisplayMissing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut all: BTreeSet<&str> = BTreeSet::new();
        for missing in self.0 {
            all.extend(missing.fields.iter().map(String::as_str));
        }
        write!(f, "{}", join_quoted(all.iter().copied()))?;
        for missing in self.0 {
            write!(f, "; row {}: {}", missing.row, join_quoted(missing.fields.iter().map(String::as_str)))?;
        }
        Ok(())
    }
}

struct DisplayUnmapped<'a>(&'a [UnmappedField]);

impl fmt::Display for DisplayUnmapped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, unmapped) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(
                f,
                "column '{}': {{{}}}",
                unmapped.field,
                join_quoted(unmapped.values.iter().map(String::as_str))
            )?;
        }
        Ok(())
    }
}

struct DisplayInvalid<'a>(&'a [InvalidNumeric]);

impl fmt::Display for DisplayInvalid<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, invalid) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "row {} column '{}': '{}'", invalid.row, invalid.field, invalid.value)?;
        }
        Ok(())
    }
}

struct DisplayConflicts<'a>(&'a [CodeConflict]);

impl fmt::Display for DisplayConflicts<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, conflict) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            match conflict.current {
                Some(code) => write!(
                    f,
                    "'{}' = '{}' changed from {} to {}",
                    conflict.field, conflict.value, conflict.previous, code
                )?,
                None => write!(
                    f,
                    "'{}' = '{}' (code {}) was removed",
                    conflict.field, conflict.value, conflict.previous
                )?,
            }
        }
        Ok(())
    }
}

fn join_quoted<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.map(|s| format!("'{}'", s)).collect::<Vec<_>>().join(", ")
}
