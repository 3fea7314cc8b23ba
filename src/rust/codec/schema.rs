//! Schema registry: the single definition of feature names, feature order and
//! the value to code table of every categorical field.
//!
//! The codes stored here must be exactly the codes the model was fitted against.
//! Nothing in the crate rewrites them; a schema can only be replaced by a new
//! descriptor, and [`FeatureSchema::check_compatible`] tells whether the
//! replacement keeps every existing code.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::{CodeConflict, CodecError, InvalidNumeric, UnmappedField};
use super::record::FieldValue;

/// Identifier columns that precede the feature columns in input templates
pub const DEFAULT_IDENTIFIER_COLUMNS: [&str; 2] = ["PatientName", "PatientID"];

/// How a field's values are turned into a number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FieldKind {
    /// Surface strings looked up in a value map. Several strings may share a code.
    Categorical { values: BTreeMap<String, u32> },
    /// Parsed as a floating point number, no clamping
    Numeric,
}

/// Describes one input feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Stable key; also the column header in templates and uploaded tables
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Numeric,
        }
    }

    /// Creates a categorical field from `(surface value, code)` pairs
    ///
    /// ```
    /// use tbcodec::FieldSpec;
    ///
    /// let gender = FieldSpec::categorical("Gender", [("Female", 0), ("Male", 1)]);
    /// assert!(gender.is_categorical());
    /// ```
    pub fn categorical<S: Into<String>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = (S, u32)>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Categorical {
                values: values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            },
        }
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self.kind, FieldKind::Categorical { .. })
    }
}

/// Ordered collection of fields. The declaration order is the feature order of
/// the model's input vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureSchema {
    fields: Vec<FieldSpec>,
    #[serde(skip)]
    feature_order: Vec<String>,
}

impl<'de> Deserialize<'de> for FeatureSchema {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            fields: Vec<FieldSpec>,
        }
        let raw = Raw::deserialize(deserializer)?;
        FeatureSchema::new(raw.fields).map_err(serde::de::Error::custom)
    }
}

impl FeatureSchema {
    /// Creates a schema, rejecting empty or duplicate names and categorical
    /// fields without any accepted value.
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, CodecError> {
        if fields.is_empty() {
            return Err(CodecError::ValidationError("Schema must declare at least one field".into()));
        }
        let mut seen = HashSet::new();
        for field in &fields {
            if field.name.is_empty() {
                return Err(CodecError::ValidationError("Field name cannot be empty".into()));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(CodecError::ValidationError(format!(
                    "Field '{}' is declared more than once",
                    field.name
                )));
            }
            if let FieldKind::Categorical { values } = &field.kind {
                if values.is_empty() {
                    return Err(CodecError::ValidationError(format!(
                        "Categorical field '{}' must accept at least one value",
                        field.name
                    )));
                }
            }
        }
        let feature_order = fields.iter().map(|f| f.name.clone()).collect();
        Ok(Self { fields, feature_order })
    }

    /// Field names in the exact order the model's input vector expects
    pub fn required_fields(&self) -> &[String] {
        &self.feature_order
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Result<&FieldSpec, CodecError> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| CodecError::UnknownField(name.to_string()))
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.feature_order.iter().position(|f| f == name)
    }

    /// Accepted surface strings of a categorical field, for dropdowns and
    /// template validation. Numeric fields accept any number and return an
    /// empty set.
    pub fn valid_field_values(&self, name: &str) -> Result<BTreeSet<&str>, CodecError> {
        match &self.field(name)?.kind {
            FieldKind::Categorical { values } => Ok(values.keys().map(String::as_str).collect()),
            FieldKind::Numeric => Ok(BTreeSet::new()),
        }
    }

    /// Looks up the training-time code of a categorical value. Values are
    /// matched exactly: no trimming and no case folding.
    pub fn code_for(&self, name: &str, value: &str) -> Result<u32, CodecError> {
        match &self.field(name)?.kind {
            FieldKind::Categorical { values } => lookup_code(values, value).ok_or_else(|| {
                CodecError::UnmappedValue(vec![UnmappedField {
                    field: name.to_string(),
                    values: BTreeSet::from([value.to_string()]),
                }])
            }),
            FieldKind::Numeric => Err(CodecError::ValidationError(format!(
                "Field '{}' is numeric and has no value map",
                name
            ))),
        }
    }

    /// Parses a numeric field value. Range checks belong to whoever collects
    /// the input, so none are applied here.
    pub fn parse_numeric(&self, name: &str, value: &str) -> Result<f64, CodecError> {
        self.field(name)?;
        parse_finite(value).ok_or_else(|| {
            CodecError::InvalidNumeric(vec![InvalidNumeric {
                row: 0,
                field: name.to_string(),
                value: value.to_string(),
            }])
        })
    }

    /// Column headers for an input template: identifier columns, then features
    pub fn template_columns<S: AsRef<str>>(&self, identifier_columns: &[S]) -> Vec<String> {
        identifier_columns
            .iter()
            .map(|c| c.as_ref().to_string())
            .chain(self.feature_order.iter().cloned())
            .collect()
    }

    /// Dropdown options for each categorical column, in feature order
    pub fn template_options(&self) -> Vec<(&str, Vec<&str>)> {
        self.fields
            .iter()
            .filter_map(|f| match &f.kind {
                FieldKind::Categorical { values } => {
                    Some((f.name.as_str(), values.keys().map(String::as_str).collect()))
                }
                FieldKind::Numeric => None,
            })
            .collect()
    }

    /// SHA-256 over a canonical rendering of the schema. Two schemas with the
    /// same fingerprint encode every record identically.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        self.feed(&mut hasher);
        format!("{:x}", hasher.finalize())
    }

    pub(crate) fn feed(&self, hasher: &mut Sha256) {
        for field in &self.fields {
            hasher.update(field.name.as_bytes());
            hasher.update([0u8]);
            match &field.kind {
                FieldKind::Numeric => hasher.update(b"numeric"),
                FieldKind::Categorical { values } => {
                    hasher.update(b"categorical");
                    for (value, code) in values {
                        hasher.update(value.as_bytes());
                        hasher.update([0u8]);
                        hasher.update(code.to_le_bytes());
                    }
                }
            }
            hasher.update([0xffu8]);
        }
    }

    /// Checks that this schema keeps every code of `previous`: same feature
    /// order, and every surface value of the previous schema still maps to the
    /// same code. New values and synonyms are allowed.
    pub fn check_compatible(&self, previous: &FeatureSchema) -> Result<(), CodecError> {
        if self.feature_order != previous.feature_order {
            return Err(CodecError::ValidationError(format!(
                "Feature order changed from {:?} to {:?}",
                previous.feature_order, self.feature_order
            )));
        }

        let mut conflicts = Vec::new();
        for old in &previous.fields {
            let new = self.field(&old.name)?;
            match (&old.kind, &new.kind) {
                (FieldKind::Categorical { values: old_values }, FieldKind::Categorical { values: new_values }) => {
                    for (value, &code) in old_values {
                        let current = new_values.get(value).copied();
                        if current != Some(code) {
                            conflicts.push(CodeConflict {
                                field: old.name.clone(),
                                value: value.clone(),
                                previous: code,
                                current,
                            });
                        }
                    }
                }
                (FieldKind::Numeric, FieldKind::Numeric) => {}
                _ => {
                    return Err(CodecError::ValidationError(format!(
                        "Field '{}' changed kind",
                        old.name
                    )))
                }
            }
        }

        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(CodecError::Incompatible(conflicts))
        }
    }
}

pub(crate) fn parse_finite(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Looks up a categorical code by surface form. Numeric text that has no
/// exact entry is retried in canonical number form, so `"1.0"` finds `"1"`
/// the same way `FieldValue::Number(1.0)` does.
pub(crate) fn lookup_code(values: &BTreeMap<String, u32>, surface: &str) -> Option<u32> {
    values.get(surface).copied().or_else(|| {
        let canonical = FieldValue::Number(parse_finite(surface)?).to_string();
        values.get(&canonical).copied()
    })
}

/// Numeric reading of a record value; `None` means it failed to parse
pub(crate) fn numeric_value(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Number(n) if n.is_finite() => Some(*n),
        FieldValue::Number(_) | FieldValue::Missing => None,
        FieldValue::Text(text) => parse_finite(text),
    }
}

/// How the DiabetesStatus field was coded when the model was trained.
///
/// Two artifacts disagree on this, so there is no default: every deployment of
/// the builtin schema has to state it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiabetesCoding {
    /// "Diabetic" = 0, "Non-diabetic" = 1
    DiabeticIsZero,
    /// "Diabetic" = 1, "Non-diabetic" = 0
    DiabeticIsOne,
}

/// The feature layout of the TB treatment-default model.
pub fn tb_default_schema(diabetes: DiabetesCoding) -> FeatureSchema {
    let (diabetic, non_diabetic) = match diabetes {
        DiabetesCoding::DiabeticIsZero => (0, 1),
        DiabetesCoding::DiabeticIsOne => (1, 0),
    };

    let fields = vec![
        FieldSpec::numeric("Age"),
        FieldSpec::categorical("DiabetesStatus", [("Non-diabetic", non_diabetic), ("Diabetic", diabetic)]),
        FieldSpec::categorical("Microbiologically_Confirmed", [("No", 0), ("Yes", 1)]),
        FieldSpec::categorical(
            "TypeOfCase",
            [
                ("New", 0),
                ("PMDT", 1),
                ("Retreatment: Others", 2),
                ("Retreatment: Recurrent", 3),
                ("Retreatment: Treatment after failure", 4),
                ("Retreatment: Treatment after lost to follow up", 5),
            ],
        ),
        FieldSpec::categorical("SiteOfDisease", [("Extra Pulmonary", 0), ("Pulmonary", 1)]),
        FieldSpec::categorical("Gender", [("Female", 0), ("Male", 1), ("Transgender", 2)]),
        FieldSpec::categorical(
            "Inter-state/Inter-district enrollment",
            [("Inter-District", 0), ("Inter-State", 1)],
        ),
        FieldSpec::numeric("Weight"),
        FieldSpec::categorical(
            "HIV_Status",
            [("Non-Reactive", 0), ("Positive", 1), ("Reactive", 2), ("Unknown", 3)],
        ),
    ];

    // Statically well formed: names are unique and every map is non-empty.
    FeatureSchema {
        feature_order: fields.iter().map(|f| f.name.clone()).collect(),
        fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_schema() -> FeatureSchema {
        FeatureSchema::new(vec![
            FieldSpec::numeric("Age"),
            FieldSpec::categorical("Gender", [("Female", 0), ("Male", 1)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_required_fields_follow_declaration_order() {
        let schema = tb_default_schema(DiabetesCoding::DiabeticIsZero);
        assert_eq!(
            schema.required_fields(),
            &[
                "Age",
                "DiabetesStatus",
                "Microbiologically_Confirmed",
                "TypeOfCase",
                "SiteOfDisease",
                "Gender",
                "Inter-state/Inter-district enrollment",
                "Weight",
                "HIV_Status",
            ]
        );
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let result = FeatureSchema::new(vec![FieldSpec::numeric("Age"), FieldSpec::numeric("Age")]);
        assert!(matches!(result, Err(CodecError::ValidationError(_))));
    }

    #[test]
    fn test_empty_value_map_rejected() {
        let result = FeatureSchema::new(vec![FieldSpec::categorical::<&str>("Gender", [])]);
        assert!(matches!(result, Err(CodecError::ValidationError(_))));
    }

    #[test]
    fn test_code_for_is_exact() {
        let schema = small_schema();
        assert_eq!(schema.code_for("Gender", "Male").unwrap(), 1);
        let err = schema.code_for("Gender", "male").unwrap_err();
        match err {
            CodecError::UnmappedValue(fields) => {
                assert_eq!(fields[0].field, "Gender");
                assert!(fields[0].values.contains("male"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(schema.code_for("Height", "1"), Err(CodecError::UnknownField(_))));
    }

    #[test]
    fn test_synonyms_share_a_code() {
        let schema = FeatureSchema::new(vec![FieldSpec::categorical(
            "Microbiologically_Confirmed",
            [("No", 0), ("0", 0), ("Yes", 1), ("1", 1)],
        )])
        .unwrap();
        assert_eq!(schema.code_for("Microbiologically_Confirmed", "0").unwrap(), 0);
        assert_eq!(schema.code_for("Microbiologically_Confirmed", "No").unwrap(), 0);
    }

    #[test]
    fn test_numeric_text_matches_canonical_code() {
        let schema = FeatureSchema::new(vec![FieldSpec::categorical("Flag", [("0", 0), ("1", 1)])]).unwrap();
        assert_eq!(schema.code_for("Flag", "1.0").unwrap(), 1);
        assert_eq!(schema.code_for("Flag", " 0 ").unwrap(), 0);
        assert!(matches!(schema.code_for("Flag", "1.5"), Err(CodecError::UnmappedValue(_))));
    }

    #[test]
    fn test_parse_numeric() {
        let schema = small_schema();
        assert_eq!(schema.parse_numeric("Age", " 32 ").unwrap(), 32.0);
        assert!(matches!(schema.parse_numeric("Age", "thirty"), Err(CodecError::InvalidNumeric(_))));
        assert!(matches!(schema.parse_numeric("Age", "NaN"), Err(CodecError::InvalidNumeric(_))));
    }

    #[test]
    fn test_valid_values_for_numeric_is_empty() {
        let schema = small_schema();
        assert!(schema.valid_field_values("Age").unwrap().is_empty());
        assert_eq!(
            schema.valid_field_values("Gender").unwrap(),
            BTreeSet::from(["Female", "Male"])
        );
    }

    #[test]
    fn test_diabetes_coding_is_explicit() {
        let zero = tb_default_schema(DiabetesCoding::DiabeticIsZero);
        let one = tb_default_schema(DiabetesCoding::DiabeticIsOne);
        assert_eq!(zero.code_for("DiabetesStatus", "Diabetic").unwrap(), 0);
        assert_eq!(one.code_for("DiabetesStatus", "Diabetic").unwrap(), 1);
        assert_ne!(zero.fingerprint(), one.fingerprint());
    }

    #[test]
    fn test_compatible_extension_keeps_codes() {
        let base = small_schema();
        let extended = FeatureSchema::new(vec![
            FieldSpec::numeric("Age"),
            FieldSpec::categorical("Gender", [("Female", 0), ("F", 0), ("Male", 1), ("M", 1)]),
        ])
        .unwrap();
        assert!(extended.check_compatible(&base).is_ok());

        let recoded = FeatureSchema::new(vec![
            FieldSpec::numeric("Age"),
            FieldSpec::categorical("Gender", [("Female", 1)]),
        ])
        .unwrap();
        match recoded.check_compatible(&base).unwrap_err() {
            CodecError::Incompatible(conflicts) => {
                assert_eq!(conflicts.len(), 2);
                assert!(conflicts.iter().any(|c| c.value == "Male" && c.current.is_none()));
                assert!(conflicts.iter().any(|c| c.value == "Female" && c.current == Some(1)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_schema_json_roundtrip_validates() {
        let json = r#"{"fields": [
            {"name": "Age", "kind": "numeric"},
            {"name": "Gender", "kind": "categorical", "values": {"Female": 0, "Male": 1}}
        ]}"#;
        let schema: FeatureSchema = serde_json::from_str(json).unwrap();
        assert_eq!(schema, small_schema());

        let duplicate = r#"{"fields": [{"name": "Age", "kind": "numeric"}, {"name": "Age", "kind": "numeric"}]}"#;
        assert!(serde_json::from_str::<FeatureSchema>(duplicate).is_err());
    }

    #[test]
    fn test_template_columns() {
        let schema = small_schema();
        assert_eq!(
            schema.template_columns(&DEFAULT_IDENTIFIER_COLUMNS),
            vec!["PatientName", "PatientID", "Age", "Gender"]
        );
        assert_eq!(schema.template_options(), vec![("Gender", vec!["Female", "Male"])]);
    }
}
