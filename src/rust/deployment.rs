//! Model deployment descriptors: everything that differs between deployed
//! model versions (schema, threshold, output map, scaler, batch policy, label
//! coding) in one JSON document, loaded once at startup.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::batch::MissingValuePolicy;
use crate::codec::{
    tb_default_schema, CodecError, DiabetesCoding, FeatureCodec, FeatureSchema, OutputMap, Scaler,
};
use crate::evaluation::LabelCoding;

#[derive(Debug, thiserror::Error)]
pub enum DeploymentError {
    #[error("Deployment not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Invalid descriptor: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Fingerprint mismatch for deployment '{name}': expected {expected}, got {actual}")]
    FingerprintMismatch {
        name: String,
        expected: String,
        actual: String,
    },
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Descriptor of one deployed model version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDeployment {
    pub name: String,
    pub version: String,
    pub schema: FeatureSchema,
    /// Decision boundary for single-probability outputs, calibrated per artifact
    pub threshold: f64,
    pub output_map: OutputMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaler: Option<Scaler>,
    #[serde(default)]
    pub missing_values: MissingValuePolicy,
    /// How numeric outcome codes map to labels when evaluating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_coding: Option<LabelCoding>,
    /// Expected codec fingerprint; verified when the codec is built
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

/// Deployments that ship with the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinDeployment {
    /// The TB treatment-default network trained on nine clinical and
    /// demographic features, calibrated at a 0.61 threshold.
    TbDefault,
}

impl BuiltinDeployment {
    /// Builds the descriptor. The DiabetesStatus coding has no default and
    /// must match the artifact being served.
    pub fn descriptor(self, diabetes: DiabetesCoding) -> ModelDeployment {
        match self {
            Self::TbDefault => ModelDeployment {
                name: "tb-default".to_string(),
                version: "1".to_string(),
                schema: tb_default_schema(diabetes),
                threshold: 0.61,
                output_map: OutputMap::new([(0, "default"), (1, "not-default")]),
                scaler: None,
                missing_values: MissingValuePolicy::Reject,
                label_coding: Some(LabelCoding::new([(0, "default"), (1, "not-default")])),
                fingerprint: None,
            },
        }
    }
}

impl ModelDeployment {
    pub fn from_json(json: &str) -> Result<Self, DeploymentError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DeploymentError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DeploymentError::NotFound(path.display().to_string()));
        }
        let deployment = Self::from_json(&fs::read_to_string(path)?)?;
        info!(
            "Loaded deployment '{}' {} from {:?}",
            deployment.name, deployment.version, path
        );
        Ok(deployment)
    }

    pub fn to_json(&self) -> Result<String, DeploymentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Builds the codec for this deployment, checking the recorded fingerprint
    /// if there is one.
    pub fn codec(&self) -> Result<FeatureCodec, DeploymentError> {
        let mut builder = FeatureCodec::builder()
            .with_name(&self.name)
            .with_version(&self.version)
            .with_schema(self.schema.clone())?
            .with_threshold(self.threshold)
            .with_output_map(self.output_map.clone());
        if let Some(scaler) = &self.scaler {
            builder = builder.with_scaler(scaler.clone());
        }
        let codec = builder.build()?;

        if let Some(expected) = &self.fingerprint {
            let actual = codec.fingerprint();
            if !expected.eq_ignore_ascii_case(&actual) {
                return Err(DeploymentError::FingerprintMismatch {
                    name: self.name.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(codec)
    }

    /// Records the current fingerprint so later loads detect any edit
    pub fn sealed(mut self) -> Result<Self, DeploymentError> {
        self.fingerprint = None;
        self.fingerprint = Some(self.codec()?.fingerprint());
        Ok(self)
    }
}

/// Directory of deployment descriptors, one `<name>.json` per deployment.
#[derive(Debug, Clone)]
pub struct DeploymentStore {
    dir: PathBuf,
}

impl DeploymentStore {
    /// Creates a store in the default directory
    pub fn new_default() -> io::Result<Self> {
        Self::new(Self::default_dir())
    }

    /// Returns the default deployments directory
    pub fn default_dir() -> PathBuf {
        // 1. Check environment variable
        if let Ok(path) = env::var("TBCODEC_HOME") {
            return PathBuf::from(path).join("deployments");
        }

        // 2. Use platform-specific config directory
        if let Some(config_dir) = dirs::config_dir() {
            return config_dir.join("tbcodec").join("deployments");
        }

        // 3. Fallback to user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".config").join("tbcodec").join("deployments");
        }

        env::temp_dir().join("tbcodec").join("deployments")
    }

    pub fn new<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    /// Names of every stored deployment, sorted
    pub fn list(&self) -> Result<Vec<String>, DeploymentError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn load(&self, name: &str) -> Result<ModelDeployment, DeploymentError> {
        let path = self.path_for(name);
        if !path.exists() {
            return Err(DeploymentError::NotFound(name.to_string()));
        }
        let deployment = ModelDeployment::load(&path)?;
        if deployment.name != name {
            warn!(
                "Descriptor {:?} declares name '{}'",
                path, deployment.name
            );
        }
        Ok(deployment)
    }

    /// Writes a descriptor under its own name.
    ///
    /// An existing descriptor of the same name is only replaced when the new
    /// schema keeps its feature order and every code it assigns; otherwise
    /// the stored one stays and the conflict is returned. A stored descriptor
    /// that no longer parses is overwritten with a warning. Use
    /// [`DeploymentStore::remove`] first to replace a schema deliberately.
    pub fn save(&self, deployment: &ModelDeployment) -> Result<PathBuf, DeploymentError> {
        let path = self.path_for(&deployment.name);
        if path.exists() {
            match ModelDeployment::load(&path) {
                Ok(previous) => deployment.schema.check_compatible(&previous.schema)?,
                Err(e) => warn!("Replacing unreadable descriptor {:?}: {}", path, e),
            }
        }
        fs::write(&path, deployment.to_json()?)?;
        info!("Saved deployment '{}' to {:?}", deployment.name, path);
        Ok(path)
    }

    pub fn remove(&self, name: &str) -> Result<(), DeploymentError> {
        let path = self.path_for(name);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_descriptor() {
        let deployment = BuiltinDeployment::TbDefault.descriptor(DiabetesCoding::DiabeticIsZero);
        assert_eq!(deployment.threshold, 0.61);
        let codec = deployment.codec().unwrap();
        assert_eq!(codec.schema().len(), 9);
    }

    #[test]
    fn test_json_roundtrip_keeps_fingerprint() {
        let deployment = BuiltinDeployment::TbDefault
            .descriptor(DiabetesCoding::DiabeticIsOne)
            .sealed()
            .unwrap();
        let parsed = ModelDeployment::from_json(&deployment.to_json().unwrap()).unwrap();
        assert_eq!(parsed, deployment);
        assert!(parsed.codec().is_ok());
    }

    #[test]
    fn test_edited_descriptor_fails_fingerprint() {
        let mut deployment = BuiltinDeployment::TbDefault
            .descriptor(DiabetesCoding::DiabeticIsZero)
            .sealed()
            .unwrap();
        deployment.threshold = 0.60;
        assert!(matches!(
            deployment.codec(),
            Err(DeploymentError::FingerprintMismatch { .. })
        ));
    }

    #[test]
    fn test_minimal_descriptor_defaults() {
        let json = r#"{
            "name": "mini",
            "version": "3",
            "schema": {"fields": [{"name": "Age", "kind": "numeric"}]},
            "threshold": 0.6,
            "output_map": {"0": "default", "1": "not-default"}
        }"#;
        let deployment = ModelDeployment::from_json(json).unwrap();
        assert_eq!(deployment.missing_values, MissingValuePolicy::Reject);
        assert!(deployment.scaler.is_none());
        assert!(deployment.label_coding.is_none());
    }
}
