//! Feature encoding and output decoding for tuberculosis treatment-default
//! prediction models.
//!
//! A deployed model expects a fixed-order `f32` vector whose categorical
//! columns carry the exact codes used at training time, and emits either a
//! probability or class scores. This crate owns both directions of that
//! mapping. Every mismatch on the way in is an error naming the offending
//! fields and values; the way out never fails.
//!
//! # Basic Usage
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use tbcodec::{BuiltinDeployment, DiabetesCoding, Record, RawOutput};
//!
//! let codec = BuiltinDeployment::TbDefault
//!     .descriptor(DiabetesCoding::DiabeticIsZero)
//!     .codec()?;
//!
//! let record = Record::new()
//!     .with("Gender", "Female")
//!     .with("Age", 32)
//!     .with("Weight", 55.0)
//!     .with("HIV_Status", "Non-Reactive")
//!     .with("DiabetesStatus", "Non-diabetic")
//!     .with("Microbiologically_Confirmed", "Yes")
//!     .with("TypeOfCase", "New")
//!     .with("SiteOfDisease", "Pulmonary")
//!     .with("Inter-state/Inter-district enrollment", "Inter-District");
//!
//! let input = codec.encode_one(&record)?;
//! assert_eq!(input.shape(), &[1, 9]);
//!
//! let label = codec.decode(&RawOutput::Scalar(0.78));
//! assert_eq!(label, "not-default");
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! A built [`FeatureCodec`] is immutable and can be shared across threads
//! using `Arc`:
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use tbcodec::{BuiltinDeployment, DiabetesCoding, RawOutput};
//! use std::sync::Arc;
//! use std::thread;
//!
//! let codec = Arc::new(
//!     BuiltinDeployment::TbDefault
//!         .descriptor(DiabetesCoding::DiabeticIsZero)
//!         .codec()?,
//! );
//!
//! let mut handles = vec![];
//! for p in [0.1, 0.9] {
//!     let codec = Arc::clone(&codec);
//!     handles.push(thread::spawn(move || codec.decode(&RawOutput::Scalar(p))));
//! }
//!
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod codec;
pub mod deployment;
pub mod evaluation;
pub mod table;

pub use batch::{screen, MissingValuePolicy, Screened};
pub use codec::{
    CodecError, CodecInfo, DiabetesCoding, FeatureCodec, FeatureCodecBuilder, FeatureSchema, FieldKind,
    FieldSpec, FieldValue, InferenceModel, OutputMap, PredictionResult, RawOutput, Record, Scaler,
};
pub use deployment::{BuiltinDeployment, DeploymentError, DeploymentStore, ModelDeployment};
pub use evaluation::{evaluate, Evaluation, EvaluationError, LabelCoding};

pub fn init_logger() {
    env_logger::init();
}
