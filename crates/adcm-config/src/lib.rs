//! ADCM Config - Typed hierarchical configuration engine
//!
//! This crate provides:
//! - The type registry and per-prototype schema model
//! - Validation of configuration payloads against a schema
//! - Versioned storage of config revisions with restore
//! - Host group overlays of a parent configuration
//! - Config switch on bundle upgrade
//! - UI and executor views of a stored config

pub mod model;
pub mod service;
pub mod settings;

// Re-export commonly used types
pub use model::{ConfigKind, FieldSpec, PrototypeSchema};
pub use service::*;
pub use settings::EngineSettings;
