//! Configuration service layer
//!
//! This module provides the engine behind [`ConfigManager`]:
//! - Defaults, validation and encryption of secret values
//! - Revision history with current/previous pointers
//! - Host group overlays and their cascade from the parent
//! - Config switch on bundle upgrade
//! - UI and executor read projections
//! - Materialization of file values on disk

pub mod defaults;
pub mod files;
pub mod history;
pub mod host_group;
pub mod manager;
pub mod projection;
pub mod secrets;
pub mod structure;
pub mod topology;
pub mod upgrade;
pub mod validator;
pub mod variant;

pub use defaults::{BundleFiles, Defaults, FsBundleFiles, StaticBundleFiles};
pub use files::{FileScope, SecretFiles};
pub use history::{Revision, RevisionSummary, Versioner};
pub use manager::{ConfigManager, ConfigManagerBuilder, ConfigObject};
pub use projection::ConfigFieldView;
pub use structure::{StructureChecker, YspecChecker};
pub use topology::{StaticTopology, Topology};
pub use upgrade::UpgradePlan;
pub use validator::{ValidationTarget, Validator};
