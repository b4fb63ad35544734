//! ADCM Common - Shared types for the configuration engine
//!
//! This crate provides the foundational pieces used by every ADCM crate:
//! - The domain error sum and its table of error codes
//! - The secret vault (encryption at rest for secret-typed values)
//! - Common constants shared by the engine and its collaborators

pub mod crypto;
pub mod error;

// Re-exports for convenience
pub use crypto::{CryptoError, CryptoResult, SecretVault, VAULT_HEADER};
pub use error::{AdcmError, AdcmResult, ErrorCode};

/// Key under which executors expect vault-wrapped secrets
pub const ANSIBLE_VAULT_KEY: &str = "__ansible_vault";

/// Config key that receives the private-key newline fix on materialization
pub const PRIVATE_KEY_FILE_KEY: &str = "ansible_ssh_private_key_file";

/// Description of the first revision of every object config
pub const INIT_DESCRIPTION: &str = "init";

/// Description of the revision appended by a bundle upgrade
pub const UPGRADE_DESCRIPTION: &str = "upgrade";

/// Attribute key holding the host-group override tree
pub const GROUP_KEYS: &str = "group_keys";

/// Attribute key holding the host-group customizability tree
pub const CUSTOM_GROUP_KEYS: &str = "custom_group_keys";
