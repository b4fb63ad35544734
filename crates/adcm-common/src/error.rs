//! Error types and error codes for ADCM
//!
//! This module defines:
//! - `AdcmError`: Domain error enum of the configuration engine
//! - `ErrorCode`: Structured, table-driven error codes for callers

use serde::{Deserialize, Serialize};

/// Domain errors raised by the configuration engine
#[derive(thiserror::Error, Debug)]
pub enum AdcmError {
    #[error("schema error: {0}")]
    SchemaError(String),

    #[error("{0}")]
    ConfigKeyError(String),

    #[error("{0}")]
    ConfigValueError(String),

    #[error("{0}")]
    AttributeError(String),

    #[error("{0}")]
    ConfigNotFound(String),

    #[error("upgrade error: {0}")]
    UpgradeError(String),

    #[error("file io error: {0}")]
    FileIoError(String),

    #[error("{0}")]
    HostGroupError(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Result type used across the engine
pub type AdcmResult<T> = Result<T, AdcmError>;

impl AdcmError {
    /// Machine-readable code of this error
    pub fn code(&self) -> ErrorCode<'static> {
        match self {
            AdcmError::SchemaError(_) => SCHEMA_ERROR,
            AdcmError::ConfigKeyError(_) => CONFIG_KEY_ERROR,
            AdcmError::ConfigValueError(_) => CONFIG_VALUE_ERROR,
            AdcmError::AttributeError(_) => ATTRIBUTE_ERROR,
            AdcmError::ConfigNotFound(_) => CONFIG_NOT_FOUND,
            AdcmError::UpgradeError(_) => UPGRADE_ERROR,
            AdcmError::FileIoError(_) => FILE_IO_ERROR,
            AdcmError::HostGroupError(_) => HOST_GROUP_ERROR,
            AdcmError::Storage(_) => STORAGE_ERROR,
        }
    }

    /// Short code name, e.g. `CONFIG_VALUE_ERROR`
    pub fn name(&self) -> &'static str {
        self.code().name
    }

    pub fn key(msg: impl Into<String>) -> Self {
        AdcmError::ConfigKeyError(msg.into())
    }

    pub fn value(msg: impl Into<String>) -> Self {
        AdcmError::ConfigValueError(msg.into())
    }

    pub fn attr(msg: impl Into<String>) -> Self {
        AdcmError::AttributeError(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        AdcmError::SchemaError(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AdcmError::ConfigNotFound(msg.into())
    }
}

impl From<crate::crypto::CryptoError> for AdcmError {
    fn from(err: crate::crypto::CryptoError) -> Self {
        AdcmError::ConfigValueError(err.to_string())
    }
}

/// Error code structure exposed to callers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCode<'a> {
    pub code: i32,
    pub name: &'a str,
    pub message: &'a str,
}

pub const SCHEMA_ERROR: ErrorCode<'static> = ErrorCode {
    code: 40001,
    name: "SCHEMA_ERROR",
    message: "prototype config declaration is malformed",
};

pub const CONFIG_KEY_ERROR: ErrorCode<'static> = ErrorCode {
    code: 40002,
    name: "CONFIG_KEY_ERROR",
    message: "config key is unknown, missing or has a wrong shape",
};

pub const CONFIG_VALUE_ERROR: ErrorCode<'static> = ErrorCode {
    code: 40003,
    name: "CONFIG_VALUE_ERROR",
    message: "config value is invalid",
};

pub const ATTRIBUTE_ERROR: ErrorCode<'static> = ErrorCode {
    code: 40004,
    name: "ATTRIBUTE_ERROR",
    message: "config attributes are invalid",
};

pub const CONFIG_NOT_FOUND: ErrorCode<'static> = ErrorCode {
    code: 40401,
    name: "CONFIG_NOT_FOUND",
    message: "config or revision not found",
};

pub const UPGRADE_ERROR: ErrorCode<'static> = ErrorCode {
    code: 40901,
    name: "UPGRADE_ERROR",
    message: "config cannot be carried to the new prototype",
};

pub const FILE_IO_ERROR: ErrorCode<'static> = ErrorCode {
    code: 50001,
    name: "FILE_IO_ERROR",
    message: "bundle file read or config file write failed",
};

pub const HOST_GROUP_ERROR: ErrorCode<'static> = ErrorCode {
    code: 40902,
    name: "HOST_GROUP_ERROR",
    message: "host group membership is invalid",
};

pub const STORAGE_ERROR: ErrorCode<'static> = ErrorCode {
    code: 50002,
    name: "STORAGE_ERROR",
    message: "storage backend failure",
};

/// Every error code, in declaration order
pub const ERROR_CODES: &[ErrorCode<'static>] = &[
    SCHEMA_ERROR,
    CONFIG_KEY_ERROR,
    CONFIG_VALUE_ERROR,
    ATTRIBUTE_ERROR,
    CONFIG_NOT_FOUND,
    UPGRADE_ERROR,
    FILE_IO_ERROR,
    HOST_GROUP_ERROR,
    STORAGE_ERROR,
];

/// Look up an error code by its name
pub fn find_code(name: &str) -> Option<ErrorCode<'static>> {
    ERROR_CODES.iter().copied().find(|c| c.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adcm_error_display() {
        let err = AdcmError::value("not in option list");
        assert_eq!(format!("{}", err), "not in option list");

        let err = AdcmError::schema("group `adv` has no subkeys");
        assert_eq!(format!("{}", err), "schema error: group `adv` has no subkeys");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(AdcmError::key("x").name(), "CONFIG_KEY_ERROR");
        assert_eq!(AdcmError::value("x").name(), "CONFIG_VALUE_ERROR");
        assert_eq!(AdcmError::attr("x").code().code, 40004);
        assert_eq!(
            AdcmError::from(anyhow::anyhow!("db down")).name(),
            "STORAGE_ERROR"
        );
    }

    #[test]
    fn test_error_codes_are_unique() {
        for (i, a) in ERROR_CODES.iter().enumerate() {
            for b in &ERROR_CODES[i + 1..] {
                assert_ne!(a.code, b.code);
                assert_ne!(a.name, b.name);
            }
        }
        assert_eq!(find_code("UPGRADE_ERROR"), Some(UPGRADE_ERROR));
        assert_eq!(find_code("NOPE"), None);
    }

    #[test]
    fn test_storage_error_from_anyhow() {
        let err: AdcmError = anyhow::anyhow!("connection reset").into();
        assert_eq!(format!("{}", err), "connection reset");
    }
}
