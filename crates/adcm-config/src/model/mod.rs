//! Configuration schema model
//!
//! This module contains the typed representation of declared config keys:
//! - Value kinds and their coercion and shape rules
//! - Parsed `limits`
//! - The per-prototype schema with its flat and nested projections

pub mod kind;
pub mod limits;
pub mod schema;

pub use kind::ConfigKind;
pub use limits::{Limits, StateRule, VariantSource, VariantSourceKind};
pub use schema::{FieldSpec, PrototypeSchema, display_key, flat_key, value_at};
