//! Default materialization
//!
//! Builds the initial `(config, attr)` pair of an object from the schema of
//! its prototype. Defaults of file kinds name a file inside the bundle; the
//! file body becomes the value.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::debug;

use adcm_common::{AdcmError, AdcmResult};
use adcm_persistence::Prototype;

use crate::model::{FieldSpec, PrototypeSchema};

/// Resolve a bundle file reference of `prototype` to a path relative to the
/// bundle root. `./x` is relative to the prototype directory.
pub fn resolve_bundle_path(prototype: &Prototype, path: &str) -> String {
    match path.strip_prefix("./") {
        Some(rest) if prototype.path.is_empty() => rest.to_string(),
        Some(rest) => format!("{}/{}", prototype.path.trim_end_matches('/'), rest),
        None => path.trim_start_matches('/').to_string(),
    }
}

/// Read access to bundle files
#[async_trait]
pub trait BundleFiles: Send + Sync {
    /// Body of file `path` (relative to the bundle root) of bundle `bundle_hash`
    async fn read(&self, bundle_hash: &str, path: &str) -> AdcmResult<String>;
}

/// Bundles unpacked under `<root>/<bundle_hash>/`
#[derive(Debug, Clone)]
pub struct FsBundleFiles {
    root: PathBuf,
}

impl FsBundleFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BundleFiles for FsBundleFiles {
    async fn read(&self, bundle_hash: &str, path: &str) -> AdcmResult<String> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(AdcmError::FileIoError(format!(
                "bundle path \"{}\" leaves the bundle",
                path
            )));
        }
        let full = self.root.join(bundle_hash).join(relative);
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| AdcmError::FileIoError(format!("{}: {}", full.display(), e)))
    }
}

/// Bundle files held in memory, keyed by `(bundle_hash, path)`
#[derive(Debug, Default, Clone)]
pub struct StaticBundleFiles {
    files: HashMap<(String, String), String>,
}

impl StaticBundleFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(
        mut self,
        bundle_hash: impl Into<String>,
        path: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        self.files
            .insert((bundle_hash.into(), path.into()), body.into());
        self
    }
}

#[async_trait]
impl BundleFiles for StaticBundleFiles {
    async fn read(&self, bundle_hash: &str, path: &str) -> AdcmResult<String> {
        self.files
            .get(&(bundle_hash.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| {
                AdcmError::FileIoError(format!("bundle {} has no file {}", bundle_hash, path))
            })
    }
}

/// Default engine
#[derive(Clone)]
pub struct Defaults {
    bundle: Arc<dyn BundleFiles>,
    file_size_cap: usize,
}

impl Defaults {
    pub fn new(bundle: Arc<dyn BundleFiles>, file_size_cap: usize) -> Self {
        Self {
            bundle,
            file_size_cap,
        }
    }

    /// Typed default of one leaf; file kinds are read from the bundle
    pub async fn value(&self, prototype: &Prototype, field: &FieldSpec) -> AdcmResult<Value> {
        if !field.kind.is_file() {
            return Ok(field.default.clone());
        }
        let Value::String(reference) = &field.default else {
            return Ok(Value::Null);
        };

        let path = resolve_bundle_path(prototype, reference);
        let body = self.bundle.read(&prototype.bundle_hash, &path).await?;
        if body.len() > self.file_size_cap {
            return Err(AdcmError::value(format!(
                "default file \"{}\" of \"{}\" is longer than {} bytes",
                path,
                field.display(),
                self.file_size_cap
            )));
        }
        debug!(key = %field.display(), path = %path, "Default read from bundle file");
        Ok(Value::String(body))
    }

    /// Initial nested config of an object of `prototype`
    pub async fn config(
        &self,
        prototype: &Prototype,
        schema: &PrototypeSchema,
    ) -> AdcmResult<Value> {
        let mut flat = Map::new();
        for field in schema.leaves() {
            flat.insert(field.key(), self.value(prototype, field).await?);
        }
        Ok(schema.unflatten(&flat))
    }
}

/// Initial attr: `{group: {"active": default}}` for every activatable group
pub fn initial_attr(schema: &PrototypeSchema) -> Value {
    Value::Object(
        schema
            .activatable_groups()
            .map(|group| (group.name.clone(), json!({"active": group.limits.active})))
            .collect(),
    )
}
