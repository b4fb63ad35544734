//! Command handlers
//!
//! Offline commands run the engine over the in-memory backend against a
//! throwaway cluster, so nothing outside `--file-dir` is touched and the
//! materialized files are removed once the command ends, failed or not.

use std::path::Path;
use std::sync::Arc;

use adcm_common::SecretVault;
use adcm_config::{ConfigManager, ConfigObject, EngineSettings};
use adcm_persistence::{
    ExternalDbPersistService, MemoryPersistService, ObjectKind, ObjectRef, PersistenceService,
    Prototype, PrototypeConfigRow, PrototypePersistence,
};
use anyhow::Context;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::cli::{Command, ViewFormat};
use crate::settings::Settings;

const WORKBENCH_OBJECT_ID: i64 = 1;

/// Result of a command, printed to stdout
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Json(Value),
    Text(String),
}

impl std::fmt::Display for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Output::Json(value) => {
                let text = serde_json::to_string_pretty(value).map_err(|_| std::fmt::Error)?;
                write!(f, "{}", text)
            }
            Output::Text(text) => write!(f, "{}", text),
        }
    }
}

pub async fn run(command: Command, settings: &Settings) -> anyhow::Result<Output> {
    match command {
        Command::Defaults { schema, bundle } => {
            let bench = Workbench::new(&settings.engine)?;
            let prototype = bench.load_prototype(1, &schema, &bundle).await?;
            let target = bench.target(prototype);
            let output = async {
                if bench.manager.init(&target).await?.is_none() {
                    return Ok(json!({"config": null, "attr": null}));
                }
                anyhow::Ok(pair(bench.manager.current_decrypted(&target).await?))
            }
            .await;
            bench.finish(&target).await;
            Ok(Output::Json(output?))
        }
        Command::Validate {
            schema,
            config,
            attr,
            state,
            bundle,
        } => {
            let bench = Workbench::new(&settings.engine)?;
            let prototype = bench.load_prototype(1, &schema, &bundle).await?;
            let mut target = bench.target(prototype);
            if let Some(state) = state {
                target = target.with_state(state);
            }
            let output = async {
                bench.apply(&target, &config, attr.as_deref()).await?;
                anyhow::Ok(pair(bench.manager.current_decrypted(&target).await?))
            }
            .await;
            bench.finish(&target).await;
            Ok(Output::Json(output?))
        }
        Command::View {
            schema,
            config,
            attr,
            format,
            bundle,
        } => {
            let bench = Workbench::new(&settings.engine)?;
            let prototype = bench.load_prototype(1, &schema, &bundle).await?;
            let target = bench.target(prototype);
            let output = async {
                bench.apply(&target, &config, attr.as_deref()).await?;
                let view = match format {
                    ViewFormat::Ui => serde_json::to_value(bench.manager.schema(&target).await?)?,
                    ViewFormat::Executor => bench.manager.executor_view(&target).await?,
                };
                anyhow::Ok(view)
            }
            .await;
            bench.finish(&target).await;
            Ok(Output::Json(output?))
        }
        Command::Upgrade {
            old_schema,
            new_schema,
            config,
            attr,
            bundle,
        } => {
            let bench = Workbench::new(&settings.engine)?;
            let old = bench.load_prototype(1, &old_schema, &bundle).await?;
            let new = bench.load_prototype(2, &new_schema, &bundle).await?;
            let target = bench.target(old);
            let switched = async {
                bench.apply(&target, &config, attr.as_deref()).await?;
                bench.manager.switch(&target, &new).await?;
                anyhow::Ok(())
            }
            .await;
            // Files on disk follow the prototype the stored config is under
            if let Err(e) = switched {
                bench.finish(&target).await;
                return Err(e);
            }

            let upgraded = bench.target(new);
            let output = bench.manager.current_decrypted(&upgraded).await;
            bench.finish(&upgraded).await;
            Ok(Output::Json(pair(output?)))
        }
        Command::Encrypt { text } => {
            let vault = configured_vault(&settings.engine)?;
            Ok(Output::Text(vault.encrypt(&text)?))
        }
        Command::Decrypt { blob } => {
            let vault = configured_vault(&settings.engine)?;
            Ok(Output::Text(vault.decrypt(&blob)?))
        }
        Command::GenerateKey => Ok(Output::Text(SecretVault::generate_base64_key())),
        Command::Migrate => {
            let url = settings
                .database
                .url
                .as_deref()
                .context("database url is not configured, pass --db-url or set DATABASE_URL")?;
            let db = ExternalDbPersistService::connect(url).await?;
            db.create_schema().await?;
            info!("Configuration schema migrated ({})", db.storage_mode());
            Ok(Output::Text("configuration tables are in place".to_string()))
        }
    }
}

fn pair((config, attr): (Value, Value)) -> Value {
    json!({"config": config, "attr": attr})
}

fn configured_vault(settings: &EngineSettings) -> anyhow::Result<SecretVault> {
    if settings.vault_key.is_empty() {
        anyhow::bail!("vault key is not configured, pass --vault-key or set ADCM_VAULT_KEY");
    }
    Ok(SecretVault::from_base64_key(&settings.vault_key)?)
}

async fn read_json(path: &Path) -> anyhow::Result<Value> {
    let body = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&body).with_context(|| format!("{} is not valid JSON", path.display()))
}

/// Engine over the in-memory backend hosting one throwaway cluster
pub struct Workbench {
    manager: ConfigManager,
    persistence: Arc<MemoryPersistService>,
}

impl Workbench {
    pub fn new(settings: &EngineSettings) -> anyhow::Result<Self> {
        let mut settings = settings.clone();
        if settings.vault_key.is_empty() {
            warn!("No vault key configured, secrets are encrypted with a one-off key");
            settings.vault_key = SecretVault::generate_base64_key();
        }

        let persistence = Arc::new(MemoryPersistService::new());
        let manager = ConfigManager::builder(settings, persistence.clone()).build()?;
        debug!("Workbench ready on {} storage", persistence.storage_mode());
        Ok(Self {
            manager,
            persistence,
        })
    }

    /// Register the rows in `path` as a cluster prototype
    pub async fn load_prototype(&self, id: i64, path: &Path, bundle: &str) -> anyhow::Result<Prototype> {
        let rows: Vec<PrototypeConfigRow> = serde_json::from_value(read_json(path).await?)
            .with_context(|| format!("{} is not a list of prototype config rows", path.display()))?;
        self.persistence.prototype_config_save(id, rows).await?;

        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cluster".to_string());
        Ok(Prototype {
            id,
            kind: ObjectKind::Cluster,
            name,
            version: id.to_string(),
            bundle_hash: bundle.to_string(),
            path: String::new(),
        })
    }

    pub fn target(&self, prototype: Prototype) -> ConfigObject {
        ConfigObject::new(
            ObjectRef::new(ObjectKind::Cluster, WORKBENCH_OBJECT_ID),
            prototype,
        )
    }

    /// Initialize `target` and store the config read from `config`
    async fn apply(&self, target: &ConfigObject, config: &Path, attr: Option<&Path>) -> anyhow::Result<()> {
        self.manager.init(target).await?;
        let config = read_json(config).await?;
        let attr = match attr {
            Some(path) => read_json(path).await?,
            None => json!({}),
        };
        self.manager.update(target, &config, &attr, "cli").await?;
        Ok(())
    }

    async fn finish(&self, target: &ConfigObject) {
        if let Err(e) = self.manager.destroy(target).await {
            warn!("Failed to clean up workbench files: {}", e);
        }
    }
}
