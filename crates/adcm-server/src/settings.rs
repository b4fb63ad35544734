//! Application settings
//!
//! Layered from lowest to highest priority:
//! 1. Built-in defaults
//! 2. The settings file (`conf/adcm.yml`, optional)
//! 3. `ADCM_*` environment variables, nested with `__`
//!    (e.g. `ADCM_ENGINE__FILE_DIR`)
//! 4. Command line flags

use adcm_config::EngineSettings;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::cli::Cli;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineSettings,
    pub database: DatabaseSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub dir: Option<String>,
    pub console: bool,
    pub file: bool,
    pub level: String,
    pub file_level: Option<String>,
    pub rotation: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            dir: None,
            console: true,
            file: false,
            level: "warn".to_string(),
            file_level: None,
            rotation: "daily".to_string(),
        }
    }
}

impl Settings {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(&cli.config_file).required(false))
            .add_source(
                Environment::with_prefix("ADCM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("engine.file_dir", cli.file_dir.clone())?
            .set_override_option("engine.bundle_dir", cli.bundle_dir.clone())?
            .set_override_option("engine.vault_key", cli.vault_key.clone())?
            .set_override_option("database.url", cli.database_url.clone())?
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
