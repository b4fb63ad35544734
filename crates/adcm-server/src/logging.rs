//! Logging setup for the `adcm` binary.
//!
//! Console output goes to stderr so that command results on stdout stay
//! machine readable. File logging is optional and writes rolling files:
//!
//! | Log File          | Target Prefixes   |
//! |-------------------|-------------------|
//! | adcm.log          | (all)             |
//! | config.log        | adcm_config       |
//! | persistence.log   | adcm_persistence  |
//!
//! Override the defaults with the `ADCM_LOG_*` environment variables or the
//! `log` section of `conf/adcm.yml`.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::settings::LogSettings;

struct ComponentLogDef {
    file_name: &'static str,
    targets: &'static [&'static str],
}

const COMPONENT_LOGS: &[ComponentLogDef] = &[
    ComponentLogDef {
        file_name: "config.log",
        targets: &["adcm_config"],
    },
    ComponentLogDef {
        file_name: "persistence.log",
        targets: &["adcm_persistence"],
    },
];

/// Log rotation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    Daily,
    Hourly,
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

impl std::str::FromStr for LogRotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(LogRotation::Daily),
            "hourly" => Ok(LogRotation::Hourly),
            "never" => Ok(LogRotation::Never),
            other => Err(format!("unknown log rotation: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub console_output: bool,
    pub console_level: Level,
    pub file_logging: bool,
    pub file_level: Level,
    pub rotation: LogRotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            console_output: true,
            console_level: Level::WARN,
            file_logging: false,
            file_level: Level::INFO,
            rotation: LogRotation::Daily,
        }
    }
}

fn default_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(format!("{}/adcm/logs", home))
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

impl LoggingConfig {
    /// Create from the `log` section of the application settings.
    pub fn from_settings(settings: &LogSettings) -> Self {
        let console_level = settings.level.parse().unwrap_or(Level::WARN);
        Self {
            log_dir: settings
                .dir
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(default_log_dir),
            console_output: settings.console,
            console_level,
            file_logging: settings.file,
            file_level: settings
                .file_level
                .as_deref()
                .and_then(|v| v.parse().ok())
                .unwrap_or(console_level),
            rotation: settings.rotation.parse().unwrap_or(LogRotation::Daily),
        }
    }

    /// Apply `ADCM_LOG_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("ADCM_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        if let Ok(v) = std::env::var("ADCM_LOG_CONSOLE") {
            self.console_output = parse_flag(&v);
        }
        if let Ok(v) = std::env::var("ADCM_LOG_FILE") {
            self.file_logging = parse_flag(&v);
        }
        if let Some(level) = std::env::var("ADCM_LOG_LEVEL")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.console_level = level;
            self.file_level = level;
        }
        if let Some(level) = std::env::var("ADCM_LOG_FILE_LEVEL")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.file_level = level;
        }
        self
    }
}

/// Keeps the non-blocking file writers alive. Dropping it flushes buffered
/// output.
pub struct LoggingGuard {
    _file_guards: Vec<WorkerGuard>,
}

pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    if config.file_logging {
        std::fs::create_dir_all(&config.log_dir)?;
    }

    let mut guards: Vec<WorkerGuard> = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console_output {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.console_level.to_string()));
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_filter(filter);
        layers.push(Box::new(console_layer));
    }

    if config.file_logging {
        let root_appender =
            RollingFileAppender::new(config.rotation.into(), &config.log_dir, "adcm.log");
        let (root_nb, root_guard) = tracing_appender::non_blocking(root_appender);
        guards.push(root_guard);

        let root_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.file_level.to_string()));
        let root_layer = fmt::layer()
            .with_writer(root_nb)
            .with_target(true)
            .with_ansi(false)
            .with_filter(root_filter);
        layers.push(Box::new(root_layer));

        let level_filter = LevelFilter::from_level(config.file_level);
        for def in COMPONENT_LOGS {
            let appender =
                RollingFileAppender::new(config.rotation.into(), &config.log_dir, def.file_name);
            let (nb, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);

            let targets = def
                .targets
                .iter()
                .fold(Targets::new(), |t, target| t.with_target(*target, level_filter));
            let layer = fmt::layer()
                .with_writer(nb)
                .with_target(true)
                .with_ansi(false)
                .with_filter(targets);
            layers.push(Box::new(layer));
        }
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))?;

    Ok(LoggingGuard {
        _file_guards: guards,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_parse() {
        assert_eq!("DAILY".parse::<LogRotation>(), Ok(LogRotation::Daily));
        assert_eq!("never".parse::<LogRotation>(), Ok(LogRotation::Never));
        assert!("weekly".parse::<LogRotation>().is_err());
    }

    #[test]
    fn test_from_settings() {
        let settings = LogSettings {
            dir: Some("/var/log/adcm".to_string()),
            console: false,
            file: true,
            level: "debug".to_string(),
            file_level: None,
            rotation: "hourly".to_string(),
        };
        let config = LoggingConfig::from_settings(&settings);
        assert_eq!(config.log_dir, PathBuf::from("/var/log/adcm"));
        assert!(!config.console_output);
        assert!(config.file_logging);
        assert_eq!(config.console_level, Level::DEBUG);
        assert_eq!(config.file_level, Level::DEBUG);
        assert_eq!(config.rotation, LogRotation::Hourly);
    }

    #[test]
    fn test_bad_level_falls_back() {
        let settings = LogSettings {
            level: "loud".to_string(),
            ..LogSettings::default()
        };
        assert_eq!(LoggingConfig::from_settings(&settings).console_level, Level::WARN);
    }
}
