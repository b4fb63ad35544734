//! Command line interface of the `adcm` binary

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

pub const DEFAULT_CONFIG_FILE: &str = "conf/adcm.yml";

#[derive(Debug, Parser)]
#[command(
    name = "adcm",
    version,
    about = "Typed hierarchical configuration engine for ADCM"
)]
pub struct Cli {
    /// Settings file, merged under ADCM_* environment variables
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: String,

    /// Directory of materialized file and secretfile values
    #[arg(long = "file-dir")]
    pub file_dir: Option<String>,

    /// Root of unpacked bundles
    #[arg(long = "bundle-dir")]
    pub bundle_dir: Option<String>,

    /// Base64 encoded 256-bit vault key
    #[arg(long = "vault-key", env = "ADCM_VAULT_KEY", hide_env_values = true)]
    pub vault_key: Option<String>,

    /// Database URL (mysql:// or postgres://)
    #[arg(long = "db-url", env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ViewFormat {
    /// Field descriptors for the UI
    Ui,
    /// Config and attr as handed to the executor
    Executor,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the initial config and attr of a prototype
    Defaults {
        /// JSON array of prototype config rows
        schema: PathBuf,
        /// Bundle hash resolving file defaults under the bundle dir
        #[arg(long, default_value = "")]
        bundle: String,
    },

    /// Validate a config against a prototype and print its normalized form
    Validate {
        schema: PathBuf,
        config: PathBuf,
        #[arg(long)]
        attr: Option<PathBuf>,
        /// Lifecycle state of the owning object
        #[arg(long)]
        state: Option<String>,
        #[arg(long, default_value = "")]
        bundle: String,
    },

    /// Render a validated config in the UI or executor projection
    View {
        schema: PathBuf,
        config: PathBuf,
        #[arg(long)]
        attr: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = ViewFormat::Ui)]
        format: ViewFormat,
        #[arg(long, default_value = "")]
        bundle: String,
    },

    /// Carry a config from one prototype version to another
    Upgrade {
        old_schema: PathBuf,
        new_schema: PathBuf,
        config: PathBuf,
        #[arg(long)]
        attr: Option<PathBuf>,
        #[arg(long, default_value = "")]
        bundle: String,
    },

    /// Encrypt a value with the configured vault key
    Encrypt { text: String },

    /// Decrypt a vault payload with the configured vault key
    Decrypt { blob: String },

    /// Print a fresh base64 vault key
    GenerateKey,

    /// Create the configuration tables in the database
    Migrate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_validate() {
        let cli = Cli::try_parse_from([
            "adcm",
            "--file-dir",
            "/tmp/files",
            "validate",
            "schema.json",
            "config.json",
            "--state",
            "installed",
        ])
        .unwrap();
        assert_eq!(cli.file_dir.as_deref(), Some("/tmp/files"));
        assert_eq!(cli.config_file, DEFAULT_CONFIG_FILE);
        match cli.command {
            Command::Validate {
                schema,
                attr,
                state,
                bundle,
                ..
            } => {
                assert_eq!(schema, PathBuf::from("schema.json"));
                assert!(attr.is_none());
                assert_eq!(state.as_deref(), Some("installed"));
                assert!(bundle.is_empty());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_view_format() {
        let cli = Cli::try_parse_from(["adcm", "view", "s.json", "c.json", "--format", "executor"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Command::View {
                format: ViewFormat::Executor,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_subcommand_fails() {
        assert!(Cli::try_parse_from(["adcm"]).is_err());
    }
}
