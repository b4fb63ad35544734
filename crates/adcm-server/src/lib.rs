//! ADCM Server - command line front end of the configuration engine
//!
//! This crate provides:
//! - The `adcm` command line interface
//! - Layered application settings (file, environment, flags)
//! - Console and rolling file logging
//! - Command handlers over the in-memory and database backends

pub mod cli;
pub mod command;
pub mod logging;
pub mod settings;

pub use cli::{Cli, Command, ViewFormat};
pub use command::{Output, Workbench, run};
pub use logging::{LoggingConfig, LoggingGuard, init_logging};
pub use settings::Settings;
