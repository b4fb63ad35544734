//! Entry point of the `adcm` binary.

use std::process::ExitCode;

use adcm_common::AdcmError;
use adcm_server::{Cli, LoggingConfig, Settings, init_logging, run};
use clap::Parser;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load settings: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let logging_config = LoggingConfig::from_settings(&settings.log).with_env_overrides();
    let _logging_guard = match init_logging(&logging_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(cli.command, &settings).await {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            match e.downcast_ref::<AdcmError>() {
                Some(err) => {
                    error!(code = err.name(), "Command failed: {}", err);
                    eprintln!("{}: {}", err.name(), err);
                }
                None => eprintln!("{:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}
