//! wadrunner - Launch game engines against deduplicated data-package presets

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wadrunner::cli::{App, Cli};
use wadrunner::config::Config;
use wadrunner::core::ResultCode;
use wadrunner::persistence::Database;
use wadrunner::{APP_NAME, APP_VERSION};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::resolve(cli.database.clone(), cli.verbose) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {:#}", e);
            return ResultCode::StoreFailure.into();
        }
    };

    // Initialize logging
    init_logging(&config);

    info!("{} v{} starting...", APP_NAME, APP_VERSION);

    let db = match Database::new(&config.database_path) {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database: {:#}", e);
            return ResultCode::StoreFailure.into();
        }
    };

    let app = App::new(db);
    match app.run(cli.command).await {
        Ok(code) => code.into(),
        Err(e) => {
            error!("{}", e);
            e.result_code().into()
        }
    }
}

/// Initialize the logging system
fn init_logging(config: &Config) {
    let filter = if config.verbose {
        EnvFilter::new(config.log_filter())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter()))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
