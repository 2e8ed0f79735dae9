use clap::Parser;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

mod app;
mod cli;
mod config;
mod document;
mod engine;
mod publish;
mod server;
mod source;
mod spec;

use cli::Cli;
use config::{Config, LogLevel, SourceMode};

fn setup_logging(log_level: &LogLevel) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jplot")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("jplot.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // RUST_LOG env var takes precedence, otherwise use config log_level
    let mut builder = env_logger::Builder::new();

    if std::env::var("RUST_LOG").is_ok() {
        builder.parse_default_env();
    } else {
        builder.filter_level(log_level.as_filter());
    }

    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.apply_cli(&cli);

    setup_logging(&config.log_level).context("Failed to setup logging")?;

    let specs = spec::parse_specs(&cli.fields).context("Cannot parse spec")?;
    let mode = SourceMode::resolve(cli.url.clone(), &config, std::io::stdin().is_terminal())?;
    info!("Starting jplot with {:?}", mode);

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let result = runtime.block_on(app::run(config, mode, specs));

    // A read from stdin may still be parked on the blocking pool.
    runtime.shutdown_timeout(Duration::from_millis(250));

    result
}
