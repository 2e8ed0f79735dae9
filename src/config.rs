use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::Cli;

/// Main jplot configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Address the viewer server binds to
    pub bind: String,
    /// Port the viewer server listens on
    pub port: u16,
    /// Number of values the viewer plots per field
    pub steps: usize,
    /// Seconds between fetches in URL mode
    pub interval: f64,
    /// Replay recent events to subscribers that attach late
    pub replay: bool,
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn as_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Off => log::LevelFilter::Off,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
            steps: 100,
            interval: 1.0,
            replay: true,
            log_level: LogLevel::Info,
        }
    }
}

/// Where documents come from for this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceMode {
    /// Newline-delimited JSON on stdin
    Stdin,
    /// Periodic GET against a URL
    Poll { url: String, interval: Duration },
}

impl SourceMode {
    /// Pick the source: a URL wins, otherwise stdin must not be a terminal
    ///
    /// The fetch interval is only validated when polling.
    pub fn resolve(url: Option<String>, config: &Config, stdin_is_terminal: bool) -> Result<Self> {
        match url {
            Some(url) => Ok(SourceMode::Poll {
                url,
                interval: config.interval()?,
            }),
            None if !stdin_is_terminal => Ok(SourceMode::Stdin),
            None => eyre::bail!("neither --url nor stdin is provided"),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        if let Ok(env_path) = std::env::var("JPLOT_CONFIG") {
            let path = PathBuf::from(env_path);
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from JPLOT_CONFIG: {}", e);
                    }
                }
            }
        }

        // Try ~/.config/jplot/jplot.yaml
        if let Some(config_dir) = dirs::config_dir() {
            let path = config_dir.join("jplot").join("jplot.yaml");
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", path.display(), e);
                    }
                }
            }
        }

        let local_config = PathBuf::from("jplot.yaml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load local config: {}", e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Command line flags take precedence over the file
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(steps) = cli.steps {
            self.steps = steps;
        }
        if let Some(interval) = cli.interval {
            self.interval = interval.as_secs_f64();
        }
        if cli.verbose {
            self.log_level = LogLevel::Debug;
        }
    }

    /// Fetch interval, rejecting zero and negative values
    pub fn interval(&self) -> Result<Duration> {
        if self.interval.is_nan() || self.interval <= 0.0 {
            eyre::bail!("interval must be positive, got {}", self.interval);
        }
        Duration::try_from_secs_f64(self.interval).context("Invalid interval")
    }
}
