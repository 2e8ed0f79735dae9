use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

const FIELD_SPEC_HELP: &str = "\
FIELD_SPEC: [<option>[,<option>...]:]path
  option:
    - counter: Computes the difference with the last value. The value must increase monotonically.
    - marker: When the value is non-zero, a vertical line is drawn.
  path:
    JSON field path (eg: field.sub-field).

Logs are written to: ~/.local/share/jplot/logs/jplot.log";

#[derive(Parser)]
#[command(
    name = "jplot",
    about = "Plot numeric fields from a stream of JSON documents in the browser",
    version,
    after_help = FIELD_SPEC_HELP
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, help = "Path to jplot.yaml config file")]
    pub config: Option<PathBuf>,

    /// URL to fetch every interval. Read JSON objects from stdin if not specified.
    #[arg(long)]
    pub url: Option<String>,

    /// When url is provided, defines the interval between fetches (eg: 500ms, 2s, 1m).
    /// Note that counter fields are computed based on this interval.
    #[arg(long, value_parser = parse_interval)]
    pub interval: Option<Duration>,

    /// Number of values to plot
    #[arg(long)]
    pub steps: Option<usize>,

    /// Port to run server on
    #[arg(long)]
    pub port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Fields to plot
    #[arg(value_name = "FIELD_SPEC", required = true)]
    pub fields: Vec<String>,
}

/// Parse `500ms`, `2s`, `1.5m` or a bare number of seconds
pub fn parse_interval(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);

    let number: f64 = number.parse().map_err(|_| format!("invalid interval '{}'", raw))?;
    let seconds = match unit {
        "" | "s" => number,
        "ms" => number / 1000.0,
        "m" => number * 60.0,
        "h" => number * 3600.0,
        other => return Err(format!("unknown interval unit '{}'", other)),
    };

    if seconds <= 0.0 {
        return Err("interval must be positive".to_string());
    }
    Duration::try_from_secs_f64(seconds).map_err(|e| e.to_string())
}
