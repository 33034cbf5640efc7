use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

/// Journal file name inside the data directory.
pub const JOURNAL_FILE: &str = "bookings.journal";

/// Process configuration, read from `STAYLINE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub compact_threshold: u64,
    pub compact_interval: Duration,
    pub metrics_port: Option<u16>,
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(60),
            metrics_port: None,
            log_json: false,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults, malformed
    /// values are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut cfg = Self::default();
        if let Some(dir) = lookup("STAYLINE_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Some(n) = parse(&lookup, "STAYLINE_COMPACT_THRESHOLD")? {
            cfg.compact_threshold = n;
        }
        if let Some(secs) = parse::<u64>(&lookup, "STAYLINE_COMPACT_INTERVAL_SECS")? {
            anyhow::ensure!(secs > 0, "STAYLINE_COMPACT_INTERVAL_SECS must be positive");
            cfg.compact_interval = Duration::from_secs(secs);
        }
        cfg.metrics_port = parse(&lookup, "STAYLINE_METRICS_PORT")?;
        if let Some(json) = parse(&lookup, "STAYLINE_LOG_JSON")? {
            cfg.log_json = json;
        }
        Ok(cfg)
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join(JOURNAL_FILE)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| raw.trim().parse::<T>().with_context(|| format!("invalid {key}: {raw:?}")))
        .transpose()
}
