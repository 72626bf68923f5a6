//! Exporter configuration from environment variables
//!
//! Every value is immutable once loaded. Changing the minute configuration
//! means building a new [`MinuteConfig`] and handing it to
//! `MinuteExporter::reconfigure`, which discards the old pipeline state.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_ROLLING_MINUTES: i64 = 60;
pub const DEFAULT_OUTPUT_ROOT: &str = "exports";
pub const DEFAULT_EXCHANGE: &str = "BINANCE_FUTURES";
pub const DEFAULT_TICK_EXPORTER: &str = "TickTapeExporter";

#[derive(Debug)]
pub enum ConfigError {
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// How the CVD accumulator is scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CvdMode {
    /// Sum of deltas over the trailing `window_minutes` minutes.
    Rolling { window_minutes: i64 },
    /// Accumulate from the session anchor until a time regression.
    Session,
}

impl CvdMode {
    /// Parse `rolling:<N>` or `session`. Anything else falls back to
    /// `rolling:60` with a warning.
    pub fn parse(raw: &str) -> Self {
        let text = raw.trim();
        if text.is_empty() {
            return CvdMode::default();
        }

        if text.eq_ignore_ascii_case("session") {
            return CvdMode::Session;
        }

        let lower = text.to_ascii_lowercase();
        if let Some(rest) = lower.strip_prefix("rolling") {
            match rest.strip_prefix(':').map(|m| m.trim().parse::<i64>()) {
                Some(Ok(minutes)) if minutes > 0 => {
                    return CvdMode::Rolling { window_minutes: minutes };
                }
                _ => {
                    log::warn!(
                        "Invalid rolling window in SESSION_MODE '{}', defaulting to rolling:{}",
                        text,
                        DEFAULT_ROLLING_MINUTES
                    );
                    return CvdMode::default();
                }
            }
        }

        log::warn!(
            "Unknown SESSION_MODE '{}', defaulting to rolling:{}",
            text,
            DEFAULT_ROLLING_MINUTES
        );
        CvdMode::default()
    }

    /// Canonical label written to the `cvd_mode` field.
    pub fn label(&self) -> String {
        match self {
            CvdMode::Rolling { window_minutes } => format!("rolling:{}", window_minutes),
            CvdMode::Session => "session".to_string(),
        }
    }
}

impl Default for CvdMode {
    fn default() -> Self {
        CvdMode::Rolling {
            window_minutes: DEFAULT_ROLLING_MINUTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputTimezone {
    #[default]
    Utc,
    Local,
}

impl OutputTimezone {
    pub fn label(&self) -> &'static str {
        match self {
            OutputTimezone::Utc => "UTC",
            OutputTimezone::Local => "Local",
        }
    }
}

impl FromStr for OutputTimezone {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utc" => Ok(OutputTimezone::Utc),
            "local" => Ok(OutputTimezone::Local),
            other => Err(ConfigError::InvalidValue(format!(
                "OUTPUT_TIMEZONE must be UTC or Local, got '{}'",
                other
            ))),
        }
    }
}

/// Which pending minutes close when a snapshot for minute `M` arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushBoundary {
    /// Flush every pending `K < M`. The minute being updated stays open.
    #[default]
    RightClosed,
    /// Flush every pending `K <= M`. Backfill only: lets a finished replay
    /// pass emit its last minute without waiting for a later one.
    Inclusive,
}

impl FromStr for FlushBoundary {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "right_closed" | "right-closed" | "exclusive" => Ok(FlushBoundary::RightClosed),
            "inclusive" => Ok(FlushBoundary::Inclusive),
            other => Err(ConfigError::InvalidValue(format!(
                "FLUSH_BOUNDARY must be right_closed or inclusive, got '{}'",
                other
            ))),
        }
    }
}

/// Where the append-only minute log lives under the output root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BarFileLayout {
    /// `market_data_<YYYYMMDD>.jsonl`
    Flat,
    /// `date=<YYYY-MM-DD>/bar_<YYYYMMDD>.jsonl`
    #[default]
    Partitioned,
}

impl FromStr for BarFileLayout {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" => Ok(BarFileLayout::Flat),
            "partitioned" => Ok(BarFileLayout::Partitioned),
            other => Err(ConfigError::InvalidValue(format!(
                "BAR_FILE_LAYOUT must be flat or partitioned, got '{}'",
                other
            ))),
        }
    }
}

/// Configuration for the minute aggregation path.
#[derive(Debug, Clone, PartialEq)]
pub struct MinuteConfig {
    pub cvd_mode: CvdMode,
    pub write_on_bar_close_only: bool,
    pub output_timezone: OutputTimezone,
    pub backfill: bool,
    /// Effective boundary; `Inclusive` only survives loading when `backfill` is set.
    pub flush_boundary: FlushBoundary,
    pub json_indent: bool,
    pub output_root: PathBuf,
    pub bar_file_layout: BarFileLayout,
    /// Skip profile, absorption and volume-peak work on every update.
    pub safe_mode: bool,
}

impl Default for MinuteConfig {
    fn default() -> Self {
        Self {
            cvd_mode: CvdMode::default(),
            write_on_bar_close_only: true,
            output_timezone: OutputTimezone::Utc,
            backfill: false,
            flush_boundary: FlushBoundary::RightClosed,
            json_indent: false,
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            bar_file_layout: BarFileLayout::Partitioned,
            safe_mode: true,
        }
    }
}

impl MinuteConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `SESSION_MODE` (default: rolling:60)
    /// - `WRITE_ON_BAR_CLOSE_ONLY` (default: true)
    /// - `OUTPUT_TIMEZONE` (default: UTC)
    /// - `BACKFILL` (default: false)
    /// - `FLUSH_BOUNDARY` (default: right_closed)
    /// - `JSON_INDENT` (default: false)
    /// - `EXPORT_DIR` or `OUTPUT_ROOT` (default: exports)
    /// - `BAR_FILE_LAYOUT` (default: partitioned)
    /// - `SAFE_MODE` (default: true)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let output_root = resolve_output_root(&lookup, &["EXPORT_DIR", "OUTPUT_ROOT"])?
            .unwrap_or(defaults.output_root);

        let backfill = parse_or(&lookup, "BACKFILL", defaults.backfill);
        let mut flush_boundary = parse_or(&lookup, "FLUSH_BOUNDARY", defaults.flush_boundary);
        if flush_boundary == FlushBoundary::Inclusive && !backfill {
            log::warn!("FLUSH_BOUNDARY=inclusive requires BACKFILL=true, using right_closed");
            flush_boundary = FlushBoundary::RightClosed;
        }

        Ok(Self {
            cvd_mode: lookup("SESSION_MODE")
                .map(|raw| CvdMode::parse(&raw))
                .unwrap_or(defaults.cvd_mode),
            write_on_bar_close_only: parse_or(
                &lookup,
                "WRITE_ON_BAR_CLOSE_ONLY",
                defaults.write_on_bar_close_only,
            ),
            output_timezone: parse_or(&lookup, "OUTPUT_TIMEZONE", defaults.output_timezone),
            backfill,
            flush_boundary,
            json_indent: parse_or(&lookup, "JSON_INDENT", defaults.json_indent),
            output_root,
            bar_file_layout: parse_or(&lookup, "BAR_FILE_LAYOUT", defaults.bar_file_layout),
            safe_mode: parse_or(&lookup, "SAFE_MODE", defaults.safe_mode),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_root.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue(
                "output root cannot be empty".to_string(),
            ));
        }
        if let CvdMode::Rolling { window_minutes } = self.cvd_mode {
            if window_minutes <= 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "rolling window must be positive, got {}",
                    window_minutes
                )));
            }
        }
        Ok(())
    }
}

/// Configuration for the tick tape path.
#[derive(Debug, Clone, PartialEq)]
pub struct TickConfig {
    pub output_root: PathBuf,
    /// Directory name under `_heartbeats/`.
    pub exporter_name: String,
    pub exchange: String,
    /// Symbol reported in the heartbeat file.
    pub symbol: String,
    pub flush_batch_size: usize,
    pub flush_interval_ms: u64,
    pub heartbeat_every_ms: u64,
    pub partition_by_hour: bool,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            exporter_name: DEFAULT_TICK_EXPORTER.to_string(),
            exchange: DEFAULT_EXCHANGE.to_string(),
            symbol: "UNKNOWN".to_string(),
            flush_batch_size: 200,
            flush_interval_ms: 100,
            heartbeat_every_ms: 5_000,
            partition_by_hour: true,
        }
    }
}

impl TickConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `TICK_OUTPUT_ROOT` (default: `fallback_root`)
    /// - `TICK_EXCHANGE` (default: BINANCE_FUTURES)
    /// - `TICK_SYMBOL` (default: UNKNOWN)
    /// - `FLUSH_BATCH_SIZE` (default: 200)
    /// - `FLUSH_INTERVAL_MS` (default: 100)
    /// - `HEARTBEAT_EVERY_MS` (default: 5000)
    /// - `PARTITION_BY_HOUR` (default: true)
    pub fn from_env(fallback_root: PathBuf) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok(), fallback_root)
    }

    pub fn from_lookup<F>(lookup: F, fallback_root: PathBuf) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let output_root =
            resolve_output_root(&lookup, &["TICK_OUTPUT_ROOT"])?.unwrap_or(fallback_root);

        let symbol = lookup("TICK_SYMBOL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.symbol);

        let exchange = lookup("TICK_EXCHANGE")
            .map(|s| s.trim().to_string())
            .unwrap_or(defaults.exchange);

        Ok(Self {
            output_root,
            exporter_name: defaults.exporter_name,
            exchange,
            symbol,
            flush_batch_size: parse_positive_or(&lookup, "FLUSH_BATCH_SIZE", defaults.flush_batch_size),
            flush_interval_ms: parse_positive_or(&lookup, "FLUSH_INTERVAL_MS", defaults.flush_interval_ms),
            heartbeat_every_ms: parse_positive_or(
                &lookup,
                "HEARTBEAT_EVERY_MS",
                defaults.heartbeat_every_ms,
            ),
            partition_by_hour: parse_or(&lookup, "PARTITION_BY_HOUR", defaults.partition_by_hour),
        })
    }
}

/// Process-level settings for the runtime binary.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub rust_log: String,
    /// Mirror log lines into `<output_root>/_logs/`.
    pub log_to_file: bool,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let lookup = |key: &str| env::var(key).ok();
        Self {
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            log_to_file: parse_or(&lookup, "EXPORTER_LOG_FILE", true),
        }
    }
}

/// First non-missing key wins. A key that is set but blank is a fatal error.
fn resolve_output_root<F>(lookup: &F, keys: &[&str]) -> Result<Option<PathBuf>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    for key in keys {
        if let Some(raw) = lookup(key) {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Err(ConfigError::InvalidValue(format!("{} cannot be blank", key)));
            }
            return Ok(Some(PathBuf::from(trimmed)));
        }
    }
    Ok(None)
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Debug,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().to_ascii_lowercase().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("Invalid {} '{}', defaulting to {:?}", key, raw, default);
                default
            }
        },
    }
}

fn parse_positive_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd + Default + Copy + std::fmt::Debug,
{
    let value = parse_or(lookup, key, default);
    if value <= T::default() {
        log::warn!("{} must be positive, defaulting to {:?}", key, default);
        return default;
    }
    value
}
