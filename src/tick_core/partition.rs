//! Tick file layout: `<root>/<symbol>/date=<YYYY-MM-DD>[/<HH>]/ticks.jsonl`

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

pub const TICK_FILE: &str = "ticks.jsonl";

/// Keep `[A-Za-z0-9_-]`, replace everything else with `_`.
pub fn sanitized_symbol(symbol: &str) -> String {
    let cleaned: String = symbol
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();

    if cleaned.is_empty() {
        "UNKNOWN".to_string()
    } else {
        cleaned
    }
}

pub fn partition_dir(root: &Path, symbol: &str, ts: DateTime<Utc>, by_hour: bool) -> PathBuf {
    let dir = root
        .join(sanitized_symbol(symbol))
        .join(format!("date={}", ts.format("%Y-%m-%d")));

    if by_hour {
        dir.join(ts.format("%H").to_string())
    } else {
        dir
    }
}

pub fn tick_path(root: &Path, symbol: &str, ts: DateTime<Utc>, by_hour: bool) -> PathBuf {
    partition_dir(root, symbol, ts, by_hour).join(TICK_FILE)
}

pub fn heartbeat_path(root: &Path, exporter: &str, symbol: &str) -> PathBuf {
    root.join("_heartbeats")
        .join(sanitized_symbol(exporter))
        .join(sanitized_symbol(symbol))
        .join("heartbeat.txt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sanitized_symbol() {
        assert_eq!(sanitized_symbol("ES 03-24"), "ES_03-24");
        assert_eq!(sanitized_symbol("BTC/USDT:PERP"), "BTC_USDT_PERP");
        assert_eq!(sanitized_symbol("../etc"), "___etc");
        assert_eq!(sanitized_symbol("  "), "UNKNOWN");
    }

    #[test]
    fn test_tick_path() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 7, 59, 59).unwrap();
        let root = Path::new("/data");

        assert_eq!(
            tick_path(root, "BTCUSDT", ts, true),
            PathBuf::from("/data/BTCUSDT/date=2024-03-01/07/ticks.jsonl")
        );
        assert_eq!(
            tick_path(root, "BTCUSDT", ts, false),
            PathBuf::from("/data/BTCUSDT/date=2024-03-01/ticks.jsonl")
        );
        assert_eq!(
            heartbeat_path(root, "TickTapeExporter", "BTCUSDT"),
            PathBuf::from("/data/_heartbeats/TickTapeExporter/BTCUSDT/heartbeat.txt")
        );
    }
}
