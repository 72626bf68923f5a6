//! Minute record persistence: `latest.json` plus an append-only day log
//!
//! Layout under the output root:
//!
//! ```text
//! <root>/
//! ├── latest.json                       (overwritten on every commit)
//! ├── market_data_20240301.jsonl        (BarFileLayout::Flat)
//! └── date=2024-03-01/
//!     └── bar_20240301.jsonl            (BarFileLayout::Partitioned)
//! ```

use super::record::MinuteRecord;
use super::sink::RecordSink;
use crate::config::{BarFileLayout, MinuteConfig};
use crate::error::ExportError;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

pub const SCHEMA_VERSION: &str = "v6.3";
pub const EXPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

const LATEST_FILE: &str = "latest.json";

/// On-disk shape of a minute record. Field order is the output key order.
#[derive(Debug, Serialize)]
pub struct MinuteDocument<'a> {
    pub timestamp: &'a str,
    pub timestamp_utc: String,
    pub tz: &'static str,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    pub poc: Option<f64>,
    pub vah: Option<f64>,
    pub val: Option<f64>,
    pub cvd: Option<f64>,
    pub absorption_detected: bool,
    pub absorption_strength: Option<f64>,
    pub absorption_side: &'a str,
    pub bar_vpo_price: Option<f64>,
    pub bar_vpo_vol: Option<f64>,
    pub bar_vpo_loc: Option<f64>,
    pub bar_vpo_side: &'a str,
    pub window_id: String,
    pub flush_seq: u64,
    pub exporter_version: &'static str,
    pub schema_version: &'static str,
    pub backfill: bool,
    pub cvd_mode: &'a str,
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

fn finite_opt(value: Option<f64>) -> Option<f64> {
    value.and_then(finite)
}

impl<'a> MinuteDocument<'a> {
    pub fn from_record(record: &'a MinuteRecord) -> Self {
        let timestamp_utc = record.timestamp_utc();
        let peak = record.volume_peak.as_ref();

        Self {
            timestamp: &record.timestamp,
            window_id: timestamp_utc.clone(),
            timestamp_utc,
            tz: record.tz.label(),
            open: finite(record.open),
            high: finite(record.high),
            low: finite(record.low),
            close: finite(record.close),
            volume: finite(record.volume),
            poc: finite_opt(record.poc),
            vah: finite_opt(record.vah),
            val: finite_opt(record.val),
            cvd: finite_opt(record.cvd),
            absorption_detected: record.absorption.detected(),
            absorption_strength: finite(record.absorption.strength()),
            absorption_side: record.absorption.side(),
            bar_vpo_price: peak.and_then(|p| finite(p.price)),
            bar_vpo_vol: peak.and_then(|p| finite(p.volume)),
            bar_vpo_loc: peak.and_then(|p| finite_opt(p.loc)),
            bar_vpo_side: peak.map_or("", |p| p.side.as_str()),
            flush_seq: record.flush_seq,
            exporter_version: EXPORTER_VERSION,
            schema_version: SCHEMA_VERSION,
            backfill: record.backfill,
            cvd_mode: &record.cvd_mode,
        }
    }
}

pub struct DurableWriter {
    root: PathBuf,
    layout: BarFileLayout,
    json_indent: bool,
    // Serializes the latest/day-log pair across commits.
    lock: Mutex<()>,
}

impl DurableWriter {
    pub fn new(root: impl Into<PathBuf>, layout: BarFileLayout, json_indent: bool) -> Result<Self, ExportError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        log::info!("📝 Writing minute records to: {}", root.display());

        Ok(Self {
            root,
            layout,
            json_indent,
            lock: Mutex::new(()),
        })
    }

    pub fn from_config(config: &MinuteConfig) -> Result<Self, ExportError> {
        Self::new(config.output_root.clone(), config.bar_file_layout, config.json_indent)
    }

    pub fn latest_path(&self) -> PathBuf {
        self.root.join(LATEST_FILE)
    }

    /// Day log for `record`, named by its UTC date.
    pub fn day_log_path(&self, record: &MinuteRecord) -> PathBuf {
        let date = record.minute_utc.date_naive();
        let compact = date.format("%Y%m%d");

        match self.layout {
            BarFileLayout::Flat => self.root.join(format!("market_data_{}.jsonl", compact)),
            BarFileLayout::Partitioned => self
                .root
                .join(format!("date={}", date.format("%Y-%m-%d")))
                .join(format!("bar_{}.jsonl", compact)),
        }
    }

    pub fn write_record(&self, record: &MinuteRecord) -> Result<(), ExportError> {
        let document = MinuteDocument::from_record(record);
        let line = serde_json::to_string(&document)?;
        let latest = if self.json_indent {
            serde_json::to_string_pretty(&document)?
        } else {
            line.clone()
        };

        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        fs::write(self.latest_path(), latest)?;

        let day_log = self.day_log_path(record);
        if let Some(parent) = day_log.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&day_log)?;
        writeln!(file, "{}", line)?;

        log::debug!(
            "Committed minute {} (seq {}) to {}",
            document.timestamp_utc,
            record.flush_seq,
            day_log.display()
        );
        Ok(())
    }
}

impl RecordSink for DurableWriter {
    fn commit(&mut self, record: &MinuteRecord) -> Result<(), ExportError> {
        self.write_record(record)
    }

    fn backend_type(&self) -> &'static str {
        "JSONL"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MinuteConfig;
    use crate::minute_core::aggregator::MinuteAggregator;
    use crate::minute_core::snapshot::MarketSnapshot;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn flushed_record(poc: Option<f64>) -> MinuteRecord {
        let config = MinuteConfig { safe_mode: false, ..MinuteConfig::default() };
        let mut aggregator = MinuteAggregator::new(&config);
        let mut snap = MarketSnapshot::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 30).unwrap(),
            100.0,
            101.0,
            99.5,
            100.5,
            42.0,
        )
        .with_delta(3.0);
        snap.poc = poc;
        let mut record = aggregator.build(&snap);
        record.flush_seq = 7;
        record
    }

    #[test]
    fn test_nan_serializes_as_null() {
        let record = flushed_record(Some(f64::NAN));
        let json = serde_json::to_string(&MinuteDocument::from_record(&record)).unwrap();

        assert!(json.contains("\"poc\":null"));
        assert!(!json.contains("NaN"));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["poc"].is_null());
        assert_eq!(value["cvd"], 3.0);
        // No volume peak: numeric peak fields are null, the side is still a string.
        assert!(value["bar_vpo_price"].is_null());
        assert_eq!(value["bar_vpo_side"], "");
    }

    #[test]
    fn test_document_key_order() {
        let record = flushed_record(Some(100.0));
        let json = serde_json::to_string(&MinuteDocument::from_record(&record)).unwrap();

        let keys = [
            "timestamp", "timestamp_utc", "tz", "open", "high", "low", "close", "volume", "poc",
            "vah", "val", "cvd", "absorption_detected", "absorption_strength", "absorption_side",
            "bar_vpo_price", "bar_vpo_vol", "bar_vpo_loc", "bar_vpo_side", "window_id",
            "flush_seq", "exporter_version", "schema_version", "backfill", "cvd_mode",
        ];
        let positions: Vec<usize> = keys
            .iter()
            .map(|k| json.find(&format!("\"{}\":", k)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_commit_writes_latest_and_partitioned_log() {
        let dir = TempDir::new().unwrap();
        let mut writer = DurableWriter::new(dir.path(), BarFileLayout::Partitioned, true).unwrap();
        let record = flushed_record(None);

        writer.commit(&record).unwrap();
        writer.commit(&record).unwrap();

        let latest = fs::read_to_string(dir.path().join("latest.json")).unwrap();
        assert!(latest.contains('\n'), "indent applies to latest.json");
        let latest: serde_json::Value = serde_json::from_str(&latest).unwrap();
        assert_eq!(latest["flush_seq"], 7);
        assert_eq!(latest["window_id"], "2024-03-01T10:00:00Z");
        assert_eq!(latest["schema_version"], SCHEMA_VERSION);

        let log = fs::read_to_string(dir.path().join("date=2024-03-01").join("bar_20240301.jsonl")).unwrap();
        assert_eq!(log.lines().count(), 2);
        for line in log.lines() {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["timestamp_utc"], "2024-03-01T10:00:00Z");
        }
    }

    #[test]
    fn test_flat_layout() {
        let dir = TempDir::new().unwrap();
        let writer = DurableWriter::new(dir.path(), BarFileLayout::Flat, false).unwrap();

        writer.write_record(&flushed_record(None)).unwrap();

        assert!(dir.path().join("market_data_20240301.jsonl").exists());
        assert!(!dir.path().join("date=2024-03-01").exists());
    }

    #[test]
    fn test_commit_reports_io_failure() {
        let dir = TempDir::new().unwrap();
        let mut writer = DurableWriter::new(dir.path(), BarFileLayout::Partitioned, false).unwrap();
        // A directory squatting on latest.json makes the overwrite fail.
        fs::create_dir(dir.path().join("latest.json")).unwrap();

        let result = writer.commit(&flushed_record(None));
        assert!(matches!(result, Err(ExportError::Io(_))));
    }
}
