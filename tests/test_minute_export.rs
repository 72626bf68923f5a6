//! Integration tests for the minute export path
//!
//! Drives `MinuteExporter` with a real `DurableWriter` against a scratch
//! directory and checks the files a downstream consumer would read.
//!
//! Key behaviors tested:
//! - Right-closed flush: the current minute stays pending
//! - One day-log line per flushed minute, strictly increasing flush_seq
//! - latest.json tracks the most recent flush
//! - Non-finite values land as JSON null

#[cfg(test)]
mod minute_export_tests {
    use chrono::{DateTime, TimeZone, Utc};
    use flowexport::config::{BarFileLayout, CvdMode, MinuteConfig};
    use flowexport::minute_core::{MarketSnapshot, MinuteExporter};
    use serde_json::Value;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
    }

    fn config(root: &Path) -> MinuteConfig {
        MinuteConfig {
            output_root: root.to_path_buf(),
            cvd_mode: CvdMode::Rolling { window_minutes: 5 },
            ..MinuteConfig::default()
        }
    }

    fn day_log(root: &Path) -> Vec<Value> {
        let path = root.join("date=2024-03-01").join("bar_20240301.jsonl");
        fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_three_snapshots_emit_one_minute() {
        let dir = TempDir::new().unwrap();
        let exporter = MinuteExporter::new(config(dir.path())).unwrap();

        exporter.ingest(&MarketSnapshot::new(at(10, 0, 10), 100.0, 101.0, 99.0, 100.5, 10.0).with_delta(5.0));
        exporter.ingest(&MarketSnapshot::new(at(10, 0, 40), 100.0, 102.0, 99.0, 101.0, 20.0).with_delta(3.0));
        exporter.ingest(&MarketSnapshot::new(at(10, 1, 5), 101.0, 101.0, 100.0, 100.0, 4.0).with_delta(-2.0));

        let lines = day_log(dir.path());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["timestamp_utc"], "2024-03-01T10:00:00Z");
        assert_eq!(lines[0]["cvd"], 8.0);
        assert_eq!(lines[0]["close"], 101.0);
        assert_eq!(lines[0]["flush_seq"], 1);
        assert_eq!(lines[0]["cvd_mode"], "rolling:5");
        assert_eq!(lines[0]["backfill"], false);
        assert_eq!(exporter.pending_minutes(), vec![at(10, 1, 0)]);

        let latest: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("latest.json")).unwrap()).unwrap();
        assert_eq!(latest, lines[0]);
    }

    #[test]
    fn test_day_log_is_ordered_and_unique() {
        let dir = TempDir::new().unwrap();
        let exporter = MinuteExporter::new(config(dir.path())).unwrap();

        // Out of order, with duplicates and a late straggler.
        let seconds = [5, 70, 65, 130, 10, 200, 190, 260, 400];
        for s in seconds {
            let ts = at(10, 0, 0) + chrono::Duration::seconds(s);
            exporter.ingest(&MarketSnapshot::new(ts, 1.0, 1.0, 1.0, 1.0, 1.0).with_delta(1.0));
        }

        let lines = day_log(dir.path());
        let stamps: Vec<&str> = lines.iter().map(|l| l["timestamp_utc"].as_str().unwrap()).collect();
        assert_eq!(
            stamps,
            vec![
                "2024-03-01T10:00:00Z",
                "2024-03-01T10:01:00Z",
                "2024-03-01T10:02:00Z",
                "2024-03-01T10:03:00Z",
                "2024-03-01T10:04:00Z"
            ]
        );
        let seqs: Vec<u64> = lines.iter().map(|l| l["flush_seq"].as_u64().unwrap()).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
        assert_eq!(exporter.stats().late_dropped, 1);
    }

    #[test]
    fn test_reconfigure_keeps_day_log_unique() {
        let dir = TempDir::new().unwrap();
        let exporter = MinuteExporter::new(config(dir.path())).unwrap();
        let bar = |ts: DateTime<Utc>| MarketSnapshot::new(ts, 1.0, 1.0, 1.0, 1.0, 1.0).with_delta(1.0);

        exporter.ingest(&bar(at(10, 0, 0)));
        exporter.ingest(&bar(at(10, 1, 0)));
        exporter
            .reconfigure(MinuteConfig { cvd_mode: CvdMode::Session, ..config(dir.path()) })
            .unwrap();
        exporter.ingest(&bar(at(10, 0, 0)));
        exporter.ingest(&bar(at(10, 1, 0)));
        exporter.ingest(&bar(at(10, 2, 0)));

        let lines = day_log(dir.path());
        let stamps: Vec<&str> = lines.iter().map(|l| l["timestamp_utc"].as_str().unwrap()).collect();
        assert_eq!(stamps, vec!["2024-03-01T10:00:00Z", "2024-03-01T10:01:00Z"]);
        assert_eq!(lines[1]["flush_seq"], 2);
        assert_eq!(lines[1]["cvd_mode"], "session");
    }

    #[test]
    fn test_missing_delta_and_nan_written_as_null() {
        let dir = TempDir::new().unwrap();
        let config = MinuteConfig { safe_mode: false, ..config(dir.path()) };
        let exporter = MinuteExporter::new(config).unwrap();

        let mut snap = MarketSnapshot::new(at(10, 0, 0), 1.0, 2.0, 0.5, 1.5, 3.0);
        snap.poc = Some(f64::NAN);
        exporter.ingest(&snap);
        exporter.ingest(&MarketSnapshot::new(at(10, 1, 0), 1.0, 1.0, 1.0, 1.0, 1.0));

        let raw = fs::read_to_string(dir.path().join("date=2024-03-01").join("bar_20240301.jsonl")).unwrap();
        assert!(!raw.contains("NaN"));
        let line: Value = serde_json::from_str(raw.lines().next().unwrap()).unwrap();
        assert!(line["poc"].is_null());
        assert!(line["cvd"].is_null());
        assert!(line["absorption_strength"].is_null());
        assert_eq!(line["absorption_detected"], false);
        assert_eq!(line["bar_vpo_side"], "");
    }

    #[test]
    fn test_flat_layout_and_blank_root() {
        let dir = TempDir::new().unwrap();
        let config = MinuteConfig { bar_file_layout: BarFileLayout::Flat, ..config(dir.path()) };
        let exporter = MinuteExporter::new(config).unwrap();

        exporter.ingest(&MarketSnapshot::new(at(23, 59, 30), 1.0, 1.0, 1.0, 1.0, 1.0).with_delta(1.0));
        exporter.ingest(
            &MarketSnapshot::new(Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 5).unwrap(), 1.0, 1.0, 1.0, 1.0, 1.0)
                .with_delta(1.0),
        );

        // Named by the flushed minute's UTC date, not the flushing snapshot's.
        assert!(dir.path().join("market_data_20240301.jsonl").exists());
        assert!(!dir.path().join("market_data_20240302.jsonl").exists());

        let blank = MinuteConfig { output_root: "".into(), ..MinuteConfig::default() };
        assert!(MinuteExporter::new(blank).is_err());
    }
}
