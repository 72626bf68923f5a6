//! Canonical one-minute record

use super::absorption::Absorption;
use super::snapshot::VolumePeak;
use crate::config::OutputTimezone;
use chrono::{DateTime, Local, SecondsFormat, Timelike, Utc};

/// Truncate to the start of the UTC minute.
pub fn floor_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// RFC 3339 rendering of a minute key in the requested zone.
pub fn format_minute(minute_utc: DateTime<Utc>, tz: OutputTimezone) -> String {
    match tz {
        OutputTimezone::Utc => minute_utc.to_rfc3339_opts(SecondsFormat::Secs, true),
        OutputTimezone::Local => minute_utc
            .with_timezone(&Local)
            .to_rfc3339_opts(SecondsFormat::Secs, false),
    }
}

/// Where the bar's heaviest price level sits and which side dominated it.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumePeakSummary {
    pub price: f64,
    pub volume: f64,
    /// Position within `[low, high]`, 0 at the low. `None` for a flat bar.
    pub loc: Option<f64>,
    /// `bull`, `bear` or `neutral`; empty when bid/ask are unusable.
    pub side: String,
}

impl VolumePeakSummary {
    pub fn from_peak(peak: &VolumePeak, high: f64, low: f64) -> Self {
        let loc = (high > low).then(|| ((peak.price - low) / (high - low)).clamp(0.0, 1.0));

        let side = if peak.bid.is_nan() || peak.ask.is_nan() {
            ""
        } else if peak.ask > peak.bid {
            "bull"
        } else if peak.bid > peak.ask {
            "bear"
        } else {
            "neutral"
        };

        Self {
            price: peak.price,
            volume: peak.volume,
            loc,
            side: side.to_string(),
        }
    }
}

/// Everything known about one minute. Mutable while pending, frozen once a
/// flush sequence number is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct MinuteRecord {
    pub minute_utc: DateTime<Utc>,
    /// Display timestamp in `tz`.
    pub timestamp: String,
    pub tz: OutputTimezone,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub delta: Option<f64>,
    pub cvd: Option<f64>,
    pub poc: Option<f64>,
    pub vah: Option<f64>,
    pub val: Option<f64>,
    pub absorption: Absorption,
    pub volume_peak: Option<VolumePeakSummary>,
    /// 0 until emitted.
    pub flush_seq: u64,
    pub backfill: bool,
    pub cvd_mode: String,
}

impl MinuteRecord {
    pub fn timestamp_utc(&self) -> String {
        format_minute(self.minute_utc, OutputTimezone::Utc)
    }

    pub fn is_flushed(&self) -> bool {
        self.flush_seq > 0
    }
}
