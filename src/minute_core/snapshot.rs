//! Host-neutral bar snapshot handed to the minute pipeline
//!
//! The host adapter fills one of these per bar update. Every optional field
//! is best-effort: an adapter that cannot resolve a value leaves it `None`.

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Bar timestamp as the host delivered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SnapshotTime {
    Utc(DateTime<Utc>),
    Offset(DateTime<FixedOffset>),
    /// No zone attached; read as process-local time.
    Unspecified(NaiveDateTime),
}

impl SnapshotTime {
    pub fn to_utc(&self) -> DateTime<Utc> {
        match self {
            SnapshotTime::Utc(ts) => *ts,
            SnapshotTime::Offset(ts) => ts.with_timezone(&Utc),
            SnapshotTime::Unspecified(naive) => match Local.from_local_datetime(naive).earliest() {
                Some(local) => local.with_timezone(&Utc),
                None => {
                    // Falls inside a DST gap; there is no local reading.
                    log::debug!("Local time {} does not exist, reading as UTC", naive);
                    Utc.from_utc_datetime(naive)
                }
            },
        }
    }
}

impl From<DateTime<Utc>> for SnapshotTime {
    fn from(ts: DateTime<Utc>) -> Self {
        SnapshotTime::Utc(ts)
    }
}

impl FromStr for SnapshotTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
            if ts.offset().local_minus_utc() == 0 && (text.ends_with('Z') || text.ends_with('z')) {
                return Ok(SnapshotTime::Utc(ts.with_timezone(&Utc)));
            }
            return Ok(SnapshotTime::Offset(ts));
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
                return Ok(SnapshotTime::Unspecified(naive));
            }
        }
        Err(format!("unrecognised timestamp '{}'", text))
    }
}

impl TryFrom<String> for SnapshotTime {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SnapshotTime> for String {
    fn from(value: SnapshotTime) -> Self {
        match value {
            SnapshotTime::Utc(ts) => ts.to_rfc3339(),
            SnapshotTime::Offset(ts) => ts.to_rfc3339(),
            SnapshotTime::Unspecified(naive) => naive.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
        }
    }
}

/// Absorption signal supplied by the host, trusted as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AbsorptionSignal {
    pub detected: Option<bool>,
    pub strength: Option<f64>,
    pub side: Option<String>,
}

/// Price level carrying the most volume inside the bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumePeak {
    pub price: f64,
    pub volume: f64,
    pub bid: f64,
    pub ask: f64,
}

fn default_closed() -> bool {
    true
}

/// One bar update from the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub time: SnapshotTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub delta: Option<f64>,
    #[serde(default)]
    pub buy_volume: Option<f64>,
    #[serde(default)]
    pub sell_volume: Option<f64>,
    #[serde(default)]
    pub poc: Option<f64>,
    #[serde(default)]
    pub vah: Option<f64>,
    #[serde(default)]
    pub val: Option<f64>,
    #[serde(default)]
    pub absorption: Option<AbsorptionSignal>,
    #[serde(default)]
    pub volume_peak: Option<VolumePeak>,
    /// False while the bar is still forming.
    #[serde(default = "default_closed")]
    pub closed: bool,
}

impl MarketSnapshot {
    /// Bare OHLCV snapshot; the optional fields start empty.
    pub fn new(time: impl Into<SnapshotTime>, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            time: time.into(),
            open,
            high,
            low,
            close,
            volume,
            delta: None,
            buy_volume: None,
            sell_volume: None,
            poc: None,
            vah: None,
            val: None,
            absorption: None,
            volume_peak: None,
            closed: true,
        }
    }

    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = Some(delta);
        self
    }

    /// Explicit delta when finite, otherwise buy minus sell when both sides resolve.
    pub fn resolve_delta(&self) -> Option<f64> {
        if let Some(delta) = self.delta.filter(|d| d.is_finite()) {
            return Some(delta);
        }

        match (
            self.buy_volume.filter(|v| v.is_finite()),
            self.sell_volume.filter(|v| v.is_finite()),
        ) {
            (Some(buy), Some(sell)) => Some(buy - sell),
            _ => {
                log::debug!("No delta resolvable for snapshot at {:?}", self.time);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_snapshot_time_variants() {
        let utc: SnapshotTime = "2024-03-01T10:00:10Z".parse().unwrap();
        assert!(matches!(utc, SnapshotTime::Utc(_)));

        let offset: SnapshotTime = "2024-03-01T12:00:10+02:00".parse().unwrap();
        assert!(matches!(offset, SnapshotTime::Offset(_)));
        assert_eq!(offset.to_utc(), utc.to_utc());

        let naive: SnapshotTime = "2024-03-01 10:00:10".parse().unwrap();
        assert!(matches!(naive, SnapshotTime::Unspecified(_)));

        assert!("yesterday".parse::<SnapshotTime>().is_err());
    }

    #[test]
    fn test_unspecified_reads_as_local() {
        let naive = NaiveDateTime::parse_from_str("2024-03-01 10:00:10", "%Y-%m-%d %H:%M:%S").unwrap();
        let expected = Local.from_local_datetime(&naive).earliest().unwrap().with_timezone(&Utc);
        assert_eq!(SnapshotTime::Unspecified(naive).to_utc(), expected);
        assert_eq!(expected.second(), 10);
    }

    #[test]
    fn test_resolve_delta() {
        let ts = Utc::now();
        let mut snap = MarketSnapshot::new(ts, 1.0, 1.0, 1.0, 1.0, 10.0);
        assert_eq!(snap.resolve_delta(), None);

        snap.buy_volume = Some(7.0);
        assert_eq!(snap.resolve_delta(), None);

        snap.sell_volume = Some(3.0);
        assert_eq!(snap.resolve_delta(), Some(4.0));

        snap.delta = Some(f64::NAN);
        assert_eq!(snap.resolve_delta(), Some(4.0));

        snap.delta = Some(-2.5);
        assert_eq!(snap.resolve_delta(), Some(-2.5));
    }

    #[test]
    fn test_deserialize_snapshot() {
        let json = r#"{"time":"2024-03-01T10:00:10Z","open":1,"high":2,"low":0.5,"close":1.5,"volume":100,"delta":12}"#;
        let snap: MarketSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.delta, Some(12.0));
        assert!(snap.closed);
        assert!(snap.absorption.is_none());
    }
}
