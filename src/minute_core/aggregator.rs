//! Snapshot → MinuteRecord conversion

use super::absorption::{self, Absorption};
use super::delta_engine::WindowedDeltaEngine;
use super::record::{floor_to_minute, format_minute, MinuteRecord, VolumePeakSummary};
use super::snapshot::MarketSnapshot;
use crate::config::{CvdMode, MinuteConfig, OutputTimezone};

/// Builds a fresh record for each snapshot, feeding the delta engine along the way.
///
/// Records are never merged: the caller stores the result under its minute
/// key and the latest snapshot for a minute wins.
pub struct MinuteAggregator {
    engine: WindowedDeltaEngine,
    safe_mode: bool,
    output_timezone: OutputTimezone,
    backfill: bool,
    cvd_label: String,
}

impl MinuteAggregator {
    pub fn new(config: &MinuteConfig) -> Self {
        Self {
            engine: WindowedDeltaEngine::new(config.cvd_mode),
            safe_mode: config.safe_mode,
            output_timezone: config.output_timezone,
            backfill: config.backfill,
            cvd_label: config.cvd_mode.label(),
        }
    }

    pub fn build(&mut self, snapshot: &MarketSnapshot) -> MinuteRecord {
        let minute_utc = floor_to_minute(snapshot.time.to_utc());

        let delta = snapshot.resolve_delta();
        let cvd = self.engine.update(minute_utc, delta);

        let (poc, vah, val, absorption, volume_peak) = if self.safe_mode {
            (None, None, None, Absorption::Unavailable, None)
        } else {
            (
                snapshot.poc,
                snapshot.vah,
                snapshot.val,
                absorption::evaluate(snapshot.absorption.as_ref(), snapshot.volume, delta),
                snapshot
                    .volume_peak
                    .as_ref()
                    .map(|peak| VolumePeakSummary::from_peak(peak, snapshot.high, snapshot.low)),
            )
        };

        MinuteRecord {
            minute_utc,
            timestamp: format_minute(minute_utc, self.output_timezone),
            tz: self.output_timezone,
            open: snapshot.open,
            high: snapshot.high,
            low: snapshot.low,
            close: snapshot.close,
            volume: snapshot.volume,
            delta,
            cvd,
            poc,
            vah,
            val,
            absorption,
            volume_peak,
            flush_seq: 0,
            backfill: self.backfill,
            cvd_mode: self.cvd_label.clone(),
        }
    }

    /// Account for a snapshot whose minute was already flushed.
    ///
    /// Session mode still sees its delta so a time regression restarts the
    /// session. The rolling window ignores it.
    pub fn absorb_late(&mut self, snapshot: &MarketSnapshot) {
        if self.engine.mode() == CvdMode::Session {
            let minute_utc = floor_to_minute(snapshot.time.to_utc());
            self.engine.update(minute_utc, snapshot.resolve_delta());
        }
    }

    pub fn engine(&self) -> &WindowedDeltaEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut WindowedDeltaEngine {
        &mut self.engine
    }
}
