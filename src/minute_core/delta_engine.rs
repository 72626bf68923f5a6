//! Cumulative volume delta over a rolling window or an anchored session

use crate::config::CvdMode;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// One delta-bearing minute held by the rolling window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaWindowEntry {
    pub minute: DateTime<Utc>,
    pub delta: f64,
}

#[derive(Debug, Clone, Default)]
struct SessionState {
    anchor: Option<DateTime<Utc>>,
    last_processed: Option<DateTime<Utc>>,
}

/// CVD accumulator for a single configuration.
///
/// A new configuration needs a new engine; nothing here can be switched in place.
#[derive(Debug, Clone)]
pub struct WindowedDeltaEngine {
    mode: CvdMode,
    accumulator: f64,
    window: VecDeque<DeltaWindowEntry>,
    session: SessionState,
}

impl WindowedDeltaEngine {
    pub fn new(mode: CvdMode) -> Self {
        let mode = match mode {
            CvdMode::Rolling { window_minutes } if window_minutes <= 0 => {
                log::warn!(
                    "Rolling window must be positive (got {}), using default",
                    window_minutes
                );
                CvdMode::default()
            }
            other => other,
        };

        Self {
            mode,
            accumulator: 0.0,
            window: VecDeque::with_capacity(64),
            session: SessionState::default(),
        }
    }

    /// Fold one minute's delta in and return the CVD.
    ///
    /// Returns `None` when `delta` is absent; the accumulator is never
    /// advanced by a missing delta.
    pub fn update(&mut self, minute: DateTime<Utc>, delta: Option<f64>) -> Option<f64> {
        match self.mode {
            CvdMode::Session => self.update_session(minute, delta),
            CvdMode::Rolling { window_minutes } => self.update_rolling(minute, delta, window_minutes),
        }
    }

    fn update_session(&mut self, minute: DateTime<Utc>, delta: Option<f64>) -> Option<f64> {
        let regressed = self
            .session
            .last_processed
            .is_some_and(|last| minute < last);

        if self.session.anchor.is_none() || regressed {
            if regressed {
                log::info!("Session restart detected at {} (time regression)", minute);
            }
            self.accumulator = 0.0;
            self.session.anchor = Some(minute);
        }

        let delta = delta?;
        self.accumulator += delta;
        Some(self.accumulator)
    }

    fn update_rolling(
        &mut self,
        minute: DateTime<Utc>,
        delta: Option<f64>,
        window_minutes: i64,
    ) -> Option<f64> {
        let in_order = self.window.back().map_or(true, |last| last.minute <= minute);

        if let Some(delta) = delta {
            // Window stays sorted by minute so eviction can work from the front.
            let at = self.window.partition_point(|entry| entry.minute <= minute);
            self.window.insert(at, DeltaWindowEntry { minute, delta });
            self.accumulator += delta;
        }

        let lower = minute - Duration::minutes(window_minutes);
        self.evict_before(lower);

        delta?;
        if in_order {
            return Some(self.accumulator);
        }

        // Later minutes already in the window are not part of this minute's sum.
        log::debug!("Out-of-order delta at {}, summing [{}, {}]", minute, lower, minute);
        Some(
            self.window
                .iter()
                .take_while(|entry| entry.minute <= minute)
                .map(|entry| entry.delta)
                .sum(),
        )
    }

    /// Drop entries strictly older than `boundary`; an entry at the boundary stays.
    fn evict_before(&mut self, boundary: DateTime<Utc>) {
        while let Some(front) = self.window.front() {
            if front.minute >= boundary {
                break;
            }
            if let Some(evicted) = self.window.pop_front() {
                self.accumulator -= evicted.delta;
            }
        }

        if self.window.is_empty() {
            // Clears float residue left by add/subtract cycles.
            self.accumulator = 0.0;
        }
    }

    /// Record that `minute` has been finalized downstream.
    pub fn mark_processed(&mut self, minute: DateTime<Utc>) {
        self.session.last_processed = Some(minute);
    }

    pub fn mode(&self) -> CvdMode {
        self.mode
    }

    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn session_anchor(&self) -> Option<DateTime<Utc>> {
        self.session.anchor
    }
}
