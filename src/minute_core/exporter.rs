//! Thread-safe front door for the minute path
//!
//! One mutex covers the whole ingest-and-flush sequence for a snapshot: the
//! delta engine, the pending map, the sequence counter and the sink commit.

use super::aggregator::MinuteAggregator;
use super::durable_writer::DurableWriter;
use super::record::{floor_to_minute, MinuteRecord};
use super::scheduler::{Admission, FlushScheduler, FlushSequence};
use super::sink::RecordSink;
use super::snapshot::MarketSnapshot;
use crate::config::MinuteConfig;
use crate::error::ExportError;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};

/// Counters since the exporter was created. Survive `reconfigure`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExporterStats {
    pub snapshots_seen: u64,
    pub open_bars_skipped: u64,
    pub late_dropped: u64,
    pub records_committed: u64,
    pub commit_failures: u64,
}

struct ExporterState {
    config: MinuteConfig,
    aggregator: MinuteAggregator,
    scheduler: FlushScheduler,
    sequence: FlushSequence,
    sink: Box<dyn RecordSink>,
    // Rebuild the writer on reconfigure only if we built it ourselves.
    owns_sink: bool,
    stats: ExporterStats,
}

pub struct MinuteExporter {
    state: Mutex<ExporterState>,
}

impl MinuteExporter {
    /// Exporter writing through a `DurableWriter` rooted at `config.output_root`.
    pub fn new(config: MinuteConfig) -> Result<Self, ExportError> {
        config.validate()?;
        let writer = DurableWriter::from_config(&config)?;
        Ok(Self::build(config, Box::new(writer), true))
    }

    pub fn with_sink(config: MinuteConfig, sink: Box<dyn RecordSink>) -> Self {
        Self::build(config, sink, false)
    }

    fn build(config: MinuteConfig, sink: Box<dyn RecordSink>, owns_sink: bool) -> Self {
        log::info!(
            "📊 Minute exporter ready: cvd_mode={}, boundary={:?}, safe_mode={}, backfill={}, sink={}",
            config.cvd_mode.label(),
            config.flush_boundary,
            config.safe_mode,
            config.backfill,
            sink.backend_type()
        );

        Self {
            state: Mutex::new(ExporterState {
                aggregator: MinuteAggregator::new(&config),
                scheduler: FlushScheduler::new(config.flush_boundary),
                sequence: FlushSequence::new(),
                sink,
                owns_sink,
                stats: ExporterStats::default(),
                config,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ExporterState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            log::warn!("Minute exporter lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Fold one snapshot in and commit every minute it closes.
    ///
    /// Returns how many records were handed to the sink. Never fails: write
    /// errors are logged and the affected record is lost.
    pub fn ingest(&self, snapshot: &MarketSnapshot) -> usize {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.stats.snapshots_seen += 1;

        let config = &state.config;
        if !snapshot.closed && (config.safe_mode || config.write_on_bar_close_only) && !config.backfill {
            state.stats.open_bars_skipped += 1;
            log::debug!("Skipping open bar at {}", snapshot.time.to_utc());
            return 0;
        }

        let current = floor_to_minute(snapshot.time.to_utc());
        if state.scheduler.admit(current) == Admission::Late {
            state.aggregator.absorb_late(snapshot);
            state.stats.late_dropped += 1;
            return 0;
        }

        let record = state.aggregator.build(snapshot);
        state.scheduler.upsert(record);

        let ready = state.scheduler.collect_ready(current, &mut state.sequence);
        for record in &ready {
            state.aggregator.engine_mut().mark_processed(record.minute_utc);

            match state.sink.commit(record) {
                Ok(()) => state.stats.records_committed += 1,
                Err(e) => {
                    state.stats.commit_failures += 1;
                    log::error!(
                        "❌ Failed to commit minute {} (seq {}) via {}: {}",
                        record.timestamp_utc(),
                        record.flush_seq,
                        state.sink.backend_type(),
                        e
                    );
                }
            }
        }

        ready.len()
    }

    /// Swap in a new configuration.
    ///
    /// The engine and every pending minute are discarded. The flush sequence,
    /// the counters and the flushed-minute watermark carry over.
    pub fn reconfigure(&self, config: MinuteConfig) -> Result<(), ExportError> {
        config.validate()?;
        let mut guard = self.lock();
        let state = &mut *guard;

        if state.owns_sink {
            state.sink = Box::new(DurableWriter::from_config(&config)?);
        }

        let dropped = state.scheduler.pending_len();
        if dropped > 0 {
            log::warn!("Reconfigure discarded {} pending minute(s)", dropped);
        }

        state.aggregator = MinuteAggregator::new(&config);
        state.scheduler = FlushScheduler::resume(config.flush_boundary, state.scheduler.watermark());
        log::info!("🔄 Minute exporter reconfigured: cvd_mode={}", config.cvd_mode.label());
        state.config = config;
        Ok(())
    }

    pub fn config(&self) -> MinuteConfig {
        self.lock().config.clone()
    }

    pub fn stats(&self) -> ExporterStats {
        self.lock().stats.clone()
    }

    /// Minutes awaiting a later snapshot, oldest first. Inspection only.
    pub fn pending_minutes(&self) -> Vec<DateTime<Utc>> {
        self.lock().scheduler.pending_minutes()
    }

    pub fn pending_record(&self, minute: &DateTime<Utc>) -> Option<MinuteRecord> {
        self.lock().scheduler.pending(minute).cloned()
    }

    pub fn last_flush_seq(&self) -> u64 {
        self.lock().sequence.last_assigned()
    }
}
