//! Tick buffer - unbounded intake queue drained by one background writer
//!
//! Writer loop (10ms poll):
//! 1. Drains queued trades into the working batch, up to `flush_batch_size`
//! 2. Flushes when the batch is full, or when `flush_interval_ms` has passed
//!    since the last flush and the batch is non-empty
//! 3. Writes a heartbeat every `heartbeat_every_ms`, trades or not
//!
//! Cancellation stops the loop; whatever is still queued is drained and
//! flushed before the task exits.

use super::heartbeat::Heartbeat;
use super::sink::TickSink;
use super::trade_event::TradeEvent;
use crate::config::TickConfig;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL_MS: u64 = 10;

#[derive(Debug, Default)]
pub struct TickStats {
    batches_flushed: AtomicU64,
    events_written: AtomicU64,
    buffered: AtomicU64,
    heartbeats: AtomicU64,
    write_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStatsSnapshot {
    pub batches_flushed: u64,
    pub events_written: u64,
    /// Accepted by a producer, not yet handed to the sink.
    pub buffered: u64,
    pub heartbeats: u64,
    pub write_failures: u64,
}

impl TickStats {
    pub fn snapshot(&self) -> TickStatsSnapshot {
        TickStatsSnapshot {
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            events_written: self.events_written.load(Ordering::Relaxed),
            buffered: self.buffered.load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

/// Cloneable intake handle. `push` never blocks.
#[derive(Clone)]
pub struct TickProducer {
    tx: mpsc::UnboundedSender<TradeEvent>,
    ticks_since_heartbeat: Arc<AtomicU64>,
    stats: Arc<TickStats>,
}

impl TickProducer {
    /// Queue one trade. Returns `false` once the writer has stopped.
    pub fn push(&self, event: TradeEvent) -> bool {
        // Counted before sending so the writer never decrements first.
        self.stats.buffered.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(event).is_err() {
            self.stats.buffered.fetch_sub(1, Ordering::Relaxed);
            log::debug!("Tick writer stopped, dropping trade");
            return false;
        }
        self.ticks_since_heartbeat.fetch_add(1, Ordering::Relaxed);
        true
    }
}

pub struct TickBufferHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    stats: Arc<TickStats>,
}

impl TickBufferHandle {
    pub fn stats(&self) -> TickStatsSnapshot {
        self.stats.snapshot()
    }

    /// Cancel the writer and wait for its final drain.
    pub async fn shutdown(self) -> TickStatsSnapshot {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            log::error!("❌ Tick writer task failed: {}", e);
        }
        self.stats.snapshot()
    }
}

pub struct TickBuffer;

impl TickBuffer {
    /// Start the background writer on the current tokio runtime.
    pub fn spawn<S>(config: TickConfig, sink: S) -> (TickProducer, TickBufferHandle)
    where
        S: TickSink + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(TickStats::default());
        let ticks_since_heartbeat = Arc::new(AtomicU64::new(0));
        let cancel = CancellationToken::new();

        let writer = WriterLoop {
            batch: Vec::with_capacity(config.flush_batch_size),
            config,
            rx,
            sink,
            stats: Arc::clone(&stats),
            ticks_since_heartbeat: Arc::clone(&ticks_since_heartbeat),
            last_flush: Instant::now(),
            last_heartbeat: None,
        };
        let task = tokio::spawn(writer.run(cancel.clone()));

        let producer = TickProducer {
            tx,
            ticks_since_heartbeat,
            stats: Arc::clone(&stats),
        };
        (producer, TickBufferHandle { cancel, task, stats })
    }
}

struct WriterLoop<S> {
    config: TickConfig,
    rx: mpsc::UnboundedReceiver<TradeEvent>,
    sink: S,
    batch: Vec<TradeEvent>,
    stats: Arc<TickStats>,
    ticks_since_heartbeat: Arc<AtomicU64>,
    last_flush: Instant,
    last_heartbeat: Option<Instant>,
}

impl<S: TickSink> WriterLoop<S> {
    async fn run(mut self, cancel: CancellationToken) {
        log::info!("🚀 Starting tick writer ({})", self.sink.backend_type());
        log::info!("   ├─ Batch size: {}", self.config.flush_batch_size);
        log::info!("   ├─ Flush interval: {}ms", self.config.flush_interval_ms);
        log::info!("   └─ Heartbeat every: {}ms", self.config.heartbeat_every_ms);

        let flush_every = Duration::from_millis(self.config.flush_interval_ms);
        let heartbeat_every = Duration::from_millis(self.config.heartbeat_every_ms);
        let mut poll = interval(Duration::from_millis(POLL_INTERVAL_MS));
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut intake_open = true;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    log::info!("🛑 Tick writer cancelled");
                    break;
                }

                _ = poll.tick() => {
                    if !self.batch.is_empty() && self.last_flush.elapsed() >= flush_every {
                        self.flush().await;
                    }
                    if self.last_heartbeat.map_or(true, |t| t.elapsed() >= heartbeat_every) {
                        self.heartbeat().await;
                    }
                }

                received = self.rx.recv(), if intake_open => match received {
                    Some(event) => {
                        self.batch.push(event);
                        self.fill_batch();
                        if self.batch.len() >= self.config.flush_batch_size {
                            self.flush().await;
                        }
                    }
                    None => {
                        // Heartbeats keep going until cancellation.
                        log::warn!("⚠️  All tick producers dropped");
                        intake_open = false;
                    }
                },
            }
        }

        log::info!("🔄 Performing final tick flush...");
        while let Ok(event) = self.rx.try_recv() {
            self.batch.push(event);
            if self.batch.len() >= self.config.flush_batch_size {
                self.flush().await;
            }
        }
        self.flush().await;

        let stats = self.stats.snapshot();
        log::info!(
            "✅ Tick writer stopped: {} events in {} batches, {} write failures",
            stats.events_written,
            stats.batches_flushed,
            stats.write_failures
        );
    }

    fn fill_batch(&mut self) {
        while self.batch.len() < self.config.flush_batch_size {
            match self.rx.try_recv() {
                Ok(event) => self.batch.push(event),
                Err(_) => break,
            }
        }
    }

    async fn flush(&mut self) {
        self.last_flush = Instant::now();
        if self.batch.is_empty() {
            return;
        }

        let batch = std::mem::replace(&mut self.batch, Vec::with_capacity(self.config.flush_batch_size));
        match self.sink.write_batch(&batch).await {
            Ok(written) => {
                self.stats.batches_flushed.fetch_add(1, Ordering::Relaxed);
                self.stats.events_written.fetch_add(written as u64, Ordering::Relaxed);
                log::debug!("✅ Flushed {} ticks", written);
            }
            Err(e) => {
                self.stats.write_failures.fetch_add(1, Ordering::Relaxed);
                log::error!("❌ Failed to flush {} ticks: {}", batch.len(), e);
            }
        }
        self.stats.buffered.fetch_sub(batch.len() as u64, Ordering::Relaxed);
    }

    async fn heartbeat(&mut self) {
        self.last_heartbeat = Some(Instant::now());
        let beat = Heartbeat {
            ts_utc: Utc::now(),
            symbol: self.config.symbol.clone(),
            ticks_in_window: self.ticks_since_heartbeat.swap(0, Ordering::Relaxed),
        };

        match self.sink.heartbeat(&beat).await {
            Ok(()) => {
                self.stats.heartbeats.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.write_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("⚠️  Failed to write heartbeat: {}", e);
            }
        }
    }
}
