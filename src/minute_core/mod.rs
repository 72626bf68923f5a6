//! Minute Core - Bar Snapshot Aggregation and Durable Export
//!
//! Turns an unordered stream of partial bar updates into exactly-once,
//! strictly ordered one-minute records.
//!
//! # Architecture
//!
//! ```text
//! MarketSnapshot
//!     ↓
//! MinuteAggregator (floor to minute, delta, absorption, volume peak)
//!     ↓                    ↘
//!     ↓                     WindowedDeltaEngine (rolling / session CVD)
//! FlushScheduler (pending map, right-closed boundary, flush_seq)
//!     ↓
//! DurableWriter → latest.json + day log
//! ```
//!
//! `MinuteExporter` owns all of the above behind a single mutex.

pub mod absorption;
pub mod aggregator;
pub mod delta_engine;
pub mod durable_writer;
pub mod exporter;
pub mod record;
pub mod scheduler;
pub mod sink;
pub mod snapshot;

pub use absorption::Absorption;
pub use aggregator::MinuteAggregator;
pub use delta_engine::{DeltaWindowEntry, WindowedDeltaEngine};
pub use durable_writer::{DurableWriter, MinuteDocument};
pub use exporter::{ExporterStats, MinuteExporter};
pub use record::{MinuteRecord, VolumePeakSummary};
pub use scheduler::{FlushScheduler, FlushSequence};
pub use sink::RecordSink;
pub use snapshot::{AbsorptionSignal, MarketSnapshot, SnapshotTime, VolumePeak};
