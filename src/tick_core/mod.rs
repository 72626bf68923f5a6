//! Tick Core - Buffered Trade Tape Writer
//!
//! # Architecture
//!
//! ```text
//! TickProducer::push (any thread, never blocks)
//!     ↓  unbounded mpsc
//! WriterLoop (tokio task, 10ms poll, CancellationToken)
//!     ├─ size / time trigger → TickSink::write_batch
//!     │                           ↓
//!     │      <symbol>/date=YYYY-MM-DD[/HH]/ticks.jsonl(.part)
//!     └─ every HeartbeatEveryMs → _heartbeats/<exporter>/<symbol>/heartbeat.txt
//! ```

pub mod buffer;
pub mod heartbeat;
pub mod part_writer;
pub mod partition;
pub mod sink;
pub mod trade_event;

pub use buffer::{TickBuffer, TickBufferHandle, TickProducer, TickStats, TickStatsSnapshot};
pub use heartbeat::Heartbeat;
pub use sink::{PartFileSink, TickSink};
pub use trade_event::{TickLine, TradeEvent, TradeSide};
