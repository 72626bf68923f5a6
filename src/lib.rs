//! flowexport - durable export of market bars and trade ticks
//!
//! Two independent pipelines sharing an output root:
//!
//! ```text
//! MarketSnapshot → minute_core::MinuteExporter → latest.json + day log
//! TradeEvent     → tick_core::TickBuffer       → ticks.jsonl + heartbeat
//! ```

pub mod config;
pub mod error;
pub mod feed;
pub mod logging;
pub mod minute_core;
pub mod tick_core;

pub use config::{MinuteConfig, RuntimeConfig, TickConfig};
pub use error::ExportError;
