//! Sink trait for tick batches and heartbeats
//!
//! Defines the interface the tick buffer writes through, plus the
//! production `.part`-file implementation.

use super::heartbeat::Heartbeat;
use super::part_writer;
use super::partition;
use super::trade_event::{TickLine, TradeEvent};
use crate::config::TickConfig;
use crate::error::ExportError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

#[async_trait]
pub trait TickSink: Send {
    /// Persist one batch, FIFO within each destination. Returns events written.
    async fn write_batch(&mut self, batch: &[TradeEvent]) -> Result<usize, ExportError>;

    /// Replace the liveness file
    async fn heartbeat(&mut self, beat: &Heartbeat) -> Result<(), ExportError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}

pub struct PartFileSink {
    root: PathBuf,
    exchange: String,
    partition_by_hour: bool,
    heartbeat_path: PathBuf,
}

impl PartFileSink {
    pub fn new(config: &TickConfig) -> Self {
        Self {
            root: config.output_root.clone(),
            exchange: config.exchange.clone(),
            partition_by_hour: config.partition_by_hour,
            heartbeat_path: partition::heartbeat_path(
                &config.output_root,
                &config.exporter_name,
                &config.symbol,
            ),
        }
    }

    /// Split a batch by destination file, keeping first-seen order of
    /// destinations and arrival order inside each.
    fn group(&self, batch: &[TradeEvent]) -> Result<Vec<(PathBuf, Vec<String>)>, ExportError> {
        let mut groups: Vec<(PathBuf, Vec<String>)> = Vec::new();
        let mut index: HashMap<PathBuf, usize> = HashMap::new();

        for event in batch {
            let dest = partition::tick_path(&self.root, &event.symbol, event.ts, self.partition_by_hour);
            let line = serde_json::to_string(&TickLine::new(event, &self.exchange))?;

            match index.get(&dest) {
                Some(&i) => groups[i].1.push(line),
                None => {
                    index.insert(dest.clone(), groups.len());
                    groups.push((dest, vec![line]));
                }
            }
        }

        Ok(groups)
    }
}

#[async_trait]
impl TickSink for PartFileSink {
    async fn write_batch(&mut self, batch: &[TradeEvent]) -> Result<usize, ExportError> {
        let mut written = 0;
        let mut first_error = None;

        for (dest, lines) in self.group(batch)? {
            match part_writer::append_batch(&dest, &lines) {
                Ok(n) => written += n,
                Err(e) => {
                    log::error!("❌ Failed to append {} ticks to {}: {}", lines.len(), dest.display(), e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    async fn heartbeat(&mut self, beat: &Heartbeat) -> Result<(), ExportError> {
        beat.write_to(&self.heartbeat_path)
    }

    fn backend_type(&self) -> &'static str {
        "JSONL-part"
    }
}
