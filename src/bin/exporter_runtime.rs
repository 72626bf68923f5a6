//! Exporter Runtime - stdin feed driving both export pipelines
//!
//! Reads NDJSON from stdin: `{"type":"bar",...}` lines go to the minute
//! exporter, `{"type":"trade",...}` lines to the tick buffer.
//!
//! ## Usage
//!
//! ```bash
//! feed-source | cargo run --release --bin exporter_runtime
//! ```
//!
//! ## Environment Variables
//!
//! - EXPORT_DIR / OUTPUT_ROOT - Output root (default: exports)
//! - SESSION_MODE - rolling:<minutes> or session (default: rolling:60)
//! - SAFE_MODE, WRITE_ON_BAR_CLOSE_ONLY, BACKFILL, FLUSH_BOUNDARY
//! - OUTPUT_TIMEZONE, JSON_INDENT, BAR_FILE_LAYOUT
//! - TICK_OUTPUT_ROOT, TICK_EXCHANGE, TICK_SYMBOL
//! - FLUSH_BATCH_SIZE, FLUSH_INTERVAL_MS, HEARTBEAT_EVERY_MS, PARTITION_BY_HOUR
//! - EXPORTER_LOG_FILE - Mirror logs into <root>/_logs (default: true)
//! - RUST_LOG - Logging level (optional, default: info)
//!
//! Stops on EOF or Ctrl-C; queued ticks are flushed before exit.

use flowexport::config::{MinuteConfig, RuntimeConfig, TickConfig};
use flowexport::feed::{self, FeedMessage};
use flowexport::logging;
use flowexport::minute_core::MinuteExporter;
use flowexport::tick_core::{PartFileSink, TickBuffer};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let runtime = RuntimeConfig::from_env();
    let minute_config = MinuteConfig::from_env()?;
    let tick_config = TickConfig::from_env(minute_config.output_root.clone())?;

    logging::init(&runtime, &minute_config.output_root);

    log::info!("🚀 Starting exporter runtime v{}", env!("CARGO_PKG_VERSION"));
    log::info!("📊 Configuration:");
    log::info!("   Output root: {}", minute_config.output_root.display());
    log::info!("   CVD mode: {}", minute_config.cvd_mode.label());
    log::info!("   Safe mode: {}", minute_config.safe_mode);
    log::info!("   Backfill: {}", minute_config.backfill);
    log::info!("   Tick root: {}", tick_config.output_root.display());

    let exporter = MinuteExporter::new(minute_config)?;
    let sink = PartFileSink::new(&tick_config);
    let (producer, tick_handle) = TickBuffer::spawn(tick_config, sink);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut bars = 0u64;
    let mut trades = 0u64;

    log::info!("✅ Runtime ready, reading feed from stdin...");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => match feed::parse_line(&line) {
                        Some(FeedMessage::Bar(snapshot)) => {
                            exporter.ingest(&snapshot);
                            bars += 1;
                        }
                        Some(FeedMessage::Trade(trade)) => {
                            producer.push(trade);
                            trades += 1;
                        }
                        None => {}
                    },
                    Ok(None) => {
                        log::info!("📭 Feed closed (EOF)");
                        break;
                    }
                    Err(e) => {
                        log::error!("❌ Feed read error: {}", e);
                        break;
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                log::info!("🛑 Received Ctrl-C, shutting down...");
                break;
            }
        }
    }

    drop(producer);
    let tick_stats = tick_handle.shutdown().await;
    let minute_stats = exporter.stats();

    log::info!("📊 Session summary:");
    log::info!("   Bars read: {} | Trades read: {}", bars, trades);
    log::info!(
        "   Minutes committed: {} (late dropped: {}, commit failures: {})",
        minute_stats.records_committed,
        minute_stats.late_dropped,
        minute_stats.commit_failures
    );
    log::info!(
        "   Ticks written: {} in {} batches (write failures: {})",
        tick_stats.events_written,
        tick_stats.batches_flushed,
        tick_stats.write_failures
    );
    let pending = exporter.pending_minutes();
    if !pending.is_empty() {
        log::info!("   {} minute(s) still pending, not written", pending.len());
    }

    Ok(())
}
