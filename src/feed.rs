//! NDJSON feed adapter
//!
//! One JSON object per line, tagged by `type`:
//!
//! ```text
//! {"type":"bar","time":"2024-03-01T10:00:10Z","open":1,"high":2,"low":0.5,"close":1.5,"volume":10,"delta":5}
//! {"type":"trade","ts":"2024-03-01T10:00:10.250Z","symbol":"ES","price":1.5,"qty":2,"side":"buy"}
//! ```

use crate::minute_core::MarketSnapshot;
use crate::tick_core::TradeEvent;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeedMessage {
    Bar(MarketSnapshot),
    Trade(TradeEvent),
}

/// Parse one feed line. Blank lines and unparseable input yield `None`.
pub fn parse_line(line: &str) -> Option<FeedMessage> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str(trimmed) {
        Ok(message) => Some(message),
        Err(e) => {
            log::debug!("Skipping malformed feed line ({}): {}", e, trimmed);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_parse_bar() {
        let line = r#"{"type":"bar","time":"2024-03-01T10:00:10Z","open":1,"high":2,"low":0.5,"close":1.5,"volume":10,"delta":5}"#;
        match parse_line(line) {
            Some(FeedMessage::Bar(snap)) => {
                assert_eq!(snap.time.to_utc(), Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 10).unwrap());
                assert_eq!(snap.delta, Some(5.0));
                assert!(snap.closed);
            }
            other => panic!("expected bar, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_trade() {
        let line = r#"{"type":"trade","ts":"2024-03-01T10:00:10.250Z","symbol":"ES","price":1.5,"qty":2,"side":"sell","trade_id":"42"}"#;
        match parse_line(line) {
            Some(FeedMessage::Trade(trade)) => {
                assert_eq!(trade.symbol, "ES");
                assert_eq!(trade.trade_id.as_deref(), Some("42"));
            }
            other => panic!("expected trade, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_lines_skipped() {
        assert!(parse_line("").is_none());
        assert!(parse_line("not json").is_none());
        assert!(parse_line(r#"{"type":"quote","bid":1}"#).is_none());
        assert!(parse_line(r#"{"type":"bar","open":1}"#).is_none());
    }
}
