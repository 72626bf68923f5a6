use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const TICK_SCHEMA_VERSION: &str = "tick.v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    #[serde(alias = "BUY", alias = "Buy", alias = "bid")]
    Buy,
    #[serde(alias = "SELL", alias = "Sell", alias = "ask")]
    Sell,
    #[default]
    #[serde(other)]
    Unknown,
}

/// One trade as delivered by the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub price: f64,
    pub qty: f64,
    #[serde(default)]
    pub side: TradeSide,
    #[serde(default)]
    pub best_bid: Option<f64>,
    #[serde(default)]
    pub best_ask: Option<f64>,
    #[serde(default)]
    pub trade_id: Option<String>,
    /// Overrides the configured exchange for this event.
    #[serde(default)]
    pub exchange: Option<String>,
}

impl TradeEvent {
    pub fn new(ts: DateTime<Utc>, symbol: impl Into<String>, price: f64, qty: f64, side: TradeSide) -> Self {
        Self {
            ts,
            symbol: symbol.into(),
            price,
            qty,
            side,
            best_bid: None,
            best_ask: None,
            trade_id: None,
            exchange: None,
        }
    }
}

/// Serialized form of a trade in `ticks.jsonl`.
#[derive(Debug, Serialize)]
pub struct TickLine<'a> {
    pub ts: DateTime<Utc>,
    pub exchange: &'a str,
    pub symbol: &'a str,
    pub price: f64,
    pub qty: f64,
    pub side: TradeSide,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_bid: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_ask: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_id: Option<&'a str>,
    pub exporter_version: &'static str,
    pub schema_version: &'static str,
}

impl<'a> TickLine<'a> {
    pub fn new(event: &'a TradeEvent, default_exchange: &'a str) -> Self {
        Self {
            ts: event.ts,
            exchange: event.exchange.as_deref().unwrap_or(default_exchange),
            symbol: &event.symbol,
            price: event.price,
            qty: event.qty,
            side: event.side,
            best_bid: event.best_bid,
            best_ask: event.best_ask,
            trade_id: event.trade_id.as_deref().filter(|id| !id.is_empty()),
            exporter_version: env!("CARGO_PKG_VERSION"),
            schema_version: TICK_SCHEMA_VERSION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_tick_line_shape() {
        let mut event = TradeEvent::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            "BTCUSDT",
            64000.5,
            0.25,
            TradeSide::Sell,
        );
        event.best_bid = Some(64000.0);

        let json = serde_json::to_string(&TickLine::new(&event, "BINANCE_FUTURES")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["exchange"], "BINANCE_FUTURES");
        assert_eq!(value["side"], "sell");
        assert_eq!(value["best_bid"], 64000.0);
        assert!(value.get("best_ask").is_none());
        assert!(value.get("trade_id").is_none());
        assert_eq!(value["schema_version"], "tick.v1");
        assert!(json.starts_with("{\"ts\":"));
    }

    #[test]
    fn test_side_parsing() {
        let raw = r#"{"ts":"2024-03-01T10:00:00Z","symbol":"ES","price":1.0,"qty":2.0,"side":"BUY"}"#;
        let event: TradeEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.side, TradeSide::Buy);

        let raw = r#"{"ts":"2024-03-01T10:00:00Z","symbol":"ES","price":1.0,"qty":2.0,"side":"aggressor?"}"#;
        let event: TradeEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.side, TradeSide::Unknown);

        let raw = r#"{"ts":"2024-03-01T10:00:00Z","symbol":"ES","price":1.0,"qty":2.0}"#;
        let event: TradeEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.side, TradeSide::Unknown);
    }
}
