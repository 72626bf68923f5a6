use crate::error::ExportError;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct Heartbeat {
    pub ts_utc: DateTime<Utc>,
    pub symbol: String,
    pub ticks_in_window: u64,
}

impl Heartbeat {
    pub fn render(&self) -> String {
        format!(
            "ts_utc={}\nsymbol={}\nticks_in_window={}\n",
            self.ts_utc.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.symbol,
            self.ticks_in_window
        )
    }

    /// Replace the heartbeat file: write a temp sibling, then rename over.
    pub fn write_to(&self, path: &Path) -> Result<(), ExportError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("txt.tmp");
        fs::write(&tmp, self.render())?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Parse the `ts_utc=` line back out of a heartbeat file body.
pub fn read_ts_utc(body: &str) -> Option<DateTime<Utc>> {
    body.lines()
        .find_map(|line| line.strip_prefix("ts_utc="))
        .and_then(|raw| DateTime::parse_from_rfc3339(raw.trim()).ok())
        .map(|ts| ts.with_timezone(&Utc))
}
