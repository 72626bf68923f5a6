//! Sink trait for finalized minute records
//!
//! The minute path runs synchronously under the exporter lock, so unlike the
//! tick sink this seam is a plain blocking trait.

use super::record::MinuteRecord;
use crate::error::ExportError;

pub trait RecordSink: Send {
    /// Persist one finalized record
    fn commit(&mut self, record: &MinuteRecord) -> Result<(), ExportError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}
