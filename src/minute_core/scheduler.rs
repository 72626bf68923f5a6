//! Right-closed flush scheduling for pending minute records
//!
//! Each minute key moves `Pending → Flushed` exactly once. A flushed key is
//! removed from the map and the watermark moves past it, so a late snapshot
//! for that minute can never produce a second record.

use super::record::MinuteRecord;
use crate::config::FlushBoundary;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Monotonic flush counter. Starts at 1 and never hands out a number twice.
#[derive(Debug, Default)]
pub struct FlushSequence {
    last: u64,
}

impl FlushSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    pub fn last_assigned(&self) -> u64 {
        self.last
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Stored (or replaced) in the pending map.
    Pending,
    /// The minute was already flushed; the record was discarded.
    Late,
}

pub struct FlushScheduler {
    pending: BTreeMap<DateTime<Utc>, MinuteRecord>,
    boundary: FlushBoundary,
    watermark: Option<DateTime<Utc>>,
    late_dropped: u64,
}

impl FlushScheduler {
    pub fn new(boundary: FlushBoundary) -> Self {
        Self {
            pending: BTreeMap::new(),
            boundary,
            watermark: None,
            late_dropped: 0,
        }
    }

    /// Scheduler for a new configuration that still refuses every minute
    /// flushed under the previous one.
    pub fn resume(boundary: FlushBoundary, watermark: Option<DateTime<Utc>>) -> Self {
        Self {
            watermark,
            ..Self::new(boundary)
        }
    }

    /// Whether an update for `minute` may still be stored. Late minutes are
    /// counted and logged.
    pub fn admit(&mut self, minute: DateTime<Utc>) -> Admission {
        if self.watermark.is_some_and(|w| minute <= w) {
            self.late_dropped += 1;
            log::warn!("Dropping late update for already flushed minute {}", minute);
            return Admission::Late;
        }
        Admission::Pending
    }

    /// Store `record` under its minute, replacing whatever was pending there.
    pub fn upsert(&mut self, record: MinuteRecord) -> Admission {
        if self.admit(record.minute_utc) == Admission::Late {
            return Admission::Late;
        }

        self.pending.insert(record.minute_utc, record);
        Admission::Pending
    }

    /// Remove and return every minute closed by `current`, oldest first,
    /// each stamped with the next sequence number.
    pub fn collect_ready(
        &mut self,
        current: DateTime<Utc>,
        sequence: &mut FlushSequence,
    ) -> Vec<MinuteRecord> {
        let ready: Vec<DateTime<Utc>> = self
            .pending
            .keys()
            .copied()
            .take_while(|minute| match self.boundary {
                FlushBoundary::RightClosed => *minute < current,
                FlushBoundary::Inclusive => *minute <= current,
            })
            .collect();

        let mut flushed = Vec::with_capacity(ready.len());
        for minute in ready {
            if let Some(mut record) = self.pending.remove(&minute) {
                record.flush_seq = sequence.next();
                self.watermark = Some(minute);
                flushed.push(record);
            }
        }

        flushed
    }

    pub fn boundary(&self) -> FlushBoundary {
        self.boundary
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_minutes(&self) -> Vec<DateTime<Utc>> {
        self.pending.keys().copied().collect()
    }

    pub fn pending(&self, minute: &DateTime<Utc>) -> Option<&MinuteRecord> {
        self.pending.get(minute)
    }

    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark
    }

    pub fn late_dropped(&self) -> u64 {
        self.late_dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MinuteConfig;
    use crate::minute_core::aggregator::MinuteAggregator;
    use crate::minute_core::snapshot::MarketSnapshot;
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    fn record_at(minute: i64, close: f64) -> MinuteRecord {
        let mut aggregator = MinuteAggregator::new(&MinuteConfig::default());
        let ts = base() + Duration::minutes(minute) + Duration::seconds(5);
        aggregator.build(&MarketSnapshot::new(ts, close, close, close, close, 1.0))
    }

    #[test]
    fn test_current_minute_never_flushed() {
        let mut scheduler = FlushScheduler::new(FlushBoundary::RightClosed);
        let mut seq = FlushSequence::new();

        scheduler.upsert(record_at(0, 1.0));
        assert!(scheduler.collect_ready(base(), &mut seq).is_empty());
        assert_eq!(scheduler.pending_len(), 1);
    }

    #[test]
    fn test_flushes_in_ascending_order() {
        let mut scheduler = FlushScheduler::new(FlushBoundary::RightClosed);
        let mut seq = FlushSequence::new();

        for m in [3, 1, 2, 5] {
            scheduler.upsert(record_at(m, m as f64));
        }

        let flushed = scheduler.collect_ready(base() + Duration::minutes(5), &mut seq);
        assert!(flushed.iter().all(|r| r.is_flushed()));
        assert!(!scheduler.pending(&(base() + Duration::minutes(5))).unwrap().is_flushed());
        let minutes: Vec<_> = flushed.iter().map(|r| r.minute_utc).collect();
        assert_eq!(
            minutes,
            vec![
                base() + Duration::minutes(1),
                base() + Duration::minutes(2),
                base() + Duration::minutes(3)
            ]
        );
        let seqs: Vec<_> = flushed.iter().map(|r| r.flush_seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(scheduler.pending_minutes(), vec![base() + Duration::minutes(5)]);
        assert_eq!(scheduler.watermark(), Some(base() + Duration::minutes(3)));
    }

    #[test]
    fn test_inclusive_boundary_flushes_current() {
        let mut scheduler = FlushScheduler::new(FlushBoundary::Inclusive);
        let mut seq = FlushSequence::new();

        scheduler.upsert(record_at(0, 1.0));
        let flushed = scheduler.collect_ready(base(), &mut seq);
        assert_eq!(flushed.len(), 1);
        assert_eq!(scheduler.pending_len(), 0);
    }

    #[test]
    fn test_late_update_dropped_after_flush() {
        let mut scheduler = FlushScheduler::new(FlushBoundary::RightClosed);
        let mut seq = FlushSequence::new();

        scheduler.upsert(record_at(0, 1.0));
        scheduler.upsert(record_at(1, 1.0));
        assert_eq!(scheduler.collect_ready(base() + Duration::minutes(1), &mut seq).len(), 1);

        assert_eq!(scheduler.upsert(record_at(0, 9.0)), Admission::Late);
        assert_eq!(scheduler.late_dropped(), 1);
        assert!(scheduler.collect_ready(base() + Duration::minutes(1), &mut seq).is_empty());
    }

    #[test]
    fn test_resumed_scheduler_keeps_watermark() {
        let mut seq = FlushSequence::new();
        let mut first = FlushScheduler::new(FlushBoundary::RightClosed);
        first.upsert(record_at(0, 1.0));
        first.collect_ready(base() + Duration::minutes(1), &mut seq);

        let mut second = FlushScheduler::resume(FlushBoundary::RightClosed, first.watermark());
        assert_eq!(second.admit(base()), Admission::Late);
        assert_eq!(second.upsert(record_at(0, 1.0)), Admission::Late);
        assert_eq!(second.upsert(record_at(1, 1.0)), Admission::Pending);
        assert_eq!(second.late_dropped(), 2);
    }

    #[test]
    fn test_sequence_survives_across_schedulers() {
        let mut seq = FlushSequence::new();

        let mut first = FlushScheduler::new(FlushBoundary::RightClosed);
        first.upsert(record_at(0, 1.0));
        first.collect_ready(base() + Duration::minutes(1), &mut seq);

        let mut second = FlushScheduler::new(FlushBoundary::RightClosed);
        second.upsert(record_at(0, 1.0));
        let flushed = second.collect_ready(base() + Duration::minutes(1), &mut seq);
        assert_eq!(flushed[0].flush_seq, 2);
        assert_eq!(seq.last_assigned(), 2);
    }
}
