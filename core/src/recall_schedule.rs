//! Read side of the recall schedule. Queries only; nothing here writes.

use crate::{datastore::Datastore, error::DeskResult, records::OrderRecord, types::Timestamp};

pub struct RecallScheduleReader<'s, S: Datastore + ?Sized> {
    store: &'s S,
}

impl<'s, S: Datastore + ?Sized> RecallScheduleReader<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Orders whose recall is due at `now`, oldest-due first.
    /// With a watermark, only recalls that fell due after it.
    pub fn due(
        &self,
        now: Timestamp,
        watermark: Option<Timestamp>,
    ) -> DeskResult<Vec<OrderRecord>> {
        let due = self.store.query_due_recalls(now, watermark)?;
        debug_assert!(due
            .iter()
            .all(|o| o.recall_at.is_some_and(|at| at <= now)));
        log::debug!(
            "{} recalls due at {now} (watermark {watermark:?})",
            due.len()
        );
        Ok(due)
    }
}

/// The watermark to pass on the next poll: the latest recall returned,
/// or the previous watermark when nothing new fell due.
pub fn next_watermark(due: &[OrderRecord], previous: Option<Timestamp>) -> Option<Timestamp> {
    due.iter()
        .filter_map(|o| o.recall_at)
        .max()
        .or(previous)
}
