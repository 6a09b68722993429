//! Status transitions and the recall schedule they drive.
//!
//! On every explicit status change:
//!   1. First move away from "no status" stamps `first_processed_at` and
//!      `processing_time_min`. Once per order, ever.
//!   2. A status with `recall_after_h` schedules `recall_at = now + H`
//!      and bumps `recall_attempts`. A status without one leaves any
//!      existing recall alone.
//!   3. Both land in one transaction of conditional UPDATEs (see DeskStore).

use crate::{
    datastore::Datastore,
    error::{DeskError, DeskResult},
    event::DeskEvent,
    records::{FirstProcessing, OrderRecord, StatusFieldsUpdate},
    types::{OrderId, StatusId, Timestamp},
};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// What a status change left on the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub order_id: OrderId,
    pub status_id: Option<StatusId>,
    pub recall_at: Option<Timestamp>,
    pub recall_attempts: u32,
    pub processing_time_min: Option<i64>,
    pub first_processed_at: Option<Timestamp>,
}

impl From<&OrderRecord> for StatusChange {
    fn from(o: &OrderRecord) -> Self {
        Self {
            order_id: o.order_id,
            status_id: o.status_id,
            recall_at: o.recall_at,
            recall_attempts: o.recall_attempts,
            processing_time_min: o.processing_time_min,
            first_processed_at: o.first_processed_at,
        }
    }
}

pub struct StatusTransitionEngine<'s, S: Datastore + ?Sized> {
    store: &'s S,
}

impl<'s, S: Datastore + ?Sized> StatusTransitionEngine<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    pub fn change_status(
        &self,
        order_id: OrderId,
        status_id: Option<StatusId>,
        now: Timestamp,
        events: &mut Vec<DeskEvent>,
    ) -> DeskResult<StatusChange> {
        let order = self
            .store
            .find_order(order_id)?
            .ok_or_else(|| DeskError::not_found("order", order_id))?;
        let status = match status_id {
            Some(id) => Some(
                self.store
                    .find_status(id)?
                    .ok_or_else(|| DeskError::not_found("status", id))?,
            ),
            None => None,
        };

        // Only a proposal: the store writes it iff the column is still NULL.
        let first_processing = match (&status, order.first_processed_at) {
            (Some(_), None) => Some(FirstProcessing {
                at: now,
                processing_time_min: processing_minutes(order.order_date, now),
            }),
            _ => None,
        };
        let recall_at = status
            .as_ref()
            .and_then(|s| s.recall_after_h)
            .map(|h| now + Duration::hours(i64::from(h)));

        let write = self.store.update_order_status_fields(
            order_id,
            &StatusFieldsUpdate {
                status_id,
                first_processing,
                recall_at,
                increment_recall_attempts: recall_at.is_some(),
            },
        )?;
        let updated = write.order;

        log::info!(
            "order #{order_id} status {:?} -> {:?} (recall_at={:?}, attempts={})",
            order.status_id,
            updated.status_id,
            updated.recall_at,
            updated.recall_attempts,
        );
        events.push(DeskEvent::StatusChanged {
            order_id,
            from_status_id: order.status_id,
            to_status_id: updated.status_id,
        });

        if let Some(fp) = first_processing {
            if write.first_processing_written {
                log::info!(
                    "order #{order_id} first processed after {} min",
                    fp.processing_time_min
                );
                events.push(DeskEvent::FirstProcessed {
                    order_id,
                    at: fp.at,
                    processing_time_min: fp.processing_time_min,
                });
            } else {
                log::debug!("order #{order_id} was first processed by a concurrent change");
            }
        }
        if let Some(at) = recall_at {
            events.push(DeskEvent::RecallScheduled {
                order_id,
                recall_at: at,
                recall_attempts: updated.recall_attempts,
            });
        }

        Ok(StatusChange::from(&updated))
    }

    /// Manual override. The only path that may clear a recall;
    /// never touches the attempt counter.
    pub fn set_manual_recall(
        &self,
        order_id: OrderId,
        recall_at: Option<Timestamp>,
        events: &mut Vec<DeskEvent>,
    ) -> DeskResult<StatusChange> {
        let updated = self.store.set_order_recall(order_id, recall_at)?;
        log::info!("order #{order_id} recall manually set to {recall_at:?}");
        events.push(DeskEvent::RecallSetManually {
            order_id,
            recall_at,
        });
        Ok(StatusChange::from(&updated))
    }
}

/// Whole minutes from order date to `now`, rounded half away from zero.
/// An order date in the future (feed clock skew) counts as zero.
pub fn processing_minutes(order_date: Timestamp, now: Timestamp) -> i64 {
    let millis = (now - order_date).num_milliseconds();
    if millis < 0 {
        log::warn!("order date {order_date} is after first processing at {now}");
        return 0;
    }
    (millis as f64 / 60_000.0).round() as i64
}
