//! The audit trail of every state change the desk makes.
//!
//! RULE: Components never write the event log themselves.
//! They push DeskEvents into the caller's buffer; the engine
//! persists them in order.

use crate::types::{AgentId, OrderId, StatusId, Timestamp};
use serde::{Deserialize, Serialize};

/// Variants are append-only. Never remove or reorder them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeskEvent {
    // ── Ingestion ──────────────────────────────────
    OrderIngested {
        order_id: OrderId,
        external_number: String,
        product_count: usize,
    },
    DuplicateSkipped {
        external_number: String,
    },
    OrderRejected {
        external_number: String,
        reason: String,
    },

    // ── Assignment ─────────────────────────────────
    OrderAssigned {
        order_id: OrderId,
        agent_id: AgentId,
        load_before: u32,
        tied_candidates: usize,
    },
    OrderLeftUnassigned {
        order_id: OrderId,
        reason: String,
    },
    AssignmentConflict {
        order_id: OrderId,
    },
    OrderReassigned {
        order_id: OrderId,
        from_agent_id: Option<AgentId>,
        to_agent_id: AgentId,
    },

    // ── Status & recall ────────────────────────────
    StatusChanged {
        order_id: OrderId,
        from_status_id: Option<StatusId>,
        to_status_id: Option<StatusId>,
    },
    FirstProcessed {
        order_id: OrderId,
        at: Timestamp,
        processing_time_min: i64,
    },
    RecallScheduled {
        order_id: OrderId,
        recall_at: Timestamp,
        recall_attempts: u32,
    },
    RecallSetManually {
        order_id: OrderId,
        recall_at: Option<Timestamp>,
    },
}

impl DeskEvent {
    /// Stable name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::OrderIngested { .. } => "order_ingested",
            Self::DuplicateSkipped { .. } => "duplicate_skipped",
            Self::OrderRejected { .. } => "order_rejected",
            Self::OrderAssigned { .. } => "order_assigned",
            Self::OrderLeftUnassigned { .. } => "order_left_unassigned",
            Self::AssignmentConflict { .. } => "assignment_conflict",
            Self::OrderReassigned { .. } => "order_reassigned",
            Self::StatusChanged { .. } => "status_changed",
            Self::FirstProcessed { .. } => "first_processed",
            Self::RecallScheduled { .. } => "recall_scheduled",
            Self::RecallSetManually { .. } => "recall_set_manually",
        }
    }

    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            Self::OrderIngested { order_id, .. }
            | Self::OrderAssigned { order_id, .. }
            | Self::OrderLeftUnassigned { order_id, .. }
            | Self::AssignmentConflict { order_id }
            | Self::OrderReassigned { order_id, .. }
            | Self::StatusChanged { order_id, .. }
            | Self::FirstProcessed { order_id, .. }
            | Self::RecallScheduled { order_id, .. }
            | Self::RecallSetManually { order_id, .. } => Some(*order_id),
            Self::DuplicateSkipped { .. } | Self::OrderRejected { .. } => None,
        }
    }
}

/// A persisted row from the event_log table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub batch_id: Option<String>,
    pub order_id: Option<OrderId>,
    pub occurred_at: Timestamp,
    pub event_type: String,
    pub payload: String,
}

impl EventLogEntry {
    pub fn from_event(
        event: &DeskEvent,
        batch_id: Option<&str>,
        occurred_at: Timestamp,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: None,
            batch_id: batch_id.map(String::from),
            order_id: event.order_id(),
            occurred_at,
            event_type: event.type_name().to_string(),
            payload: serde_json::to_string(event)?,
        })
    }
}
