//! Records exchanged with the datastore.

use crate::types::{AgentId, OrderId, ProductId, StatusId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: OrderId,
    pub external_number: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub product_note: String,
    pub order_date: Timestamp,
    pub price: f64,
    pub agent_id: Option<AgentId>,
    pub status_id: Option<StatusId>,
    pub recall_at: Option<Timestamp>,
    pub first_processed_at: Option<Timestamp>,
    pub processing_time_min: Option<i64>,
    pub recall_attempts: u32,
    pub product_ids: Vec<ProductId>,
    pub created_at: Timestamp,
}

/// Fields for a freshly ingested order. Agent and status start empty.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub external_number: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub product_note: String,
    pub order_date: Timestamp,
    pub price: f64,
    pub items: Vec<OrderItem>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: AgentId,
    pub name: String,
    pub active: bool,
    /// Whether the agent is allowed to see (and so receive) orders.
    pub sees_orders: bool,
}

/// Narrows `find_active_agents`. Inactive agents are always excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentFilter {
    pub require_order_visibility: bool,
}

impl Default for AgentFilter {
    fn default() -> Self {
        Self {
            require_order_visibility: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product_id: ProductId,
    pub external_id: String,
    pub title: String,
    /// Whitelist. Non-empty means the product is specialized.
    pub assigned_agent_ids: Vec<AgentId>,
    /// Blacklist.
    pub hidden_for_agent_ids: Vec<AgentId>,
}

impl ProductRecord {
    pub fn is_specialized(&self) -> bool {
        !self.assigned_agent_ids.is_empty()
    }

    pub fn is_hidden_for(&self, agent_id: AgentId) -> bool {
        self.hidden_for_agent_ids.contains(&agent_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status_id: StatusId,
    pub name: String,
    pub recall_after_h: Option<u32>,
    /// Orders in a terminal status stop counting toward agent load.
    pub terminal: bool,
}

/// The set-once processing stamp. Written only while
/// `first_processed_at` is still NULL in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirstProcessing {
    pub at: Timestamp,
    pub processing_time_min: i64,
}

/// One atomic status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFieldsUpdate {
    pub status_id: Option<StatusId>,
    pub first_processing: Option<FirstProcessing>,
    /// `None` leaves the stored recall untouched.
    pub recall_at: Option<Timestamp>,
    pub increment_recall_attempts: bool,
}

/// What a status update wrote. `first_processing_written` is true only
/// for the call whose guarded write set the processing stamp.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusFieldsWrite {
    pub order: OrderRecord,
    pub first_processing_written: bool,
}
