//! The storage collaborator.
//!
//! RULE: Components talk to storage only through this trait.
//! Set-once and counter fields are updated by the datastore with
//! conditional statements; callers never read-modify-write them.

use crate::{
    error::DeskResult,
    event::EventLogEntry,
    records::{
        AgentFilter, AgentRecord, NewOrder, OrderRecord, ProductRecord, StatusFieldsUpdate,
        StatusFieldsWrite, StatusRecord,
    },
    types::{AgentId, OrderId, ProductId, StatusId, Timestamp},
};
use std::collections::HashMap;

pub trait Datastore {
    // ── Orders ─────────────────────────────────────────────────

    fn find_order_by_external_number(&self, number: &str) -> DeskResult<Option<OrderRecord>>;

    fn find_order(&self, order_id: OrderId) -> DeskResult<Option<OrderRecord>>;

    /// Insert a new order with its product set.
    /// A duplicate external number yields `DeskError::Conflict`.
    fn create_order(&self, order: &NewOrder) -> DeskResult<OrderRecord>;

    /// Orders still waiting for an agent, oldest first.
    fn find_unassigned_orders(&self) -> DeskResult<Vec<OrderRecord>>;

    // ── Catalog ────────────────────────────────────────────────

    fn find_products_by_external_ids(&self, ids: &[String]) -> DeskResult<Vec<ProductRecord>>;

    fn find_products_by_ids(&self, ids: &[ProductId]) -> DeskResult<Vec<ProductRecord>>;

    /// Active agents, ordered by agent id.
    fn find_active_agents(&self, filter: &AgentFilter) -> DeskResult<Vec<AgentRecord>>;

    fn find_agent(&self, agent_id: AgentId) -> DeskResult<Option<AgentRecord>>;

    fn find_status(&self, status_id: StatusId) -> DeskResult<Option<StatusRecord>>;

    // ── Assignment ─────────────────────────────────────────────

    /// Assigned orders whose status is unset or non-terminal, per agent.
    fn count_outstanding_orders_per_agent(&self) -> DeskResult<HashMap<AgentId, u32>>;

    /// Set the agent only if the order is still unassigned.
    /// Yields `DeskError::Conflict` when another writer already assigned it.
    fn update_order_agent(&self, order_id: OrderId, agent_id: AgentId) -> DeskResult<()>;

    /// Unconditional agent change. Returns the previous agent.
    fn reassign_order_agent(
        &self,
        order_id: OrderId,
        agent_id: AgentId,
    ) -> DeskResult<Option<AgentId>>;

    // ── Status & recall ────────────────────────────────────────

    /// Apply one status change atomically. Reports whether this call
    /// is the one that wrote the processing stamp.
    fn update_order_status_fields(
        &self,
        order_id: OrderId,
        update: &StatusFieldsUpdate,
    ) -> DeskResult<StatusFieldsWrite>;

    /// Overwrite (or clear) the recall without touching the attempt counter.
    fn set_order_recall(&self, order_id: OrderId, recall_at: Option<Timestamp>)
        -> DeskResult<OrderRecord>;

    /// Orders with `recall_at <= now` (and `> watermark` when given),
    /// oldest-due first.
    fn query_due_recalls(
        &self,
        now: Timestamp,
        watermark: Option<Timestamp>,
    ) -> DeskResult<Vec<OrderRecord>>;

    // ── Batches & event log ────────────────────────────────────

    /// Persist a new batch; the returned sequence seeds its RNG streams.
    fn open_batch(&self, started_at: Timestamp) -> DeskResult<u64>;

    fn append_event(&self, entry: &EventLogEntry) -> DeskResult<()>;
}
