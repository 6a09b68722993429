//! SQLite persistence layer.
//!
//! RULE: Only store/ talks to the database.
//! Components call the Datastore trait and never execute SQL directly.

use crate::{
    config::DeskConfig,
    datastore::Datastore,
    error::DeskResult,
    event::EventLogEntry,
    records::{
        AgentFilter, AgentRecord, NewOrder, OrderRecord, ProductRecord, StatusFieldsUpdate,
        StatusFieldsWrite, StatusRecord,
    },
    types::{from_millis, to_millis, AgentId, OrderId, ProductId, StatusId, Timestamp},
};
use rusqlite::{params, Connection};
use std::collections::HashMap;

mod catalog;
mod order;

pub struct DeskStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl DeskStore {
    pub fn open(path: &str) -> DeskResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        // Concurrent handlers wait for the writer instead of failing fast.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> DeskResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new in-memory database (isolated).
    /// For file-based databases, this opens the same file.
    pub fn reopen(&self) -> DeskResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order. Safe to run repeatedly.
    pub fn migrate(&self) -> DeskResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_orders.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_event_log.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/004_batch.sql"))?;
        Ok(())
    }

    /// Upsert the whole reference catalog in one transaction.
    pub fn seed_catalog(&self, config: &DeskConfig) -> DeskResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for agent in &config.agents {
            self.upsert_agent(agent)?;
        }
        for product in &config.products {
            self.upsert_product(product)?;
        }
        for status in &config.statuses {
            self.upsert_status(status)?;
        }
        tx.commit()?;
        log::info!(
            "Catalog seeded: {} agents, {} products, {} statuses",
            config.agents.len(),
            config.products.len(),
            config.statuses.len(),
        );
        Ok(())
    }

    // ── Batches ────────────────────────────────────────────────

    /// Register a new batch and return its zero-based sequence.
    /// Sequences are never reused, even across reopened connections.
    pub fn open_batch(&self, started_at: Timestamp) -> DeskResult<u64> {
        self.conn.execute(
            "INSERT INTO batch (started_at) VALUES (?1)",
            params![to_millis(started_at)],
        )?;
        Ok((self.conn.last_insert_rowid() - 1) as u64)
    }

    pub fn batch_count(&self) -> DeskResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM batch", [], |row| row.get(0))
            .map_err(Into::into)
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> DeskResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (batch_id, order_id, occurred_at, event_type, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.batch_id.as_deref(),
                entry.order_id,
                to_millis(entry.occurred_at),
                entry.event_type,
                entry.payload,
            ],
        )?;
        Ok(())
    }

    pub fn events_for_order(&self, order_id: OrderId) -> DeskResult<Vec<EventLogEntry>> {
        self.query_events("WHERE order_id = ?1", params![order_id])
    }

    pub fn events_for_batch(&self, batch_id: &str) -> DeskResult<Vec<EventLogEntry>> {
        self.query_events("WHERE batch_id = ?1", params![batch_id])
    }

    /// Every event in insertion order. Used by the determinism test.
    pub fn all_events(&self) -> DeskResult<Vec<EventLogEntry>> {
        self.query_events("", params![])
    }

    pub fn event_count(&self, event_type: &str) -> DeskResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM event_log WHERE event_type = ?1",
                params![event_type],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    fn query_events(
        &self,
        filter: &str,
        args: impl rusqlite::Params,
    ) -> DeskResult<Vec<EventLogEntry>> {
        let sql = format!(
            "SELECT id, batch_id, order_id, occurred_at, event_type, payload
             FROM event_log {filter} ORDER BY id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let entries = stmt
            .query_map(args, |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    batch_id: row.get(1)?,
                    order_id: row.get(2)?,
                    occurred_at: from_millis(row.get(3)?),
                    event_type: row.get(4)?,
                    payload: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

impl Datastore for DeskStore {
    fn find_order_by_external_number(&self, number: &str) -> DeskResult<Option<OrderRecord>> {
        DeskStore::find_order_by_external_number(self, number)
    }

    fn find_order(&self, order_id: OrderId) -> DeskResult<Option<OrderRecord>> {
        DeskStore::find_order(self, order_id)
    }

    fn create_order(&self, order: &NewOrder) -> DeskResult<OrderRecord> {
        DeskStore::create_order(self, order)
    }

    fn find_unassigned_orders(&self) -> DeskResult<Vec<OrderRecord>> {
        DeskStore::find_unassigned_orders(self)
    }

    fn find_products_by_external_ids(&self, ids: &[String]) -> DeskResult<Vec<ProductRecord>> {
        DeskStore::find_products_by_external_ids(self, ids)
    }

    fn find_products_by_ids(&self, ids: &[ProductId]) -> DeskResult<Vec<ProductRecord>> {
        DeskStore::find_products_by_ids(self, ids)
    }

    fn find_active_agents(&self, filter: &AgentFilter) -> DeskResult<Vec<AgentRecord>> {
        DeskStore::find_active_agents(self, filter)
    }

    fn find_agent(&self, agent_id: AgentId) -> DeskResult<Option<AgentRecord>> {
        DeskStore::find_agent(self, agent_id)
    }

    fn find_status(&self, status_id: StatusId) -> DeskResult<Option<StatusRecord>> {
        DeskStore::find_status(self, status_id)
    }

    fn count_outstanding_orders_per_agent(&self) -> DeskResult<HashMap<AgentId, u32>> {
        DeskStore::count_outstanding_orders_per_agent(self)
    }

    fn update_order_agent(&self, order_id: OrderId, agent_id: AgentId) -> DeskResult<()> {
        DeskStore::update_order_agent(self, order_id, agent_id)
    }

    fn reassign_order_agent(
        &self,
        order_id: OrderId,
        agent_id: AgentId,
    ) -> DeskResult<Option<AgentId>> {
        DeskStore::reassign_order_agent(self, order_id, agent_id)
    }

    fn update_order_status_fields(
        &self,
        order_id: OrderId,
        update: &StatusFieldsUpdate,
    ) -> DeskResult<StatusFieldsWrite> {
        DeskStore::update_order_status_fields(self, order_id, update)
    }

    fn set_order_recall(
        &self,
        order_id: OrderId,
        recall_at: Option<Timestamp>,
    ) -> DeskResult<OrderRecord> {
        DeskStore::set_order_recall(self, order_id, recall_at)
    }

    fn query_due_recalls(
        &self,
        now: Timestamp,
        watermark: Option<Timestamp>,
    ) -> DeskResult<Vec<OrderRecord>> {
        DeskStore::query_due_recalls(self, now, watermark)
    }

    fn open_batch(&self, started_at: Timestamp) -> DeskResult<u64> {
        DeskStore::open_batch(self, started_at)
    }

    fn append_event(&self, entry: &EventLogEntry) -> DeskResult<()> {
        DeskStore::append_event(self, entry)
    }
}
