//! The desk engine: the service boundary of the order desk.
//!
//! Each public method is one short, synchronous request:
//!   - ingest_orders          insert a batch, then assign it
//!   - assign_pending_orders  retry assignment for unassigned orders
//!   - change_order_status    status transition + recall scheduling
//!   - set_manual_recall      override or clear a recall
//!   - reassign_order         privileged agent change
//!   - list_due_recalls       read-only recall query
//!
//! RULES:
//!   - All randomness flows through the RngBank, one stream per batch.
//!   - All time flows through the Clock, truncated to storage precision.
//!   - Every state change is recorded in the event log.

use crate::{
    clock::{Clock, SystemClock},
    config::DeskConfig,
    datastore::Datastore,
    error::{DeskError, DeskResult},
    event::{DeskEvent, EventLogEntry},
    ingestion::{Batch, IngestReport, OrderIngestionPipeline, RawOrder},
    recall_schedule::RecallScheduleReader,
    records::{AgentFilter, OrderRecord},
    rng::{RngBank, StreamSlot},
    status_transition::{StatusChange, StatusTransitionEngine},
    store::DeskStore,
    types::{from_millis, to_millis, AgentId, OrderId, StatusId, Timestamp},
};

pub struct DeskEngine<S: Datastore = DeskStore> {
    pub store: S,
    pub rng_bank: RngBank,
    clock: Box<dyn Clock>,
    agent_filter: AgentFilter,
}

impl<S: Datastore> DeskEngine<S> {
    pub fn new(store: S, master_seed: u64, clock: Box<dyn Clock>) -> Self {
        log::debug!("desk engine seeded with {master_seed}");
        Self {
            store,
            rng_bank: RngBank::new(master_seed),
            clock,
            agent_filter: AgentFilter::default(),
        }
    }

    /// Build an engine with seed and agent filter taken from the config.
    pub fn from_config(store: S, config: &DeskConfig, clock: Box<dyn Clock>) -> Self {
        Self::new(store, config.settings.master_seed, clock).with_agent_filter(AgentFilter {
            require_order_visibility: config.settings.require_order_visibility,
        })
    }

    pub fn with_agent_filter(mut self, filter: AgentFilter) -> Self {
        self.agent_filter = filter;
        self
    }

    /// Now, at the millisecond precision the store keeps.
    pub fn now(&self) -> Timestamp {
        from_millis(to_millis(self.clock.now()))
    }

    // ── Assignment ─────────────────────────────────────────────

    pub fn ingest_orders(&mut self, raw_orders: &[RawOrder]) -> DeskResult<IngestReport> {
        let mut batch = self.start_batch()?;
        let mut events = Vec::new();
        let result = OrderIngestionPipeline::new(&self.store, self.agent_filter).ingest(
            raw_orders,
            &mut batch,
            &mut events,
        );
        // Orders already committed keep their audit trail even if assignment failed.
        self.record(&events, Some(&batch.batch_id), batch.started_at)?;
        result
    }

    pub fn assign_pending_orders(&mut self) -> DeskResult<IngestReport> {
        let mut batch = self.start_batch()?;
        let mut events = Vec::new();
        let result = OrderIngestionPipeline::new(&self.store, self.agent_filter)
            .assign_pending(&mut batch, &mut events);
        self.record(&events, Some(&batch.batch_id), batch.started_at)?;
        result
    }

    /// Privileged override: moves the order to `agent_id` regardless of
    /// product rules. The target agent must exist and be active.
    pub fn reassign_order(&mut self, order_id: OrderId, agent_id: AgentId) -> DeskResult<()> {
        let agent = self
            .store
            .find_agent(agent_id)?
            .filter(|a| a.active)
            .ok_or_else(|| DeskError::not_found("active agent", agent_id))?;
        let previous = self.store.reassign_order_agent(order_id, agent.agent_id)?;
        log::info!("order #{order_id} reassigned {previous:?} -> agent {agent_id}");
        self.record(
            &[DeskEvent::OrderReassigned {
                order_id,
                from_agent_id: previous,
                to_agent_id: agent_id,
            }],
            None,
            self.now(),
        )
    }

    // ── Status & recall ────────────────────────────────────────

    pub fn change_order_status(
        &mut self,
        order_id: OrderId,
        status_id: Option<StatusId>,
    ) -> DeskResult<StatusChange> {
        let now = self.now();
        let mut events = Vec::new();
        let change = StatusTransitionEngine::new(&self.store).change_status(
            order_id,
            status_id,
            now,
            &mut events,
        )?;
        self.record(&events, None, now)?;
        Ok(change)
    }

    pub fn set_manual_recall(
        &mut self,
        order_id: OrderId,
        recall_at: Option<Timestamp>,
    ) -> DeskResult<StatusChange> {
        let now = self.now();
        let recall_at = recall_at.map(|at| from_millis(to_millis(at)));
        let mut events = Vec::new();
        let change = StatusTransitionEngine::new(&self.store).set_manual_recall(
            order_id,
            recall_at,
            &mut events,
        )?;
        self.record(&events, None, now)?;
        Ok(change)
    }

    pub fn list_due_recalls(&self, watermark: Option<Timestamp>) -> DeskResult<Vec<OrderRecord>> {
        RecallScheduleReader::new(&self.store).due(self.now(), watermark)
    }

    // ── Internals ──────────────────────────────────────────────

    /// The sequence comes from the store, so a reopened database
    /// continues where the previous process stopped.
    fn start_batch(&self) -> DeskResult<Batch> {
        let started_at = self.now();
        let sequence = self.store.open_batch(started_at)?;
        let mut id_rng = self.rng_bank.for_stream(StreamSlot::BatchId, sequence);
        let batch_id = uuid::Builder::from_random_bytes(id_rng.next_bytes16())
            .into_uuid()
            .to_string();
        log::debug!("batch {batch_id} opened as sequence {sequence}");
        Ok(Batch {
            batch_id,
            started_at,
            rng: self.rng_bank.for_stream(StreamSlot::Assignment, sequence),
        })
    }

    fn record(
        &self,
        events: &[DeskEvent],
        batch_id: Option<&str>,
        occurred_at: Timestamp,
    ) -> DeskResult<()> {
        for event in events {
            let entry = EventLogEntry::from_event(event, batch_id, occurred_at)?;
            self.store.append_event(&entry)?;
        }
        Ok(())
    }
}

impl DeskEngine<DeskStore> {
    /// Fully wired engine over a fresh in-memory store with the test
    /// catalog, driven by `clock`.
    pub fn build_test(seed: u64, clock: Box<dyn Clock>) -> DeskResult<Self> {
        let store = DeskStore::in_memory()?;
        store.migrate()?;
        let mut config = DeskConfig::default_test();
        config.settings.master_seed = seed;
        store.seed_catalog(&config)?;
        Ok(Self::from_config(store, &config, clock))
    }

    /// Open `db`, migrate, and wire against the real clock.
    pub fn open(db: &str, config: &DeskConfig) -> DeskResult<Self> {
        let store = DeskStore::open(db)?;
        store.migrate()?;
        Ok(Self::from_config(store, config, Box::new(SystemClock)))
    }
}
