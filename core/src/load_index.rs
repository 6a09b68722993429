//! Per-agent outstanding-order counts for one batch.
//!
//! Built once at batch start from the persisted aggregate and then
//! only ever incremented. Never cached across batches.

use crate::types::AgentId;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentLoadIndex {
    counts: HashMap<AgentId, u32>,
}

impl AgentLoadIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from `count_outstanding_orders_per_agent`.
    pub fn from_counts(counts: HashMap<AgentId, u32>) -> Self {
        Self { counts }
    }

    /// Agents absent from the aggregate carry no load.
    pub fn load(&self, agent_id: AgentId) -> u32 {
        self.counts.get(&agent_id).copied().unwrap_or(0)
    }

    /// Record one more order for `agent_id`; returns the new load.
    pub fn increment(&mut self, agent_id: AgentId) -> u32 {
        let count = self.counts.entry(agent_id).or_insert(0);
        *count += 1;
        *count
    }

    pub fn total(&self) -> u64 {
        self.counts.values().map(|&c| u64::from(c)).sum()
    }
}
