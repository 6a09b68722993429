//! Least-loaded selection with a random tie-break.
//!
//! The chosen agent's count is bumped in the index before returning,
//! so the next order in the same batch sees the new load.

use crate::{load_index::AgentLoadIndex, records::AgentRecord, rng::StreamRng, types::AgentId};

/// Outcome of one selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub agent_id: AgentId,
    /// Load the agent carried before this order.
    pub load_before: u32,
    /// How many agents shared the minimum load.
    pub tied_candidates: usize,
}

pub struct AssignmentSelector<'a> {
    index: &'a mut AgentLoadIndex,
    rng: &'a mut StreamRng,
}

impl<'a> AssignmentSelector<'a> {
    pub fn new(index: &'a mut AgentLoadIndex, rng: &'a mut StreamRng) -> Self {
        Self { index, rng }
    }

    /// Pick among `eligible`; `None` when nobody is eligible.
    pub fn select(&mut self, eligible: &[&AgentRecord]) -> Option<Selection> {
        let min_load = eligible
            .iter()
            .map(|a| self.index.load(a.agent_id))
            .min()?;
        let tied: Vec<AgentId> = eligible
            .iter()
            .map(|a| a.agent_id)
            .filter(|&id| self.index.load(id) == min_load)
            .collect();

        let agent_id = if tied.len() == 1 {
            tied[0]
        } else {
            let pick = tied[self.rng.pick_index(tied.len())];
            log::trace!(
                "[{}] tie at load {min_load} among {tied:?}, drew {pick}",
                self.rng.name
            );
            pick
        };
        self.index.increment(agent_id);

        Some(Selection {
            agent_id,
            load_before: min_load,
            tied_candidates: tied.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn roster(ids: &[AgentId]) -> Vec<AgentRecord> {
        ids.iter()
            .map(|&agent_id| AgentRecord {
                agent_id,
                name: format!("agent-{agent_id}"),
                active: true,
                sees_orders: true,
            })
            .collect()
    }

    #[test]
    fn strict_minimum_wins() {
        let agents = roster(&[1, 2, 3]);
        let eligible: Vec<&AgentRecord> = agents.iter().collect();
        let mut index = AgentLoadIndex::from_counts(HashMap::from([(1, 2), (2, 2), (3, 0)]));
        let mut rng = StreamRng::from_seed(1);

        let pick = AssignmentSelector::new(&mut index, &mut rng)
            .select(&eligible)
            .unwrap();
        assert_eq!(pick.agent_id, 3);
        assert_eq!(pick.load_before, 0);
        assert_eq!(pick.tied_candidates, 1);
        assert_eq!(index.load(3), 1);
    }

    #[test]
    fn empty_eligible_list_selects_nobody() {
        let mut index = AgentLoadIndex::new();
        let mut rng = StreamRng::from_seed(1);
        assert!(AssignmentSelector::new(&mut index, &mut rng)
            .select(&[])
            .is_none());
        assert_eq!(index.total(), 0);
    }

    #[test]
    fn repeated_selection_balances_within_one() {
        let agents = roster(&[1, 2, 3, 4]);
        let eligible: Vec<&AgentRecord> = agents.iter().collect();
        let mut index = AgentLoadIndex::new();
        let mut rng = StreamRng::from_seed(99);
        let mut selector = AssignmentSelector::new(&mut index, &mut rng);

        let mut assigned: HashMap<AgentId, u32> = HashMap::new();
        for _ in 0..23 {
            let pick = selector.select(&eligible).unwrap();
            *assigned.entry(pick.agent_id).or_default() += 1;
        }
        let max = assigned.values().max().copied().unwrap_or(0);
        let min = (1..=4)
            .map(|id| assigned.get(&id).copied().unwrap_or(0))
            .min()
            .unwrap();
        assert!(max - min <= 1, "unbalanced: {assigned:?}");
    }

    #[test]
    fn tie_break_is_reproducible_for_a_seed() {
        let agents = roster(&[1, 2, 3]);
        let eligible: Vec<&AgentRecord> = agents.iter().collect();

        let run = |seed: u64| -> Vec<AgentId> {
            let mut index = AgentLoadIndex::new();
            let mut rng = StreamRng::from_seed(seed);
            let mut selector = AssignmentSelector::new(&mut index, &mut rng);
            (0..9)
                .map(|_| selector.select(&eligible).unwrap().agent_id)
                .collect()
        };
        assert_eq!(run(5), run(5));
    }

    #[test]
    fn tie_break_reaches_every_tied_agent() {
        let agents = roster(&[1, 2, 3]);
        let eligible: Vec<&AgentRecord> = agents.iter().collect();
        let mut firsts = std::collections::HashSet::new();
        for seed in 0..64 {
            let mut index = AgentLoadIndex::new();
            let mut rng = StreamRng::from_seed(seed);
            let pick = AssignmentSelector::new(&mut index, &mut rng)
                .select(&eligible)
                .unwrap();
            firsts.insert(pick.agent_id);
        }
        assert_eq!(firsts.len(), 3, "tie-break never chose some agents: {firsts:?}");
    }
}
