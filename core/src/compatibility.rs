//! Which agents may take an order, judged from its products alone.
//!
//!   - An agent hidden by ANY ordered product is out.
//!   - If the order holds specialized products, the agent must be on the
//!     whitelist of EVERY one of them.
//!   - Otherwise every non-hidden agent qualifies.
//!
//! An empty result is not an error: the order simply stays unassigned.

use crate::records::{AgentRecord, ProductRecord};

/// Filter `roster` down to the agents eligible for an order holding
/// `products`. Roster order is preserved.
pub fn eligible_agents<'a>(
    products: &[ProductRecord],
    roster: &'a [AgentRecord],
) -> Vec<&'a AgentRecord> {
    let specialized: Vec<&ProductRecord> =
        products.iter().filter(|p| p.is_specialized()).collect();

    roster
        .iter()
        .filter(|agent| agent.active)
        .filter(|agent| !products.iter().any(|p| p.is_hidden_for(agent.agent_id)))
        .filter(|agent| {
            specialized
                .iter()
                .all(|p| p.assigned_agent_ids.contains(&agent.agent_id))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentId;

    fn agent(agent_id: AgentId) -> AgentRecord {
        AgentRecord {
            agent_id,
            name: format!("agent-{agent_id}"),
            active: true,
            sees_orders: true,
        }
    }

    fn product(assigned: Vec<AgentId>, hidden: Vec<AgentId>) -> ProductRecord {
        ProductRecord {
            product_id: 1,
            external_id: "p".into(),
            title: "P".into(),
            assigned_agent_ids: assigned,
            hidden_for_agent_ids: hidden,
        }
    }

    fn ids(agents: Vec<&AgentRecord>) -> Vec<AgentId> {
        agents.into_iter().map(|a| a.agent_id).collect()
    }

    #[test]
    fn unrestricted_products_admit_everyone() {
        let roster = vec![agent(1), agent(2), agent(3)];
        let products = vec![product(vec![], vec![])];
        assert_eq!(ids(eligible_agents(&products, &roster)), vec![1, 2, 3]);
    }

    #[test]
    fn no_products_admit_everyone() {
        let roster = vec![agent(1), agent(2)];
        assert_eq!(ids(eligible_agents(&[], &roster)), vec![1, 2]);
    }

    #[test]
    fn hidden_agent_is_excluded() {
        let roster = vec![agent(1), agent(2), agent(3)];
        let products = vec![product(vec![], vec![2]), product(vec![], vec![])];
        assert_eq!(ids(eligible_agents(&products, &roster)), vec![1, 3]);
    }

    #[test]
    fn specialization_must_hold_for_every_specialized_product() {
        let roster = vec![agent(1), agent(2), agent(3)];
        let products = vec![
            product(vec![1, 3], vec![]),
            product(vec![3], vec![]),
            product(vec![], vec![]),
        ];
        assert_eq!(ids(eligible_agents(&products, &roster)), vec![3]);
    }

    #[test]
    fn hidden_beats_whitelist() {
        let roster = vec![agent(1), agent(2)];
        let products = vec![product(vec![1, 2], vec![]), product(vec![], vec![1])];
        assert_eq!(ids(eligible_agents(&products, &roster)), vec![2]);
    }

    #[test]
    fn disjoint_whitelists_leave_nobody() {
        let roster = vec![agent(1), agent(2)];
        let products = vec![product(vec![1], vec![]), product(vec![2], vec![])];
        assert!(eligible_agents(&products, &roster).is_empty());
    }

    #[test]
    fn inactive_agents_never_qualify() {
        let mut idle = agent(2);
        idle.active = false;
        let roster = vec![agent(1), idle];
        assert_eq!(ids(eligible_agents(&[], &roster)), vec![1]);
    }
}
