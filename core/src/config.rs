//! Reference catalog and settings, loaded from the data/ directory.
//!
//! data/
//!   settings.json
//!   catalog/agents.json
//!   catalog/products.json
//!   catalog/statuses.json

use crate::types::{AgentId, ProductId, StatusId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_id: AgentId,
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_true")]
    pub sees_orders: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductConfig {
    pub product_id: ProductId,
    pub external_id: String,
    pub title: String,
    #[serde(default)]
    pub assigned_agent_ids: Vec<AgentId>,
    #[serde(default)]
    pub hidden_for_agent_ids: Vec<AgentId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    pub status_id: StatusId,
    pub name: String,
    #[serde(default)]
    pub recall_after_h: Option<u32>,
    #[serde(default)]
    pub terminal: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeskSettings {
    /// Master seed for tie-break and batch-id streams.
    pub master_seed: u64,
    /// Only agents flagged `sees_orders` may receive assignments.
    #[serde(default = "default_true")]
    pub require_order_visibility: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct AgentsFile {
    agents: Vec<AgentConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProductsFile {
    products: Vec<ProductConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct StatusesFile {
    statuses: Vec<StatusConfig>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct DeskConfig {
    pub settings: DeskSettings,
    pub agents: Vec<AgentConfig>,
    pub products: Vec<ProductConfig>,
    pub statuses: Vec<StatusConfig>,
}

impl DeskConfig {
    /// Load from the data/ directory.
    /// In tests, use DeskConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let settings: DeskSettings = read_json(&format!("{data_dir}/settings.json"))?;
        let agents: AgentsFile = read_json(&format!("{data_dir}/catalog/agents.json"))?;
        let products: ProductsFile = read_json(&format!("{data_dir}/catalog/products.json"))?;
        let statuses: StatusesFile = read_json(&format!("{data_dir}/catalog/statuses.json"))?;

        let config = Self {
            settings,
            agents: agents.agents,
            products: products.products,
            statuses: statuses.statuses,
        };
        config.validate()?;
        log::debug!(
            "Loaded catalog from {data_dir}: {} agents, {} products, {} statuses",
            config.agents.len(),
            config.products.len(),
            config.statuses.len(),
        );
        Ok(config)
    }

    /// Product rules may only reference agents that exist in the catalog.
    pub fn validate(&self) -> anyhow::Result<()> {
        for product in &self.products {
            for agent_id in product
                .assigned_agent_ids
                .iter()
                .chain(&product.hidden_for_agent_ids)
            {
                if !self.agents.iter().any(|a| a.agent_id == *agent_id) {
                    anyhow::bail!(
                        "Product '{}' references unknown agent {agent_id}",
                        product.external_id
                    );
                }
            }
        }
        Ok(())
    }

    /// Catalog with hardcoded defaults for use in tests.
    ///
    /// Agents: 1 Alice, 2 Bob, 3 Carol (active, visible),
    ///         4 Dave (inactive), 5 Erin (active, cannot see orders).
    /// Products: widget (specialized to Alice), gadget (hidden from Bob),
    ///           gizmo (unrestricted), pro-kit (specialized to Alice + Carol).
    /// Statuses: Confirmed (recall 24h), No answer (recall 2h),
    ///           Callback requested (no recall), Delivered, Cancelled (terminal).
    pub fn default_test() -> Self {
        let agent = |agent_id: AgentId, name: &str, active: bool, sees_orders: bool| AgentConfig {
            agent_id,
            name: name.into(),
            active,
            sees_orders,
        };
        let product = |product_id: ProductId,
                       external_id: &str,
                       title: &str,
                       assigned: Vec<AgentId>,
                       hidden: Vec<AgentId>| ProductConfig {
            product_id,
            external_id: external_id.into(),
            title: title.into(),
            assigned_agent_ids: assigned,
            hidden_for_agent_ids: hidden,
        };
        let status =
            |status_id: StatusId, name: &str, recall_after_h: Option<u32>, terminal: bool| {
                StatusConfig {
                    status_id,
                    name: name.into(),
                    recall_after_h,
                    terminal,
                }
            };

        Self {
            settings: DeskSettings {
                master_seed: 42,
                require_order_visibility: true,
            },
            agents: vec![
                agent(1, "Alice", true, true),
                agent(2, "Bob", true, true),
                agent(3, "Carol", true, true),
                agent(4, "Dave", false, true),
                agent(5, "Erin", true, false),
            ],
            products: vec![
                product(1, "sku-widget", "Widget", vec![1], vec![]),
                product(2, "sku-gadget", "Gadget", vec![], vec![2]),
                product(3, "sku-gizmo", "Gizmo", vec![], vec![]),
                product(4, "sku-prokit", "Pro Kit", vec![1, 3], vec![]),
            ],
            statuses: vec![
                status(1, "Confirmed", Some(24), false),
                status(2, "No answer", Some(2), false),
                status(3, "Callback requested", None, false),
                status(4, "Delivered", None, true),
                status(5, "Cancelled", None, true),
            ],
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> anyhow::Result<T> {
    let content =
        std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
    serde_json::from_str(&content).map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))
}
