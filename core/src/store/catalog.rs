use super::DeskStore;
use crate::{
    config::{AgentConfig, ProductConfig, StatusConfig},
    error::DeskResult,
    records::{AgentFilter, AgentRecord, ProductRecord, StatusRecord},
    types::{AgentId, ProductId, StatusId},
};
use rusqlite::{params, params_from_iter, OptionalExtension};
use std::collections::HashMap;

fn agent_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentRecord> {
    Ok(AgentRecord {
        agent_id: row.get(0)?,
        name: row.get(1)?,
        active: row.get::<_, i32>(2)? != 0,
        sees_orders: row.get::<_, i32>(3)? != 0,
    })
}

fn status_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<StatusRecord> {
    Ok(StatusRecord {
        status_id: row.get(0)?,
        name: row.get(1)?,
        recall_after_h: row.get(2)?,
        terminal: row.get::<_, i32>(3)? != 0,
    })
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

impl DeskStore {
    // ── Agents ─────────────────────────────────────────────────────

    pub fn upsert_agent(&self, a: &AgentConfig) -> DeskResult<()> {
        self.conn.execute(
            "INSERT INTO agent (agent_id, name, active, sees_orders) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(agent_id) DO UPDATE SET
                name = excluded.name,
                active = excluded.active,
                sees_orders = excluded.sees_orders",
            params![
                a.agent_id,
                &a.name,
                if a.active { 1i32 } else { 0i32 },
                if a.sees_orders { 1i32 } else { 0i32 },
            ],
        )?;
        Ok(())
    }

    pub fn set_agent_active(&self, agent_id: AgentId, active: bool) -> DeskResult<()> {
        self.conn.execute(
            "UPDATE agent SET active = ?1 WHERE agent_id = ?2",
            params![if active { 1i32 } else { 0i32 }, agent_id],
        )?;
        Ok(())
    }

    pub fn find_agent(&self, agent_id: AgentId) -> DeskResult<Option<AgentRecord>> {
        self.conn
            .query_row(
                "SELECT agent_id, name, active, sees_orders FROM agent WHERE agent_id = ?1",
                params![agent_id],
                agent_row_mapper,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn find_active_agents(&self, filter: &AgentFilter) -> DeskResult<Vec<AgentRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT agent_id, name, active, sees_orders FROM agent
             WHERE active = 1 AND (?1 = 0 OR sees_orders = 1)
             ORDER BY agent_id ASC",
        )?;
        let rows = stmt.query_map(
            params![if filter.require_order_visibility { 1i32 } else { 0i32 }],
            agent_row_mapper,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Products ───────────────────────────────────────────────────

    /// Insert or update a product and replace its agent rules.
    pub fn upsert_product(&self, p: &ProductConfig) -> DeskResult<()> {
        self.conn.execute(
            "INSERT INTO product (product_id, external_id, title) VALUES (?1, ?2, ?3)
             ON CONFLICT(product_id) DO UPDATE SET
                external_id = excluded.external_id,
                title = excluded.title",
            params![p.product_id, &p.external_id, &p.title],
        )?;
        self.conn.execute(
            "DELETE FROM product_agent_assignment WHERE product_id = ?1",
            params![p.product_id],
        )?;
        self.conn.execute(
            "DELETE FROM product_agent_hidden WHERE product_id = ?1",
            params![p.product_id],
        )?;
        for agent_id in &p.assigned_agent_ids {
            self.conn.execute(
                "INSERT OR IGNORE INTO product_agent_assignment (product_id, agent_id)
                 VALUES (?1, ?2)",
                params![p.product_id, agent_id],
            )?;
        }
        for agent_id in &p.hidden_for_agent_ids {
            self.conn.execute(
                "INSERT OR IGNORE INTO product_agent_hidden (product_id, agent_id)
                 VALUES (?1, ?2)",
                params![p.product_id, agent_id],
            )?;
        }
        Ok(())
    }

    pub fn find_products_by_external_ids(
        &self,
        external_ids: &[String],
    ) -> DeskResult<Vec<ProductRecord>> {
        if external_ids.is_empty() {
            return Ok(vec![]);
        }
        let sql = format!(
            "SELECT product_id, external_id, title FROM product
             WHERE external_id IN ({}) ORDER BY product_id ASC",
            placeholders(external_ids.len())
        );
        self.query_products(&sql, params_from_iter(external_ids.iter()))
    }

    pub fn find_products_by_ids(&self, ids: &[ProductId]) -> DeskResult<Vec<ProductRecord>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let sql = format!(
            "SELECT product_id, external_id, title FROM product
             WHERE product_id IN ({}) ORDER BY product_id ASC",
            placeholders(ids.len())
        );
        self.query_products(&sql, params_from_iter(ids.iter()))
    }

    fn query_products(
        &self,
        sql: &str,
        args: impl rusqlite::Params,
    ) -> DeskResult<Vec<ProductRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let heads = stmt
            .query_map(args, |row| {
                Ok((
                    row.get::<_, ProductId>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut products = Vec::with_capacity(heads.len());
        for (product_id, external_id, title) in heads {
            products.push(ProductRecord {
                product_id,
                external_id,
                title,
                assigned_agent_ids: self.product_rule_agents("product_agent_assignment", product_id)?,
                hidden_for_agent_ids: self.product_rule_agents("product_agent_hidden", product_id)?,
            });
        }
        Ok(products)
    }

    fn product_rule_agents(&self, table: &str, product_id: ProductId) -> DeskResult<Vec<AgentId>> {
        let sql =
            format!("SELECT agent_id FROM {table} WHERE product_id = ?1 ORDER BY agent_id ASC");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![product_id], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Statuses ───────────────────────────────────────────────────

    pub fn upsert_status(&self, s: &StatusConfig) -> DeskResult<()> {
        self.conn.execute(
            "INSERT INTO order_status (status_id, name, recall_after_h, terminal)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(status_id) DO UPDATE SET
                name = excluded.name,
                recall_after_h = excluded.recall_after_h,
                terminal = excluded.terminal",
            params![
                s.status_id,
                &s.name,
                s.recall_after_h.map(i64::from),
                if s.terminal { 1i32 } else { 0i32 },
            ],
        )?;
        Ok(())
    }

    pub fn find_status(&self, status_id: StatusId) -> DeskResult<Option<StatusRecord>> {
        self.conn
            .query_row(
                "SELECT status_id, name, recall_after_h, terminal
                 FROM order_status WHERE status_id = ?1",
                params![status_id],
                status_row_mapper,
            )
            .optional()
            .map_err(Into::into)
    }

    // ── Load aggregate ─────────────────────────────────────────────

    pub fn count_outstanding_orders_per_agent(&self) -> DeskResult<HashMap<AgentId, u32>> {
        let mut stmt = self.conn.prepare(
            "SELECT o.agent_id, COUNT(*)
             FROM orders o
             LEFT JOIN order_status s ON s.status_id = o.status_id
             WHERE o.agent_id IS NOT NULL
               AND (o.status_id IS NULL OR s.terminal = 0)
             GROUP BY o.agent_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, AgentId>(0)?, row.get::<_, i64>(1)? as u32))
        })?;
        rows.collect::<Result<HashMap<_, _>, _>>()
            .map_err(Into::into)
    }
}
