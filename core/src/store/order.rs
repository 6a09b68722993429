use super::DeskStore;
use crate::{
    error::{DeskError, DeskResult},
    records::{NewOrder, OrderRecord, StatusFieldsUpdate, StatusFieldsWrite},
    types::{from_millis, to_millis, AgentId, OrderId, ProductId, Timestamp},
};
use rusqlite::{params, OptionalExtension};

const ORDER_COLUMNS: &str = "order_id, external_number, customer_name, customer_phone,
    product_note, order_date, price, agent_id, status_id, recall_at,
    first_processed_at, processing_time_min, recall_attempts, created_at";

// Helper function for mapping order rows. Product ids are filled in afterwards.
fn order_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<OrderRecord> {
    Ok(OrderRecord {
        order_id: row.get(0)?,
        external_number: row.get(1)?,
        customer_name: row.get(2)?,
        customer_phone: row.get(3)?,
        product_note: row.get(4)?,
        order_date: from_millis(row.get(5)?),
        price: row.get(6)?,
        agent_id: row.get(7)?,
        status_id: row.get(8)?,
        recall_at: row.get::<_, Option<i64>>(9)?.map(from_millis),
        first_processed_at: row.get::<_, Option<i64>>(10)?.map(from_millis),
        processing_time_min: row.get(11)?,
        recall_attempts: row.get(12)?,
        product_ids: Vec::new(),
        created_at: from_millis(row.get(13)?),
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

impl DeskStore {
    // ── Order reads ────────────────────────────────────────────────

    pub fn find_order(&self, order_id: OrderId) -> DeskResult<Option<OrderRecord>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = ?1");
        let order = self
            .conn
            .query_row(&sql, params![order_id], order_row_mapper)
            .optional()?;
        order.map(|o| self.with_products(o)).transpose()
    }

    pub fn find_order_by_external_number(&self, number: &str) -> DeskResult<Option<OrderRecord>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE external_number = ?1");
        let order = self
            .conn
            .query_row(&sql, params![number], order_row_mapper)
            .optional()?;
        order.map(|o| self.with_products(o)).transpose()
    }

    pub fn find_unassigned_orders(&self) -> DeskResult<Vec<OrderRecord>> {
        self.query_orders("WHERE agent_id IS NULL ORDER BY order_id ASC", params![])
    }

    /// Every order, in insertion order.
    pub fn all_orders(&self) -> DeskResult<Vec<OrderRecord>> {
        self.query_orders("ORDER BY order_id ASC", params![])
    }

    pub fn order_count(&self) -> DeskResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))
            .map_err(Into::into)
    }

    pub fn orders_for_agent(&self, agent_id: AgentId) -> DeskResult<Vec<OrderRecord>> {
        self.query_orders(
            "WHERE agent_id = ?1 ORDER BY order_id ASC",
            params![agent_id],
        )
    }

    fn query_orders(
        &self,
        tail: &str,
        args: impl rusqlite::Params,
    ) -> DeskResult<Vec<OrderRecord>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders {tail}");
        let mut stmt = self.conn.prepare(&sql)?;
        let orders = stmt
            .query_map(args, order_row_mapper)?
            .collect::<Result<Vec<_>, _>>()?;
        orders.into_iter().map(|o| self.with_products(o)).collect()
    }

    fn with_products(&self, mut order: OrderRecord) -> DeskResult<OrderRecord> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT product_id FROM order_product WHERE order_id = ?1 ORDER BY product_id ASC",
        )?;
        order.product_ids = stmt
            .query_map(params![order.order_id], |row| row.get::<_, ProductId>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(order)
    }

    // ── Order writes ───────────────────────────────────────────────

    /// Insert the order row and its product lines in one transaction.
    pub fn create_order(&self, o: &NewOrder) -> DeskResult<OrderRecord> {
        let tx = self.conn.unchecked_transaction()?;
        let inserted = self.conn.execute(
            "INSERT INTO orders (
                external_number, customer_name, customer_phone, product_note,
                order_date, price, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &o.external_number,
                &o.customer_name,
                &o.customer_phone,
                &o.product_note,
                to_millis(o.order_date),
                o.price,
                to_millis(o.created_at),
            ],
        );
        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                return Err(DeskError::conflict(
                    format!("external order {}", o.external_number),
                    "already ingested",
                ));
            }
            return Err(e.into());
        }
        let order_id = self.conn.last_insert_rowid();

        for item in &o.items {
            self.conn.execute(
                "INSERT INTO order_product (order_id, product_id, quantity) VALUES (?1, ?2, ?3)
                 ON CONFLICT(order_id, product_id) DO UPDATE SET
                    quantity = quantity + excluded.quantity",
                params![order_id, item.product_id, item.quantity],
            )?;
        }
        tx.commit()?;

        self.find_order(order_id)?
            .ok_or_else(|| DeskError::not_found("order", order_id))
    }

    /// Conditional assignment: only an unassigned order takes an agent.
    pub fn update_order_agent(&self, order_id: OrderId, agent_id: AgentId) -> DeskResult<()> {
        let changed = self.conn.execute(
            "UPDATE orders SET agent_id = ?1 WHERE order_id = ?2 AND agent_id IS NULL",
            params![agent_id, order_id],
        )?;
        if changed == 1 {
            return Ok(());
        }
        match self.current_agent(order_id)? {
            None => Err(DeskError::not_found("order", order_id)),
            Some(current) => Err(DeskError::conflict(
                format!("order {order_id}"),
                format!("already assigned to agent {}", current.unwrap_or_default()),
            )),
        }
    }

    pub fn reassign_order_agent(
        &self,
        order_id: OrderId,
        agent_id: AgentId,
    ) -> DeskResult<Option<AgentId>> {
        let tx = self.conn.unchecked_transaction()?;
        let previous = self
            .current_agent(order_id)?
            .ok_or_else(|| DeskError::not_found("order", order_id))?;
        self.conn.execute(
            "UPDATE orders SET agent_id = ?1 WHERE order_id = ?2",
            params![agent_id, order_id],
        )?;
        tx.commit()?;
        Ok(previous)
    }

    /// Outer None: no such order. Inner None: order unassigned.
    fn current_agent(&self, order_id: OrderId) -> DeskResult<Option<Option<AgentId>>> {
        self.conn
            .query_row(
                "SELECT agent_id FROM orders WHERE order_id = ?1",
                params![order_id],
                |row| row.get::<_, Option<AgentId>>(0),
            )
            .optional()
            .map_err(Into::into)
    }

    /// The processing stamp is a guarded write that only lands while
    /// `first_processed_at` is still NULL; its change count says whether
    /// this call set it. The recall is replaced only when a new one is
    /// given, and the attempt counter increments in SQL. Both statements
    /// share one transaction.
    pub fn update_order_status_fields(
        &self,
        order_id: OrderId,
        u: &StatusFieldsUpdate,
    ) -> DeskResult<StatusFieldsWrite> {
        let tx = self.conn.unchecked_transaction()?;
        let changed = self.conn.execute(
            "UPDATE orders SET
                status_id = ?1,
                recall_at = COALESCE(?2, recall_at),
                recall_attempts = recall_attempts + ?3
             WHERE order_id = ?4",
            params![
                u.status_id,
                u.recall_at.map(to_millis),
                if u.increment_recall_attempts { 1i64 } else { 0i64 },
                order_id,
            ],
        )?;
        if changed == 0 {
            return Err(DeskError::not_found("order", order_id));
        }
        let first_processing_written = match u.first_processing {
            Some(fp) => {
                self.conn.execute(
                    "UPDATE orders SET first_processed_at = ?1, processing_time_min = ?2
                     WHERE order_id = ?3 AND first_processed_at IS NULL",
                    params![to_millis(fp.at), fp.processing_time_min, order_id],
                )? == 1
            }
            None => false,
        };
        tx.commit()?;

        let order = self
            .find_order(order_id)?
            .ok_or_else(|| DeskError::not_found("order", order_id))?;
        Ok(StatusFieldsWrite {
            order,
            first_processing_written,
        })
    }

    pub fn set_order_recall(
        &self,
        order_id: OrderId,
        recall_at: Option<Timestamp>,
    ) -> DeskResult<OrderRecord> {
        let changed = self.conn.execute(
            "UPDATE orders SET recall_at = ?1 WHERE order_id = ?2",
            params![recall_at.map(to_millis), order_id],
        )?;
        if changed == 0 {
            return Err(DeskError::not_found("order", order_id));
        }
        self.find_order(order_id)?
            .ok_or_else(|| DeskError::not_found("order", order_id))
    }

    // ── Recalls ────────────────────────────────────────────────────

    pub fn query_due_recalls(
        &self,
        now: Timestamp,
        watermark: Option<Timestamp>,
    ) -> DeskResult<Vec<OrderRecord>> {
        self.query_orders(
            "WHERE recall_at IS NOT NULL
               AND recall_at <= ?1
               AND (?2 IS NULL OR recall_at > ?2)
             ORDER BY recall_at ASC, order_id ASC",
            params![to_millis(now), watermark.map(to_millis)],
        )
    }
}
