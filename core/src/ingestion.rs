//! Order ingestion: dedup, resolve products, persist, then assign.
//!
//! Two phases per batch:
//!   1. Insert. Each raw order is validated, deduplicated by external
//!      number and persisted on its own. A bad record is logged and
//!      counted; it never stops the batch or undoes earlier inserts.
//!   2. Assign. The load index and roster are read ONCE, then every
//!      newly inserted order is matched in insertion order. The index
//!      is bumped after each pick so the batch spreads out.

use crate::{
    assignment::AssignmentSelector,
    compatibility::eligible_agents,
    datastore::Datastore,
    error::{DeskError, DeskResult},
    event::DeskEvent,
    load_index::AgentLoadIndex,
    records::{AgentFilter, NewOrder, OrderItem, OrderRecord, ProductRecord},
    rng::StreamRng,
    types::Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An order as received from the external shop feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOrder {
    pub external_number: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub order_date: Timestamp,
    pub price: f64,
    #[serde(default)]
    pub line_items: Vec<RawLineItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLineItem {
    /// Catalog external id; absent for free-text items.
    #[serde(default)]
    pub product_external_id: Option<String>,
    pub title: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

/// Counts for one batch. `inserted_count` and `assigned_count` are the
/// headline numbers; the rest explain where the other records went.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub batch_id: String,
    pub inserted_count: usize,
    pub assigned_count: usize,
    pub skipped_duplicates: usize,
    pub rejected_count: usize,
    pub failed_count: usize,
    pub unassigned_count: usize,
}

/// Everything a batch carries between its two phases.
pub struct Batch {
    pub batch_id: String,
    pub started_at: Timestamp,
    pub rng: StreamRng,
}

enum InsertOutcome {
    Inserted(OrderRecord, Vec<ProductRecord>),
    Duplicate,
}

#[derive(Default)]
struct AssignTally {
    assigned: usize,
    unassigned: usize,
    failed: usize,
}

pub struct OrderIngestionPipeline<'s, S: Datastore + ?Sized> {
    store: &'s S,
    filter: AgentFilter,
}

impl<'s, S: Datastore + ?Sized> OrderIngestionPipeline<'s, S> {
    pub fn new(store: &'s S, filter: AgentFilter) -> Self {
        Self { store, filter }
    }

    /// Run both phases over `raw_orders`.
    pub fn ingest(
        &self,
        raw_orders: &[RawOrder],
        batch: &mut Batch,
        events: &mut Vec<DeskEvent>,
    ) -> DeskResult<IngestReport> {
        let mut report = IngestReport {
            batch_id: batch.batch_id.clone(),
            ..IngestReport::default()
        };
        let mut inserted = Vec::new();

        for raw in raw_orders {
            match self.insert_one(raw, batch.started_at, events) {
                Ok(InsertOutcome::Inserted(order, products)) => {
                    report.inserted_count += 1;
                    inserted.push((order, products));
                }
                Ok(InsertOutcome::Duplicate) => {
                    report.skipped_duplicates += 1;
                }
                Err(DeskError::Validation { reason, .. }) => {
                    log::warn!(
                        "batch={} rejected order '{}': {reason}",
                        batch.batch_id,
                        raw.external_number
                    );
                    report.rejected_count += 1;
                    events.push(DeskEvent::OrderRejected {
                        external_number: raw.external_number.clone(),
                        reason,
                    });
                }
                Err(e) if e.is_conflict() => {
                    // Lost an insert race with a concurrent batch.
                    log::debug!(
                        "batch={} order '{}' inserted concurrently: {e}",
                        batch.batch_id,
                        raw.external_number
                    );
                    report.skipped_duplicates += 1;
                    events.push(DeskEvent::DuplicateSkipped {
                        external_number: raw.external_number.clone(),
                    });
                }
                Err(e) => {
                    log::error!(
                        "batch={} failed to ingest order '{}': {e}",
                        batch.batch_id,
                        raw.external_number
                    );
                    report.failed_count += 1;
                }
            }
        }

        let tally = self.assign_orders(&inserted, batch, events)?;
        report.assigned_count = tally.assigned;
        report.unassigned_count = tally.unassigned;
        report.failed_count += tally.failed;

        log::info!(
            "batch={} ingested: inserted={} assigned={} duplicates={} rejected={} failed={} unassigned={}",
            report.batch_id,
            report.inserted_count,
            report.assigned_count,
            report.skipped_duplicates,
            report.rejected_count,
            report.failed_count,
            report.unassigned_count,
        );
        Ok(report)
    }

    /// Re-run the assignment phase over every order still unassigned.
    pub fn assign_pending(
        &self,
        batch: &mut Batch,
        events: &mut Vec<DeskEvent>,
    ) -> DeskResult<IngestReport> {
        let mut pending = Vec::new();
        for order in self.store.find_unassigned_orders()? {
            let products = self.store.find_products_by_ids(&order.product_ids)?;
            pending.push((order, products));
        }

        let tally = self.assign_orders(&pending, batch, events)?;
        log::info!(
            "batch={} pending sweep: candidates={} assigned={} unassigned={}",
            batch.batch_id,
            pending.len(),
            tally.assigned,
            tally.unassigned,
        );
        Ok(IngestReport {
            batch_id: batch.batch_id.clone(),
            assigned_count: tally.assigned,
            unassigned_count: tally.unassigned,
            failed_count: tally.failed,
            ..IngestReport::default()
        })
    }

    fn insert_one(
        &self,
        raw: &RawOrder,
        now: Timestamp,
        events: &mut Vec<DeskEvent>,
    ) -> DeskResult<InsertOutcome> {
        validate(raw)?;
        let external_number = raw.external_number.trim();

        if self
            .store
            .find_order_by_external_number(external_number)?
            .is_some()
        {
            log::debug!("order '{external_number}' already present, skipping");
            events.push(DeskEvent::DuplicateSkipped {
                external_number: external_number.to_string(),
            });
            return Ok(InsertOutcome::Duplicate);
        }

        let mut external_ids: Vec<String> = raw
            .line_items
            .iter()
            .filter_map(|li| li.product_external_id.as_deref())
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        external_ids.sort();
        external_ids.dedup();
        let products = self.store.find_products_by_external_ids(&external_ids)?;
        if products.len() < external_ids.len() {
            log::debug!(
                "order '{external_number}': {} of {} product ids unresolved",
                external_ids.len() - products.len(),
                external_ids.len()
            );
        }

        let by_external: HashMap<&str, &ProductRecord> = products
            .iter()
            .map(|p| (p.external_id.as_str(), p))
            .collect();
        let resolve = |li: &RawLineItem| {
            li.product_external_id
                .as_deref()
                .and_then(|id| by_external.get(id.trim()).copied())
        };

        let items: Vec<OrderItem> = raw
            .line_items
            .iter()
            .filter_map(|li| {
                resolve(li).map(|p| OrderItem {
                    product_id: p.product_id,
                    quantity: li.quantity,
                })
            })
            .collect();
        let product_note = build_product_note(&raw.line_items, |li| {
            resolve(li).map(|p| p.title.as_str())
        });

        let order = self.store.create_order(&NewOrder {
            external_number: external_number.to_string(),
            customer_name: raw.customer_name.trim().to_string(),
            customer_phone: raw.customer_phone.trim().to_string(),
            product_note,
            order_date: raw.order_date,
            price: raw.price,
            items,
            created_at: now,
        })?;

        log::debug!(
            "order '{}' stored as #{} with {} products",
            order.external_number,
            order.order_id,
            products.len()
        );
        events.push(DeskEvent::OrderIngested {
            order_id: order.order_id,
            external_number: order.external_number.clone(),
            product_count: products.len(),
        });
        Ok(InsertOutcome::Inserted(order, products))
    }

    fn assign_orders(
        &self,
        orders: &[(OrderRecord, Vec<ProductRecord>)],
        batch: &mut Batch,
        events: &mut Vec<DeskEvent>,
    ) -> DeskResult<AssignTally> {
        let mut tally = AssignTally::default();
        if orders.is_empty() {
            return Ok(tally);
        }

        // Aggregate once per batch; the selector keeps it current from here.
        let mut index = AgentLoadIndex::from_counts(self.store.count_outstanding_orders_per_agent()?);
        let roster = self.store.find_active_agents(&self.filter)?;
        let mut selector = AssignmentSelector::new(&mut index, &mut batch.rng);

        for (order, products) in orders {
            let eligible = eligible_agents(products, &roster);
            let Some(pick) = selector.select(&eligible) else {
                log::info!(
                    "batch={} order #{} ('{}') left unassigned: no eligible agent",
                    batch.batch_id,
                    order.order_id,
                    order.external_number
                );
                tally.unassigned += 1;
                events.push(DeskEvent::OrderLeftUnassigned {
                    order_id: order.order_id,
                    reason: "no eligible agent".into(),
                });
                continue;
            };

            match self.store.update_order_agent(order.order_id, pick.agent_id) {
                Ok(()) => {
                    log::info!(
                        "batch={} order #{} ('{}') -> agent {} (load {}, {} tied, {} eligible)",
                        batch.batch_id,
                        order.order_id,
                        order.external_number,
                        pick.agent_id,
                        pick.load_before,
                        pick.tied_candidates,
                        eligible.len(),
                    );
                    tally.assigned += 1;
                    events.push(DeskEvent::OrderAssigned {
                        order_id: order.order_id,
                        agent_id: pick.agent_id,
                        load_before: pick.load_before,
                        tied_candidates: pick.tied_candidates,
                    });
                }
                Err(e) if e.is_conflict() => {
                    log::info!(
                        "batch={} order #{} assigned concurrently, skipping: {e}",
                        batch.batch_id,
                        order.order_id
                    );
                    events.push(DeskEvent::AssignmentConflict {
                        order_id: order.order_id,
                    });
                }
                Err(e) => {
                    log::error!(
                        "batch={} failed to assign order #{}: {e}",
                        batch.batch_id,
                        order.order_id
                    );
                    tally.failed += 1;
                }
            }
        }
        Ok(tally)
    }
}

fn validate(raw: &RawOrder) -> DeskResult<()> {
    let reject = |reason: &str| {
        Err(DeskError::Validation {
            external_number: raw.external_number.clone(),
            reason: reason.to_string(),
        })
    };
    if raw.external_number.trim().is_empty() {
        return reject("empty external order number");
    }
    if raw.customer_phone.trim().is_empty() {
        return reject("empty customer phone");
    }
    if !raw.price.is_finite() || raw.price < 0.0 {
        return reject("price must be a finite, non-negative amount");
    }
    if raw.line_items.iter().any(|li| li.quantity == 0) {
        return reject("line item with zero quantity");
    }
    Ok(())
}

/// Join line-item titles into the human-readable note, preferring the
/// catalog title of a resolved product over the feed's raw title.
fn build_product_note<'a>(
    line_items: &'a [RawLineItem],
    resolved_title: impl Fn(&'a RawLineItem) -> Option<&'a str>,
) -> String {
    line_items
        .iter()
        .filter_map(|li| {
            let title = resolved_title(li).unwrap_or(li.title.trim());
            if title.is_empty() {
                return None;
            }
            Some(if li.quantity > 1 {
                format!("{title} x{}", li.quantity)
            } else {
                title.to_string()
            })
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn raw(number: &str) -> RawOrder {
        RawOrder {
            external_number: number.into(),
            customer_name: "Jane Roe".into(),
            customer_phone: "+15550100".into(),
            order_date: chrono::Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap(),
            price: 19.99,
            line_items: vec![],
        }
    }

    fn item(ext: Option<&str>, title: &str, quantity: u32) -> RawLineItem {
        RawLineItem {
            product_external_id: ext.map(String::from),
            title: title.into(),
            quantity,
        }
    }

    #[test]
    fn validation_rejects_malformed_orders() {
        assert!(validate(&raw("1001")).is_ok());
        assert!(validate(&raw("  ")).is_err());

        let mut no_phone = raw("1002");
        no_phone.customer_phone = " ".into();
        assert!(validate(&no_phone).is_err());

        let mut bad_price = raw("1003");
        bad_price.price = f64::NAN;
        assert!(validate(&bad_price).is_err());
        bad_price.price = -1.0;
        assert!(validate(&bad_price).is_err());

        let mut zero_qty = raw("1004");
        zero_qty.line_items = vec![item(None, "Thing", 0)];
        assert!(matches!(
            validate(&zero_qty),
            Err(DeskError::Validation { .. })
        ));
    }

    #[test]
    fn product_note_prefers_catalog_titles() {
        let items = vec![
            item(Some("sku-1"), "raw widget", 1),
            item(None, "Gift wrap", 2),
            item(Some("sku-missing"), "Mystery box", 1),
            item(None, "   ", 1),
        ];
        let note = build_product_note(&items, |li| {
            (li.product_external_id.as_deref() == Some("sku-1")).then_some("Widget")
        });
        assert_eq!(note, "Widget, Gift wrap x2, Mystery box");
    }

    #[test]
    fn raw_order_deserializes_with_defaults() {
        let json = r#"{
            "external_number": "1001",
            "customer_name": "Jane Roe",
            "customer_phone": "+15550100",
            "order_date": "2026-01-05T09:00:00Z",
            "price": 19.99,
            "line_items": [{ "title": "Widget", "product_external_id": "sku-widget" }]
        }"#;
        let order: RawOrder = serde_json::from_str(json).unwrap();
        assert_eq!(order.line_items.len(), 1);
        assert_eq!(order.line_items[0].quantity, 1);
    }
}
