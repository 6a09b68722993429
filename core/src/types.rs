//! Shared primitive types used across the desk.

use chrono::{DateTime, TimeZone, Utc};

/// Row id of a persisted order.
pub type OrderId = i64;

/// Row id of an agent.
pub type AgentId = i64;

/// Row id of a product.
pub type ProductId = i64;

/// Row id of a configured status.
pub type StatusId = i64;

/// Every instant the desk stores or compares. Always UTC.
pub type Timestamp = DateTime<Utc>;

/// Timestamps are persisted as milliseconds since the Unix epoch.
pub fn to_millis(ts: Timestamp) -> i64 {
    ts.timestamp_millis()
}

/// Inverse of [`to_millis`]. Out-of-range values clamp to the epoch.
pub fn from_millis(millis: i64) -> Timestamp {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_default()
}
