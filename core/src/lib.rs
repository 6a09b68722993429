//! Order desk core: assigns incoming call-center orders to agents and
//! schedules status-driven follow-up calls.

pub mod assignment;
pub mod clock;
pub mod compatibility;
pub mod config;
pub mod datastore;
pub mod engine;
pub mod error;
pub mod event;
pub mod ingestion;
pub mod load_index;
pub mod recall_schedule;
pub mod records;
pub mod rng;
pub mod status_transition;
pub mod store;
pub mod types;
