//! Status transitions: processing stamp, recall scheduling, attempts.

use chrono::{Duration, TimeZone, Utc};
use orderdesk_core::{
    clock::ManualClock,
    engine::DeskEngine,
    error::DeskError,
    ingestion::RawOrder,
    records::{FirstProcessing, StatusFieldsUpdate},
    types::{OrderId, StatusId, Timestamp},
};

const CONFIRMED: StatusId = 1; // recall after 24h
const NO_ANSWER: StatusId = 2; // recall after 2h
const CALLBACK_REQUESTED: StatusId = 3; // no recall
const DELIVERED: StatusId = 4; // terminal, no recall

fn t0() -> Timestamp {
    Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()
}

/// Engine with one ingested order dated `t0`, clock still at `t0`.
fn engine_with_order(number: &str) -> (DeskEngine, ManualClock, OrderId) {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = ManualClock::new(t0());
    let mut engine = DeskEngine::build_test(42, Box::new(clock.clone())).unwrap();
    engine
        .ingest_orders(&[RawOrder {
            external_number: number.into(),
            customer_name: "Jane Roe".into(),
            customer_phone: "+15550100".into(),
            order_date: t0(),
            price: 30.0,
            line_items: vec![],
        }])
        .unwrap();
    let order_id = engine
        .store
        .find_order_by_external_number(number)
        .unwrap()
        .unwrap()
        .order_id;
    (engine, clock, order_id)
}

/// "Confirmed" (24h) at T: recall at T+24h, one attempt, processing stamped.
#[test]
fn confirmed_schedules_recall_and_stamps_processing() {
    let (mut engine, clock, order_id) = engine_with_order("1002");
    clock.advance(Duration::minutes(95));
    let t = t0() + Duration::minutes(95);

    let change = engine.change_order_status(order_id, Some(CONFIRMED)).unwrap();
    assert_eq!(change.status_id, Some(CONFIRMED));
    assert_eq!(change.recall_at, Some(t + Duration::hours(24)));
    assert_eq!(change.recall_attempts, 1);
    assert_eq!(change.first_processed_at, Some(t));
    assert_eq!(change.processing_time_min, Some(95));
}

/// Later transitions never rewrite the processing stamp.
#[test]
fn processing_stamp_is_written_once() {
    let (mut engine, clock, order_id) = engine_with_order("1003");
    clock.advance(Duration::minutes(10));
    engine.change_order_status(order_id, Some(CALLBACK_REQUESTED)).unwrap();

    for status in [Some(CONFIRMED), None, Some(NO_ANSWER), Some(DELIVERED)] {
        clock.advance(Duration::hours(5));
        let change = engine.change_order_status(order_id, status).unwrap();
        assert_eq!(change.first_processed_at, Some(t0() + Duration::minutes(10)));
        assert_eq!(change.processing_time_min, Some(10));
    }
    assert_eq!(engine.store.event_count("first_processed").unwrap(), 1);
}

/// Clearing the status of an unprocessed order stamps nothing.
#[test]
fn null_status_does_not_stamp_processing() {
    let (mut engine, clock, order_id) = engine_with_order("1004");
    clock.advance(Duration::minutes(30));

    let change = engine.change_order_status(order_id, None).unwrap();
    assert_eq!(change.status_id, None);
    assert_eq!(change.first_processed_at, None);
    assert_eq!(change.processing_time_min, None);
    assert_eq!(change.recall_at, None);
    assert_eq!(change.recall_attempts, 0);
}

/// A status without a recall delay leaves an existing recall in place.
#[test]
fn status_without_delay_keeps_recall() {
    let (mut engine, clock, order_id) = engine_with_order("1005");
    let scheduled = engine.change_order_status(order_id, Some(CONFIRMED)).unwrap();

    clock.advance(Duration::hours(1));
    let change = engine
        .change_order_status(order_id, Some(CALLBACK_REQUESTED))
        .unwrap();
    assert_eq!(change.recall_at, scheduled.recall_at);
    assert_eq!(change.recall_attempts, 1);

    clock.advance(Duration::hours(1));
    let cleared_status = engine.change_order_status(order_id, None).unwrap();
    assert_eq!(cleared_status.recall_at, scheduled.recall_at);
}

/// Each recall-bearing status moves the recall and bumps the counter.
#[test]
fn recall_attempts_accumulate() {
    let (mut engine, clock, order_id) = engine_with_order("1006");
    let mut last_attempts = 0;
    for round in 1..=3u32 {
        clock.advance(Duration::hours(3));
        let now = engine.now();
        let change = engine.change_order_status(order_id, Some(NO_ANSWER)).unwrap();
        assert_eq!(change.recall_at, Some(now + Duration::hours(2)));
        assert_eq!(change.recall_attempts, round);
        assert!(change.recall_attempts > last_attempts);
        last_attempts = change.recall_attempts;
    }
}

/// Unknown status ids are NotFound and leave the order untouched.
#[test]
fn unknown_status_is_not_found() {
    let (mut engine, _clock, order_id) = engine_with_order("1007");
    let before = engine.store.find_order(order_id).unwrap().unwrap();

    let err = engine.change_order_status(order_id, Some(99)).unwrap_err();
    assert!(matches!(err, DeskError::NotFound { entity: "status", .. }));
    assert_eq!(engine.store.find_order(order_id).unwrap().unwrap(), before);
}

/// Unknown order ids are NotFound.
#[test]
fn unknown_order_is_not_found() {
    let (mut engine, _clock, _) = engine_with_order("1008");
    let err = engine.change_order_status(9_999, Some(CONFIRMED)).unwrap_err();
    assert!(matches!(err, DeskError::NotFound { entity: "order", .. }));
}

/// Two writers racing on the first transition: the stored stamp is the
/// first one written, and only that write reports it set the stamp,
/// even when both carry the same instant.
#[test]
fn first_processing_is_compare_and_swap() {
    let (engine, _clock, order_id) = engine_with_order("1009");
    let stamp = |minutes: i64| StatusFieldsUpdate {
        status_id: Some(CONFIRMED),
        first_processing: Some(FirstProcessing {
            at: t0() + Duration::minutes(minutes),
            processing_time_min: minutes,
        }),
        recall_at: None,
        increment_recall_attempts: false,
    };

    let first = engine
        .store
        .update_order_status_fields(order_id, &stamp(5))
        .unwrap();
    let same_instant = engine
        .store
        .update_order_status_fields(order_id, &stamp(5))
        .unwrap();
    let later = engine
        .store
        .update_order_status_fields(order_id, &stamp(6))
        .unwrap();

    assert!(first.first_processing_written);
    assert!(!same_instant.first_processing_written);
    assert!(!later.first_processing_written);
    assert_eq!(first.order.first_processed_at, Some(t0() + Duration::minutes(5)));
    assert_eq!(later.order.first_processed_at, Some(t0() + Duration::minutes(5)));
    assert_eq!(later.order.processing_time_min, Some(5));
}

/// Manual recalls override or clear without touching the counter.
#[test]
fn manual_recall_overrides_and_clears() {
    let (mut engine, _clock, order_id) = engine_with_order("1010");
    engine.change_order_status(order_id, Some(CONFIRMED)).unwrap();

    let at = t0() + Duration::hours(2);
    let moved = engine.set_manual_recall(order_id, Some(at)).unwrap();
    assert_eq!(moved.recall_at, Some(at));
    assert_eq!(moved.recall_attempts, 1);

    let cleared = engine.set_manual_recall(order_id, None).unwrap();
    assert_eq!(cleared.recall_at, None);
    assert_eq!(cleared.recall_attempts, 1);
    assert_eq!(engine.store.event_count("recall_set_manually").unwrap(), 2);
}
