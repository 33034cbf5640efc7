use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::join_all;
use ulid::Ulid;

use stayline::engine::{Engine, EngineError};
use stayline::feed::BookingFeed;
use stayline::model::*;

// ── Test infrastructure ──────────────────────────────────────

fn journal_path() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("stayline_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join("bookings.journal")
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn jan(from: u32, to: u32) -> Stay {
    Stay::new(date(2025, 1, from), date(2025, 1, to))
}

async fn engine_with_property() -> (Arc<Engine>, PropertyId) {
    let engine = Arc::new(Engine::new(journal_path(), Arc::new(BookingFeed::new())).unwrap());
    let property = Property {
        id: Ulid::new(),
        owner_id: Ulid::new(),
        nightly_price: 12_000,
    };
    let id = property.id;
    engine.register_property(property).await.unwrap();
    (engine, id)
}

async fn reserve(engine: &Engine, property_id: PropertyId, stay: Stay) -> Result<Booking, EngineError> {
    let req = BookingRequest::new(property_id, Ulid::new(), stay).submitted_on(date(2024, 12, 1));
    engine.reserve_request(req).await
}

// ── Properties ───────────────────────────────────────────────

#[tokio::test]
async fn adjacent_stays_share_a_boundary() {
    let (engine, pid) = engine_with_property().await;
    reserve(&engine, pid, jan(10, 15)).await.unwrap();
    reserve(&engine, pid, jan(15, 20)).await.unwrap();
}

#[tokio::test]
async fn overlap_is_rejected() {
    let (engine, pid) = engine_with_property().await;
    let first = reserve(&engine, pid, jan(10, 15)).await.unwrap();
    assert_eq!(
        reserve(&engine, pid, jan(12, 18)).await,
        Err(EngineError::Conflict(vec![first.id]))
    );
}

#[tokio::test]
async fn cancellation_frees_the_same_stay() {
    let (engine, pid) = engine_with_property().await;
    let b = reserve(&engine, pid, jan(10, 15)).await.unwrap();
    engine.cancel(b.id).await.unwrap();
    reserve(&engine, pid, jan(10, 15)).await.unwrap();
}

#[tokio::test]
async fn double_cancel_is_harmless() {
    let (engine, pid) = engine_with_property().await;
    let b = reserve(&engine, pid, jan(10, 15)).await.unwrap();
    let once = engine.cancel(b.id).await.unwrap();
    let twice = engine.cancel(b.id).await.unwrap();
    assert_eq!(once, twice);
    assert_eq!(twice.status, BookingStatus::Cancelled);
}

#[tokio::test]
async fn inverted_stay_is_invalid_and_leaves_no_record() {
    let (engine, pid) = engine_with_property().await;
    assert!(matches!(
        reserve(&engine, pid, jan(15, 10)).await,
        Err(EngineError::InvalidInterval(_))
    ));
    assert!(engine.bookings(pid).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_reservations_exactly_one_wins() {
    for _ in 0..20 {
        let (engine, pid) = engine_with_property().await;
        let results = join_all([
            tokio::spawn({
                let e = engine.clone();
                async move { reserve(&e, pid, jan(10, 15)).await }
            }),
            tokio::spawn({
                let e = engine.clone();
                async move { reserve(&e, pid, jan(14, 20)).await }
            }),
        ])
        .await;

        let results: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(EngineError::Conflict(_))))
                .count(),
            1
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn active_bookings_stay_disjoint_under_mixed_load() {
    let (engine, pid) = engine_with_property().await;

    let tasks = (0..48u32).map(|i| {
        let engine = engine.clone();
        tokio::spawn(async move {
            let from = 1 + (i * 5) % 26;
            let to = from + 1 + i % 4;
            if let Ok(b) = reserve(&engine, pid, jan(from, to)).await {
                match i % 3 {
                    0 => {
                        engine.cancel(b.id).await.unwrap();
                    }
                    1 => {
                        engine.confirm(b.id).await.unwrap();
                    }
                    _ => {}
                }
            }
        })
    });
    for r in join_all(tasks).await {
        r.unwrap();
    }

    let active: Vec<_> = engine
        .bookings(pid)
        .await
        .unwrap()
        .into_iter()
        .filter(Booking::is_active)
        .collect();
    for (i, a) in active.iter().enumerate() {
        for b in &active[i + 1..] {
            assert!(!a.stay.overlaps(&b.stay), "{} overlaps {}", a.stay, b.stay);
        }
    }
}

#[tokio::test]
async fn september_scenario() {
    let (engine, pid) = engine_with_property().await;
    let req = BookingRequest::new(pid, Ulid::new(), Stay::new(date(2025, 9, 15), date(2025, 9, 20)))
        .historical();
    let b = engine.reserve_request(req).await.unwrap();
    engine.confirm(b.id).await.unwrap();

    let overlapping = Stay::new(date(2025, 9, 18), date(2025, 9, 22));
    let after = Stay::new(date(2025, 9, 20), date(2025, 9, 25));
    assert!(!engine.check_availability(pid, overlapping).await.unwrap());
    assert!(engine.check_availability(pid, after).await.unwrap());

    let scan = engine.list_conflicts(pid, overlapping).await.unwrap();
    assert_eq!(scan.ids(), vec![b.id]);
}

#[tokio::test]
async fn subscribers_see_committed_events() {
    let (engine, pid) = engine_with_property().await;
    let mut rx = engine.subscribe(pid);
    let b = reserve(&engine, pid, jan(3, 6)).await.unwrap();
    match rx.recv().await.unwrap() {
        Event::BookingReserved { booking } => assert_eq!(booking, b),
        other => panic!("unexpected event {other:?}"),
    }
}
