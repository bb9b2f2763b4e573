//! End-to-end flows through the public API: browse, book, reduce
//! capacity, restart.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use ulid::Ulid;

use vacancy::model::{BookingFilter, CancelReason, Event, HotelFilter};
use vacancy::notify::{NotifyHub, Scope};
use vacancy::{BookingStatus, Engine, EngineError, Stay};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("vacancy_test_flows");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

#[tokio::test]
async fn guest_booking_flow() {
    init_tracing();
    let engine = Arc::new(
        Engine::new(test_wal_path("guest_flow.wal"), Arc::new(NotifyHub::new())).unwrap(),
    );

    // Operator sets up a hotel with two room categories.
    let hotel_id = Ulid::new();
    engine
        .create_hotel(hotel_id, "Grand Central".into(), "Berlin".into(), Some(4))
        .await
        .unwrap();
    let double = Ulid::new();
    let suite = Ulid::new();
    engine
        .create_category(double, hotel_id, "Double".into(), 2, 12_000, vec!["wifi".into()])
        .await
        .unwrap();
    engine
        .create_category(suite, hotel_id, "Suite".into(), 1, 30_000, vec!["wifi".into(), "balcony".into()])
        .await
        .unwrap();

    // Guest searches by city with dates.
    let stay = Stay::parse("2024-07-10", "2024-07-14").unwrap();
    let results = engine
        .list_hotels(&HotelFilter {
            city: Some("Berlin".into()),
            stay: Some(stay),
            ..Default::default()
        })
        .await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].categories.len(), 2);

    // Books the double.
    let booking_id = Ulid::new();
    let guest_id = Ulid::new();
    engine
        .create_booking(booking_id, double, guest_id, stay, Utc::now())
        .await
        .unwrap();

    // The availability check reflects the booking.
    let rows = engine.check_availability(hotel_id, &stay).await.unwrap();
    let double_row = rows.iter().find(|r| r.category_id == double).unwrap();
    assert_eq!(double_row.remaining, 1);
    let suite_row = rows.iter().find(|r| r.category_id == suite).unwrap();
    assert_eq!(suite_row.remaining, 1);

    // Operator sees the booking on the hotel ledger.
    let bookings = engine
        .list_bookings(hotel_id, &BookingFilter::default())
        .await
        .unwrap();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].id, booking_id);
    assert_eq!(bookings[0].guest_id, guest_id);
    assert_eq!(bookings[0].status, BookingStatus::Confirmed);

    // Guest cancels; the unit is free again.
    engine.cancel_booking(booking_id).await.unwrap();
    let rows = engine.check_availability(hotel_id, &stay).await.unwrap();
    assert_eq!(rows.iter().find(|r| r.category_id == double).unwrap().remaining, 2);
}

#[tokio::test]
async fn capacity_reduction_notifies_and_survives_restart() {
    init_tracing();
    let path = test_wal_path("reduction_restart.wal");
    let hotel_id = Ulid::new();
    let category_id = Ulid::new();
    let early = Ulid::new();
    let late = Ulid::new();
    let today = d(2024, 4, 1);

    {
        let engine = Arc::new(Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap());
        engine
            .create_hotel(hotel_id, "Seaside".into(), "Nice".into(), None)
            .await
            .unwrap();
        engine
            .create_category(category_id, hotel_id, "Double".into(), 2, 15_000, vec![])
            .await
            .unwrap();

        let stay = Stay::new(d(2024, 6, 1), d(2024, 6, 5));
        engine
            .create_booking(early, category_id, Ulid::new(), stay, Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap())
            .await
            .unwrap();
        engine
            .create_booking(late, category_id, Ulid::new(), stay, Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap())
            .await
            .unwrap();

        // A wing closes: capacity drops to 1. The later booker loses the
        // room; subscribers hear about it.
        let mut rx = engine.notify.subscribe(Scope::Category(category_id));
        let cancelled = engine
            .update_category(category_id, None, Some(1), None, None, today)
            .await
            .unwrap();
        assert_eq!(cancelled, vec![late]);

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            Event::BookingCancelled {
                id: late,
                category_id,
                reason: CancelReason::CapacityReduced,
            }
        );
    }

    // Fresh process, same WAL: the reduction and both booking records are
    // still there.
    let engine = Arc::new(Engine::new(path, Arc::new(NotifyHub::new())).unwrap());
    assert_eq!(engine.get_booking(early).await.unwrap().status, BookingStatus::Confirmed);
    assert_eq!(engine.get_booking(late).await.unwrap().status, BookingStatus::Cancelled);

    let stay = Stay::new(d(2024, 6, 2), d(2024, 6, 4));
    assert_eq!(
        engine.category_availability(category_id, Some(&stay)).await.unwrap(),
        0
    );

    // New capacity is persisted too: a second guest is refused.
    let err = engine
        .create_booking(Ulid::new(), category_id, Ulid::new(), stay, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NoVacancy(_)));
}
