use super::*;
use crate::limits::*;

const H: Minute = 60;

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("amenityd_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn new_engine(name: &str) -> (Engine, PathBuf) {
    let path = test_wal_path(name);
    let engine = Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap();
    (engine, path)
}

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 8, d).unwrap()
}

fn request(area_id: Ulid, day: NaiveDate, start: Minute, end: Minute) -> ReservationRequest {
    ReservationRequest {
        id: Ulid::new(),
        area_id,
        unit: 402,
        contact: Contact {
            name: "María Pérez".into(),
            phone: Some("555-0101".into()),
            email: None,
        },
        date: day,
        span: Span::new(start, end),
        headcount: 10,
        purpose: Some("Birthday".into()),
    }
}

async fn area_with_rate(engine: &Engine, name: &str, rate: Cents) -> Ulid {
    let id = Ulid::new();
    let mut config = AreaConfig::new(name);
    config.hourly_rate = rate;
    config.capacity = 30;
    engine.create_area(id, config).await.unwrap();
    id
}

// ── Areas ────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_area() {
    let (engine, _) = new_engine("create_area.wal");
    let id = area_with_rate(&engine, "Party room", 5000).await;

    let info = engine.get_area(&id).await.unwrap();
    assert_eq!(info.id, id);
    assert_eq!(info.config.name, "Party room");
    assert_eq!(info.config.hourly_rate, 5000);
    assert_eq!(info.config.hours(), Span::new(8 * H, 22 * H));
}

#[tokio::test]
async fn duplicate_area_id_and_name_rejected() {
    let (engine, _) = new_engine("dup_area.wal");
    let id = area_with_rate(&engine, "Pool", 0).await;

    let result = engine.create_area(id, AreaConfig::new("Other")).await;
    assert!(matches!(result, Err(EngineError::AlreadyExists(_))));

    let result = engine.create_area(Ulid::new(), AreaConfig::new("  POOL ")).await;
    assert!(matches!(result, Err(EngineError::NameTaken(_))));
}

#[tokio::test]
async fn invalid_area_config_rejected() {
    let (engine, _) = new_engine("bad_config.wal");
    let mut config = AreaConfig::new("Gym");
    config.opens = 20 * H;
    config.closes = 8 * H;
    let result = engine.create_area(Ulid::new(), config).await;
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    assert!(engine.list_areas().await.is_empty());
}

#[tokio::test]
async fn list_areas_sorted_by_name() {
    let (engine, _) = new_engine("list_areas.wal");
    area_with_rate(&engine, "terrace", 0).await;
    area_with_rate(&engine, "BBQ", 0).await;
    area_with_rate(&engine, "gym", 0).await;

    let names: Vec<_> = engine
        .list_areas()
        .await
        .into_iter()
        .map(|a| a.config.name)
        .collect();
    assert_eq!(names, vec!["BBQ", "gym", "terrace"]);
}

#[tokio::test]
async fn update_area_applies_patch_and_renames() {
    let (engine, _) = new_engine("update_area.wal");
    let id = area_with_rate(&engine, "Lounge", 1000).await;
    let other = area_with_rate(&engine, "Library", 0).await;

    let patch = AreaPatch {
        name: Some("Sky lounge".into()),
        hourly_rate: Some(2500),
        closes: Some(24 * H),
        ..AreaPatch::default()
    };
    let config = engine.update_area(id, patch).await.unwrap();
    assert_eq!(config.name, "Sky lounge");
    assert_eq!(config.hourly_rate, 2500);
    assert_eq!(config.closes, 1440);

    // Old name is free again, new one is taken.
    engine.create_area(Ulid::new(), AreaConfig::new("Lounge")).await.unwrap();
    let taken = engine
        .update_area(
            other,
            AreaPatch {
                name: Some("sky LOUNGE".into()),
                ..AreaPatch::default()
            },
        )
        .await;
    assert!(matches!(taken, Err(EngineError::NameTaken(_))));

    // Invalid result leaves the area untouched.
    let bad = engine
        .update_area(
            id,
            AreaPatch {
                min_minutes: Some(600),
                ..AreaPatch::default()
            },
        )
        .await;
    assert!(matches!(bad, Err(EngineError::InvalidConfig(_))));
    assert_eq!(engine.get_area(&id).await.unwrap().config.min_minutes, 60);
}

#[tokio::test]
async fn update_missing_area_not_found() {
    let (engine, _) = new_engine("update_missing.wal");
    let result = engine.update_area(Ulid::new(), AreaPatch::default()).await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn delete_area_blocked_by_active_reservations() {
    let (engine, _) = new_engine("delete_area.wal");
    let id = area_with_rate(&engine, "Cinema", 0).await;
    let r = engine
        .request_reservation(request(id, date(1), 18 * H, 20 * H))
        .await
        .unwrap();

    let result = engine.delete_area(id).await;
    assert!(matches!(result, Err(EngineError::HasActiveReservations(_))));

    engine.cancel_reservation(r.id, None).await.unwrap();
    engine.delete_area(id).await.unwrap();
    assert!(matches!(engine.get_area(&id).await, Err(EngineError::NotFound(_))));
    assert!(matches!(engine.get_reservation(&r.id).await, Err(EngineError::NotFound(_))));

    // Name can be reused after delete.
    engine.create_area(Ulid::new(), AreaConfig::new("Cinema")).await.unwrap();
}

// ── Requesting ───────────────────────────────────────────

#[tokio::test]
async fn request_computes_cost_and_starts_pending() {
    let (engine, _) = new_engine("request_cost.wal");
    let id = area_with_rate(&engine, "Party room", 5000).await;

    let r = engine
        .request_reservation(request(id, date(2), 14 * H, 16 * H))
        .await
        .unwrap();
    assert_eq!(r.status, ReservationStatus::Pending);
    assert_eq!(r.total_cost, 10000);
    assert!(r.created_at > 0);
    assert_eq!(r.updated_at, None);
    assert_eq!(engine.get_reservation(&r.id).await.unwrap(), r);
}

#[tokio::test]
async fn overlapping_request_reports_conflict() {
    let (engine, _) = new_engine("request_conflict.wal");
    let id = area_with_rate(&engine, "BBQ", 0).await;
    let first = engine
        .request_reservation(request(id, date(3), 10 * H, 12 * H))
        .await
        .unwrap();

    let cases = [
        (11 * H, 13 * H, Overlap::StartsInside),
        (9 * H, 11 * H, Overlap::EndsInside),
        (9 * H, 13 * H, Overlap::Contains),
    ];
    for (start, end, expected) in cases {
        match engine.request_reservation(request(id, date(3), start, end)).await {
            Err(EngineError::Conflict { with, overlap, .. }) => {
                assert_eq!(with, first.id);
                assert_eq!(overlap, expected);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    // Touching edges are fine.
    engine.request_reservation(request(id, date(3), 8 * H, 10 * H)).await.unwrap();
    engine.request_reservation(request(id, date(3), 12 * H, 13 * H)).await.unwrap();
    // Same hours on another day are fine.
    engine.request_reservation(request(id, date(4), 10 * H, 12 * H)).await.unwrap();
}

#[tokio::test]
async fn cancelled_and_completed_free_the_slot() {
    let (engine, _) = new_engine("inactive_free.wal");
    let id = area_with_rate(&engine, "Terrace", 0).await;

    let r = engine
        .request_reservation(request(id, date(5), 10 * H, 12 * H))
        .await
        .unwrap();
    engine.cancel_reservation(r.id, Some("rain".into())).await.unwrap();
    let again = engine
        .request_reservation(request(id, date(5), 10 * H, 12 * H))
        .await
        .unwrap();

    engine.confirm_reservation(again.id).await.unwrap();
    engine.complete_reservation(again.id).await.unwrap();
    engine
        .request_reservation(request(id, date(5), 11 * H, 12 * H))
        .await
        .unwrap();
}

#[tokio::test]
async fn request_validation_errors() {
    let (engine, _) = new_engine("request_validation.wal");
    let id = area_with_rate(&engine, "Gym", 0).await;

    let r = engine.request_reservation(request(id, date(6), 12 * H, 11 * H)).await;
    assert!(matches!(r, Err(EngineError::InvalidRange { .. })));

    let r = engine.request_reservation(request(id, date(6), 7 * H, 9 * H)).await;
    assert!(matches!(r, Err(EngineError::OutsideOperatingHours { .. })));

    let r = engine.request_reservation(request(id, date(6), 10 * H, 10 * H + 30)).await;
    assert!(matches!(r, Err(EngineError::DurationOutOfBounds { minutes: 30, .. })));

    let mut crowd = request(id, date(6), 10 * H, 11 * H);
    crowd.headcount = 31;
    let r = engine.request_reservation(crowd).await;
    assert!(matches!(r, Err(EngineError::HeadcountOutOfRange { capacity: 30, .. })));

    let mut nameless = request(id, date(6), 10 * H, 11 * H);
    nameless.contact.name = " ".into();
    let r = engine.request_reservation(nameless).await;
    assert!(matches!(r, Err(EngineError::InvalidRequest(_))));

    let r = engine.request_reservation(request(Ulid::new(), date(6), 10 * H, 11 * H)).await;
    assert!(matches!(r, Err(EngineError::NotFound(_))));

    engine
        .update_area(
            id,
            AreaPatch {
                enabled: Some(false),
                ..AreaPatch::default()
            },
        )
        .await
        .unwrap();
    let r = engine.request_reservation(request(id, date(6), 10 * H, 11 * H)).await;
    assert!(matches!(r, Err(EngineError::AreaDisabled(_))));
}

#[tokio::test]
async fn duplicate_reservation_id_rejected() {
    let (engine, _) = new_engine("dup_reservation.wal");
    let id = area_with_rate(&engine, "Pool", 0).await;
    let req = request(id, date(7), 9 * H, 10 * H);
    engine.request_reservation(req.clone()).await.unwrap();

    let mut again = req;
    again.span = Span::new(15 * H, 16 * H);
    let r = engine.request_reservation(again).await;
    assert!(matches!(r, Err(EngineError::AlreadyExists(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_for_one_slot_book_once() {
    let path = test_wal_path("concurrent.wal");
    let engine = Arc::new(Engine::new(path, Arc::new(NotifyHub::new())).unwrap());
    let id = area_with_rate(&engine, "Court", 0).await;

    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let mut req = request(id, date(8), 18 * H, 19 * H);
            req.unit = 100 + i;
            engine.request_reservation(req).await
        }));
    }
    let mut booked = 0;
    let mut conflicts = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => booked += 1,
            Err(EngineError::Conflict { .. }) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(booked, 1);
    assert_eq!(conflicts, 15);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_with_same_name_admit_one() {
    let path = test_wal_path("concurrent_names.wal");
    let engine = Arc::new(Engine::new(path, Arc::new(NotifyHub::new())).unwrap());

    let mut handles = Vec::new();
    for name in ["Pool", "pool", "POOL", "pOoL"] {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.create_area(Ulid::new(), AreaConfig::new(name)).await
        }));
    }
    let mut created = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(()) => created += 1,
            Err(EngineError::NameTaken(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(engine.list_areas().await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_renames_to_same_name_admit_one() {
    let path = test_wal_path("concurrent_renames.wal");
    let engine = Arc::new(Engine::new(path, Arc::new(NotifyHub::new())).unwrap());
    let gym = area_with_rate(&engine, "Gym", 0).await;
    let spa = area_with_rate(&engine, "Spa", 0).await;

    let rename = |id: Ulid, name: &'static str| {
        let engine = engine.clone();
        tokio::spawn(async move {
            let patch = AreaPatch {
                name: Some(name.into()),
                ..AreaPatch::default()
            };
            engine.update_area(id, patch).await
        })
    };
    let (a, b) = tokio::join!(rename(gym, "Court"), rename(spa, "court"));
    let results = [a.unwrap(), b.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(r, Err(EngineError::NameTaken(_)))));

    let names: Vec<String> = engine
        .list_areas()
        .await
        .into_iter()
        .map(|a| a.config.name.to_lowercase())
        .collect();
    assert_eq!(names.iter().filter(|n| *n == "court").count(), 1);
}

// ── Lifecycle ────────────────────────────────────────────

#[tokio::test]
async fn lifecycle_transitions() {
    let (engine, _) = new_engine("lifecycle.wal");
    let id = area_with_rate(&engine, "Lobby", 0).await;
    let r = engine
        .request_reservation(request(id, date(9), 9 * H, 10 * H))
        .await
        .unwrap();

    let r2 = engine.complete_reservation(r.id).await;
    assert!(matches!(
        r2,
        Err(EngineError::InvalidTransition {
            from: ReservationStatus::Pending,
            to: ReservationStatus::Completed,
            ..
        })
    ));

    let confirmed = engine.confirm_reservation(r.id).await.unwrap();
    assert_eq!(confirmed.status, ReservationStatus::Confirmed);
    assert!(confirmed.updated_at.is_some());

    let completed = engine.complete_reservation(r.id).await.unwrap();
    assert_eq!(completed.status, ReservationStatus::Completed);

    let r3 = engine.cancel_reservation(r.id, None).await;
    assert!(matches!(r3, Err(EngineError::InvalidTransition { .. })));
    let r4 = engine.confirm_reservation(Ulid::new()).await;
    assert!(matches!(r4, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn cancel_records_reason() {
    let (engine, _) = new_engine("cancel_reason.wal");
    let id = area_with_rate(&engine, "Lobby", 0).await;
    let r = engine
        .request_reservation(request(id, date(10), 9 * H, 10 * H))
        .await
        .unwrap();
    engine.confirm_reservation(r.id).await.unwrap();

    let cancelled = engine
        .cancel_reservation(r.id, Some("plumbing repair".into()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert_eq!(cancelled.notes.as_deref(), Some("plumbing repair"));

    let too_long = engine
        .cancel_reservation(r.id, Some("x".repeat(MAX_NOTES_LEN + 1)))
        .await;
    assert!(matches!(too_long, Err(EngineError::LimitExceeded(_))));
}

#[tokio::test]
async fn reschedule_moves_and_reprices() {
    let (engine, _) = new_engine("reschedule.wal");
    let id = area_with_rate(&engine, "Party room", 3000).await;
    let r = engine
        .request_reservation(request(id, date(11), 10 * H, 12 * H))
        .await
        .unwrap();
    let other = engine
        .request_reservation(request(id, date(12), 15 * H, 17 * H))
        .await
        .unwrap();

    // Overlapping its own old slot is fine.
    let moved = engine
        .reschedule_reservation(r.id, None, Some(11 * H), Some(14 * H))
        .await
        .unwrap();
    assert_eq!(moved.span, Span::new(11 * H, 14 * H));
    assert_eq!(moved.total_cost, 9000);

    // Someone else's slot is not.
    let clash = engine
        .reschedule_reservation(r.id, Some(date(12)), Some(16 * H), Some(18 * H))
        .await;
    match clash {
        Err(EngineError::Conflict { with, .. }) => assert_eq!(with, other.id),
        other => panic!("expected conflict, got {other:?}"),
    }

    let moved = engine
        .reschedule_reservation(r.id, Some(date(12)), Some(17 * H), Some(18 * H))
        .await
        .unwrap();
    assert_eq!(moved.date, date(12));
    assert_eq!(moved.total_cost, 3000);
    assert!(engine.list_reservations(&ReservationFilter {
        date: Some(date(11)),
        ..ReservationFilter::default()
    }).await.unwrap().is_empty());

    // Index follows the new date.
    engine.confirm_reservation(r.id).await.unwrap();
    assert_eq!(
        engine.get_reservation(&r.id).await.unwrap().status,
        ReservationStatus::Confirmed
    );
}

#[tokio::test]
async fn reschedule_requires_active() {
    let (engine, _) = new_engine("reschedule_inactive.wal");
    let id = area_with_rate(&engine, "Gym", 0).await;
    let r = engine
        .request_reservation(request(id, date(13), 10 * H, 11 * H))
        .await
        .unwrap();
    engine.cancel_reservation(r.id, None).await.unwrap();
    let result = engine
        .reschedule_reservation(r.id, None, Some(12 * H), Some(13 * H))
        .await;
    assert!(matches!(
        result,
        Err(EngineError::NotActive {
            status: ReservationStatus::Cancelled,
            ..
        })
    ));
}

#[tokio::test]
async fn reschedule_rechecks_headcount_against_capacity() {
    let (engine, _) = new_engine("reschedule_headcount.wal");
    let id = area_with_rate(&engine, "Quincho", 0).await;
    let r = engine
        .request_reservation(request(id, date(14), 10 * H, 11 * H))
        .await
        .unwrap();
    assert_eq!(r.headcount, 10);

    engine
        .update_area(
            id,
            AreaPatch {
                capacity: Some(5),
                ..AreaPatch::default()
            },
        )
        .await
        .unwrap();
    let result = engine
        .reschedule_reservation(r.id, None, Some(12 * H), Some(13 * H))
        .await;
    assert!(matches!(
        result,
        Err(EngineError::HeadcountOutOfRange {
            headcount: 10,
            capacity: 5
        })
    ));
    assert_eq!(
        engine.get_reservation(&r.id).await.unwrap().span,
        Span::new(10 * H, 11 * H)
    );
}

#[tokio::test]
async fn delete_reservation_frees_slot() {
    let (engine, _) = new_engine("delete_reservation.wal");
    let id = area_with_rate(&engine, "Gym", 0).await;
    let r = engine
        .request_reservation(request(id, date(14), 10 * H, 11 * H))
        .await
        .unwrap();
    engine.delete_reservation(r.id).await.unwrap();
    assert!(matches!(engine.get_reservation(&r.id).await, Err(EngineError::NotFound(_))));
    assert!(matches!(engine.delete_reservation(r.id).await, Err(EngineError::NotFound(_))));
    assert!(
        engine
            .is_available(&id, date(14), Span::new(10 * H, 11 * H))
            .await
            .unwrap()
    );
}

// ── Queries ──────────────────────────────────────────────

#[tokio::test]
async fn availability_and_slots() {
    let (engine, _) = new_engine("availability.wal");
    let id = area_with_rate(&engine, "Salon", 0).await;
    let r = engine
        .request_reservation(request(id, date(15), 10 * H, 12 * H))
        .await
        .unwrap();
    engine.confirm_reservation(r.id).await.unwrap();

    assert!(!engine.is_available(&id, date(15), Span::new(11 * H, 13 * H)).await.unwrap());
    assert!(engine.is_available(&id, date(15), Span::new(12 * H, 13 * H)).await.unwrap());
    assert!(matches!(
        engine.is_available(&id, date(15), Span::new(13 * H, 12 * H)).await,
        Err(EngineError::InvalidRange { .. })
    ));
    assert!(matches!(
        engine.is_available(&Ulid::new(), date(15), Span::new(9 * H, 10 * H)).await,
        Err(EngineError::NotFound(_))
    ));

    let slots = engine.available_slots(&id, date(15)).await.unwrap();
    assert_eq!(slots.len(), 12);
    assert!(!slots.contains(&Span::new(10 * H, 11 * H)));
    assert!(!slots.contains(&Span::new(11 * H, 12 * H)));

    let free = engine.free_windows(&id, date(15), Some(3 * H)).await.unwrap();
    assert_eq!(free, vec![Span::new(12 * H, 22 * H)]);
}

#[tokio::test]
async fn engine_quotes_cost() {
    let (engine, _) = new_engine("quote.wal");
    let id = area_with_rate(&engine, "Party room", 5000).await;
    assert_eq!(engine.compute_cost(&id, Span::new(14 * H, 16 * H)).await.unwrap(), 10000);
    assert_eq!(engine.compute_cost(&id, Span::new(14 * H, 14 * H + 90)).await.unwrap(), 7500);
    assert!(matches!(
        engine.compute_cost(&id, Span::new(16 * H, 14 * H)).await,
        Err(EngineError::InvalidRange { .. })
    ));
}

#[tokio::test]
async fn occupied_dates_by_month() {
    let (engine, _) = new_engine("occupied.wal");
    let id = area_with_rate(&engine, "Grill", 0).await;
    engine.request_reservation(request(id, date(20), 10 * H, 11 * H)).await.unwrap();
    engine.request_reservation(request(id, date(3), 10 * H, 11 * H)).await.unwrap();
    let gone = engine
        .request_reservation(request(id, date(9), 10 * H, 11 * H))
        .await
        .unwrap();
    engine.cancel_reservation(gone.id, None).await.unwrap();
    let september = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
    engine.request_reservation(request(id, september, 10 * H, 11 * H)).await.unwrap();

    assert_eq!(
        engine.occupied_dates(&id, Some((2025, 8))).await.unwrap(),
        vec![date(3), date(20)]
    );
    assert_eq!(engine.occupied_dates(&id, None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn list_reservations_filters_and_orders() {
    let (engine, _) = new_engine("list_reservations.wal");
    let pool = area_with_rate(&engine, "Pool", 0).await;
    let gym = area_with_rate(&engine, "Gym", 0).await;

    let late = engine.request_reservation(request(pool, date(2), 15 * H, 16 * H)).await.unwrap();
    let early = engine.request_reservation(request(pool, date(2), 9 * H, 10 * H)).await.unwrap();
    let first = engine.request_reservation(request(gym, date(1), 20 * H, 21 * H)).await.unwrap();
    let mut other_unit = request(gym, date(2), 9 * H, 10 * H);
    other_unit.unit = 101;
    let other_unit = engine.request_reservation(other_unit).await.unwrap();
    engine.confirm_reservation(early.id).await.unwrap();

    let all = engine.list_reservations(&ReservationFilter::default()).await.unwrap();
    let ids: Vec<_> = all.iter().map(|r| r.id).collect();
    assert_eq!(ids[0], first.id);
    assert_eq!(ids.len(), 4);
    assert!(ids.iter().position(|i| *i == early.id) < ids.iter().position(|i| *i == late.id));

    let pool_only = engine
        .list_reservations(&ReservationFilter {
            area_id: Some(pool),
            ..ReservationFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(pool_only.iter().map(|r| r.id).collect::<Vec<_>>(), vec![early.id, late.id]);

    let confirmed = engine
        .list_reservations(&ReservationFilter {
            status: Some(ReservationStatus::Confirmed),
            ..ReservationFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].id, early.id);

    let unit = engine
        .list_reservations(&ReservationFilter {
            unit: Some(101),
            date: Some(date(2)),
            ..ReservationFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(unit.len(), 1);
    assert_eq!(unit[0].id, other_unit.id);

    let missing = engine
        .list_reservations(&ReservationFilter {
            area_id: Some(Ulid::new()),
            ..ReservationFilter::default()
        })
        .await;
    assert!(matches!(missing, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn upcoming_for_unit_skips_past_and_inactive() {
    let (engine, _) = new_engine("upcoming.wal");
    let pool = area_with_rate(&engine, "Pool", 0).await;
    let gym = area_with_rate(&engine, "Gym", 0).await;

    engine.request_reservation(request(pool, date(1), 9 * H, 10 * H)).await.unwrap();
    let soon = engine.request_reservation(request(gym, date(10), 9 * H, 10 * H)).await.unwrap();
    let later = engine.request_reservation(request(pool, date(12), 9 * H, 10 * H)).await.unwrap();
    let cancelled = engine.request_reservation(request(pool, date(11), 9 * H, 10 * H)).await.unwrap();
    engine.cancel_reservation(cancelled.id, None).await.unwrap();
    let mut neighbour = request(pool, date(10), 11 * H, 12 * H);
    neighbour.unit = 403;
    engine.request_reservation(neighbour).await.unwrap();

    let upcoming: Vec<_> = engine
        .upcoming_for_unit(402, date(10))
        .await
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(upcoming, vec![soon.id, later.id]);
}

#[tokio::test]
async fn collect_finished_uses_end_time_today() {
    let (engine, _) = new_engine("finished.wal");
    let id = area_with_rate(&engine, "Pool", 0).await;
    let past = engine.request_reservation(request(id, date(1), 9 * H, 10 * H)).await.unwrap();
    let ended = engine.request_reservation(request(id, date(2), 9 * H, 10 * H)).await.unwrap();
    let running = engine.request_reservation(request(id, date(2), 10 * H, 12 * H)).await.unwrap();
    engine.request_reservation(request(id, date(3), 9 * H, 10 * H)).await.unwrap();
    engine.confirm_reservation(past.id).await.unwrap();

    let mut finished = engine.collect_finished(date(2), 11 * H).await;
    finished.sort_by_key(|(id, _)| *id);
    let mut expected = vec![
        (past.id, ReservationStatus::Confirmed),
        (ended.id, ReservationStatus::Pending),
    ];
    expected.sort_by_key(|(id, _)| *id);
    assert_eq!(finished, expected);
    assert!(!finished.iter().any(|(id, _)| *id == running.id));
}

// ── Persistence ──────────────────────────────────────────

#[tokio::test]
async fn replay_reproduces_state() {
    let (engine, path) = new_engine("replay.wal");
    let id = area_with_rate(&engine, "Party room", 5000).await;
    engine
        .update_area(
            id,
            AreaPatch {
                name: Some("Event hall".into()),
                ..AreaPatch::default()
            },
        )
        .await
        .unwrap();
    let kept = engine.request_reservation(request(id, date(5), 14 * H, 16 * H)).await.unwrap();
    engine.confirm_reservation(kept.id).await.unwrap();
    let moved = engine.request_reservation(request(id, date(5), 9 * H, 10 * H)).await.unwrap();
    engine
        .reschedule_reservation(moved.id, Some(date(6)), None, Some(11 * H))
        .await
        .unwrap();
    let removed = engine.request_reservation(request(id, date(7), 9 * H, 10 * H)).await.unwrap();
    engine.delete_reservation(removed.id).await.unwrap();
    let doomed = area_with_rate(&engine, "Sauna", 0).await;
    engine.delete_area(doomed).await.unwrap();

    let before = engine.list_reservations(&ReservationFilter::default()).await.unwrap();
    drop(engine);

    let engine = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
    let after = engine.list_reservations(&ReservationFilter::default()).await.unwrap();
    assert_eq!(before, after);
    assert_eq!(engine.list_areas().await.len(), 1);
    assert_eq!(engine.get_area(&id).await.unwrap().config.name, "Event hall");
    assert_eq!(
        engine.get_reservation(&moved.id).await.unwrap().span,
        Span::new(9 * H, 11 * H)
    );

    // Name index survives replay.
    let dup = engine.create_area(Ulid::new(), AreaConfig::new("event HALL")).await;
    assert!(matches!(dup, Err(EngineError::NameTaken(_))));
    engine.create_area(Ulid::new(), AreaConfig::new("Sauna")).await.unwrap();
}

#[tokio::test]
async fn compaction_preserves_state() {
    let (engine, path) = new_engine("compaction.wal");
    let id = area_with_rate(&engine, "Pool", 2000).await;
    let mut expected = Vec::new();
    for hour in 8..20 {
        let r = engine
            .request_reservation(request(id, date(16), hour * H, (hour + 1) * H))
            .await
            .unwrap();
        if hour % 2 == 0 {
            engine.cancel_reservation(r.id, Some("churn".into())).await.unwrap();
        }
        expected.push(r.id);
    }
    assert!(engine.wal_appends_since_compact().await >= 19);

    let before = engine.list_reservations(&ReservationFilter::default()).await.unwrap();
    engine.compact_wal().await.unwrap();
    assert_eq!(engine.wal_appends_since_compact().await, 0);

    // Writes after compaction land in the new file.
    let after_compact = engine
        .request_reservation(request(id, date(17), 8 * H, 9 * H))
        .await
        .unwrap();
    drop(engine);

    let engine = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
    let mut after = engine.list_reservations(&ReservationFilter::default()).await.unwrap();
    assert_eq!(after.pop().map(|r| r.id), Some(after_compact.id));
    assert_eq!(before, after);
    assert_eq!(after.len(), expected.len());
}

#[tokio::test]
async fn writes_after_torn_tail_survive_next_restart() {
    let (engine, path) = new_engine("torn_restart.wal");
    let first = area_with_rate(&engine, "Pool", 0).await;
    drop(engine);

    // Simulate a crash mid-record.
    {
        use std::io::Write;
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&[7u8, 0, 0, 0, 1, 2]).unwrap();
    }

    let engine = Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap();
    assert!(engine.get_area(&first).await.is_ok());
    let second = area_with_rate(&engine, "Gym", 0).await;
    let r = engine
        .request_reservation(request(second, date(20), 9 * H, 10 * H))
        .await
        .unwrap();
    drop(engine);

    let engine = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
    assert_eq!(engine.list_areas().await.len(), 2);
    assert!(engine.get_area(&second).await.is_ok());
    assert_eq!(engine.get_reservation(&r.id).await.unwrap().area_id, second);
}

#[tokio::test]
async fn compaction_waits_for_area_delete() {
    let (engine, path) = new_engine("compact_delete.wal");
    let engine = Arc::new(engine);
    let kept = area_with_rate(&engine, "Pool", 0).await;
    let doomed = area_with_rate(&engine, "Sauna", 0).await;

    // Hold the area so the delete parks between its checks and the WAL append.
    let area = engine.get_area_state(&doomed).unwrap();
    let held = area.read().await;
    let delete = tokio::spawn({
        let engine = engine.clone();
        async move { engine.delete_area(doomed).await }
    });
    tokio::task::yield_now().await;
    let compact = tokio::spawn({
        let engine = engine.clone();
        async move { engine.compact_wal().await }
    });
    tokio::task::yield_now().await;
    drop(held);

    delete.await.unwrap().unwrap();
    compact.await.unwrap().unwrap();
    drop(area);
    drop(engine);

    let engine = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
    assert!(engine.get_area(&kept).await.is_ok());
    assert!(matches!(engine.get_area(&doomed).await, Err(EngineError::NotFound(_))));
    assert_eq!(engine.list_areas().await.len(), 1);
}

#[tokio::test]
async fn compaction_includes_area_created_concurrently() {
    let (engine, path) = new_engine("compact_create.wal");
    let engine = Arc::new(engine);
    let kept = area_with_rate(&engine, "Pool", 0).await;

    let area = engine.get_area_state(&kept).unwrap();
    let held = area.read().await;
    let compact = tokio::spawn({
        let engine = engine.clone();
        async move { engine.compact_wal().await }
    });
    tokio::task::yield_now().await;
    let fresh = Ulid::new();
    let create = tokio::spawn({
        let engine = engine.clone();
        async move { engine.create_area(fresh, AreaConfig::new("Gym")).await }
    });
    tokio::task::yield_now().await;
    drop(held);

    compact.await.unwrap().unwrap();
    create.await.unwrap().unwrap();
    drop(area);
    drop(engine);

    let engine = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
    assert!(engine.get_area(&kept).await.is_ok());
    assert!(engine.get_area(&fresh).await.is_ok());
}

#[tokio::test]
async fn subscribers_see_reservation_events() {
    let (engine, _) = new_engine("notify.wal");
    let id = area_with_rate(&engine, "Pool", 0).await;
    let mut rx = engine.subscribe(id);

    let r = engine.request_reservation(request(id, date(18), 9 * H, 10 * H)).await.unwrap();
    match rx.recv().await.unwrap() {
        Event::ReservationRequested { reservation } => assert_eq!(reservation.id, r.id),
        other => panic!("unexpected event {other:?}"),
    }
    engine.confirm_reservation(r.id).await.unwrap();
    assert_eq!(rx.recv().await.unwrap().kind(), "reservation_status_changed");
}
