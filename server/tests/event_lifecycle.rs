mod common;

use std::sync::atomic::Ordering;

use common::{admin, at, new_event, user, Platform};
use eventhub_server::models::event::{EventChanges, EventStatus};
use eventhub_server::utils::error::AppError;

#[tokio::test]
async fn test_room_overlap_is_half_open() {
    let platform = Platform::new(80);
    platform.events.create(&admin(), new_event(4, 10, 12)).await.unwrap();

    for (start, end) in [(11, 13), (9, 11), (10, 12), (9, 13)] {
        assert!(
            matches!(
                platform.events.create(&admin(), new_event(4, start, end)).await,
                Err(AppError::Conflict(_))
            ),
            "{start}-{end} should conflict"
        );
    }
    assert!(platform.events.create(&admin(), new_event(4, 12, 14)).await.is_ok());
    assert!(platform.events.create(&admin(), new_event(4, 8, 10)).await.is_ok());
}

#[tokio::test]
async fn test_only_admins_manage_events() {
    let platform = Platform::new(80);
    assert!(matches!(
        platform.events.create(&user("u1"), new_event(1, 10, 12)).await,
        Err(AppError::Forbidden(_))
    ));

    let event = platform.scheduled_event(1).await;
    assert!(matches!(
        platform.events.delete(&user("u1"), event.id).await,
        Err(AppError::Forbidden(_))
    ));
}

#[tokio::test]
async fn test_completed_event_cannot_change_time() {
    let platform = Platform::new(80);
    let event = platform.scheduled_event(1).await;
    for next in [EventStatus::Ongoing, EventStatus::Completed] {
        platform
            .events
            .transition_status(&admin(), event.id, next)
            .await
            .unwrap();
    }

    let earlier = EventChanges {
        start_time: Some(at(1, 8)),
        ..Default::default()
    };
    assert!(matches!(
        platform.events.update(&admin(), event.id, earlier).await,
        Err(AppError::Immutable(_))
    ));
}

#[tokio::test]
async fn test_sync_failure_is_reported_and_reconciled() {
    let platform = Platform::new(80);
    platform.schedule.refuse_blocks.store(true, Ordering::SeqCst);

    let err = platform
        .events
        .create(&admin(), new_event(2, 10, 12))
        .await
        .unwrap_err();
    let event_id = match &err {
        AppError::SyncFailed { event_id, .. } => *event_id,
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(err.code(), "SYNC_FAILED");
    assert_eq!(
        err.details(),
        Some(serde_json::json!({ "eventId": event_id }))
    );

    // the local commit stands and still guards the room
    assert!(matches!(
        platform.events.create(&admin(), new_event(2, 11, 13)).await,
        Err(AppError::Conflict(_))
    ));

    platform.schedule.refuse_blocks.store(false, Ordering::SeqCst);
    let report = platform.events.reconcile(&admin()).await.unwrap();
    assert_eq!(report.synced, vec![event_id]);
    assert!(report.pending.is_empty());
    assert!(platform.events.get(event_id).await.unwrap().schedule_synced);
}

#[tokio::test]
async fn test_venue_listing() {
    let platform = Platform::new(80);
    platform.scheduled_event(1).await;
    let mut elsewhere = new_event(1, 10, 12);
    elsewhere.venue_id = 9;
    platform.events.create(&admin(), elsewhere).await.unwrap();

    assert_eq!(platform.events.list().await.unwrap().len(), 2);
    assert_eq!(platform.events.list_by_venue(9).await.unwrap().len(), 1);
}
