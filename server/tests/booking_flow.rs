mod common;

use std::sync::Arc;

use rust_decimal::Decimal;

use common::{admin, user, Platform};
use eventhub_server::models::booking::{BookingStatus, NewBooking};
use eventhub_server::models::event::EventStatus;
use eventhub_server::models::ticket::{TicketCategory, TicketStatus};
use eventhub_server::utils::error::AppError;

#[tokio::test]
async fn test_last_ticket_scenario() {
    let platform = Platform::new(100);
    let event = platform.scheduled_event(1).await;
    assert_eq!(event.venue_capacity, 100);

    let price = Decimal::new(7500000, 2);
    let regular = platform
        .ticket_type(event.id, TicketCategory::Regular, price, 100)
        .await;
    platform.sell(regular.id, 99).await;

    let request = |quantity| NewBooking {
        event_id: event.id,
        ticket_type_id: regular.id,
        quantity,
    };

    match platform.bookings.create(&user("u1"), request(2)).await {
        Err(AppError::InsufficientQuota {
            requested,
            remaining,
        }) => assert_eq!((requested, remaining), (2, 1)),
        other => panic!("unexpected {other:?}"),
    }
    assert!(platform
        .bookings
        .list_by_user(&user("u1"), "u1")
        .await
        .unwrap()
        .is_empty());

    let booking = platform.bookings.create(&user("u1"), request(1)).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.total_price, price);

    let paid = platform
        .bookings
        .confirm_payment(&user("u1"), booking.id)
        .await
        .unwrap();
    assert_eq!(paid.status, BookingStatus::Paid);

    let ticket = platform.tickets.get(regular.id).await.unwrap();
    assert_eq!(ticket.sold, 100);
    assert_eq!(ticket.status, TicketStatus::SoldOut);

    assert!(matches!(
        platform.bookings.confirm_payment(&user("u1"), booking.id).await,
        Err(AppError::InvalidState(_))
    ));
    assert_eq!(platform.tickets.get(regular.id).await.unwrap().sold, 100);
}

#[tokio::test]
async fn test_price_snapshot_survives_price_change() {
    let platform = Platform::new(50);
    let event = platform.scheduled_event(1).await;
    let vip = platform
        .ticket_type(event.id, TicketCategory::Vip, Decimal::new(100, 0), 10)
        .await;

    let booking = platform
        .bookings
        .create(
            &user("u1"),
            NewBooking {
                event_id: event.id,
                ticket_type_id: vip.id,
                quantity: 2,
            },
        )
        .await
        .unwrap();

    let changes = eventhub_server::models::ticket::TicketChanges {
        price: Some(Decimal::new(150, 0)),
        ..Default::default()
    };
    platform.tickets.update(&admin(), vip.id, changes).await.unwrap();

    let paid = platform
        .bookings
        .confirm_payment(&user("u1"), booking.id)
        .await
        .unwrap();
    assert_eq!(paid.total_price, Decimal::new(200, 0));
}

#[tokio::test]
async fn test_cancelled_event_refuses_bookings() {
    let platform = Platform::new(50);
    let event = platform.scheduled_event(1).await;
    let regular = platform
        .ticket_type(event.id, TicketCategory::Regular, Decimal::new(10, 0), 10)
        .await;
    platform
        .events
        .transition_status(&admin(), event.id, EventStatus::Cancelled)
        .await
        .unwrap();

    let result = platform
        .bookings
        .create(
            &user("u1"),
            NewBooking {
                event_id: event.id,
                ticket_type_id: regular.id,
                quantity: 1,
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::NotEligible(_))));

    let late = platform
        .tickets
        .create(
            &admin(),
            eventhub_server::models::ticket::NewTicketType {
                event_id: event.id,
                category: TicketCategory::Vip,
                price: Decimal::new(10, 0),
                quota: 1,
            },
        )
        .await;
    assert!(matches!(late, Err(AppError::EventNotBookable(_))));
}

#[tokio::test]
async fn test_quotas_cannot_exceed_room_capacity() {
    let platform = Platform::new(100);
    let event = platform.scheduled_event(1).await;
    platform
        .ticket_type(event.id, TicketCategory::Vip, Decimal::new(10, 0), 60)
        .await;

    let over = platform
        .tickets
        .create(
            &admin(),
            eventhub_server::models::ticket::NewTicketType {
                event_id: event.id,
                category: TicketCategory::Regular,
                price: Decimal::new(10, 0),
                quota: 41,
            },
        )
        .await;
    assert!(matches!(over, Err(AppError::CapacityExceeded { .. })));
    assert_eq!(platform.tickets.list_by_event(event.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_confirmations_never_oversell() {
    let platform = Arc::new(Platform::new(100));
    let event = platform.scheduled_event(1).await;
    let regular = platform
        .ticket_type(event.id, TicketCategory::Regular, Decimal::new(10, 0), 1)
        .await;

    let mut bookings = Vec::new();
    for n in 0..8 {
        let owner = format!("user-{n}");
        let booking = platform
            .bookings
            .create(
                &user(&owner),
                NewBooking {
                    event_id: event.id,
                    ticket_type_id: regular.id,
                    quantity: 1,
                },
            )
            .await
            .unwrap();
        bookings.push((owner, booking.id));
    }

    let mut handles = Vec::new();
    for (owner, id) in bookings {
        let platform = platform.clone();
        handles.push(tokio::spawn(async move {
            platform.bookings.confirm_payment(&user(&owner), id).await
        }));
    }

    let mut paid = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => paid += 1,
            Err(AppError::ConfirmationFailed(_)) => {}
            Err(other) => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(paid, 1);
    assert_eq!(platform.tickets.get(regular.id).await.unwrap().sold, 1);
}

#[tokio::test]
async fn test_cancel_after_payment_returns_quota() {
    let platform = Platform::new(100);
    let event = platform.scheduled_event(1).await;
    let regular = platform
        .ticket_type(event.id, TicketCategory::Regular, Decimal::new(10, 0), 3)
        .await;

    let booking = platform
        .bookings
        .create(
            &user("u1"),
            NewBooking {
                event_id: event.id,
                ticket_type_id: regular.id,
                quantity: 3,
            },
        )
        .await
        .unwrap();
    platform
        .bookings
        .confirm_payment(&user("u1"), booking.id)
        .await
        .unwrap();
    assert_eq!(
        platform.tickets.get(regular.id).await.unwrap().status,
        TicketStatus::SoldOut
    );

    let cancelled = platform.bookings.cancel(&user("u1"), booking.id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    let ticket = platform.tickets.get(regular.id).await.unwrap();
    assert_eq!(ticket.sold, 0);
    assert_eq!(ticket.status, TicketStatus::Open);
}
