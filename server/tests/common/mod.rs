#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use eventhub_server::app::Authorities;
use eventhub_server::auth::{Caller, Claims, Role, TokenKeys};
use eventhub_server::models::event::{Event, NewEvent};
use eventhub_server::models::schedule::{RoomInfo, TimeBlock};
use eventhub_server::models::ticket::{NewTicketType, TicketCategory, TicketType};
use eventhub_server::services::{
    BookingService, EventService, LocalQuotaLedger, ScheduleAuthority, TicketService,
};
use eventhub_server::stores::{MemoryBookingStore, MemoryEventStore, MemoryTicketStore};
use eventhub_server::utils::error::AppError;

pub const SECRET: &str = "integration-secret";

/// Every room exists with the configured capacity; blocks can be refused.
pub struct FakeSchedule {
    pub capacity: i32,
    pub refuse_blocks: AtomicBool,
}

impl FakeSchedule {
    pub fn with_capacity(capacity: i32) -> Self {
        Self {
            capacity,
            refuse_blocks: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ScheduleAuthority for FakeSchedule {
    async fn validate_room(
        &self,
        venue_id: i64,
        room_id: i64,
        _window: &TimeBlock,
        _exclude: Option<Uuid>,
    ) -> Result<RoomInfo, AppError> {
        Ok(RoomInfo {
            venue_id,
            room_id,
            name: Some("Main Hall".to_string()),
            capacity: self.capacity,
        })
    }

    async fn block_schedule(&self, _room_id: i64, _window: &TimeBlock) -> Result<(), AppError> {
        if self.refuse_blocks.load(Ordering::SeqCst) {
            return Err(AppError::UpstreamUnavailable(
                "schedule authority unreachable".to_string(),
            ));
        }
        Ok(())
    }
}

/// All three authorities wired in-process over memory stores.
pub struct Platform {
    pub schedule: Arc<FakeSchedule>,
    pub events: Arc<EventService>,
    pub tickets: Arc<TicketService>,
    pub bookings: Arc<BookingService>,
}

impl Platform {
    pub fn new(room_capacity: i32) -> Self {
        let schedule = Arc::new(FakeSchedule::with_capacity(room_capacity));
        let events = Arc::new(EventService::new(
            Arc::new(MemoryEventStore::new()),
            schedule.clone(),
        ));
        let tickets = Arc::new(TicketService::new(
            Arc::new(MemoryTicketStore::new()),
            events.clone(),
        ));
        let bookings = Arc::new(BookingService::new(
            Arc::new(MemoryBookingStore::new()),
            events.clone(),
            Arc::new(LocalQuotaLedger::new(tickets.clone(), "booking-service")),
        ));
        Self {
            schedule,
            events,
            tickets,
            bookings,
        }
    }

    pub fn authorities(&self) -> Authorities {
        Authorities {
            keys: Arc::new(TokenKeys::new(SECRET)),
            events: Some(self.events.clone()),
            tickets: Some(self.tickets.clone()),
            bookings: Some(self.bookings.clone()),
        }
    }

    pub async fn scheduled_event(&self, room_id: i64) -> Event {
        self.events
            .create(&admin(), new_event(room_id, 10, 12))
            .await
            .expect("event is created")
    }

    pub async fn ticket_type(
        &self,
        event_id: Uuid,
        category: TicketCategory,
        price: Decimal,
        quota: i32,
    ) -> TicketType {
        self.tickets
            .create(
                &admin(),
                NewTicketType {
                    event_id,
                    category,
                    price,
                    quota,
                },
            )
            .await
            .expect("ticket type is created")
    }

    pub async fn sell(&self, ticket_id: Uuid, quantity: i32) {
        self.tickets
            .commit_sale(&service(), ticket_id, Uuid::new_v4(), quantity)
            .await
            .expect("sale is committed");
    }
}

pub fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 10, day)
        .and_then(|d| d.and_hms_opt(hour, 0, 0))
        .expect("valid timestamp")
}

pub fn new_event(room_id: i64, start_hour: u32, end_hour: u32) -> NewEvent {
    NewEvent {
        title: "Rust Meetup".to_string(),
        description: Some("Monthly meetup".to_string()),
        venue_id: 1,
        room_id,
        start_time: at(1, start_hour),
        end_time: at(1, end_hour),
    }
}

fn caller(sub: &str, role: Role) -> Caller {
    Caller::from_claims(Claims {
        sub: sub.to_string(),
        role,
        exp: 0,
    })
}

pub fn admin() -> Caller {
    caller("admin-1", Role::Admin)
}

pub fn user(sub: &str) -> Caller {
    caller(sub, Role::User)
}

pub fn service() -> Caller {
    caller("booking-service", Role::Service)
}

pub fn token(sub: &str, role: Role) -> String {
    TokenKeys::new(SECRET)
        .issue(sub, role, Duration::from_secs(300))
        .expect("token is signed")
}
