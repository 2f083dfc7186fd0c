//! In-process stores. Used for development without `DATABASE_URL` and by
//! the test suites; each write holds the map lock for the whole check-and-set.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{BookingStore, EventStore, SaleOutcome, TicketStore};
use crate::models::booking::{Booking, BookingStatus};
use crate::models::event::{Event, EventStatus};
use crate::models::schedule::TimeBlock;
use crate::models::ticket::TicketType;
use crate::utils::error::AppError;

#[derive(Default)]
pub struct MemoryEventStore {
    events: RwLock<HashMap<Uuid, Event>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn overlapping<'a>(
    events: impl Iterator<Item = &'a Event>,
    venue_id: i64,
    room_id: i64,
    window: &TimeBlock,
    exclude: Option<Uuid>,
) -> Option<&'a Event> {
    events
        .filter(|e| e.venue_id == venue_id && e.room_id == room_id)
        .filter(|e| e.status != EventStatus::Cancelled)
        .filter(|e| Some(e.id) != exclude)
        .find(|e| e.window().overlaps(window))
}

fn overlap_conflict(existing: &Event) -> AppError {
    AppError::Conflict(format!(
        "Room already booked from {} (event {})",
        existing.window(),
        existing.id
    ))
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn insert(&self, event: &Event) -> Result<(), AppError> {
        let mut events = self.events.write().await;
        if event.status != EventStatus::Cancelled {
            if let Some(existing) = overlapping(
                events.values(),
                event.venue_id,
                event.room_id,
                &event.window(),
                Some(event.id),
            ) {
                return Err(overlap_conflict(existing));
            }
        }
        events.insert(event.id, event.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Event>, AppError> {
        Ok(self.events.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Event>, AppError> {
        let mut all: Vec<Event> = self.events.read().await.values().cloned().collect();
        all.sort_by_key(|e| e.start_time);
        Ok(all)
    }

    async fn list_by_venue(&self, venue_id: i64) -> Result<Vec<Event>, AppError> {
        let mut matching: Vec<Event> = self
            .events
            .read()
            .await
            .values()
            .filter(|e| e.venue_id == venue_id)
            .cloned()
            .collect();
        matching.sort_by_key(|e| e.start_time);
        Ok(matching)
    }

    async fn find_overlap(
        &self,
        venue_id: i64,
        room_id: i64,
        window: &TimeBlock,
        exclude: Option<Uuid>,
    ) -> Result<Option<Event>, AppError> {
        let events = self.events.read().await;
        Ok(overlapping(events.values(), venue_id, room_id, window, exclude).cloned())
    }

    async fn update(&self, current: &Event, next: &Event) -> Result<bool, AppError> {
        let mut events = self.events.write().await;
        if events.get(&current.id) != Some(current) {
            return Ok(false);
        }
        if next.status != EventStatus::Cancelled {
            if let Some(existing) = overlapping(
                events.values(),
                next.venue_id,
                next.room_id,
                &next.window(),
                Some(next.id),
            ) {
                return Err(overlap_conflict(existing));
            }
        }
        events.insert(next.id, next.clone());
        Ok(true)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.events.write().await.remove(&id).is_some())
    }

    async fn list_unsynced(&self) -> Result<Vec<Event>, AppError> {
        Ok(self
            .events
            .read()
            .await
            .values()
            .filter(|e| !e.schedule_synced && e.status != EventStatus::Cancelled)
            .cloned()
            .collect())
    }

    async fn mark_synced(&self, event: &Event) -> Result<bool, AppError> {
        let mut events = self.events.write().await;
        match events.get_mut(&event.id) {
            Some(stored)
                if stored.venue_id == event.venue_id
                    && stored.room_id == event.room_id
                    && stored.window() == event.window() =>
            {
                stored.schedule_synced = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

struct SaleRecord {
    ticket_type_id: Uuid,
    quantity: i32,
}

#[derive(Default)]
struct TicketTables {
    tickets: HashMap<Uuid, TicketType>,
    sales: HashMap<Uuid, SaleRecord>,
}

#[derive(Default)]
pub struct MemoryTicketStore {
    tables: RwLock<TicketTables>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn insert(&self, ticket: &TicketType) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let duplicate = tables
            .tickets
            .values()
            .any(|t| t.event_id == ticket.event_id && t.category == ticket.category);
        if duplicate {
            return Err(AppError::DuplicateCategory(ticket.category));
        }
        tables.tickets.insert(ticket.id, ticket.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<TicketType>, AppError> {
        Ok(self.tables.read().await.tickets.get(&id).cloned())
    }

    async fn list_by_event(&self, event_id: Uuid) -> Result<Vec<TicketType>, AppError> {
        let mut matching: Vec<TicketType> = self
            .tables
            .read()
            .await
            .tickets
            .values()
            .filter(|t| t.event_id == event_id)
            .cloned()
            .collect();
        matching.sort_by_key(|t| t.category.as_str());
        Ok(matching)
    }

    async fn update(&self, ticket: &TicketType) -> Result<Option<TicketType>, AppError> {
        let mut tables = self.tables.write().await;
        let duplicate = tables.tickets.values().any(|t| {
            t.id != ticket.id && t.event_id == ticket.event_id && t.category == ticket.category
        });
        if duplicate {
            return Err(AppError::DuplicateCategory(ticket.category));
        }
        match tables.tickets.get_mut(&ticket.id) {
            Some(current) if current.sold == ticket.sold => {
                current.category = ticket.category;
                current.price = ticket.price;
                current.quota = ticket.quota;
                current.status = ticket.status;
                Ok(Some(current.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn commit_sale(
        &self,
        id: Uuid,
        sale: Uuid,
        quantity: i32,
    ) -> Result<SaleOutcome, AppError> {
        let mut tables = self.tables.write().await;
        let TicketTables { tickets, sales } = &mut *tables;
        let Some(ticket) = tickets.get_mut(&id) else {
            return Ok(SaleOutcome::Missing);
        };
        if sales.contains_key(&sale) {
            return Ok(SaleOutcome::Applied(ticket.clone()));
        }
        if ticket.is_closed() || ticket.quota - ticket.sold < quantity {
            return Ok(SaleOutcome::Rejected(ticket.clone()));
        }
        ticket.sold += quantity;
        ticket.status = ticket.status.derive(ticket.sold, ticket.quota);
        sales.insert(
            sale,
            SaleRecord {
                ticket_type_id: id,
                quantity,
            },
        );
        Ok(SaleOutcome::Applied(ticket.clone()))
    }

    async fn release_sale(
        &self,
        id: Uuid,
        sale: Uuid,
        quantity: i32,
    ) -> Result<SaleOutcome, AppError> {
        let mut tables = self.tables.write().await;
        let TicketTables { tickets, sales } = &mut *tables;
        let Some(ticket) = tickets.get_mut(&id) else {
            return Ok(SaleOutcome::Missing);
        };
        match sales.get(&sale) {
            None => return Ok(SaleOutcome::Applied(ticket.clone())),
            Some(record) if record.ticket_type_id != id || record.quantity != quantity => {
                return Ok(SaleOutcome::Rejected(ticket.clone()))
            }
            Some(_) => {}
        }
        if ticket.sold < quantity {
            return Ok(SaleOutcome::Rejected(ticket.clone()));
        }
        ticket.sold -= quantity;
        ticket.status = ticket.status.derive(ticket.sold, ticket.quota);
        sales.remove(&sale);
        Ok(SaleOutcome::Applied(ticket.clone()))
    }

    async fn delete_unsold(&self, id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        match tables.tickets.get(&id) {
            Some(ticket) if ticket.sold == 0 => {
                tables.tickets.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct MemoryBookingStore {
    bookings: RwLock<HashMap<Uuid, Booking>>,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingStore for MemoryBookingStore {
    async fn insert(&self, booking: &Booking) -> Result<(), AppError> {
        self.bookings
            .write()
            .await
            .insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, AppError> {
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Booking>, AppError> {
        let mut owned: Vec<Booking> = self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by_key(|b| b.created_at);
        Ok(owned)
    }

    async fn transition(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<Option<Booking>, AppError> {
        let mut bookings = self.bookings.write().await;
        match bookings.get_mut(&id) {
            Some(booking) if booking.status == from => {
                booking.status = to;
                booking.updated_at = Utc::now();
                Ok(Some(booking.clone()))
            }
            _ => Ok(None),
        }
    }
}
