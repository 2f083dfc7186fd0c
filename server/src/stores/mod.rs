//! Persistence seams of the three authorities.
//!
//! Each store owns the atomicity its authority needs: overlapping events are
//! rejected at write time, event and booking writes are compare-and-set, and
//! sales are conditional increments keyed by the sale that caused them.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::booking::{Booking, BookingStatus};
use crate::models::event::Event;
use crate::models::schedule::TimeBlock;
use crate::models::ticket::TicketType;
use crate::utils::error::AppError;

pub use memory::{MemoryBookingStore, MemoryEventStore, MemoryTicketStore};
pub use postgres::{PgBookingStore, PgEventStore, PgTicketStore};

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Fails `Conflict` if a non-cancelled event in the same venue/room
    /// overlaps the new one.
    async fn insert(&self, event: &Event) -> Result<(), AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<Event>, AppError>;

    async fn list(&self) -> Result<Vec<Event>, AppError>;

    async fn list_by_venue(&self, venue_id: i64) -> Result<Vec<Event>, AppError>;

    async fn find_overlap(
        &self,
        venue_id: i64,
        room_id: i64,
        window: &TimeBlock,
        exclude: Option<Uuid>,
    ) -> Result<Option<Event>, AppError>;

    /// Replaces the stored event with `next` only while it still equals
    /// `current`. Returns false when the guard failed or the event is gone.
    /// Same overlap rule as `insert`.
    async fn update(&self, current: &Event, next: &Event) -> Result<bool, AppError>;

    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;

    /// Non-cancelled events whose schedule block was never acknowledged.
    async fn list_unsynced(&self) -> Result<Vec<Event>, AppError>;

    /// Flags the event as acknowledged while its venue, room and window are
    /// still the ones that were pushed. False if the event moved meanwhile.
    async fn mark_synced(&self, event: &Event) -> Result<bool, AppError>;
}

/// Result of a conditional change to a ticket type's `sold` count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaleOutcome {
    Applied(TicketType),
    /// The guard did not hold; carries the ticket type as it is now.
    Rejected(TicketType),
    Missing,
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Fails `DuplicateCategory` if the event already has this category.
    async fn insert(&self, ticket: &TicketType) -> Result<(), AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<TicketType>, AppError>;

    async fn list_by_event(&self, event_id: Uuid) -> Result<Vec<TicketType>, AppError>;

    /// Writes category, price, quota and status only while `sold` still
    /// equals `ticket.sold`. Returns `None` when the guard failed.
    async fn update(&self, ticket: &TicketType) -> Result<Option<TicketType>, AppError>;

    /// `sold += quantity` if the type is not closed and `quota - sold >= quantity`,
    /// recorded under `sale` in the same step. A sale already recorded is not
    /// applied twice: the type is returned as it is now.
    async fn commit_sale(
        &self,
        id: Uuid,
        sale: Uuid,
        quantity: i32,
    ) -> Result<SaleOutcome, AppError>;

    /// Undoes the recorded `sale`. An unknown sale is a no-op; one recorded
    /// on another type or with another quantity is `Rejected`.
    async fn release_sale(
        &self,
        id: Uuid,
        sale: Uuid,
        quantity: i32,
    ) -> Result<SaleOutcome, AppError>;

    /// Deletes the ticket type only while nothing is sold.
    async fn delete_unsold(&self, id: Uuid) -> Result<bool, AppError>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert(&self, booking: &Booking) -> Result<(), AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, AppError>;

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Booking>, AppError>;

    /// Moves the booking from `from` to `to`. `None` if it was not in `from`.
    async fn transition(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<Option<Booking>, AppError>;
}
