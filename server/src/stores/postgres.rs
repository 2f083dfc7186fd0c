use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{BookingStore, EventStore, SaleOutcome, TicketStore};
use crate::models::booking::{Booking, BookingStatus};
use crate::models::event::Event;
use crate::models::schedule::TimeBlock;
use crate::models::ticket::TicketType;
use crate::utils::error::AppError;

const UNIQUE_VIOLATION: &str = "23505";
const EXCLUSION_VIOLATION: &str = "23P01";
const FOREIGN_KEY_VIOLATION: &str = "23503";

fn violation_code(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|code| code.into_owned()),
        _ => None,
    }
}

#[derive(FromRow)]
struct EventRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    venue_id: i64,
    room_id: i64,
    start_time: NaiveDateTime,
    end_time: NaiveDateTime,
    status: String,
    venue_capacity: i32,
    schedule_synced: bool,
}

impl TryFrom<EventRow> for Event {
    type Error = AppError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Event {
            id: row.id,
            title: row.title,
            description: row.description,
            venue_id: row.venue_id,
            room_id: row.room_id,
            start_time: row.start_time,
            end_time: row.end_time,
            status: row.status.parse()?,
            venue_capacity: row.venue_capacity,
            schedule_synced: row.schedule_synced,
        })
    }
}

fn events_from(rows: Vec<EventRow>) -> Result<Vec<Event>, AppError> {
    rows.into_iter().map(Event::try_from).collect()
}

const EVENT_COLUMNS: &str = "id, title, description, venue_id, room_id, start_time, end_time, \
                             status, venue_capacity, schedule_synced";

pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_event_write(err: sqlx::Error) -> AppError {
    if violation_code(&err).as_deref() == Some(EXCLUSION_VIOLATION) {
        AppError::Conflict("Room already booked for an overlapping time window".to_string())
    } else {
        AppError::Database(err)
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn insert(&self, event: &Event) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO events (id, title, description, venue_id, room_id, start_time, end_time, \
             status, venue_capacity, schedule_synced) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(event.id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.venue_id)
        .bind(event.room_id)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(event.status.as_str())
        .bind(event.venue_capacity)
        .bind(event.schedule_synced)
        .execute(&self.pool)
        .await
        .map_err(map_event_write)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Event>, AppError> {
        sqlx::query_as::<_, EventRow>(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Event::try_from)
            .transpose()
    }

    async fn list(&self) -> Result<Vec<Event>, AppError> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events ORDER BY start_time"
        ))
        .fetch_all(&self.pool)
        .await?;
        events_from(rows)
    }

    async fn list_by_venue(&self, venue_id: i64) -> Result<Vec<Event>, AppError> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE venue_id = $1 ORDER BY start_time"
        ))
        .bind(venue_id)
        .fetch_all(&self.pool)
        .await?;
        events_from(rows)
    }

    async fn find_overlap(
        &self,
        venue_id: i64,
        room_id: i64,
        window: &TimeBlock,
        exclude: Option<Uuid>,
    ) -> Result<Option<Event>, AppError> {
        sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE venue_id = $1 AND room_id = $2 AND status <> 'CANCELLED' \
               AND ($5::uuid IS NULL OR id <> $5) \
               AND start_time < $4 AND end_time > $3 \
             LIMIT 1"
        ))
        .bind(venue_id)
        .bind(room_id)
        .bind(window.start)
        .bind(window.end)
        .bind(exclude)
        .fetch_optional(&self.pool)
        .await?
        .map(Event::try_from)
        .transpose()
    }

    async fn update(&self, current: &Event, next: &Event) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE events SET title = $2, description = $3, venue_id = $4, room_id = $5, \
             start_time = $6, end_time = $7, status = $8, venue_capacity = $9, \
             schedule_synced = $10, updated_at = now() \
             WHERE id = $1 AND title = $11 AND description IS NOT DISTINCT FROM $12 \
               AND venue_id = $13 AND room_id = $14 AND start_time = $15 AND end_time = $16 \
               AND status = $17 AND venue_capacity = $18 AND schedule_synced = $19",
        )
        .bind(next.id)
        .bind(&next.title)
        .bind(&next.description)
        .bind(next.venue_id)
        .bind(next.room_id)
        .bind(next.start_time)
        .bind(next.end_time)
        .bind(next.status.as_str())
        .bind(next.venue_capacity)
        .bind(next.schedule_synced)
        .bind(&current.title)
        .bind(&current.description)
        .bind(current.venue_id)
        .bind(current.room_id)
        .bind(current.start_time)
        .bind(current.end_time)
        .bind(current.status.as_str())
        .bind(current.venue_capacity)
        .bind(current.schedule_synced)
        .execute(&self.pool)
        .await
        .map_err(map_event_write)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_unsynced(&self) -> Result<Vec<Event>, AppError> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE NOT schedule_synced AND status <> 'CANCELLED' ORDER BY start_time"
        ))
        .fetch_all(&self.pool)
        .await?;
        events_from(rows)
    }

    async fn mark_synced(&self, event: &Event) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE events SET schedule_synced = TRUE, updated_at = now() \
             WHERE id = $1 AND venue_id = $2 AND room_id = $3 \
               AND start_time = $4 AND end_time = $5",
        )
        .bind(event.id)
        .bind(event.venue_id)
        .bind(event.room_id)
        .bind(event.start_time)
        .bind(event.end_time)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(FromRow)]
struct TicketRow {
    id: Uuid,
    event_id: Uuid,
    category: String,
    price: Decimal,
    quota: i32,
    sold: i32,
    status: String,
}

impl TryFrom<TicketRow> for TicketType {
    type Error = AppError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        Ok(TicketType {
            id: row.id,
            event_id: row.event_id,
            category: row.category.parse()?,
            price: row.price,
            quota: row.quota,
            sold: row.sold,
            status: row.status.parse()?,
        })
    }
}

const TICKET_COLUMNS: &str = "id, event_id, category, price, quota, sold, status";

pub struct PgTicketStore {
    pool: PgPool,
}

impl PgTicketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<TicketType>, AppError> {
        sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM ticket_types WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(TicketType::try_from)
        .transpose()
    }

    /// The type as it is now, for a sale that changed nothing.
    async fn unchanged(
        &self,
        id: Uuid,
        found: fn(TicketType) -> SaleOutcome,
    ) -> Result<SaleOutcome, AppError> {
        Ok(match self.fetch(id).await? {
            Some(current) => found(current),
            None => SaleOutcome::Missing,
        })
    }
}

fn map_ticket_write(err: sqlx::Error, ticket: &TicketType) -> AppError {
    if violation_code(&err).as_deref() == Some(UNIQUE_VIOLATION) {
        AppError::DuplicateCategory(ticket.category)
    } else {
        AppError::Database(err)
    }
}

#[async_trait]
impl TicketStore for PgTicketStore {
    async fn insert(&self, ticket: &TicketType) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO ticket_types (id, event_id, category, price, quota, sold, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(ticket.id)
        .bind(ticket.event_id)
        .bind(ticket.category.as_str())
        .bind(ticket.price)
        .bind(ticket.quota)
        .bind(ticket.sold)
        .bind(ticket.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| map_ticket_write(e, ticket))?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<TicketType>, AppError> {
        self.fetch(id).await
    }

    async fn list_by_event(&self, event_id: Uuid) -> Result<Vec<TicketType>, AppError> {
        sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM ticket_types WHERE event_id = $1 ORDER BY category"
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(TicketType::try_from)
        .collect()
    }

    async fn update(&self, ticket: &TicketType) -> Result<Option<TicketType>, AppError> {
        sqlx::query_as::<_, TicketRow>(&format!(
            "UPDATE ticket_types SET category = $2, price = $3, quota = $4, status = $5, \
             updated_at = now() \
             WHERE id = $1 AND sold = $6 \
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(ticket.id)
        .bind(ticket.category.as_str())
        .bind(ticket.price)
        .bind(ticket.quota)
        .bind(ticket.status.as_str())
        .bind(ticket.sold)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_ticket_write(e, ticket))?
        .map(TicketType::try_from)
        .transpose()
    }

    async fn commit_sale(
        &self,
        id: Uuid,
        sale: Uuid,
        quantity: i32,
    ) -> Result<SaleOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        // A concurrent commit of the same sale blocks here until it finishes.
        let recorded = sqlx::query(
            "INSERT INTO ticket_sales (sale_id, ticket_type_id, quantity) \
             VALUES ($1, $2, $3) ON CONFLICT (sale_id) DO NOTHING",
        )
        .bind(sale)
        .bind(id)
        .bind(quantity)
        .execute(&mut *tx)
        .await;
        match recorded {
            Ok(done) if done.rows_affected() == 0 => {
                tx.rollback().await?;
                return self.unchanged(id, SaleOutcome::Applied).await;
            }
            Ok(_) => {}
            Err(e) if violation_code(&e).as_deref() == Some(FOREIGN_KEY_VIOLATION) => {
                return Ok(SaleOutcome::Missing);
            }
            Err(e) => return Err(e.into()),
        }

        let applied = sqlx::query_as::<_, TicketRow>(&format!(
            "UPDATE ticket_types \
             SET sold = sold + $2, \
                 status = CASE WHEN sold + $2 >= quota THEN 'SOLD_OUT' ELSE status END, \
                 updated_at = now() \
             WHERE id = $1 AND status <> 'CLOSED' AND quota - sold >= $2 \
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(id)
        .bind(quantity)
        .fetch_optional(&mut *tx)
        .await?;

        match applied {
            Some(row) => {
                tx.commit().await?;
                Ok(SaleOutcome::Applied(row.try_into()?))
            }
            None => {
                tx.rollback().await?;
                self.unchanged(id, SaleOutcome::Rejected).await
            }
        }
    }

    async fn release_sale(
        &self,
        id: Uuid,
        sale: Uuid,
        quantity: i32,
    ) -> Result<SaleOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        let record: Option<(Uuid, i32)> = sqlx::query_as(
            "SELECT ticket_type_id, quantity FROM ticket_sales WHERE sale_id = $1 FOR UPDATE",
        )
        .bind(sale)
        .fetch_optional(&mut *tx)
        .await?;
        match record {
            None => {
                tx.rollback().await?;
                return self.unchanged(id, SaleOutcome::Applied).await;
            }
            Some((ticket_type_id, recorded)) if ticket_type_id != id || recorded != quantity => {
                tx.rollback().await?;
                return self.unchanged(id, SaleOutcome::Rejected).await;
            }
            Some(_) => {}
        }

        let applied = sqlx::query_as::<_, TicketRow>(&format!(
            "UPDATE ticket_types \
             SET sold = sold - $2, \
                 status = CASE WHEN status = 'SOLD_OUT' AND sold - $2 < quota THEN 'OPEN' \
                               ELSE status END, \
                 updated_at = now() \
             WHERE id = $1 AND sold >= $2 \
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(id)
        .bind(quantity)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = applied else {
            tx.rollback().await?;
            return self.unchanged(id, SaleOutcome::Rejected).await;
        };

        sqlx::query("DELETE FROM ticket_sales WHERE sale_id = $1")
            .bind(sale)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(SaleOutcome::Applied(row.try_into()?))
    }

    async fn delete_unsold(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM ticket_types WHERE id = $1 AND sold = 0")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(FromRow)]
struct BookingRow {
    id: Uuid,
    event_id: Uuid,
    user_id: String,
    ticket_type_id: Uuid,
    quantity: i32,
    total_price: Decimal,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = AppError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            event_id: row.event_id,
            user_id: row.user_id,
            ticket_type_id: row.ticket_type_id,
            quantity: row.quantity,
            total_price: row.total_price,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const BOOKING_COLUMNS: &str =
    "id, event_id, user_id, ticket_type_id, quantity, total_price, status, created_at, updated_at";

pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn insert(&self, booking: &Booking) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO bookings (id, event_id, user_id, ticket_type_id, quantity, total_price, \
             status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(booking.id)
        .bind(booking.event_id)
        .bind(&booking.user_id)
        .bind(booking.ticket_type_id)
        .bind(booking.quantity)
        .bind(booking.total_price)
        .bind(booking.status.as_str())
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, AppError> {
        sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Booking::try_from)
        .transpose()
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Booking>, AppError> {
        sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = $1 ORDER BY created_at"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Booking::try_from)
        .collect()
    }

    async fn transition(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<Option<Booking>, AppError> {
        sqlx::query_as::<_, BookingRow>(&format!(
            "UPDATE bookings SET status = $3, updated_at = now() \
             WHERE id = $1 AND status = $2 \
             RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(Booking::try_from)
        .transpose()
    }
}
