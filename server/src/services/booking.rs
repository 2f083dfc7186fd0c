//! Reservation orchestrator.
//!
//! A booking is created PENDING after the event and quota were checked
//! remotely, becomes PAID only after the quota ledger committed the sale, and
//! becomes CANCELLED only after any committed sale was released again.
//! Confirm and cancel on the same booking id are serialized.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::peers::{EventDirectory, QuotaLedger};
use crate::auth::{Caller, Claims};
use crate::models::booking::{Booking, BookingStatus, NewBooking};
use crate::stores::BookingStore;
use crate::utils::error::AppError;

/// Per-booking async locks. Entries nobody holds are pruned on the next
/// acquire.
#[derive(Default)]
struct BookingLocks {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl BookingLocks {
    async fn acquire(&self, id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub struct BookingService {
    store: Arc<dyn BookingStore>,
    events: Arc<dyn EventDirectory>,
    ledger: Arc<dyn QuotaLedger>,
    locks: BookingLocks,
}

fn ensure_owner_or_admin(claims: &Claims, booking: &Booking) -> Result<(), AppError> {
    if booking.user_id != claims.sub && !claims.is_admin() {
        return Err(AppError::Forbidden(
            "Booking belongs to another user".to_string(),
        ));
    }
    Ok(())
}

impl BookingService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        events: Arc<dyn EventDirectory>,
        ledger: Arc<dyn QuotaLedger>,
    ) -> Self {
        Self {
            store,
            events,
            ledger,
            locks: BookingLocks::default(),
        }
    }

    async fn load(&self, id: Uuid) -> Result<Booking, AppError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking {id} not found")))
    }

    pub async fn get(&self, caller: &Caller, id: Uuid) -> Result<Booking, AppError> {
        let claims = caller.identity()?;
        let booking = self.load(id).await?;
        ensure_owner_or_admin(claims, &booking)?;
        Ok(booking)
    }

    pub async fn list_by_user(&self, caller: &Caller, user_id: &str) -> Result<Vec<Booking>, AppError> {
        let claims = caller.identity()?;
        if claims.sub != user_id && !claims.is_admin() {
            return Err(AppError::Forbidden(
                "Bookings of another user are not visible".to_string(),
            ));
        }
        self.store.list_by_user(user_id).await
    }

    /// Quota is only checked here; `confirm_payment` is where it is taken.
    pub async fn create(&self, caller: &Caller, input: NewBooking) -> Result<Booking, AppError> {
        let claims = caller.identity()?;
        if input.quantity <= 0 {
            return Err(AppError::Validation(
                "Quantity must be greater than zero".to_string(),
            ));
        }

        let event = self
            .events
            .fetch_event(input.event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", input.event_id)))?;
        if !event.status.accepts_bookings() {
            return Err(AppError::NotEligible(format!(
                "Event '{}' is {} and does not accept bookings",
                event.title, event.status
            )));
        }

        let ticket = self
            .ledger
            .ticket_types_by_event(input.event_id)
            .await?
            .into_iter()
            .find(|t| t.id == input.ticket_type_id && t.event_id == input.event_id)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Ticket type {} not found for event {}",
                    input.ticket_type_id, input.event_id
                ))
            })?;
        if ticket.is_closed() {
            return Err(AppError::InvalidState(format!(
                "Ticket type {} is closed",
                ticket.id
            )));
        }
        if ticket.remaining() < input.quantity {
            return Err(AppError::InsufficientQuota {
                requested: input.quantity,
                remaining: ticket.remaining(),
            });
        }

        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            event_id: input.event_id,
            user_id: claims.sub.clone(),
            ticket_type_id: ticket.id,
            quantity: input.quantity,
            total_price: ticket.price * Decimal::from(input.quantity),
            status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&booking).await?;
        info!(
            booking_id = %booking.id,
            event_id = %booking.event_id,
            ticket_type_id = %booking.ticket_type_id,
            quantity = booking.quantity,
            user_id = %booking.user_id,
            "Booking created"
        );
        Ok(booking)
    }

    pub async fn confirm_payment(&self, caller: &Caller, id: Uuid) -> Result<Booking, AppError> {
        let claims = caller.identity()?;
        let _guard = self.locks.acquire(id).await;

        let booking = self.load(id).await?;
        if booking.user_id != claims.sub {
            return Err(AppError::Forbidden(
                "Only the owner can pay for a booking".to_string(),
            ));
        }
        if booking.status != BookingStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "Booking is {}, only PENDING bookings can be paid",
                booking.status
            )));
        }

        if let Err(e) = self
            .ledger
            .commit_sale(booking.ticket_type_id, booking.id, booking.quantity)
            .await
        {
            // the sale may still have been applied; a retry reuses the booking id as its key
            warn!(booking_id = %id, error = %e, "Sale was not confirmed, booking stays PENDING");
            return Err(AppError::ConfirmationFailed(e.to_string()));
        }

        let failure = match self
            .store
            .transition(id, BookingStatus::Pending, BookingStatus::Paid)
            .await
        {
            Ok(Some(paid)) => {
                info!(
                    booking_id = %id,
                    ticket_type_id = %paid.ticket_type_id,
                    quantity = paid.quantity,
                    "Booking PENDING -> PAID"
                );
                return Ok(paid);
            }
            Ok(None) => AppError::InvalidState(
                "Booking changed while the payment was being confirmed".to_string(),
            ),
            Err(e) => e,
        };

        // The sale is committed but the booking is not PAID: give the units back.
        self.release(&booking).await?;
        Err(failure)
    }

    pub async fn cancel(&self, caller: &Caller, id: Uuid) -> Result<Booking, AppError> {
        let claims = caller.identity()?;
        let _guard = self.locks.acquire(id).await;

        let booking = self.load(id).await?;
        ensure_owner_or_admin(claims, &booking)?;

        let from = booking.status;
        match from {
            BookingStatus::Cancelled => {
                return Err(AppError::InvalidState(
                    "Booking is already CANCELLED".to_string(),
                ))
            }
            BookingStatus::Paid => self.release(&booking).await?,
            BookingStatus::Pending => {
                // a confirm that failed after the ledger applied it leaves a sale behind
                if let Err(e) = self.release(&booking).await {
                    warn!(
                        booking_id = %id,
                        error = %e,
                        "Cancelling PENDING booking with its sale unreleased"
                    );
                }
            }
        }

        let cancelled = self
            .store
            .transition(id, from, BookingStatus::Cancelled)
            .await?
            .ok_or_else(|| {
                if from == BookingStatus::Paid {
                    error!(booking_id = %id, "Sale released but booking left PAID concurrently");
                }
                AppError::InvalidState(format!("Booking is no longer {from}"))
            })?;

        info!(booking_id = %id, from = %from, "Booking cancelled");
        Ok(cancelled)
    }

    async fn release(&self, booking: &Booking) -> Result<(), AppError> {
        match self
            .ledger
            .release_sale(booking.ticket_type_id, booking.id, booking.quantity)
            .await
        {
            Ok(ticket) => {
                info!(
                    booking_id = %booking.id,
                    ticket_type_id = %ticket.id,
                    quantity = booking.quantity,
                    "Committed sale released"
                );
                Ok(())
            }
            Err(e) => {
                error!(booking_id = %booking.id, error = %e, "Could not release committed sale");
                Err(AppError::CompensationFailed(format!(
                    "Could not release {} ticket(s) for booking {}: {e}",
                    booking.quantity, booking.id
                )))
            }
        }
    }
}
