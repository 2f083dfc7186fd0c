//! The quota ledger. `commit_sale` and `release_sale` are the only writers
//! of `sold`, and both are single conditional store operations.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use super::peers::EventDirectory;
use crate::auth::Caller;
use crate::models::event::EventSummary;
use crate::models::ticket::{NewTicketType, TicketChanges, TicketStatus, TicketType};
use crate::stores::{SaleOutcome, TicketStore};
use crate::utils::error::AppError;

/// Attempts for an admin update that keeps losing to concurrent sales.
const UPDATE_ATTEMPTS: usize = 3;

pub struct TicketService {
    store: Arc<dyn TicketStore>,
    events: Arc<dyn EventDirectory>,
}

fn check_price(price: Decimal) -> Result<(), AppError> {
    if price < Decimal::ZERO {
        return Err(AppError::Validation("Price cannot be negative".to_string()));
    }
    Ok(())
}

fn check_quota(quota: i32) -> Result<(), AppError> {
    if quota < 0 {
        return Err(AppError::Validation("Quota cannot be negative".to_string()));
    }
    Ok(())
}

fn check_quantity(quantity: i32) -> Result<(), AppError> {
    if quantity <= 0 {
        return Err(AppError::Validation(
            "Quantity must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Sum of all quotas of the event, with `ticket_id` (if any) counted as `quota`.
fn total_quota(existing: &[TicketType], ticket_id: Option<Uuid>, quota: i32) -> i64 {
    existing
        .iter()
        .filter(|t| Some(t.id) != ticket_id)
        .map(|t| i64::from(t.quota))
        .sum::<i64>()
        + i64::from(quota)
}

fn check_capacity(event: &EventSummary, requested_total: i64) -> Result<(), AppError> {
    if requested_total > i64::from(event.venue_capacity) {
        return Err(AppError::CapacityExceeded {
            requested_total,
            capacity: event.venue_capacity,
        });
    }
    Ok(())
}

impl TicketService {
    pub fn new(store: Arc<dyn TicketStore>, events: Arc<dyn EventDirectory>) -> Self {
        Self { store, events }
    }

    pub async fn get(&self, id: Uuid) -> Result<TicketType, AppError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Ticket type {id} not found")))
    }

    pub async fn list_by_event(&self, event_id: Uuid) -> Result<Vec<TicketType>, AppError> {
        self.store.list_by_event(event_id).await
    }

    async fn event(&self, id: Uuid) -> Result<EventSummary, AppError> {
        self.events
            .fetch_event(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {id} not found")))
    }

    pub async fn create(&self, caller: &Caller, input: NewTicketType) -> Result<TicketType, AppError> {
        caller.admin()?;
        check_price(input.price)?;
        check_quota(input.quota)?;

        let event = self.event(input.event_id).await?;
        if event.status.is_terminal() {
            return Err(AppError::EventNotBookable(format!(
                "event is {}",
                event.status
            )));
        }

        let existing = self.store.list_by_event(input.event_id).await?;
        if existing.iter().any(|t| t.category == input.category) {
            return Err(AppError::DuplicateCategory(input.category));
        }
        check_capacity(&event, total_quota(&existing, None, input.quota))?;

        let ticket = TicketType {
            id: Uuid::new_v4(),
            event_id: input.event_id,
            category: input.category,
            price: input.price,
            quota: input.quota,
            sold: 0,
            status: TicketStatus::Open.derive(0, input.quota),
        };
        self.store.insert(&ticket).await?;
        info!(
            ticket_type_id = %ticket.id,
            event_id = %ticket.event_id,
            category = %ticket.category,
            quota = ticket.quota,
            "Ticket type created"
        );
        Ok(ticket)
    }

    pub async fn update(
        &self,
        caller: &Caller,
        id: Uuid,
        changes: TicketChanges,
    ) -> Result<TicketType, AppError> {
        caller.admin()?;
        if let Some(price) = changes.price {
            check_price(price)?;
        }
        if let Some(quota) = changes.quota {
            check_quota(quota)?;
        }
        if changes.status == Some(TicketStatus::SoldOut) {
            return Err(AppError::Validation(
                "SOLD_OUT is derived from sales and cannot be set".to_string(),
            ));
        }

        for _ in 0..UPDATE_ATTEMPTS {
            let current = self.get(id).await?;
            let updated = self.apply_changes(&current, &changes).await?;
            if let Some(stored) = self.store.update(&updated).await? {
                info!(
                    ticket_type_id = %id,
                    quota = stored.quota,
                    status = %stored.status,
                    "Ticket type updated"
                );
                return Ok(stored);
            }
            warn!(ticket_type_id = %id, "Sales moved during ticket type update, retrying");
        }

        Err(AppError::InvalidState(
            "Ticket type kept changing during update; retry later".to_string(),
        ))
    }

    async fn apply_changes(
        &self,
        current: &TicketType,
        changes: &TicketChanges,
    ) -> Result<TicketType, AppError> {
        let price_changes = changes.price.is_some_and(|p| p != current.price);
        let category_changes = changes.category.is_some_and(|c| c != current.category);
        if current.sold > 0 && (price_changes || category_changes) {
            return Err(AppError::Immutable(
                "Price and category cannot change once tickets are sold".to_string(),
            ));
        }

        let quota = changes.quota.unwrap_or(current.quota);
        if quota < current.sold {
            return Err(AppError::BelowSold {
                quota,
                sold: current.sold,
            });
        }

        if quota != current.quota {
            let event = self.event(current.event_id).await?;
            let existing = self.store.list_by_event(current.event_id).await?;
            check_capacity(&event, total_quota(&existing, Some(current.id), quota))?;
        }

        let requested = changes.status.unwrap_or(current.status);
        let status = match requested {
            TicketStatus::Closed => TicketStatus::Closed,
            _ => TicketStatus::Open.derive(current.sold, quota),
        };

        Ok(TicketType {
            category: changes.category.unwrap_or(current.category),
            price: changes.price.unwrap_or(current.price),
            quota,
            status,
            ..current.clone()
        })
    }

    /// `booking_id` keys the sale: committing the same booking again returns
    /// the ticket type without selling twice.
    pub async fn commit_sale(
        &self,
        caller: &Caller,
        id: Uuid,
        booking_id: Uuid,
        quantity: i32,
    ) -> Result<TicketType, AppError> {
        let claims = caller.service()?;
        check_quantity(quantity)?;

        match self.store.commit_sale(id, booking_id, quantity).await? {
            SaleOutcome::Applied(ticket) => {
                info!(
                    ticket_type_id = %id,
                    booking_id = %booking_id,
                    quantity,
                    sold = ticket.sold,
                    status = %ticket.status,
                    by = %claims.sub,
                    "Sale committed"
                );
                Ok(ticket)
            }
            SaleOutcome::Rejected(ticket) if ticket.is_closed() => Err(AppError::InvalidState(
                format!("Ticket type {id} is closed"),
            )),
            SaleOutcome::Rejected(ticket) => Err(AppError::InsufficientQuota {
                requested: quantity,
                remaining: ticket.remaining(),
            }),
            SaleOutcome::Missing => Err(AppError::NotFound(format!("Ticket type {id} not found"))),
        }
    }

    /// Releasing a booking whose sale is not recorded (never committed, or
    /// already released) changes nothing.
    pub async fn release_sale(
        &self,
        caller: &Caller,
        id: Uuid,
        booking_id: Uuid,
        quantity: i32,
    ) -> Result<TicketType, AppError> {
        let claims = caller.service()?;
        check_quantity(quantity)?;

        match self.store.release_sale(id, booking_id, quantity).await? {
            SaleOutcome::Applied(ticket) => {
                info!(
                    ticket_type_id = %id,
                    booking_id = %booking_id,
                    quantity,
                    sold = ticket.sold,
                    status = %ticket.status,
                    by = %claims.sub,
                    "Sale released"
                );
                Ok(ticket)
            }
            SaleOutcome::Rejected(ticket) => Err(AppError::InvalidState(format!(
                "Cannot release {quantity} ticket(s) of booking {booking_id}; {} sold",
                ticket.sold
            ))),
            SaleOutcome::Missing => Err(AppError::NotFound(format!("Ticket type {id} not found"))),
        }
    }

    pub async fn delete(&self, caller: &Caller, id: Uuid) -> Result<(), AppError> {
        caller.admin()?;

        let ticket = self.get(id).await?;
        if ticket.sold > 0 {
            return Err(AppError::HasSales(ticket.sold));
        }
        if !self.store.delete_unsold(id).await? {
            let sold = self.get(id).await?.sold;
            return Err(AppError::HasSales(sold));
        }
        info!(ticket_type_id = %id, "Ticket type deleted");
        Ok(())
    }
}
