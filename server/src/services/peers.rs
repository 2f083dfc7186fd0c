//! What one authority needs from another, behind traits so the booking and
//! ticket services work the same against a remote peer or an in-process one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use super::event::EventService;
use super::ticket::TicketService;
use crate::auth::{Caller, Claims, Role};
use crate::models::event::EventSummary;
use crate::models::ticket::TicketType;
use crate::remote::{arguments, decode, RemoteClient};
use crate::utils::error::AppError;

#[async_trait]
pub trait EventDirectory: Send + Sync {
    /// Always asks the event authority; nothing is cached.
    async fn fetch_event(&self, id: Uuid) -> Result<Option<EventSummary>, AppError>;
}

#[async_trait]
pub trait QuotaLedger: Send + Sync {
    async fn ticket_types_by_event(&self, event_id: Uuid) -> Result<Vec<TicketType>, AppError>;

    /// Idempotent per `booking_id`: a retry after a lost reply does not sell
    /// the units twice.
    async fn commit_sale(
        &self,
        id: Uuid,
        booking_id: Uuid,
        quantity: i32,
    ) -> Result<TicketType, AppError>;

    async fn release_sale(
        &self,
        id: Uuid,
        booking_id: Uuid,
        quantity: i32,
    ) -> Result<TicketType, AppError>;
}

pub struct RemoteEventDirectory {
    remote: Arc<dyn RemoteClient>,
    timeout: Duration,
}

impl RemoteEventDirectory {
    pub fn new(remote: Arc<dyn RemoteClient>, timeout: Duration) -> Self {
        Self { remote, timeout }
    }
}

#[async_trait]
impl EventDirectory for RemoteEventDirectory {
    async fn fetch_event(&self, id: Uuid) -> Result<Option<EventSummary>, AppError> {
        let payload = match self
            .remote
            .call("event", arguments(json!({ "id": id })), self.timeout)
            .await
        {
            Ok(payload) => payload,
            Err(err) if err.code() == Some("NOT_FOUND") => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        if payload.is_null() {
            return Ok(None);
        }
        Ok(Some(decode("event", payload)?))
    }
}

pub struct RemoteQuotaLedger {
    remote: Arc<dyn RemoteClient>,
    timeout: Duration,
}

impl RemoteQuotaLedger {
    pub fn new(remote: Arc<dyn RemoteClient>, timeout: Duration) -> Self {
        Self { remote, timeout }
    }

    async fn sale(
        &self,
        operation: &str,
        id: Uuid,
        booking_id: Uuid,
        quantity: i32,
    ) -> Result<TicketType, AppError> {
        let payload = self
            .remote
            .call(
                operation,
                arguments(json!({ "id": id, "bookingId": booking_id, "quantity": quantity })),
                self.timeout,
            )
            .await?;
        Ok(decode(operation, payload)?)
    }
}

#[async_trait]
impl QuotaLedger for RemoteQuotaLedger {
    async fn ticket_types_by_event(&self, event_id: Uuid) -> Result<Vec<TicketType>, AppError> {
        let payload = self
            .remote
            .call(
                "ticketTypesByEvent",
                arguments(json!({ "eventId": event_id })),
                self.timeout,
            )
            .await?;
        Ok(decode("ticketTypesByEvent", payload)?)
    }

    async fn commit_sale(
        &self,
        id: Uuid,
        booking_id: Uuid,
        quantity: i32,
    ) -> Result<TicketType, AppError> {
        self.sale("commitSale", id, booking_id, quantity).await
    }

    async fn release_sale(
        &self,
        id: Uuid,
        booking_id: Uuid,
        quantity: i32,
    ) -> Result<TicketType, AppError> {
        self.sale("releaseSale", id, booking_id, quantity).await
    }
}

#[async_trait]
impl EventDirectory for EventService {
    async fn fetch_event(&self, id: Uuid) -> Result<Option<EventSummary>, AppError> {
        Ok(self.find(id).await?.as_ref().map(EventSummary::from))
    }
}

/// The ticket authority reached without a network hop. Sales are made under
/// a service identity, the same one a remote booking authority presents.
pub struct LocalQuotaLedger {
    tickets: Arc<TicketService>,
    caller: Caller,
}

impl LocalQuotaLedger {
    pub fn new(tickets: Arc<TicketService>, subject: &str) -> Self {
        Self {
            tickets,
            caller: Caller::from_claims(Claims {
                sub: subject.to_string(),
                role: Role::Service,
                exp: 0,
            }),
        }
    }
}

#[async_trait]
impl QuotaLedger for LocalQuotaLedger {
    async fn ticket_types_by_event(&self, event_id: Uuid) -> Result<Vec<TicketType>, AppError> {
        self.tickets.list_by_event(event_id).await
    }

    async fn commit_sale(
        &self,
        id: Uuid,
        booking_id: Uuid,
        quantity: i32,
    ) -> Result<TicketType, AppError> {
        self.tickets
            .commit_sale(&self.caller, id, booking_id, quantity)
            .await
    }

    async fn release_sale(
        &self,
        id: Uuid,
        booking_id: Uuid,
        quantity: i32,
    ) -> Result<TicketType, AppError> {
        self.tickets
            .release_sale(&self.caller, id, booking_id, quantity)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{Arguments, RemoteError};
    use serde_json::Value;

    struct Scripted(Result<Value, fn() -> RemoteError>);

    #[async_trait]
    impl RemoteClient for Scripted {
        async fn call(
            &self,
            _operation: &str,
            _arguments: Arguments,
            _timeout: Duration,
        ) -> Result<Value, RemoteError> {
            match &self.0 {
                Ok(value) => Ok(value.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    fn directory(script: Result<Value, fn() -> RemoteError>) -> RemoteEventDirectory {
        RemoteEventDirectory::new(Arc::new(Scripted(script)), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_remote_event_is_summarized() {
        let id = Uuid::new_v4();
        let found = directory(Ok(json!({
            "id": id,
            "title": "Gala",
            "status": "SCHEDULED",
            "venueCapacity": 120,
            "venueId": 1,
            "roomId": 2
        })))
        .fetch_event(id)
        .await
        .unwrap()
        .unwrap();
        assert_eq!(found.venue_capacity, 120);
    }

    #[tokio::test]
    async fn test_remote_not_found_is_absent() {
        let missing = directory(Err(|| RemoteError::Rejected {
            operation: "event".to_string(),
            code: Some("NOT_FOUND".to_string()),
            messages: vec!["Event not found".to_string()],
        }));
        assert!(missing.fetch_event(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_event_authority_is_upstream_unavailable() {
        let down = directory(Err(|| RemoteError::Timeout {
            operation: "event".to_string(),
            after: Duration::from_secs(1),
        }));
        assert!(matches!(
            down.fetch_event(Uuid::new_v4()).await,
            Err(AppError::UpstreamUnavailable(_))
        ));
    }
}
