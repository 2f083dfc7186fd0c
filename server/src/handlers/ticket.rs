use axum::body::Bytes;
use axum::extract::State;
use axum::response::Response;
use serde::Deserialize;
use uuid::Uuid;

use super::{parse_operation, RpcState};
use crate::auth::Caller;
use crate::models::ticket::{NewTicketType, TicketChanges};
use crate::services::TicketService;
use crate::utils::error::AppError;
use crate::utils::response::{empty_success, success};

#[derive(Debug, Deserialize)]
#[serde(
    tag = "operation",
    content = "arguments",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum TicketOperation {
    TicketType {
        id: Uuid,
    },
    TicketTypesByEvent {
        event_id: Uuid,
    },
    CreateTicketType(NewTicketType),
    UpdateTicketType {
        id: Uuid,
        #[serde(flatten)]
        changes: TicketChanges,
    },
    DeleteTicketType {
        id: Uuid,
    },
    CommitSale {
        id: Uuid,
        booking_id: Uuid,
        quantity: i32,
    },
    ReleaseSale {
        id: Uuid,
        booking_id: Uuid,
        quantity: i32,
    },
}

pub async fn rpc(
    State(state): State<RpcState<TicketService>>,
    caller: Caller,
    body: Bytes,
) -> Result<Response, AppError> {
    let tickets = &state.service;
    let response = match parse_operation(&body)? {
        TicketOperation::TicketType { id } => {
            success(tickets.get(id).await?, "Ticket type retrieved")
        }
        TicketOperation::TicketTypesByEvent { event_id } => success(
            tickets.list_by_event(event_id).await?,
            "Ticket types retrieved",
        ),
        TicketOperation::CreateTicketType(input) => {
            success(tickets.create(&caller, input).await?, "Ticket type created")
        }
        TicketOperation::UpdateTicketType { id, changes } => success(
            tickets.update(&caller, id, changes).await?,
            "Ticket type updated",
        ),
        TicketOperation::DeleteTicketType { id } => {
            tickets.delete(&caller, id).await?;
            empty_success("Ticket type deleted")
        }
        TicketOperation::CommitSale {
            id,
            booking_id,
            quantity,
        } => success(
            tickets.commit_sale(&caller, id, booking_id, quantity).await?,
            "Sale committed",
        ),
        TicketOperation::ReleaseSale {
            id,
            booking_id,
            quantity,
        } => success(
            tickets.release_sale(&caller, id, booking_id, quantity).await?,
            "Sale released",
        ),
    };
    Ok(response)
}
