use axum::body::Bytes;
use axum::extract::State;
use axum::response::Response;
use serde::Deserialize;
use uuid::Uuid;

use super::{parse_operation, RpcState};
use crate::auth::Caller;
use crate::models::event::{EventChanges, EventStatus, NewEvent};
use crate::services::EventService;
use crate::utils::error::AppError;
use crate::utils::response::{empty_success, success};

#[derive(Debug, Deserialize)]
#[serde(
    tag = "operation",
    content = "arguments",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum EventOperation {
    Event {
        id: Uuid,
    },
    Events {},
    EventsByVenue {
        venue_id: i64,
    },
    CreateEvent(NewEvent),
    UpdateEvent {
        id: Uuid,
        #[serde(flatten)]
        changes: EventChanges,
    },
    TransitionEvent {
        id: Uuid,
        status: EventStatus,
    },
    DeleteEvent {
        id: Uuid,
    },
    ReconcileSchedule {},
}

pub async fn rpc(
    State(state): State<RpcState<EventService>>,
    caller: Caller,
    body: Bytes,
) -> Result<Response, AppError> {
    let events = &state.service;
    let response = match parse_operation(&body)? {
        EventOperation::Event { id } => success(events.get(id).await?, "Event retrieved"),
        EventOperation::Events {} => success(events.list().await?, "Events retrieved"),
        EventOperation::EventsByVenue { venue_id } => {
            success(events.list_by_venue(venue_id).await?, "Events retrieved")
        }
        EventOperation::CreateEvent(input) => {
            success(events.create(&caller, input).await?, "Event created")
        }
        EventOperation::UpdateEvent { id, changes } => {
            success(events.update(&caller, id, changes).await?, "Event updated")
        }
        EventOperation::TransitionEvent { id, status } => success(
            events.transition_status(&caller, id, status).await?,
            "Event status changed",
        ),
        EventOperation::DeleteEvent { id } => {
            events.delete(&caller, id).await?;
            empty_success("Event deleted")
        }
        EventOperation::ReconcileSchedule {} => success(
            events.reconcile(&caller).await?,
            "Schedule reconciliation finished",
        ),
    };
    Ok(response)
}
