//! Event lifecycle: admin-gated create/update/delete, explicit status
//! transitions, and the push of room blocks to the schedule authority.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use super::schedule::ScheduleAuthority;
use crate::auth::Caller;
use crate::models::event::{Event, EventChanges, EventStatus, NewEvent};
use crate::models::schedule::TimeBlock;
use crate::stores::EventStore;
use crate::utils::error::AppError;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub synced: Vec<Uuid>,
    pub pending: Vec<Uuid>,
}

const WRITE_ATTEMPTS: usize = 3;

pub struct EventService {
    store: Arc<dyn EventStore>,
    schedule: Arc<dyn ScheduleAuthority>,
}

fn checked_title(title: &str) -> Result<String, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("Title cannot be empty".to_string()));
    }
    Ok(title.to_string())
}

impl EventService {
    pub fn new(store: Arc<dyn EventStore>, schedule: Arc<dyn ScheduleAuthority>) -> Self {
        Self { store, schedule }
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Event>, AppError> {
        self.store.get(id).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Event, AppError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {id} not found")))
    }

    pub async fn list(&self) -> Result<Vec<Event>, AppError> {
        self.store.list().await
    }

    pub async fn list_by_venue(&self, venue_id: i64) -> Result<Vec<Event>, AppError> {
        self.store.list_by_venue(venue_id).await
    }

    pub async fn create(&self, caller: &Caller, input: NewEvent) -> Result<Event, AppError> {
        caller.admin()?;

        let title = checked_title(&input.title)?;
        let window = TimeBlock::new(input.start_time, input.end_time)?;

        let room = self
            .schedule
            .validate_room(input.venue_id, input.room_id, &window, None)
            .await?;
        self.ensure_room_free(input.venue_id, input.room_id, &window, None)
            .await?;

        let mut event = Event {
            id: Uuid::new_v4(),
            title,
            description: input.description,
            venue_id: input.venue_id,
            room_id: input.room_id,
            start_time: window.start,
            end_time: window.end,
            status: EventStatus::Scheduled,
            venue_capacity: room.capacity,
            schedule_synced: false,
        };
        self.store.insert(&event).await?;
        info!(
            event_id = %event.id,
            venue_id = event.venue_id,
            room_id = event.room_id,
            capacity = event.venue_capacity,
            "Event created"
        );

        self.push_block(&mut event).await?;
        Ok(event)
    }

    pub async fn update(
        &self,
        caller: &Caller,
        id: Uuid,
        changes: EventChanges,
    ) -> Result<Event, AppError> {
        caller.admin()?;

        for _ in 0..WRITE_ATTEMPTS {
            let current = self.get(id).await?;
            let (mut event, moves) = self.apply_changes(&current, &changes).await?;
            if !self.store.update(&current, &event).await? {
                warn!(event_id = %id, "Event changed during update, retrying");
                continue;
            }
            info!(event_id = %id, rescheduled = moves, "Event updated");

            if moves {
                self.push_block(&mut event).await?;
            }
            return Ok(event);
        }

        Err(AppError::InvalidState(
            "Event kept changing during update; retry later".to_string(),
        ))
    }

    /// Checks `changes` against the event as read and, for a move, against the
    /// schedule authority. Returns the event to write and whether it moved.
    async fn apply_changes(
        &self,
        current: &Event,
        changes: &EventChanges,
    ) -> Result<(Event, bool), AppError> {
        if current.status == EventStatus::Completed {
            return Err(AppError::Immutable(
                "Completed events cannot be modified".to_string(),
            ));
        }

        let moves = changes.moves_schedule(current);
        if moves && current.status == EventStatus::Cancelled {
            return Err(AppError::InvalidState(
                "Cancelled events cannot be rescheduled".to_string(),
            ));
        }

        let mut event = current.clone();
        if let Some(title) = changes.title.as_deref() {
            event.title = checked_title(title)?;
        }
        if changes.description.is_some() {
            event.description = changes.description.clone();
        }
        event.venue_id = changes.venue_id.unwrap_or(current.venue_id);
        event.room_id = changes.room_id.unwrap_or(current.room_id);
        let window = TimeBlock::new(
            changes.start_time.unwrap_or(current.start_time),
            changes.end_time.unwrap_or(current.end_time),
        )?;
        event.start_time = window.start;
        event.end_time = window.end;

        if moves {
            let room = self
                .schedule
                .validate_room(event.venue_id, event.room_id, &window, Some(event.id))
                .await?;
            self.ensure_room_free(event.venue_id, event.room_id, &window, Some(event.id))
                .await?;
            event.venue_capacity = room.capacity;
            event.schedule_synced = false;
        }
        Ok((event, moves))
    }

    pub async fn transition_status(
        &self,
        caller: &Caller,
        id: Uuid,
        next: EventStatus,
    ) -> Result<Event, AppError> {
        caller.admin()?;

        for _ in 0..WRITE_ATTEMPTS {
            let current = self.get(id).await?;
            if !current.status.can_transition_to(next) {
                return Err(AppError::InvalidState(format!(
                    "Event cannot move from {} to {}",
                    current.status, next
                )));
            }

            let event = Event {
                status: next,
                ..current.clone()
            };
            if self.store.update(&current, &event).await? {
                info!(event_id = %id, from = %current.status, to = %next, "Event status changed");
                return Ok(event);
            }
            warn!(event_id = %id, "Event changed during status change, retrying");
        }

        Err(AppError::InvalidState(
            "Event kept changing during status change; retry later".to_string(),
        ))
    }

    pub async fn delete(&self, caller: &Caller, id: Uuid) -> Result<(), AppError> {
        caller.admin()?;

        let event = self.get(id).await?;
        match event.status {
            EventStatus::Completed => {
                return Err(AppError::Immutable(
                    "Completed events cannot be deleted".to_string(),
                ))
            }
            EventStatus::Ongoing => {
                return Err(AppError::InvalidState(
                    "Ongoing events cannot be deleted".to_string(),
                ))
            }
            EventStatus::Scheduled | EventStatus::Cancelled => {}
        }

        if !self.store.delete(id).await? {
            return Err(AppError::NotFound(format!("Event {id} not found")));
        }
        info!(event_id = %id, "Event deleted");
        Ok(())
    }

    pub async fn reconcile(&self, caller: &Caller) -> Result<ReconcileReport, AppError> {
        caller.admin()?;
        self.reconcile_schedule().await
    }

    /// Retries the block push for every event the schedule authority has not
    /// acknowledged yet.
    pub async fn reconcile_schedule(&self) -> Result<ReconcileReport, AppError> {
        let mut report = ReconcileReport::default();
        for event in self.store.list_unsynced().await? {
            match self.schedule.block_schedule(event.room_id, &event.window()).await {
                Ok(()) => {
                    if self.store.mark_synced(&event).await? {
                        info!(event_id = %event.id, "Schedule block reconciled");
                        report.synced.push(event.id);
                    } else {
                        info!(event_id = %event.id, "Event moved during reconciliation");
                        report.pending.push(event.id);
                    }
                }
                Err(e) => {
                    warn!(event_id = %event.id, error = %e, "Schedule block still not registered");
                    report.pending.push(event.id);
                }
            }
        }
        Ok(report)
    }

    async fn ensure_room_free(
        &self,
        venue_id: i64,
        room_id: i64,
        window: &TimeBlock,
        exclude: Option<Uuid>,
    ) -> Result<(), AppError> {
        if let Some(other) = self
            .store
            .find_overlap(venue_id, room_id, window, exclude)
            .await?
        {
            return Err(AppError::Conflict(format!(
                "Room already booked from {} (event {})",
                other.window(),
                other.id
            )));
        }
        Ok(())
    }

    /// The event is already stored; a failed push leaves it unsynced for the
    /// reconciler and is reported as `SyncFailed`.
    async fn push_block(&self, event: &mut Event) -> Result<(), AppError> {
        let pushed = self
            .schedule
            .block_schedule(event.room_id, &event.window())
            .await;
        let message = match pushed {
            Ok(()) => match self.store.mark_synced(event).await {
                Ok(true) => {
                    event.schedule_synced = true;
                    return Ok(());
                }
                Ok(false) => {
                    // moved by a later update, which pushes its own block
                    info!(event_id = %event.id, "Event moved while its block was pushed");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        event_id = %event.id,
                        error = %e,
                        "Block registered but not marked synced"
                    );
                    e.to_string()
                }
            },
            Err(e) => e.to_string(),
        };
        Err(AppError::SyncFailed {
            event_id: event.id,
            message,
        })
    }
}

pub fn spawn_reconciler(events: Arc<EventService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match events.reconcile_schedule().await {
                Ok(report) if !report.synced.is_empty() || !report.pending.is_empty() => {
                    info!(
                        synced = report.synced.len(),
                        pending = report.pending.len(),
                        "Schedule reconciliation pass finished"
                    );
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Schedule reconciliation pass failed"),
            }
        }
    })
}
