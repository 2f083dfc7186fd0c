use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::schedule::TimeBlock;
use super::text_enum;
use crate::utils::time::{wire, wire_option};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Scheduled,
    Ongoing,
    Completed,
    Cancelled,
}

text_enum!(EventStatus {
    Scheduled => "SCHEDULED",
    Ongoing => "ONGOING",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
});

impl EventStatus {
    /// SCHEDULED -> ONGOING -> COMPLETED, and SCHEDULED/ONGOING -> CANCELLED.
    pub fn can_transition_to(self, next: EventStatus) -> bool {
        matches!(
            (self, next),
            (EventStatus::Scheduled, EventStatus::Ongoing)
                | (EventStatus::Ongoing, EventStatus::Completed)
                | (EventStatus::Scheduled, EventStatus::Cancelled)
                | (EventStatus::Ongoing, EventStatus::Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, EventStatus::Completed | EventStatus::Cancelled)
    }

    pub fn accepts_bookings(self) -> bool {
        self == EventStatus::Scheduled
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub venue_id: i64,
    pub room_id: i64,
    #[serde(with = "wire")]
    pub start_time: NaiveDateTime,
    #[serde(with = "wire")]
    pub end_time: NaiveDateTime,
    pub status: EventStatus,
    /// Room capacity as reported by the schedule authority when the
    /// event's room or time last changed.
    pub venue_capacity: i32,
    /// False while the schedule authority has not acknowledged the block.
    pub schedule_synced: bool,
}

impl Event {
    pub fn window(&self) -> TimeBlock {
        TimeBlock {
            start: self.start_time,
            end: self.end_time,
        }
    }
}

/// What peers need to know about an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub id: Uuid,
    pub title: String,
    pub status: EventStatus,
    pub venue_capacity: i32,
}

impl From<&Event> for EventSummary {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id,
            title: event.title.clone(),
            status: event.status,
            venue_capacity: event.venue_capacity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub venue_id: i64,
    pub room_id: i64,
    #[serde(with = "wire")]
    pub start_time: NaiveDateTime,
    #[serde(with = "wire")]
    pub end_time: NaiveDateTime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventChanges {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub venue_id: Option<i64>,
    #[serde(default)]
    pub room_id: Option<i64>,
    #[serde(default, with = "wire_option")]
    pub start_time: Option<NaiveDateTime>,
    #[serde(default, with = "wire_option")]
    pub end_time: Option<NaiveDateTime>,
}

impl EventChanges {
    /// Whether applying these changes would move the event to another room
    /// or time window.
    pub fn moves_schedule(&self, current: &Event) -> bool {
        self.venue_id.is_some_and(|v| v != current.venue_id)
            || self.room_id.is_some_and(|r| r != current.room_id)
            || self.start_time.is_some_and(|s| s != current.start_time)
            || self.end_time.is_some_and(|e| e != current.end_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_lifecycle_transitions() {
        use EventStatus::*;
        assert!(Scheduled.can_transition_to(Ongoing));
        assert!(Ongoing.can_transition_to(Completed));
        assert!(Scheduled.can_transition_to(Cancelled));
        assert!(Ongoing.can_transition_to(Cancelled));

        assert!(!Scheduled.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Scheduled));
        assert!(!Ongoing.can_transition_to(Scheduled));
    }

    #[test]
    fn test_only_scheduled_events_accept_bookings() {
        assert!(EventStatus::Scheduled.accepts_bookings());
        assert!(!EventStatus::Ongoing.accepts_bookings());
        assert!(!EventStatus::Cancelled.accepts_bookings());
    }

    #[test]
    fn test_changes_detect_schedule_moves() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1)
            .and_then(|d| d.and_hms_opt(10, 0, 0))
            .unwrap();
        let event = Event {
            id: Uuid::new_v4(),
            title: "Launch".to_string(),
            description: None,
            venue_id: 1,
            room_id: 2,
            start_time: start,
            end_time: start + chrono::Duration::hours(2),
            status: EventStatus::Scheduled,
            venue_capacity: 100,
            schedule_synced: true,
        };

        let retitle = EventChanges {
            title: Some("Relaunch".to_string()),
            ..Default::default()
        };
        assert!(!retitle.moves_schedule(&event));

        let same_room = EventChanges {
            room_id: Some(2),
            ..Default::default()
        };
        assert!(!same_room.moves_schedule(&event));

        let later = EventChanges {
            start_time: Some(start + chrono::Duration::hours(1)),
            ..Default::default()
        };
        assert!(later.moves_schedule(&event));
    }

    #[test]
    fn test_event_wire_shape() {
        let json = serde_json::json!({
            "title": "Gala",
            "venueId": 3,
            "roomId": 7,
            "startTime": "2025-05-01",
            "endTime": "2025-05-01 23:00:00"
        });
        let input: NewEvent = serde_json::from_value(json).unwrap();
        assert_eq!(input.venue_id, 3);
        assert_eq!(input.start_time.format("%H:%M").to_string(), "00:00");
        assert!(input.description.is_none());
    }
}
