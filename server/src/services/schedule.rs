//! The external space-scheduling authority, consumed as a black box.
//!
//! [`SpaceMasterClient`] talks to it through a [`RemoteClient`]: it confirms
//! that a venue and room exist, reads the room capacity, scans the room's
//! published schedules for a conflicting block, and pushes new blocks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::schedule::{RoomInfo, TimeBlock};
use crate::remote::{arguments, decode, GraphqlOperation, RemoteClient};
use crate::utils::error::AppError;
use crate::utils::time::parse_timestamp;

#[async_trait]
pub trait ScheduleAuthority: Send + Sync {
    /// Checks venue, room and availability. `exclude` skips the block that
    /// belongs to the event being re-validated.
    async fn validate_room(
        &self,
        venue_id: i64,
        room_id: i64,
        window: &TimeBlock,
        exclude: Option<Uuid>,
    ) -> Result<RoomInfo, AppError>;

    async fn block_schedule(&self, room_id: i64, window: &TimeBlock) -> Result<(), AppError>;
}

pub const SPACEMASTER_OPERATIONS: &[GraphqlOperation] = &[
    GraphqlOperation {
        name: "venues",
        document: "query { venues { id name city } }",
        field: "venues",
    },
    GraphqlOperation {
        name: "roomsByVenue",
        document: "query($venueId: ID!) { roomsByVenue(venueId: $venueId) { id name capacity } }",
        field: "roomsByVenue",
    },
    GraphqlOperation {
        name: "schedules",
        document: "query { schedules { id roomId startTime endTime status } }",
        field: "schedules",
    },
    GraphqlOperation {
        name: "blockSchedule",
        document: "mutation($input: BlockScheduleInput!) { blockSchedule(input: $input) { success message } }",
        field: "blockSchedule",
    },
];

/// The authority's own timestamp format for block input.
const BLOCK_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Schedule statuses that do not occupy the room.
const FREE_STATUSES: [&str; 2] = ["CANCELLED", "AVAILABLE"];

#[derive(Deserialize)]
struct Room {
    id: Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    capacity: Option<i32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Schedule {
    #[serde(default)]
    id: Value,
    room_id: Value,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl Schedule {
    fn is_free(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|status| FREE_STATUSES.contains(&status))
    }

    /// `None` when the authority published times we cannot read.
    fn window(&self) -> Option<TimeBlock> {
        let start = parse_timestamp(self.start_time.as_deref()?).ok()?;
        let end = parse_timestamp(self.end_time.as_deref()?).ok()?;
        Some(TimeBlock { start, end })
    }
}

#[derive(Deserialize)]
struct BlockResult {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

/// The authority sends ids as numbers or strings.
fn numeric_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn textual_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

pub struct SpaceMasterClient {
    remote: Arc<dyn RemoteClient>,
    timeout: Duration,
}

impl SpaceMasterClient {
    pub fn new(remote: Arc<dyn RemoteClient>, timeout: Duration) -> Self {
        Self { remote, timeout }
    }

    async fn query<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        variables: Value,
    ) -> Result<T, AppError> {
        let payload = self
            .remote
            .call(operation, arguments(variables), self.timeout)
            .await?;
        Ok(decode(operation, payload)?)
    }
}

#[async_trait]
impl ScheduleAuthority for SpaceMasterClient {
    async fn validate_room(
        &self,
        venue_id: i64,
        room_id: i64,
        window: &TimeBlock,
        exclude: Option<Uuid>,
    ) -> Result<RoomInfo, AppError> {
        let venues: Vec<Value> = self.query("venues", json!({})).await?;
        if !venues
            .iter()
            .any(|venue| venue.get("id").and_then(numeric_id) == Some(venue_id))
        {
            return Err(AppError::NotFound(format!(
                "Venue with ID '{venue_id}' not found in schedule authority"
            )));
        }

        let rooms: Vec<Room> = self
            .query("roomsByVenue", json!({ "venueId": venue_id.to_string() }))
            .await?;
        let room = rooms
            .into_iter()
            .find(|room| numeric_id(&room.id) == Some(room_id))
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Room with ID '{room_id}' not found in venue '{venue_id}'"
                ))
            })?;

        let schedules: Vec<Schedule> = self.query("schedules", json!({})).await?;
        let excluded = exclude.map(|id| id.to_string());
        for schedule in schedules
            .iter()
            .filter(|s| numeric_id(&s.room_id) == Some(room_id))
        {
            if excluded.is_some() && textual_id(&schedule.id) == excluded {
                continue;
            }
            if schedule.is_free() {
                continue;
            }
            let Some(block) = schedule.window() else {
                debug!(room_id, "Skipping schedule with unreadable times");
                continue;
            };
            if block.overlaps(window) {
                return Err(AppError::Conflict(format!(
                    "Room already booked from {block} (schedule authority)"
                )));
            }
        }

        Ok(RoomInfo {
            venue_id,
            room_id,
            name: room.name,
            capacity: room.capacity.unwrap_or(0),
        })
    }

    async fn block_schedule(&self, room_id: i64, window: &TimeBlock) -> Result<(), AppError> {
        let input = json!({
            "input": {
                "roomId": room_id,
                "startTime": window.start.format(BLOCK_FORMAT).to_string(),
                "endTime": window.end.format(BLOCK_FORMAT).to_string(),
            }
        });
        let result: BlockResult = self.query("blockSchedule", input).await?;
        if !result.success {
            return Err(AppError::RemoteRejected {
                code: None,
                message: result
                    .message
                    .unwrap_or_else(|| "Schedule block was not accepted".to_string()),
            });
        }

        info!(room_id, window = %window, "Schedule block registered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{Arguments, RemoteError};
    use chrono::NaiveDate;
    use std::sync::Mutex;

    struct CannedAuthority {
        schedules: Value,
        block: Value,
        calls: Mutex<Vec<(String, Arguments)>>,
    }

    #[async_trait]
    impl RemoteClient for CannedAuthority {
        async fn call(
            &self,
            operation: &str,
            arguments: Arguments,
            _timeout: Duration,
        ) -> Result<Value, RemoteError> {
            self.calls
                .lock()
                .unwrap()
                .push((operation.to_string(), arguments));
            Ok(match operation {
                "venues" => json!([{ "id": "1", "name": "Hall", "city": "Bandung" }]),
                "roomsByVenue" => json!([{ "id": 7, "name": "Main", "capacity": 100 }]),
                "schedules" => self.schedules.clone(),
                "blockSchedule" => self.block.clone(),
                other => panic!("unexpected operation {other}"),
            })
        }
    }

    fn client(schedules: Value) -> (Arc<CannedAuthority>, SpaceMasterClient) {
        let remote = Arc::new(CannedAuthority {
            schedules,
            block: json!({ "success": true, "message": "ok" }),
            calls: Mutex::new(Vec::new()),
        });
        let client = SpaceMasterClient::new(remote.clone(), Duration::from_secs(1));
        (remote, client)
    }

    fn window(start_hour: u32, end_hour: u32) -> TimeBlock {
        let day = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        TimeBlock::new(
            day.and_hms_opt(start_hour, 0, 0).unwrap(),
            day.and_hms_opt(end_hour, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_validate_room_returns_capacity() {
        let (_, client) = client(json!([]));
        let room = client.validate_room(1, 7, &window(10, 12), None).await.unwrap();
        assert_eq!(room.capacity, 100);
        assert_eq!(room.name.as_deref(), Some("Main"));
    }

    #[tokio::test]
    async fn test_unknown_venue_and_room_are_not_found() {
        let (_, client) = client(json!([]));
        assert!(matches!(
            client.validate_room(2, 7, &window(10, 12), None).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            client.validate_room(1, 8, &window(10, 12), None).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_conflicting_block_is_rejected() {
        let (_, client) = client(json!([
            { "id": 1, "roomId": "7", "startTime": "2025-06-01 11:00:00", "endTime": "2025-06-01 13:00:00", "status": "BOOKED" }
        ]));
        assert!(matches!(
            client.validate_room(1, 7, &window(10, 12), None).await,
            Err(AppError::Conflict(_))
        ));
        // touching endpoints
        assert!(client.validate_room(1, 7, &window(9, 11), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_free_unreadable_and_other_room_blocks_are_ignored() {
        let (_, client) = client(json!([
            { "id": 1, "roomId": 7, "startTime": "2025-06-01T10:00:00", "endTime": "2025-06-01T12:00:00", "status": "CANCELLED" },
            { "id": 2, "roomId": 7, "startTime": "2025-06-01T10:00:00", "endTime": "2025-06-01T12:00:00", "status": "AVAILABLE" },
            { "id": 3, "roomId": 7, "startTime": "soon", "endTime": "later", "status": "BOOKED" },
            { "id": 4, "roomId": 9, "startTime": "2025-06-01T10:00:00", "endTime": "2025-06-01T12:00:00", "status": "BOOKED" }
        ]));
        assert!(client.validate_room(1, 7, &window(10, 12), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_excluded_block_is_ignored() {
        let own = Uuid::new_v4();
        let (_, client) = client(json!([
            { "id": own.to_string(), "roomId": 7, "startTime": "2025-06-01T10:00:00", "endTime": "2025-06-01T12:00:00", "status": "BOOKED" }
        ]));
        assert!(client.validate_room(1, 7, &window(10, 12), Some(own)).await.is_ok());
        assert!(client.validate_room(1, 7, &window(10, 12), None).await.is_err());
    }

    #[tokio::test]
    async fn test_block_schedule_sends_authority_format() {
        let (remote, client) = client(json!([]));
        client.block_schedule(7, &window(10, 12)).await.unwrap();

        let calls = remote.calls.lock().unwrap();
        let (operation, args) = calls.last().unwrap();
        assert_eq!(operation, "blockSchedule");
        assert_eq!(args["input"]["roomId"], 7);
        assert_eq!(args["input"]["startTime"], "2025-06-01 10:00:00");
    }

    #[tokio::test]
    async fn test_refused_block_is_remote_rejected() {
        let remote = Arc::new(CannedAuthority {
            schedules: json!([]),
            block: json!({ "success": false, "message": "Room under maintenance" }),
            calls: Mutex::new(Vec::new()),
        });
        let client = SpaceMasterClient::new(remote, Duration::from_secs(1));
        match client.block_schedule(7, &window(10, 12)).await {
            Err(AppError::RemoteRejected { message, .. }) => {
                assert_eq!(message, "Room under maintenance")
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
