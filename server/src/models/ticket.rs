use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::text_enum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketCategory {
    Vip,
    Regular,
    EarlyBird,
}

text_enum!(TicketCategory {
    Vip => "VIP",
    Regular => "REGULAR",
    EarlyBird => "EARLY_BIRD",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Open,
    SoldOut,
    Closed,
}

text_enum!(TicketStatus {
    Open => "OPEN",
    SoldOut => "SOLD_OUT",
    Closed => "CLOSED",
});

impl TicketStatus {
    /// Status after `sold`/`quota` changed. A closed ticket type stays closed.
    pub fn derive(self, sold: i32, quota: i32) -> TicketStatus {
        match self {
            TicketStatus::Closed => TicketStatus::Closed,
            _ if sold >= quota => TicketStatus::SoldOut,
            _ => TicketStatus::Open,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketType {
    pub id: Uuid,
    pub event_id: Uuid,
    pub category: TicketCategory,
    pub price: Decimal,
    pub quota: i32,
    pub sold: i32,
    pub status: TicketStatus,
}

impl TicketType {
    pub fn remaining(&self) -> i32 {
        (self.quota - self.sold).max(0)
    }

    pub fn is_closed(&self) -> bool {
        self.status == TicketStatus::Closed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTicketType {
    pub event_id: Uuid,
    pub category: TicketCategory,
    pub price: Decimal,
    pub quota: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketChanges {
    #[serde(default)]
    pub category: Option<TicketCategory>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub quota: Option<i32>,
    /// Only `OPEN` and `CLOSED` may be requested; `SOLD_OUT` is derived.
    #[serde(default)]
    pub status: Option<TicketStatus>,
}
