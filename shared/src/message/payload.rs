//! Typed payloads for the inbound message union

use serde::{Deserialize, Serialize};

use crate::models::{BerthType, BoardingStatus};

/// Payload of `upgrade:offer` — a freshly pushed offer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct OfferEventPayload {
    pub notification_id: Option<String>,
    pub from_berth: Option<String>,
    pub to_berth: Option<String>,
    pub coach: Option<String>,
    pub berth_type: Option<BerthType>,
    /// UTC epoch milliseconds
    pub expires_at: Option<i64>,
}

/// Payload carrying only the authority-assigned offer id
/// (`upgrade:expired`, `upgrade:accepted`, `upgrade:denied`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRef {
    pub notification_id: String,
}

/// Payload of `upgrade:confirmed` — the conductor approved the reallocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationPayload {
    pub notification_id: String,
    pub to_berth: Option<String>,
}

/// Payload of `upgrade:rejected` — the conductor declined the reallocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RejectionPayload {
    pub notification_id: String,
    pub reason: Option<String>,
}

/// Payload of `passenger:boarding_status`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BoardingStatusPayload {
    pub pnr: String,
    pub status: BoardingStatus,
    pub no_show: Option<bool>,
}

/// Payload of `train:update` — informational only
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TrainUpdatePayload {
    pub train_number: Option<String>,
    pub current_station: Option<String>,
    pub delay_minutes: Option<i64>,
    pub message: Option<String>,
}
