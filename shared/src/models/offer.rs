//! Upgrade offer model
//!
//! An offer proposes moving a RAC passenger to a specific confirmed berth.
//! The status tokens are part of the wire and storage contract and must
//! round-trip unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::BerthType;

/// Offer lifecycle status
///
/// ```text
/// PENDING --accept--> ACCEPTED --confirm--> CONFIRMED  (terminal)
/// PENDING --accept--> ACCEPTED --reject-->  REJECTED   (terminal)
/// PENDING --deny-->   DENIED                           (terminal)
/// PENDING --expire--> EXPIRED                          (terminal)
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferStatus {
    #[default]
    Pending,
    Accepted,
    Denied,
    Expired,
    Confirmed,
    Rejected,
}

/// Which progression lane a status belongs to.
///
/// The server-driven lane advances PENDING -> ACCEPTED -> CONFIRMED/REJECTED;
/// DENIED and EXPIRED are client-terminal outcomes that never advance further.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLane {
    /// PENDING / ACCEPTED / CONFIRMED / REJECTED
    Allocation,
    /// DENIED / EXPIRED
    Declined,
}

impl OfferStatus {
    /// True for states with no further client-side transition.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OfferStatus::Pending | OfferStatus::Accepted)
    }

    /// Monotonic ordinal used by the remote-merge policy: a remote update is
    /// only applied when it moves the record strictly forward.
    pub fn rank(&self) -> u8 {
        match self {
            OfferStatus::Pending => 0,
            OfferStatus::Accepted => 1,
            OfferStatus::Confirmed | OfferStatus::Rejected => 2,
            OfferStatus::Denied | OfferStatus::Expired => 2,
        }
    }

    pub fn lane(&self) -> StatusLane {
        match self {
            OfferStatus::Denied | OfferStatus::Expired => StatusLane::Declined,
            _ => StatusLane::Allocation,
        }
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfferStatus::Pending => write!(f, "pending"),
            OfferStatus::Accepted => write!(f, "accepted"),
            OfferStatus::Denied => write!(f, "denied"),
            OfferStatus::Expired => write!(f, "expired"),
            OfferStatus::Confirmed => write!(f, "confirmed"),
            OfferStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// Upgrade offer record
///
/// All timestamps are UTC epoch milliseconds. The transition timestamps
/// (`accepted_at` etc.) are set exactly once, the first time the matching
/// transition occurs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    /// Locally generated id, stable even before the authority knows the offer
    pub id: String,
    /// Authority-assigned id; the join key when merging remote records
    pub notification_id: Option<String>,
    /// Passenger record this offer belongs to
    pub pnr: String,
    pub from_berth: Option<String>,
    pub to_berth: Option<String>,
    pub coach: Option<String>,
    pub berth_type: Option<BerthType>,
    pub status: OfferStatus,
    pub created_at: i64,
    /// Absent means the offer does not expire on its own
    pub expires_at: Option<i64>,
    pub accepted_at: Option<i64>,
    pub denied_at: Option<i64>,
    pub confirmed_at: Option<i64>,
    pub rejected_at: Option<i64>,
    pub expired_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub denial_reason: Option<String>,
    pub rejection_reason: Option<String>,
}

impl Offer {
    /// Pending and, when an expiry is set, not yet past it.
    pub fn is_active(&self, now: i64) -> bool {
        if self.status != OfferStatus::Pending {
            return false;
        }
        match self.expires_at {
            Some(expiry) => now < expiry,
            None => true,
        }
    }

    /// Milliseconds until expiry; `None` when no expiry is set.
    pub fn remaining_ms(&self, now: i64) -> Option<i64> {
        self.expires_at.map(|expiry| expiry - now)
    }
}

/// Partial offer record used for inserts and remote merges.
///
/// Missing fields are defaulted by the store: `id` to a fresh uuid,
/// `status` to PENDING, `created_at` to now.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferDraft {
    pub id: Option<String>,
    pub notification_id: Option<String>,
    pub from_berth: Option<String>,
    pub to_berth: Option<String>,
    pub coach: Option<String>,
    pub berth_type: Option<BerthType>,
    pub status: Option<OfferStatus>,
    pub created_at: Option<i64>,
    pub expires_at: Option<i64>,
    pub accepted_at: Option<i64>,
    pub denied_at: Option<i64>,
    pub confirmed_at: Option<i64>,
    pub rejected_at: Option<i64>,
    pub denial_reason: Option<String>,
    pub rejection_reason: Option<String>,
}

/// Per-status offer counts, scoped to a PNR or global
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OfferStatistics {
    pub total: usize,
    pub pending: usize,
    pub accepted: usize,
    pub denied: usize,
    pub confirmed: usize,
    pub rejected: usize,
    pub expired: usize,
}
