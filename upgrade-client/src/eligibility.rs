//! Offer eligibility rules
//!
//! Pure functions over passenger and offer snapshots. A failed check is a
//! value with a human-readable reason, never an error; callers decide how
//! to surface it. Time enters as an explicit `now` argument so the rules
//! stay deterministic under test.

use shared::models::{BoardingStatus, Offer, OfferStatus, Passenger, PnrStatus};
use std::fmt;

/// Whether a passenger may receive upgrade offers at all
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eligibility {
    pub eligible: bool,
    pub reason: String,
}

impl Eligibility {
    fn ok(reason: &str) -> Self {
        Self {
            eligible: true,
            reason: reason.to_string(),
        }
    }

    fn blocked(reason: &str) -> Self {
        Self {
            eligible: false,
            reason: reason.to_string(),
        }
    }
}

/// Verdict on a single accept/deny attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub reason: String,
}

impl Decision {
    fn allow(reason: &str) -> Self {
        Self {
            allowed: true,
            reason: reason.to_string(),
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// The two responses a passenger can give to an offer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferAction {
    Accept,
    Deny,
}

impl fmt::Display for OfferAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfferAction::Accept => write!(f, "accept"),
            OfferAction::Deny => write!(f, "deny"),
        }
    }
}

/// All problems with a response attempt, collected rather than
/// short-circuited
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Whether the passenger may receive upgrade offers.
///
/// Checks run in a fixed order and the first failure wins: data missing,
/// not RAC, not boarded, marked no-show, already deboarded.
pub fn check_upgrade_eligibility(passenger: Option<&Passenger>) -> Eligibility {
    let Some(passenger) = passenger else {
        return Eligibility::blocked("Passenger data not available");
    };

    if passenger.pnr_status != PnrStatus::Rac {
        return Eligibility::blocked("Only RAC passengers are eligible for upgrades");
    }

    if !passenger.boarded {
        return Eligibility::blocked("Passenger must be boarded to receive upgrade offers");
    }

    if passenger.no_show {
        return Eligibility::blocked("Passenger marked as no-show");
    }

    if passenger.boarding_status == BoardingStatus::Deboarded {
        return Eligibility::blocked("Passenger has already deboarded");
    }

    Eligibility::ok("Passenger is eligible for upgrades")
}

/// Whether this offer can be accepted right now.
pub fn can_accept_offer(
    offer: Option<&Offer>,
    passenger: Option<&Passenger>,
    now: i64,
) -> Decision {
    let Some(offer) = offer else {
        return Decision::deny("Offer not found");
    };

    if offer.status != OfferStatus::Pending {
        return Decision::deny(format!("Offer is {}", offer.status));
    }

    if let Some(expires_at) = offer.expires_at {
        if now >= expires_at {
            return Decision::deny("Offer has expired");
        }
    }

    let eligibility = check_upgrade_eligibility(passenger);
    if !eligibility.eligible {
        return Decision::deny(eligibility.reason);
    }

    Decision::allow("Offer can be accepted")
}

/// Whether this offer can be denied. Only Pending offers may be denied.
pub fn can_deny_offer(offer: Option<&Offer>) -> Decision {
    let Some(offer) = offer else {
        return Decision::deny("Offer not found");
    };

    if offer.status != OfferStatus::Pending {
        return Decision::deny(format!("Offer is already {}", offer.status));
    }

    Decision::allow("Offer can be denied")
}

/// Validate a response attempt, collecting every applicable problem.
///
/// Eligibility is only relevant for accepts; a passenger may always walk
/// away from an offer.
pub fn validate_offer_response(
    offer: Option<&Offer>,
    action: OfferAction,
    passenger: Option<&Passenger>,
    now: i64,
) -> ValidationReport {
    let mut errors = Vec::new();

    if offer.is_none() {
        errors.push("Offer not found".to_string());
    }

    if passenger.is_none() {
        errors.push("Passenger data not available".to_string());
    }

    if let Some(offer) = offer {
        if offer.status != OfferStatus::Pending {
            errors.push(format!(
                "Cannot {action} an offer that is {}",
                offer.status
            ));
        }

        if let Some(expires_at) = offer.expires_at {
            if now >= expires_at {
                errors.push("Offer has expired".to_string());
            }
        }
    }

    if action == OfferAction::Accept && passenger.is_some() {
        let eligibility = check_upgrade_eligibility(passenger);
        if !eligibility.eligible {
            errors.push(eligibility.reason);
        }
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}

/// Priority score for ranking simultaneous offers; higher is better.
///
/// Berth preference contributes up to 5 points, remaining validity up to
/// 5 more (one point per ten minutes).
pub fn calculate_offer_priority(offer: &Offer, now: i64) -> f64 {
    let mut score = offer
        .berth_type
        .map(|b| b.preference_score())
        .unwrap_or(0.0);

    if let Some(remaining) = offer.remaining_ms(now) {
        let minutes_remaining = remaining.div_euclid(60_000) as f64;
        score += (minutes_remaining / 10.0).min(5.0);
    }

    score
}

/// True while the offer is still live but inside the warning threshold.
pub fn is_offer_expiring_soon(offer: &Offer, threshold_ms: i64, now: i64) -> bool {
    match offer.remaining_ms(now) {
        Some(remaining) => remaining > 0 && remaining <= threshold_ms,
        None => false,
    }
}
