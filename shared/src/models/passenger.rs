//! Passenger snapshot used by the eligibility rules

use serde::{Deserialize, Serialize};

/// Fare status on the booking record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PnrStatus {
    /// Partially confirmed; the only status eligible for upgrade offers
    Rac,
    Confirmed,
    Waitlisted,
}

/// Where the passenger currently is relative to the train
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoardingStatus {
    #[default]
    NotBoarded,
    Boarded,
    Deboarded,
}

/// Berth position, ordered by passenger preference
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BerthType {
    /// Lower berth, most preferred
    #[serde(rename = "LB")]
    Lower,
    /// Side lower
    #[serde(rename = "SL")]
    SideLower,
    /// Middle berth
    #[serde(rename = "MB")]
    Middle,
    /// Upper berth
    #[serde(rename = "UB")]
    Upper,
    /// Side upper
    #[serde(rename = "SU")]
    SideUpper,
}

impl BerthType {
    /// Fixed preference order used when ranking simultaneous offers
    pub fn preference_score(&self) -> f64 {
        match self {
            BerthType::Lower => 5.0,
            BerthType::SideLower => 4.0,
            BerthType::Middle => 3.0,
            BerthType::Upper => 2.0,
            BerthType::SideUpper => 1.0,
        }
    }
}

/// Point-in-time view of a passenger, consumed by the pure eligibility rules
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passenger {
    pub pnr: String,
    pub pnr_status: PnrStatus,
    pub boarded: bool,
    pub no_show: bool,
    pub boarding_status: BoardingStatus,
    pub coach: Option<String>,
    pub berth: Option<String>,
}

impl Passenger {
    /// A boarded RAC passenger with no disqualifying flags, handy in tests
    pub fn boarded_rac(pnr: impl Into<String>) -> Self {
        Self {
            pnr: pnr.into(),
            pnr_status: PnrStatus::Rac,
            boarded: true,
            no_show: false,
            boarding_status: BoardingStatus::Boarded,
            coach: None,
            berth: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_berth_wire_tokens() {
        assert_eq!(serde_json::to_string(&BerthType::Lower).unwrap(), "\"LB\"");
        assert_eq!(
            serde_json::to_string(&BerthType::SideUpper).unwrap(),
            "\"SU\""
        );
        let parsed: BerthType = serde_json::from_str("\"MB\"").unwrap();
        assert_eq!(parsed, BerthType::Middle);
    }

    #[test]
    fn test_preference_order() {
        let ordered = [
            BerthType::Lower,
            BerthType::SideLower,
            BerthType::Middle,
            BerthType::Upper,
            BerthType::SideUpper,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0].preference_score() > pair[1].preference_score());
        }
    }
}
