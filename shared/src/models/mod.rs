//! Domain models shared between the client crate and its tests

pub mod offer;
pub mod passenger;

pub use offer::{Offer, OfferDraft, OfferStatistics, OfferStatus, StatusLane};
pub use passenger::{BerthType, BoardingStatus, Passenger, PnrStatus};
