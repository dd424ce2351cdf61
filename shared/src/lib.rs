//! Shared types for the upgrade-offer synchronization client
//!
//! Domain models, socket message envelopes, and remote-authority response
//! structures used by the client crate.

pub mod message;
pub mod models;
pub mod response;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

// Message re-exports (for convenient access)
pub use message::{ClientMessage, Envelope, ServerMessage};
pub use models::{Offer, OfferStatus, Passenger};
