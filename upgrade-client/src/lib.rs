//! Realtime berth-upgrade synchronization client
//!
//! Keeps a passenger's upgrade offers in sync with the allocation
//! backend: a socket connection delivers pushed events, periodic fetches
//! reconcile missed state, a redb-backed store holds the offer lifecycle,
//! and an idempotency gate guarantees each accept/deny reaches the
//! authority exactly once.
//!
//! # Example
//!
//! ```no_run
//! use upgrade_client::{ClientConfig, OfferStorage, UpgradeSession};
//!
//! # async fn run() -> upgrade_client::SyncResult<()> {
//! let config = ClientConfig::new("http://localhost:5000");
//! let storage = OfferStorage::open("offers.redb")?;
//! let session = UpgradeSession::with_defaults("1234567890", config, storage)?;
//! session.start().await?;
//!
//! for offer in session.active_offers().await {
//!     println!("{}: berth {:?}", offer.id, offer.to_berth);
//! }
//! # Ok(())
//! # }
//! ```

pub mod authority;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod idempotency;
pub mod notify;
pub mod session;
pub mod socket;
pub mod store;

pub use authority::{Authority, HttpAuthority};
pub use config::{ClientConfig, ReconnectPolicy, SessionConfig, SocketConfig};
pub use error::{SyncError, SyncResult};
pub use idempotency::{ExecutionGate, IdempotencyManager, execute_idempotent};
pub use notify::{LogNotifier, Notification, NotificationKind, Notifier};
pub use session::UpgradeSession;
pub use socket::{ConnectionStatus, ListenerId, SocketClient};
pub use store::{OfferFilter, OfferStorage, OfferStore, StorageError};

pub use shared::message::{ClientMessage, Envelope, EventKind, ServerMessage};
pub use shared::models::{Offer, OfferDraft, OfferStatistics, OfferStatus, Passenger};
pub use shared::response::{ApiResponse, OfferActionOutcome};
