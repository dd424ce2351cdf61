//! redb-based durable store
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `offers` | `offer_id` | `Offer` (JSON) | Offer cache, survives restarts |
//! | `idempotency_tokens` | `action` | `StoredToken` (JSON) | Token cache for retried submissions |
//!
//! Every mutating operation in the offer store rewrites the full offer set
//! inside one transaction, so a later load can never observe a partial
//! write. redb commits are durable as soon as `commit()` returns.

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use shared::models::Offer;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Table for the offer cache: key = offer id, value = JSON-serialized Offer
const OFFERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("offers");

/// Table for idempotency tokens: key = action, value = JSON-serialized StoredToken
const TOKENS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("idempotency_tokens");

/// Idempotency token persisted per action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    /// UTC epoch milliseconds at which the token was issued
    pub timestamp: i64,
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Offer storage backed by redb
#[derive(Clone)]
pub struct OfferStorage {
    db: Arc<Database>,
}

impl OfferStorage {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        let storage = Self { db: Arc::new(db) };
        storage.init_tables()?;
        Ok(storage)
    }

    /// Open an in-memory database (tests and ephemeral sessions)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        let storage = Self { db: Arc::new(db) };
        storage.init_tables()?;
        Ok(storage)
    }

    fn init_tables(&self) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let _ = write_txn.open_table(OFFERS_TABLE)?;
            let _ = write_txn.open_table(TOKENS_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    // ========== Offer Cache ==========

    /// Replace the persisted offer set with `offers`, atomically.
    pub fn save_offers(&self, offers: &[Offer]) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            write_txn.delete_table(OFFERS_TABLE)?;
            let mut table = write_txn.open_table(OFFERS_TABLE)?;
            for offer in offers {
                let value = serde_json::to_vec(offer)?;
                table.insert(offer.id.as_str(), value.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Load every persisted offer
    pub fn load_offers(&self) -> StorageResult<Vec<Offer>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OFFERS_TABLE)?;

        let mut offers = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            let offer: Offer = serde_json::from_slice(value.value())?;
            offers.push(offer);
        }
        Ok(offers)
    }

    // ========== Idempotency Token Cache ==========

    /// Persist the token for an action, replacing any previous one
    pub fn store_token(&self, action: &str, token: &StoredToken) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TOKENS_TABLE)?;
            let value = serde_json::to_vec(token)?;
            table.insert(action, value.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Fetch the token for an action if it is younger than `ttl_ms`.
    ///
    /// An expired token is removed as a side effect.
    pub fn get_token(&self, action: &str, ttl_ms: i64, now: i64) -> StorageResult<Option<String>> {
        let token = {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(TOKENS_TABLE)?;
            match table.get(action)? {
                Some(value) => {
                    let stored: StoredToken = serde_json::from_slice(value.value())?;
                    Some(stored)
                }
                None => None,
            }
        };

        match token {
            Some(stored) if now - stored.timestamp <= ttl_ms => Ok(Some(stored.token)),
            Some(_) => {
                self.remove_token(action)?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Remove the token for an action
    pub fn remove_token(&self, action: &str) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TOKENS_TABLE)?;
            table.remove(action)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Drop every token older than `ttl_ms`; returns how many were removed
    pub fn cleanup_tokens(&self, ttl_ms: i64, now: i64) -> StorageResult<usize> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(TOKENS_TABLE)?;

            let mut stale: Vec<String> = Vec::new();
            for result in table.iter()? {
                let (key, value) = result?;
                let stored: StoredToken = serde_json::from_slice(value.value())?;
                if now - stored.timestamp > ttl_ms {
                    stale.push(key.value().to_string());
                }
            }

            for action in &stale {
                table.remove(action.as_str())?;
            }
            stale.len()
        };
        write_txn.commit()?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{Offer, OfferStatus};

    fn sample_offer(id: &str) -> Offer {
        Offer {
            id: id.to_string(),
            notification_id: Some(format!("n-{id}")),
            pnr: "1234567890".to_string(),
            from_berth: Some("S2-45".to_string()),
            to_berth: Some("S1-22".to_string()),
            coach: Some("S1".to_string()),
            berth_type: None,
            status: OfferStatus::Pending,
            created_at: 1_700_000_000_000,
            expires_at: Some(1_700_000_060_000),
            accepted_at: None,
            denied_at: None,
            confirmed_at: None,
            rejected_at: None,
            expired_at: None,
            updated_at: None,
            denial_reason: None,
            rejection_reason: None,
        }
    }

    #[test]
    fn test_save_and_load_offers() {
        let storage = OfferStorage::open_in_memory().unwrap();
        assert!(storage.load_offers().unwrap().is_empty());

        let offers = vec![sample_offer("o1"), sample_offer("o2")];
        storage.save_offers(&offers).unwrap();

        let mut loaded = storage.load_offers().unwrap();
        loaded.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(loaded, offers);
    }

    #[test]
    fn test_save_replaces_previous_set() {
        let storage = OfferStorage::open_in_memory().unwrap();
        storage
            .save_offers(&[sample_offer("o1"), sample_offer("o2")])
            .unwrap();
        storage.save_offers(&[sample_offer("o3")]).unwrap();

        let loaded = storage.load_offers().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "o3");
    }

    #[test]
    fn test_token_ttl() {
        let storage = OfferStorage::open_in_memory().unwrap();
        let now = 1_700_000_000_000;
        let token = StoredToken {
            token: "tok-1".to_string(),
            timestamp: now,
        };
        storage.store_token("accept_offer", &token).unwrap();

        // Fresh token is returned
        assert_eq!(
            storage
                .get_token("accept_offer", 300_000, now + 1_000)
                .unwrap()
                .as_deref(),
            Some("tok-1")
        );

        // Past the TTL the token is gone (and removed)
        assert!(storage
            .get_token("accept_offer", 300_000, now + 301_000)
            .unwrap()
            .is_none());
        assert!(storage
            .get_token("accept_offer", 300_000, now + 1_000)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_cleanup_tokens() {
        let storage = OfferStorage::open_in_memory().unwrap();
        let now = 1_700_000_000_000;
        storage
            .store_token(
                "accept_offer",
                &StoredToken {
                    token: "old".to_string(),
                    timestamp: now - 400_000,
                },
            )
            .unwrap();
        storage
            .store_token(
                "deny_offer",
                &StoredToken {
                    token: "fresh".to_string(),
                    timestamp: now,
                },
            )
            .unwrap();

        let removed = storage.cleanup_tokens(300_000, now).unwrap();
        assert_eq!(removed, 1);
        assert!(storage
            .get_token("deny_offer", 300_000, now)
            .unwrap()
            .is_some());
    }
}
