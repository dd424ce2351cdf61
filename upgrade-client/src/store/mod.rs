//! Offer store
//!
//! In-memory offer map over the redb-backed [`OfferStorage`]. All state
//! transitions go through the methods here; every mutation persists the
//! full offer set in one transaction before returning.

mod storage;

pub use storage::{OfferStorage, StorageError, StorageResult, StoredToken};

use shared::models::{Offer, OfferDraft, OfferStatistics, OfferStatus};
use shared::util::now_millis;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Filter for [`OfferStore::offers_by_pnr`]
#[derive(Debug, Clone, Copy, Default)]
pub struct OfferFilter {
    pub status: Option<OfferStatus>,
    /// When true, keep only offers that are Pending and not past expiry
    pub active: bool,
}

/// Offer cache with durable write-through persistence.
///
/// Callers serialize access behind a single lock; the store itself holds
/// no interior synchronization.
pub struct OfferStore {
    offers: HashMap<String, Offer>,
    storage: OfferStorage,
}

impl OfferStore {
    /// Build a store over existing storage, loading any persisted offers.
    pub fn new(storage: OfferStorage) -> StorageResult<Self> {
        let persisted = storage.load_offers()?;
        let mut offers = HashMap::with_capacity(persisted.len());
        for offer in persisted {
            offers.insert(offer.id.clone(), offer);
        }
        if !offers.is_empty() {
            info!(count = offers.len(), "Loaded persisted offers");
        }
        Ok(Self { offers, storage })
    }

    fn persist(&self) -> StorageResult<()> {
        let all: Vec<Offer> = self.offers.values().cloned().collect();
        self.storage.save_offers(&all)
    }

    // ========== Inserts ==========

    /// Insert an offer from a partial record.
    ///
    /// Missing `id` gets a fresh uuid, missing `status` defaults to Pending,
    /// missing `created_at` defaults to now. Returns the stored offer.
    pub fn add_offer(&mut self, pnr: &str, draft: OfferDraft) -> StorageResult<Offer> {
        let now = now_millis();
        let offer = Offer {
            id: draft
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            notification_id: draft.notification_id,
            pnr: pnr.to_string(),
            from_berth: draft.from_berth,
            to_berth: draft.to_berth,
            coach: draft.coach,
            berth_type: draft.berth_type,
            status: draft.status.unwrap_or_default(),
            created_at: draft.created_at.unwrap_or(now),
            expires_at: draft.expires_at,
            accepted_at: draft.accepted_at,
            denied_at: draft.denied_at,
            confirmed_at: draft.confirmed_at,
            rejected_at: draft.rejected_at,
            expired_at: None,
            updated_at: Some(now),
            denial_reason: draft.denial_reason,
            rejection_reason: draft.rejection_reason,
        };

        debug!(offer_id = %offer.id, pnr = %offer.pnr, "Adding offer");
        self.offers.insert(offer.id.clone(), offer.clone());
        self.persist()?;
        Ok(offer)
    }

    // ========== Reads ==========

    pub fn get(&self, offer_id: &str) -> Option<&Offer> {
        self.offers.get(offer_id)
    }

    pub fn get_by_notification_id(&self, notification_id: &str) -> Option<&Offer> {
        self.offers
            .values()
            .find(|o| o.notification_id.as_deref() == Some(notification_id))
    }

    /// Offers for a PNR, newest-created first.
    pub fn offers_by_pnr(&self, pnr: &str, filter: OfferFilter) -> Vec<Offer> {
        let now = now_millis();
        let mut result: Vec<Offer> = self
            .offers
            .values()
            .filter(|o| o.pnr == pnr)
            .filter(|o| filter.status.is_none_or(|s| o.status == s))
            .filter(|o| !filter.active || o.is_active(now))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result
    }

    /// Pending, unexpired offers for a PNR, newest first.
    pub fn active_offers(&self, pnr: &str) -> Vec<Offer> {
        self.offers_by_pnr(
            pnr,
            OfferFilter {
                status: None,
                active: true,
            },
        )
    }

    // ========== Transitions ==========

    fn transition(
        &mut self,
        offer_id: &str,
        apply: impl FnOnce(&mut Offer, i64),
    ) -> StorageResult<Option<Offer>> {
        let now = now_millis();
        let Some(offer) = self.offers.get_mut(offer_id) else {
            return Ok(None);
        };
        apply(offer, now);
        offer.updated_at = Some(now);
        let updated = offer.clone();
        self.persist()?;
        Ok(Some(updated))
    }

    pub fn accept(&mut self, offer_id: &str) -> StorageResult<Option<Offer>> {
        self.transition(offer_id, |offer, now| {
            offer.status = OfferStatus::Accepted;
            offer.accepted_at.get_or_insert(now);
        })
    }

    pub fn deny(&mut self, offer_id: &str, reason: &str) -> StorageResult<Option<Offer>> {
        self.transition(offer_id, |offer, now| {
            offer.status = OfferStatus::Denied;
            offer.denied_at.get_or_insert(now);
            offer.denial_reason = Some(reason.to_string());
        })
    }

    pub fn confirm(&mut self, offer_id: &str) -> StorageResult<Option<Offer>> {
        self.transition(offer_id, |offer, now| {
            offer.status = OfferStatus::Confirmed;
            offer.confirmed_at.get_or_insert(now);
        })
    }

    pub fn reject(&mut self, offer_id: &str, reason: Option<&str>) -> StorageResult<Option<Offer>> {
        self.transition(offer_id, |offer, now| {
            offer.status = OfferStatus::Rejected;
            offer.rejected_at.get_or_insert(now);
            if let Some(reason) = reason {
                offer.rejection_reason = Some(reason.to_string());
            }
        })
    }

    pub fn expire(&mut self, offer_id: &str) -> StorageResult<Option<Offer>> {
        self.transition(offer_id, |offer, now| {
            offer.status = OfferStatus::Expired;
            offer.expired_at.get_or_insert(now);
        })
    }

    /// Expire every Pending offer past its `expires_at`. Returns how many
    /// offers were transitioned.
    pub fn expire_old_offers(&mut self, pnr: Option<&str>) -> StorageResult<usize> {
        let now = now_millis();
        let stale: Vec<String> = self
            .offers
            .values()
            .filter(|o| pnr.is_none_or(|p| o.pnr == p))
            .filter(|o| o.status == OfferStatus::Pending)
            .filter(|o| o.expires_at.is_some_and(|e| now >= e))
            .map(|o| o.id.clone())
            .collect();

        for id in &stale {
            if let Some(offer) = self.offers.get_mut(id) {
                offer.status = OfferStatus::Expired;
                offer.expired_at.get_or_insert(now);
                offer.updated_at = Some(now);
            }
        }
        if !stale.is_empty() {
            info!(count = stale.len(), "Expired stale offers");
            self.persist()?;
        }
        Ok(stale.len())
    }

    // ========== Remote merge ==========

    /// Merge remote offer records for a PNR into the local cache.
    ///
    /// Remote records join on `notification_id`. Unknown records are
    /// inserted. Known records only advance: a remote status with a higher
    /// rank than the local one is applied, as is a remote record that
    /// carries a confirmation/rejection timestamp the local copy lacks
    /// (the status is then derived from that timestamp, never taken from
    /// a stale remote status field).
    /// Same-or-backward remote status is flagged and skipped, so a locally
    /// completed transition can never be undone by a stale fetch. Finishes
    /// with an expiry sweep over the PNR.
    pub fn merge_server_offers(
        &mut self,
        pnr: &str,
        remote: Vec<OfferDraft>,
    ) -> StorageResult<()> {
        let mut dirty = false;
        for draft in remote {
            let Some(notification_id) = draft.notification_id.clone() else {
                debug!("Skipping remote offer without notification id");
                continue;
            };

            let local_id = self
                .get_by_notification_id(&notification_id)
                .map(|o| o.id.clone());

            match local_id {
                None => {
                    self.add_offer(pnr, draft)?;
                }
                Some(id) => {
                    let now = now_millis();
                    let Some(offer) = self.offers.get_mut(&id) else {
                        continue;
                    };
                    let remote_status = draft.status.unwrap_or_default();
                    let advances = remote_status.rank() > offer.status.rank();
                    let fills_confirmation = (draft.confirmed_at.is_some()
                        && offer.confirmed_at.is_none())
                        || (draft.rejected_at.is_some() && offer.rejected_at.is_none());

                    if advances || fills_confirmation {
                        if advances {
                            offer.status = remote_status;
                        } else if draft.confirmed_at.is_some() && offer.confirmed_at.is_none() {
                            offer.status = OfferStatus::Confirmed;
                        } else {
                            offer.status = OfferStatus::Rejected;
                        }
                        if let Some(ts) = draft.accepted_at {
                            offer.accepted_at.get_or_insert(ts);
                        }
                        if let Some(ts) = draft.denied_at {
                            offer.denied_at.get_or_insert(ts);
                        }
                        if let Some(ts) = draft.confirmed_at {
                            offer.confirmed_at.get_or_insert(ts);
                        }
                        if let Some(ts) = draft.rejected_at {
                            offer.rejected_at.get_or_insert(ts);
                        }
                        if draft.denial_reason.is_some() {
                            offer.denial_reason = draft.denial_reason;
                        }
                        if draft.rejection_reason.is_some() {
                            offer.rejection_reason = draft.rejection_reason;
                        }
                        if draft.expires_at.is_some() {
                            offer.expires_at = draft.expires_at;
                        }
                        offer.updated_at = Some(now);
                        dirty = true;
                    } else if remote_status != offer.status {
                        warn!(
                            offer_id = %id,
                            local = %offer.status,
                            remote = %remote_status,
                            "Remote status does not advance local offer, skipping"
                        );
                    }
                }
            }
        }
        if dirty {
            self.persist()?;
        }
        self.expire_old_offers(Some(pnr))?;
        Ok(())
    }

    // ========== Removal ==========

    pub fn delete_offer(&mut self, offer_id: &str) -> StorageResult<bool> {
        let removed = self.offers.remove(offer_id).is_some();
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn clear_offers_by_pnr(&mut self, pnr: &str) -> StorageResult<usize> {
        let before = self.offers.len();
        self.offers.retain(|_, o| o.pnr != pnr);
        let removed = before - self.offers.len();
        if removed > 0 {
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn clear_all(&mut self) -> StorageResult<usize> {
        let removed = self.offers.len();
        self.offers.clear();
        self.persist()?;
        Ok(removed)
    }

    // ========== Request Tokens ==========

    /// Durable per-action idempotency token: reused while fresh, minted
    /// when missing or expired. Keeps request keys stable across restarts
    /// within the TTL window.
    pub fn action_token(&self, action: &str, ttl_ms: i64) -> StorageResult<String> {
        let now = now_millis();
        if let Some(token) = self.storage.get_token(action, ttl_ms, now)? {
            return Ok(token);
        }
        let token = uuid::Uuid::new_v4().to_string();
        self.storage.store_token(
            action,
            &StoredToken {
                token: token.clone(),
                timestamp: now,
            },
        )?;
        Ok(token)
    }

    /// Drop expired request tokens; returns how many were removed.
    pub fn cleanup_request_tokens(&self, ttl_ms: i64) -> StorageResult<usize> {
        self.storage.cleanup_tokens(ttl_ms, now_millis())
    }

    // ========== Statistics ==========

    /// Per-status counts, optionally scoped to one PNR.
    pub fn statistics(&self, pnr: Option<&str>) -> OfferStatistics {
        let mut stats = OfferStatistics::default();
        for offer in self
            .offers
            .values()
            .filter(|o| pnr.is_none_or(|p| o.pnr == p))
        {
            stats.total += 1;
            match offer.status {
                OfferStatus::Pending => stats.pending += 1,
                OfferStatus::Accepted => stats.accepted += 1,
                OfferStatus::Denied => stats.denied += 1,
                OfferStatus::Confirmed => stats.confirmed += 1,
                OfferStatus::Rejected => stats.rejected += 1,
                OfferStatus::Expired => stats.expired += 1,
            }
        }
        stats
    }
}
