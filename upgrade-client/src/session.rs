//! Upgrade session facade
//!
//! One [`UpgradeSession`] per passenger session ties the pieces together:
//! the socket feeds server events into the store, two background loops
//! keep the cache fresh (periodic refetch) and honest (expiry sweep), and
//! accept/deny run through validation and the idempotency gate before a
//! single authority request goes out.
//!
//! Every store mutation enters through one mutex, whether it originates
//! from a timer tick, a socket event, or an operation completing. Nothing
//! is mutated optimistically; the local transition happens only after the
//! authority has answered.

use serde_json::{Value, json};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::authority::{Authority, HttpAuthority};
use crate::config::ClientConfig;
use crate::eligibility::{can_accept_offer, can_deny_offer};
use crate::error::{SyncError, SyncResult};
use crate::idempotency::{IdempotencyManager, execute_idempotent};
use crate::notify::{LogNotifier, Notification, NotificationKind, Notifier};
use crate::socket::SocketClient;
use crate::store::{OfferFilter, OfferStorage, OfferStore};
use shared::message::{EventKind, ServerMessage};
use shared::models::{BoardingStatus, Offer, OfferDraft, OfferStatistics, Passenger};
use shared::response::OfferActionOutcome;
use shared::util::now_millis;

/// Per-passenger synchronization session
pub struct UpgradeSession {
    pnr: String,
    config: ClientConfig,
    authority: Arc<dyn Authority>,
    socket: SocketClient,
    store: Arc<Mutex<OfferStore>>,
    idempotency: Arc<Mutex<IdempotencyManager>>,
    notifier: Arc<dyn Notifier>,
    passenger: Arc<RwLock<Option<Passenger>>>,
    cancel: CancellationToken,
}

impl UpgradeSession {
    pub fn new(
        pnr: impl Into<String>,
        config: ClientConfig,
        authority: Arc<dyn Authority>,
        socket: SocketClient,
        storage: OfferStorage,
        notifier: Arc<dyn Notifier>,
    ) -> SyncResult<Self> {
        let store = OfferStore::new(storage)?;
        let idempotency = IdempotencyManager::new(
            config.session.idempotency_ttl.as_millis() as i64,
            config.session.idempotency_max_completed,
        );

        Ok(Self {
            pnr: pnr.into(),
            config,
            authority,
            socket,
            store: Arc::new(Mutex::new(store)),
            idempotency: Arc::new(Mutex::new(idempotency)),
            notifier,
            passenger: Arc::new(RwLock::new(None)),
            cancel: CancellationToken::new(),
        })
    }

    /// Production wiring: HTTP authority, TCP socket, log notifications.
    pub fn with_defaults(
        pnr: impl Into<String>,
        config: ClientConfig,
        storage: OfferStorage,
    ) -> SyncResult<Self> {
        let pnr = pnr.into();
        let authority = Arc::new(HttpAuthority::new(&config)?);
        let socket = SocketClient::with_tcp(config.socket.clone(), pnr.clone());
        Self::new(pnr, config, authority, socket, storage, Arc::new(LogNotifier))
    }

    /// Bring the session up: wire socket handlers, connect, load the
    /// current offer set, and start the refresh and sweep loops.
    pub async fn start(&self) -> SyncResult<()> {
        self.wire_handlers();
        self.socket.connect().await?;

        if let Err(e) = self.refresh_offers().await {
            // The socket still delivers new offers; the next refresh tick
            // will retry the full fetch.
            warn!("Initial offer fetch failed: {e}");
        }

        self.spawn_refresh_loop();
        self.spawn_sweep_loop();
        info!(pnr = %self.pnr, "Upgrade session started");
        Ok(())
    }

    /// Stop background work and close the connection.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.socket.disconnect().await;
        info!(pnr = %self.pnr, "Upgrade session stopped");
    }

    // ========== Operations ==========

    /// Accept an offer.
    ///
    /// Validation failures come back as a failed outcome with the reason;
    /// the offer is left untouched. The authority request is idempotent on
    /// `(pnr, offer_id, notification_id)`, so a double-tap produces one
    /// request. The local transition applies only after the authority
    /// accepts.
    pub async fn accept_offer(
        &self,
        offer_id: &str,
        notification_id: &str,
    ) -> SyncResult<OfferActionOutcome> {
        let now = now_millis();
        {
            let store = self.store.lock().await;
            let offer = store.get(offer_id);
            let passenger = self.passenger_snapshot();
            let decision = can_accept_offer(offer, passenger.as_ref(), now);
            if !decision.allowed {
                debug!(offer_id, reason = %decision.reason, "Accept blocked");
                return Ok(OfferActionOutcome::failed(decision.reason));
            }
        }

        let ttl_ms = self.config.session.idempotency_ttl.as_millis() as i64;
        let token = self.store.lock().await.action_token("accept_offer", ttl_ms)?;
        let params = json!({
            "pnr": self.pnr,
            "offerId": offer_id,
            "notificationId": notification_id,
            "token": token,
        });
        let authority = self.authority.clone();
        let pnr = self.pnr.clone();
        let notification = notification_id.to_string();

        let result = execute_idempotent(&self.idempotency, "accept_offer", &params, || async move {
            let response = authority.accept_upgrade(&pnr, &notification).await?;
            if !response.success {
                return Err(SyncError::Remote(
                    response
                        .message
                        .unwrap_or_else(|| "Accept was rejected".to_string()),
                ));
            }
            Ok(response.data.unwrap_or(Value::Null))
        })
        .await;

        match result {
            Ok(data) => {
                let accepted = self.store.lock().await.accept(offer_id)?;
                if let Some(offer) = accepted {
                    self.notifier.notify(Notification::new(
                        NotificationKind::OfferAccepted,
                        "Upgrade Accepted",
                        format!(
                            "Your upgrade to berth {} is awaiting confirmation",
                            offer.to_berth.as_deref().unwrap_or("-")
                        ),
                    ));
                }
                Ok(OfferActionOutcome::ok(Some(data)))
            }
            Err(e @ SyncError::Storage(_)) => Err(e),
            Err(e) => {
                debug!(offer_id, "Accept failed: {e}");
                Ok(OfferActionOutcome::failed(e.to_string()))
            }
        }
    }

    /// Deny an offer. Mirrors [`accept_offer`](Self::accept_offer); the
    /// reason defaults to the configured one.
    pub async fn deny_offer(
        &self,
        offer_id: &str,
        notification_id: &str,
        reason: Option<&str>,
    ) -> SyncResult<OfferActionOutcome> {
        let reason = reason
            .unwrap_or(&self.config.session.default_denial_reason)
            .to_string();

        {
            let store = self.store.lock().await;
            let decision = can_deny_offer(store.get(offer_id));
            if !decision.allowed {
                debug!(offer_id, reason = %decision.reason, "Deny blocked");
                return Ok(OfferActionOutcome::failed(decision.reason));
            }
        }

        let ttl_ms = self.config.session.idempotency_ttl.as_millis() as i64;
        let token = self.store.lock().await.action_token("deny_offer", ttl_ms)?;
        let params = json!({
            "pnr": self.pnr,
            "offerId": offer_id,
            "notificationId": notification_id,
            "token": token,
        });
        let authority = self.authority.clone();
        let pnr = self.pnr.clone();
        let notification = notification_id.to_string();
        let remote_reason = reason.clone();

        let result = execute_idempotent(&self.idempotency, "deny_offer", &params, || async move {
            let response = authority
                .deny_upgrade(&pnr, &notification, &remote_reason)
                .await?;
            if !response.success {
                return Err(SyncError::Remote(
                    response
                        .message
                        .unwrap_or_else(|| "Deny was rejected".to_string()),
                ));
            }
            Ok(response.data.unwrap_or(Value::Null))
        })
        .await;

        match result {
            Ok(data) => {
                self.store.lock().await.deny(offer_id, &reason)?;
                self.notifier.notify(Notification::new(
                    NotificationKind::OfferDeclined,
                    "Offer Declined",
                    "You keep your current berth",
                ));
                Ok(OfferActionOutcome::ok(Some(data)))
            }
            Err(e @ SyncError::Storage(_)) => Err(e),
            Err(e) => {
                debug!(offer_id, "Deny failed: {e}");
                Ok(OfferActionOutcome::failed(e.to_string()))
            }
        }
    }

    /// Fetch the authority's current offer set and merge it in.
    pub async fn refresh_offers(&self) -> SyncResult<()> {
        let remote = self.authority.fetch_offers(&self.pnr).await?;
        debug!(count = remote.len(), "Fetched remote offers");
        self.store
            .lock()
            .await
            .merge_server_offers(&self.pnr, remote)?;
        Ok(())
    }

    // ========== Reads ==========

    pub async fn get_offer(&self, offer_id: &str) -> Option<Offer> {
        self.store.lock().await.get(offer_id).cloned()
    }

    pub async fn offers(&self, filter: OfferFilter) -> Vec<Offer> {
        self.store.lock().await.offers_by_pnr(&self.pnr, filter)
    }

    pub async fn active_offers(&self) -> Vec<Offer> {
        self.store.lock().await.active_offers(&self.pnr)
    }

    pub async fn is_offer_active(&self, offer_id: &str) -> bool {
        self.store
            .lock()
            .await
            .get(offer_id)
            .is_some_and(|o| o.is_active(now_millis()))
    }

    pub async fn statistics(&self) -> OfferStatistics {
        self.store.lock().await.statistics(Some(&self.pnr))
    }

    pub async fn clear_offers(&self) -> SyncResult<usize> {
        Ok(self.store.lock().await.clear_offers_by_pnr(&self.pnr)?)
    }

    /// Update the eligibility snapshot.
    pub fn set_passenger(&self, passenger: Option<Passenger>) {
        *self.passenger.write().unwrap_or_else(|e| e.into_inner()) = passenger;
    }

    pub fn passenger_snapshot(&self) -> Option<Passenger> {
        self.passenger
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn socket(&self) -> &SocketClient {
        &self.socket
    }

    // ========== Socket wiring ==========

    fn wire_handlers(&self) {
        let store = self.store.clone();
        let notifier = self.notifier.clone();
        let pnr = self.pnr.clone();
        self.socket.on(EventKind::NewOffer, move |message| {
            if let ServerMessage::NewOffer(payload) = message {
                let payload = payload.clone();
                let store = store.clone();
                let notifier = notifier.clone();
                let pnr = pnr.clone();
                tokio::spawn(async move {
                    let mut store = store.lock().await;
                    if let Some(id) = payload.notification_id.as_deref() {
                        if store.get_by_notification_id(id).is_some() {
                            debug!(notification_id = id, "Offer already known");
                            return;
                        }
                    }
                    let draft = OfferDraft {
                        notification_id: payload.notification_id,
                        from_berth: payload.from_berth,
                        to_berth: payload.to_berth.clone(),
                        coach: payload.coach,
                        berth_type: payload.berth_type,
                        expires_at: payload.expires_at,
                        ..OfferDraft::default()
                    };
                    match store.add_offer(&pnr, draft) {
                        Ok(_) => notifier.notify(Notification::new(
                            NotificationKind::OfferReceived,
                            "Upgrade Offer",
                            format!(
                                "Berth {} is available for you",
                                payload.to_berth.as_deref().unwrap_or("-")
                            ),
                        )),
                        Err(e) => error!("Failed to store pushed offer: {e}"),
                    }
                });
            }
        });

        let store = self.store.clone();
        let notifier = self.notifier.clone();
        self.socket.on(EventKind::OfferExpired, move |message| {
            if let ServerMessage::OfferExpired(payload) = message {
                let notification_id = payload.notification_id.clone();
                let store = store.clone();
                let notifier = notifier.clone();
                tokio::spawn(async move {
                    let mut store = store.lock().await;
                    let Some(id) = store
                        .get_by_notification_id(&notification_id)
                        .map(|o| o.id.clone())
                    else {
                        return;
                    };
                    match store.expire(&id) {
                        Ok(_) => notifier.notify(Notification::new(
                            NotificationKind::OfferExpired,
                            "Offer Expired",
                            "The upgrade offer is no longer available",
                        )),
                        Err(e) => error!("Failed to expire offer: {e}"),
                    }
                });
            }
        });

        // Echoes of responses submitted by this or another device carrying
        // the same PNR; applying them again is harmless.
        let store = self.store.clone();
        self.socket.on(EventKind::OfferAccepted, move |message| {
            if let ServerMessage::OfferAccepted(payload) = message {
                let notification_id = payload.notification_id.clone();
                let store = store.clone();
                tokio::spawn(async move {
                    let mut store = store.lock().await;
                    let Some(id) = store
                        .get_by_notification_id(&notification_id)
                        .map(|o| o.id.clone())
                    else {
                        return;
                    };
                    if let Err(e) = store.accept(&id) {
                        error!("Failed to apply accept echo: {e}");
                    }
                });
            }
        });

        let store = self.store.clone();
        let default_reason = self.config.session.default_denial_reason.clone();
        self.socket.on(EventKind::OfferDenied, move |message| {
            if let ServerMessage::OfferDenied(payload) = message {
                let notification_id = payload.notification_id.clone();
                let store = store.clone();
                let reason = default_reason.clone();
                tokio::spawn(async move {
                    let mut store = store.lock().await;
                    let Some(id) = store
                        .get_by_notification_id(&notification_id)
                        .map(|o| o.id.clone())
                    else {
                        return;
                    };
                    if let Err(e) = store.deny(&id, &reason) {
                        error!("Failed to apply deny echo: {e}");
                    }
                });
            }
        });

        let store = self.store.clone();
        let notifier = self.notifier.clone();
        self.socket
            .on(EventKind::AllocationConfirmed, move |message| {
                if let ServerMessage::AllocationConfirmed(payload) = message {
                    let payload = payload.clone();
                    let store = store.clone();
                    let notifier = notifier.clone();
                    tokio::spawn(async move {
                        let mut store = store.lock().await;
                        let Some(id) = store
                            .get_by_notification_id(&payload.notification_id)
                            .map(|o| o.id.clone())
                        else {
                            warn!(
                                notification_id = %payload.notification_id,
                                "Confirmation for unknown offer"
                            );
                            return;
                        };
                        match store.confirm(&id) {
                            Ok(_) => notifier.notify(Notification::new(
                                NotificationKind::UpgradeConfirmed,
                                "Upgrade Confirmed",
                                format!(
                                    "Your new berth is {}",
                                    payload.to_berth.as_deref().unwrap_or("-")
                                ),
                            )),
                            Err(e) => error!("Failed to confirm offer: {e}"),
                        }
                    });
                }
            });

        let store = self.store.clone();
        let notifier = self.notifier.clone();
        self.socket.on(EventKind::AllocationRejected, move |message| {
            if let ServerMessage::AllocationRejected(payload) = message {
                let payload = payload.clone();
                let store = store.clone();
                let notifier = notifier.clone();
                tokio::spawn(async move {
                    let mut store = store.lock().await;
                    let Some(id) = store
                        .get_by_notification_id(&payload.notification_id)
                        .map(|o| o.id.clone())
                    else {
                        return;
                    };
                    match store.reject(&id, payload.reason.as_deref()) {
                        Ok(_) => notifier.notify(Notification::new(
                            NotificationKind::UpgradeRejected,
                            "Upgrade Not Possible",
                            payload
                                .reason
                                .unwrap_or_else(|| "The reallocation was declined".to_string()),
                        )),
                        Err(e) => error!("Failed to reject offer: {e}"),
                    }
                });
            }
        });

        let passenger = self.passenger.clone();
        let pnr = self.pnr.clone();
        self.socket.on(EventKind::BoardingStatus, move |message| {
            if let ServerMessage::BoardingStatus(payload) = message {
                if payload.pnr != pnr {
                    return;
                }
                let mut snapshot = passenger.write().unwrap_or_else(|e| e.into_inner());
                if let Some(p) = snapshot.as_mut() {
                    p.boarding_status = payload.status;
                    // Sticky: deboarding does not un-board, so the deboarded
                    // rule stays reachable
                    if payload.status == BoardingStatus::Boarded {
                        p.boarded = true;
                    }
                    if let Some(no_show) = payload.no_show {
                        p.no_show = no_show;
                    }
                    info!(pnr = %payload.pnr, status = ?payload.status, "Boarding status updated");
                }
            }
        });

        self.socket.on(EventKind::TrainUpdate, |message| {
            if let ServerMessage::TrainUpdate(payload) = message {
                info!(
                    station = payload.current_station.as_deref().unwrap_or("-"),
                    delay = payload.delay_minutes.unwrap_or(0),
                    "Train update"
                );
            }
        });
    }

    // ========== Background loops ==========

    fn spawn_refresh_loop(&self) {
        let authority = self.authority.clone();
        let store = self.store.clone();
        let pnr = self.pnr.clone();
        let interval = self.config.session.refresh_interval;
        let token = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                match authority.fetch_offers(&pnr).await {
                    Ok(remote) => {
                        if let Err(e) = store.lock().await.merge_server_offers(&pnr, remote) {
                            error!("Failed to merge refreshed offers: {e}");
                        }
                    }
                    Err(e) => warn!("Periodic offer refresh failed: {e}"),
                }
            }
            debug!("Refresh loop stopped");
        });
    }

    fn spawn_sweep_loop(&self) {
        let store = self.store.clone();
        let idempotency = self.idempotency.clone();
        let pnr = self.pnr.clone();
        let interval = self.config.session.sweep_interval;
        let ttl_ms = self.config.session.idempotency_ttl.as_millis() as i64;
        let token = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                {
                    let mut store = store.lock().await;
                    if let Err(e) = store.expire_old_offers(Some(&pnr)) {
                        error!("Expiry sweep failed: {e}");
                    }
                    if let Err(e) = store.cleanup_request_tokens(ttl_ms) {
                        error!("Token cleanup failed: {e}");
                    }
                }
                idempotency.lock().await.cleanup(now_millis());
            }
            debug!("Sweep loop stopped");
        });
    }
}
