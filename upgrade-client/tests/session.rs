//! End-to-end session scenarios against a mock authority and an
//! in-memory socket.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use upgrade_client::socket::{BoxedTransport, Connector, MemoryTransport, SocketClient};
use upgrade_client::{
    ApiResponse, Authority, ClientConfig, Envelope, Notification, Notifier, Offer, OfferDraft,
    OfferStatus, OfferStorage, Passenger, SocketConfig, SyncResult, UpgradeSession,
};

const PNR: &str = "1234567890";

struct MockAuthority {
    offers: StdMutex<Vec<OfferDraft>>,
    accept_calls: AtomicUsize,
    deny_calls: AtomicUsize,
    fail_requests: AtomicBool,
}

impl MockAuthority {
    fn new(offers: Vec<OfferDraft>) -> Arc<Self> {
        Arc::new(Self {
            offers: StdMutex::new(offers),
            accept_calls: AtomicUsize::new(0),
            deny_calls: AtomicUsize::new(0),
            fail_requests: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Authority for MockAuthority {
    async fn fetch_offers(&self, _pnr: &str) -> SyncResult<Vec<OfferDraft>> {
        Ok(self.offers.lock().unwrap().clone())
    }

    async fn accept_upgrade(
        &self,
        _pnr: &str,
        notification_id: &str,
    ) -> SyncResult<ApiResponse<serde_json::Value>> {
        self.accept_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_requests.load(Ordering::SeqCst) {
            return Ok(ApiResponse::error("Berth no longer available"));
        }
        Ok(ApiResponse::ok(json!({
            "notificationId": notification_id,
            "status": "ACCEPTED",
        })))
    }

    async fn deny_upgrade(
        &self,
        _pnr: &str,
        notification_id: &str,
        reason: &str,
    ) -> SyncResult<ApiResponse<serde_json::Value>> {
        self.deny_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ApiResponse::ok(json!({
            "notificationId": notification_id,
            "reason": reason,
        })))
    }
}

struct MemoryConnector {
    server_tx: broadcast::Sender<Envelope>,
    client_tx: broadcast::Sender<Envelope>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> SyncResult<BoxedTransport> {
        Ok(Arc::new(MemoryTransport::new(
            &self.server_tx,
            &self.client_tx,
        )))
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: StdMutex<Vec<Notification>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}

struct Harness {
    session: UpgradeSession,
    server_tx: broadcast::Sender<Envelope>,
    authority: Arc<MockAuthority>,
    notifier: Arc<RecordingNotifier>,
    /// Keeps the client->server channel open for the whole test
    _from_client: broadcast::Receiver<Envelope>,
}

fn harness(remote_offers: Vec<OfferDraft>, sweep: Duration) -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let (server_tx, _) = broadcast::channel(64);
    let (client_tx, from_client) = broadcast::channel(64);

    let connector = Arc::new(MemoryConnector {
        server_tx: server_tx.clone(),
        client_tx,
    });

    let mut config = ClientConfig::new("http://test")
        .with_socket(SocketConfig::new("test").with_heartbeat_interval(Duration::ZERO));
    config.session.refresh_interval = Duration::from_secs(3600);
    config.session.sweep_interval = sweep;

    let socket = SocketClient::new(config.socket.clone(), PNR, connector);
    let authority = MockAuthority::new(remote_offers);
    let notifier = Arc::new(RecordingNotifier::default());

    let session = UpgradeSession::new(
        PNR,
        config,
        authority.clone(),
        socket,
        OfferStorage::open_in_memory().unwrap(),
        notifier.clone(),
    )
    .unwrap();

    Harness {
        session,
        server_tx,
        authority,
        notifier,
        _from_client: from_client,
    }
}

fn remote_pending(notification_id: &str, expires_in_ms: i64) -> OfferDraft {
    OfferDraft {
        notification_id: Some(notification_id.to_string()),
        from_berth: Some("S2-45".to_string()),
        to_berth: Some("S1-22".to_string()),
        coach: Some("S1".to_string()),
        expires_at: Some(shared::util::now_millis() + expires_in_ms),
        ..OfferDraft::default()
    }
}

async fn wait_for_offer(
    session: &UpgradeSession,
    offer_id: &str,
    predicate: impl Fn(&Offer) -> bool,
) -> Offer {
    for _ in 0..200 {
        if let Some(offer) = session.get_offer(offer_id).await {
            if predicate(&offer) {
                return offer;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("offer {offer_id} never reached the expected state");
}

#[tokio::test]
async fn test_successful_upgrade_flow() {
    let h = harness(vec![remote_pending("n-1", 60_000)], Duration::from_secs(3600));
    h.session.set_passenger(Some(Passenger::boarded_rac(PNR)));
    h.session.start().await.unwrap();

    // The initial fetch brought the pending offer in
    let active = h.session.active_offers().await;
    assert_eq!(active.len(), 1);
    let offer = &active[0];
    assert_eq!(offer.status, OfferStatus::Pending);

    let outcome = h.session.accept_offer(&offer.id, "n-1").await.unwrap();
    assert!(outcome.success, "accept failed: {:?}", outcome.error);
    assert_eq!(h.authority.accept_calls.load(Ordering::SeqCst), 1);

    let accepted = h.session.get_offer(&offer.id).await.unwrap();
    assert_eq!(accepted.status, OfferStatus::Accepted);
    assert!(accepted.accepted_at.is_some());

    // The conductor confirms over the socket
    h.server_tx
        .send(
            Envelope::from_json(
                r#"{"type":"upgrade:confirmed","payload":{"notificationId":"n-1","toBerth":"S1-22"}}"#,
            )
            .unwrap(),
        )
        .unwrap();

    let confirmed = wait_for_offer(&h.session, &offer.id, |o| {
        o.status == OfferStatus::Confirmed
    })
    .await;
    assert!(confirmed.confirmed_at.is_some());

    let kinds: Vec<_> = h
        .notifier
        .sent
        .lock()
        .unwrap()
        .iter()
        .map(|n| n.kind)
        .collect();
    assert!(kinds.contains(&upgrade_client::NotificationKind::OfferAccepted));
    assert!(kinds.contains(&upgrade_client::NotificationKind::UpgradeConfirmed));

    h.session.shutdown().await;
}

#[tokio::test]
async fn test_double_accept_issues_one_request() {
    let h = harness(vec![remote_pending("n-1", 60_000)], Duration::from_secs(3600));
    h.session.set_passenger(Some(Passenger::boarded_rac(PNR)));
    h.session.start().await.unwrap();

    let offer = h.session.active_offers().await.remove(0);

    let first = h.session.accept_offer(&offer.id, "n-1").await.unwrap();
    assert!(first.success);

    let second = h.session.accept_offer(&offer.id, "n-1").await.unwrap();
    assert!(!second.success);
    assert_eq!(second.error.as_deref(), Some("Offer is accepted"));

    assert_eq!(h.authority.accept_calls.load(Ordering::SeqCst), 1);
    h.session.shutdown().await;
}

#[tokio::test]
async fn test_remote_failure_leaves_offer_pending_and_retryable() {
    let h = harness(vec![remote_pending("n-1", 60_000)], Duration::from_secs(3600));
    h.session.set_passenger(Some(Passenger::boarded_rac(PNR)));
    h.session.start().await.unwrap();

    let offer = h.session.active_offers().await.remove(0);

    h.authority.fail_requests.store(true, Ordering::SeqCst);
    let outcome = h.session.accept_offer(&offer.id, "n-1").await.unwrap();
    assert!(!outcome.success);
    assert_eq!(
        h.session.get_offer(&offer.id).await.unwrap().status,
        OfferStatus::Pending
    );

    // Failure was not cached; a retry reaches the authority again
    h.authority.fail_requests.store(false, Ordering::SeqCst);
    let retry = h.session.accept_offer(&offer.id, "n-1").await.unwrap();
    assert!(retry.success);
    assert_eq!(h.authority.accept_calls.load(Ordering::SeqCst), 2);

    h.session.shutdown().await;
}

#[tokio::test]
async fn test_offer_expires_before_response() {
    let h = harness(
        vec![remote_pending("n-1", 80)],
        Duration::from_millis(50),
    );
    h.session.set_passenger(Some(Passenger::boarded_rac(PNR)));
    h.session.start().await.unwrap();

    let offer = h.session.active_offers().await.remove(0);

    // Let the offer lapse before responding
    tokio::time::sleep(Duration::from_millis(100)).await;

    let outcome = h.session.accept_offer(&offer.id, "n-1").await.unwrap();
    assert!(!outcome.success);
    let error = outcome.error.unwrap();
    assert!(
        error == "Offer has expired" || error == "Offer is expired",
        "unexpected reason: {error}"
    );
    assert_eq!(h.authority.accept_calls.load(Ordering::SeqCst), 0);

    // The sweep marks it EXPIRED with a timestamp
    let expired = wait_for_offer(&h.session, &offer.id, |o| {
        o.status == OfferStatus::Expired
    })
    .await;
    assert!(expired.expired_at.is_some());

    h.session.shutdown().await;
}

#[tokio::test]
async fn test_re_decline_is_rejected_with_reason() {
    let h = harness(vec![remote_pending("n-1", 60_000)], Duration::from_secs(3600));
    h.session.start().await.unwrap();

    let offer = h.session.active_offers().await.remove(0);

    let first = h.session.deny_offer(&offer.id, "n-1", None).await.unwrap();
    assert!(first.success);
    let denied = h.session.get_offer(&offer.id).await.unwrap();
    assert_eq!(denied.status, OfferStatus::Denied);
    assert_eq!(denied.denial_reason.as_deref(), Some("Not interested"));

    let second = h.session.deny_offer(&offer.id, "n-1", None).await.unwrap();
    assert!(!second.success);
    assert_eq!(second.error.as_deref(), Some("Offer is already denied"));
    assert_eq!(h.authority.deny_calls.load(Ordering::SeqCst), 1);

    h.session.shutdown().await;
}

#[tokio::test]
async fn test_pushed_offer_and_expiry_event() {
    let h = harness(vec![], Duration::from_secs(3600));
    h.session.start().await.unwrap();
    assert!(h.session.active_offers().await.is_empty());

    h.server_tx
        .send(
            Envelope::from_json(
                r#"{"type":"upgrade:offer","payload":{"notificationId":"n-9","toBerth":"B1-14","berthType":"LB"}}"#,
            )
            .unwrap(),
        )
        .unwrap();

    let mut offer = None;
    for _ in 0..200 {
        let active = h.session.active_offers().await;
        if !active.is_empty() {
            offer = Some(active[0].clone());
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let offer = offer.expect("pushed offer never arrived");
    assert_eq!(offer.notification_id.as_deref(), Some("n-9"));

    h.server_tx
        .send(
            Envelope::from_json(
                r#"{"type":"upgrade:expired","payload":{"notificationId":"n-9"}}"#,
            )
            .unwrap(),
        )
        .unwrap();

    wait_for_offer(&h.session, &offer.id, |o| o.status == OfferStatus::Expired).await;
    h.session.shutdown().await;
}

#[tokio::test]
async fn test_deboarded_passenger_cannot_accept() {
    let h = harness(vec![remote_pending("n-1", 60_000)], Duration::from_secs(3600));
    h.session.set_passenger(Some(Passenger::boarded_rac(PNR)));
    h.session.start().await.unwrap();

    let offer = h.session.active_offers().await.remove(0);

    h.server_tx
        .send(
            Envelope::from_json(&format!(
                r#"{{"type":"passenger:boarding_status","payload":{{"pnr":"{PNR}","status":"DEBOARDED"}}}}"#
            ))
            .unwrap(),
        )
        .unwrap();

    // Boarding updates apply synchronously on the read loop; give it a tick
    for _ in 0..200 {
        if h.session.passenger_snapshot().is_some_and(|p| {
            p.boarding_status == shared::models::BoardingStatus::Deboarded
        }) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let outcome = h.session.accept_offer(&offer.id, "n-1").await.unwrap();
    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_deref(),
        Some("Passenger has already deboarded")
    );
    assert_eq!(h.authority.accept_calls.load(Ordering::SeqCst), 0);

    h.session.shutdown().await;
}
