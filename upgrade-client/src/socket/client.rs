//! Socket client
//!
//! Owns the realtime connection: dial + subscribe, a read loop that
//! decodes envelopes and fans them out to typed listeners, a heartbeat
//! task, and bounded-backoff reconnection after an unexpected close.
//! A clean `disconnect()` never triggers reconnection.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SocketConfig;
use crate::error::{SyncError, SyncResult};
use crate::socket::transport::{BoxedTransport, Connector, TcpConnector, Transport};
use shared::message::{ClientMessage, Envelope, EventKind, ServerMessage};

/// Connection lifecycle state, observable through [`SocketClient::status`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Reconnect budget exhausted; entered at most once per connection
    Failed,
}

/// Handle returned by [`SocketClient::on`], used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback = Arc<dyn Fn(&ServerMessage) + Send + Sync>;

struct Shared {
    config: SocketConfig,
    pnr: String,
    connector: Arc<dyn Connector>,
    transport: Mutex<Option<BoxedTransport>>,
    listeners: StdMutex<HashMap<EventKind, Vec<(ListenerId, Callback)>>>,
    next_listener_id: AtomicU64,
    status_tx: watch::Sender<ConnectionStatus>,
    cancel: StdMutex<CancellationToken>,
}

/// Realtime connection manager
#[derive(Clone)]
pub struct SocketClient {
    shared: Arc<Shared>,
    status_rx: watch::Receiver<ConnectionStatus>,
}

impl SocketClient {
    pub fn new(config: SocketConfig, pnr: impl Into<String>, connector: Arc<dyn Connector>) -> Self {
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            shared: Arc::new(Shared {
                config,
                pnr: pnr.into(),
                connector,
                transport: Mutex::new(None),
                listeners: StdMutex::new(HashMap::new()),
                next_listener_id: AtomicU64::new(1),
                status_tx,
                cancel: StdMutex::new(CancellationToken::new()),
            }),
            status_rx,
        }
    }

    /// Production client dialing TCP per the config
    pub fn with_tcp(config: SocketConfig, pnr: impl Into<String>) -> Self {
        let connector = Arc::new(TcpConnector::new(&config));
        Self::new(config, pnr, connector)
    }

    /// Establish the connection and subscribe to offer events.
    ///
    /// A no-op while already Connected or Connecting. Spawns the read loop
    /// and the heartbeat task; both stop on [`disconnect`](Self::disconnect).
    pub async fn connect(&self) -> SyncResult<()> {
        match *self.status_rx.borrow() {
            ConnectionStatus::Connected | ConnectionStatus::Connecting => return Ok(()),
            _ => {}
        }
        self.shared.status_tx.send_replace(ConnectionStatus::Connecting);

        let token = CancellationToken::new();
        *self.shared.cancel.lock().unwrap_or_else(|e| e.into_inner()) = token.clone();

        let transport = match self.shared.connector.connect().await {
            Ok(transport) => transport,
            Err(e) => {
                self.shared
                    .status_tx
                    .send_replace(ConnectionStatus::Disconnected);
                return Err(e);
            }
        };

        let subscribe = ClientMessage::SubscribeOffers {
            pnr: self.shared.pnr.clone(),
        };
        if let Err(e) = transport.write_message(&subscribe.to_envelope()).await {
            // Roll back to Disconnected or the Connecting guard above
            // would swallow every retry
            self.shared
                .status_tx
                .send_replace(ConnectionStatus::Disconnected);
            return Err(e);
        }

        *self.shared.transport.lock().await = Some(transport);
        self.shared.status_tx.send_replace(ConnectionStatus::Connected);
        info!(addr = %self.shared.config.addr, pnr = %self.shared.pnr, "Socket connected");

        let shared = self.shared.clone();
        let read_token = token.clone();
        tokio::spawn(async move {
            run_read_loop(shared, read_token).await;
        });

        let shared = self.shared.clone();
        tokio::spawn(async move {
            run_heartbeat(shared, token).await;
        });

        Ok(())
    }

    /// Tear the connection down cleanly.
    ///
    /// Cancels the read loop and heartbeat first so the close is never
    /// mistaken for a drop, sends a best-effort unsubscribe, and clears
    /// all listeners.
    pub async fn disconnect(&self) {
        self.shared
            .cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();

        let transport = self.shared.transport.lock().await.take();
        if let Some(transport) = transport {
            let unsubscribe = ClientMessage::UnsubscribeOffers {
                pnr: self.shared.pnr.clone(),
            };
            if let Err(e) = transport.write_message(&unsubscribe.to_envelope()).await {
                debug!("Unsubscribe on disconnect failed: {e}");
            }
            let _ = transport.close().await;
        }

        self.shared
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.shared
            .status_tx
            .send_replace(ConnectionStatus::Disconnected);
        info!("Socket disconnected");
    }

    /// Send a message over the open connection.
    pub async fn send(&self, message: ClientMessage) -> SyncResult<()> {
        if *self.status_rx.borrow() != ConnectionStatus::Connected {
            return Err(SyncError::NotConnected);
        }
        let transport = self
            .shared
            .transport
            .lock()
            .await
            .clone()
            .ok_or(SyncError::NotConnected)?;
        transport.write_message(&message.to_envelope()).await
    }

    /// Register a listener for one event kind. Listeners run on the read
    /// loop task; a panicking listener is isolated and logged.
    pub fn on(
        &self,
        kind: EventKind,
        callback: impl Fn(&ServerMessage) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.shared.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(kind)
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Unregister a listener.
    pub fn off(&self, id: ListenerId) {
        let mut listeners = self
            .shared
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        for callbacks in listeners.values_mut() {
            callbacks.retain(|(listener_id, _)| *listener_id != id);
        }
    }

    /// Watch the connection status.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    pub fn current_status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// Wait until the connection is up.
    ///
    /// Resolves once the status reaches `Connected`. Fails with
    /// [`SyncError::MaxReconnectAttempts`] when the reconnect budget runs
    /// out first, letting callers turn the terminal status into an error.
    pub async fn wait_connected(&self) -> SyncResult<()> {
        let mut status = self.status_rx.clone();
        loop {
            match *status.borrow_and_update() {
                ConnectionStatus::Connected => return Ok(()),
                ConnectionStatus::Failed => return Err(SyncError::MaxReconnectAttempts),
                _ => {}
            }
            if status.changed().await.is_err() {
                return Err(SyncError::NotConnected);
            }
        }
    }
}

async fn run_read_loop(shared: Arc<Shared>, token: CancellationToken) {
    loop {
        let transport = shared.transport.lock().await.clone();
        let Some(transport) = transport else {
            break;
        };

        tokio::select! {
            _ = token.cancelled() => break,
            result = transport.read_message() => match result {
                Ok(envelope) => dispatch(&shared, &envelope),
                Err(e) => {
                    if token.is_cancelled() {
                        break;
                    }
                    warn!("Socket read failed: {e}");
                    if !reconnect(&shared, &token).await {
                        break;
                    }
                }
            }
        }
    }
    debug!("Read loop stopped");
}

fn dispatch(shared: &Shared, envelope: &Envelope) {
    let message = match ServerMessage::decode(envelope) {
        Ok(Some(message)) => message,
        Ok(None) => {
            debug!(kind = %envelope.kind, "Ignoring unrecognized event");
            return;
        }
        Err(e) => {
            warn!(kind = %envelope.kind, "Failed to decode event payload: {e}");
            return;
        }
    };

    let callbacks: Vec<Callback> = {
        let listeners = shared
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        listeners
            .get(&message.kind())
            .map(|entries| entries.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default()
    };

    for callback in callbacks {
        if catch_unwind(AssertUnwindSafe(|| callback(&message))).is_err() {
            error!(kind = %message.kind(), "Event listener panicked");
        }
    }
}

/// Redial after an unexpected close. Returns true when the connection is
/// back up; false means the caller should stop (cancelled, reconnect
/// disabled, or budget exhausted — the last emits `Failed` exactly once).
async fn reconnect(shared: &Shared, token: &CancellationToken) -> bool {
    let policy = &shared.config.reconnect;
    if !policy.enabled {
        shared.status_tx.send_replace(ConnectionStatus::Disconnected);
        return false;
    }

    shared.status_tx.send_replace(ConnectionStatus::Connecting);
    *shared.transport.lock().await = None;

    for attempt in 0..policy.max_attempts {
        let delay = policy.delay_for(attempt);
        info!(
            attempt = attempt + 1,
            max = policy.max_attempts,
            delay_ms = policy.delay_for_ms(attempt),
            "Reconnecting"
        );

        tokio::select! {
            _ = token.cancelled() => return false,
            _ = tokio::time::sleep(delay) => {}
        }

        match shared.connector.connect().await {
            Ok(transport) => {
                let subscribe = ClientMessage::SubscribeOffers {
                    pnr: shared.pnr.clone(),
                };
                if let Err(e) = transport.write_message(&subscribe.to_envelope()).await {
                    warn!("Resubscribe after reconnect failed: {e}");
                    continue;
                }
                *shared.transport.lock().await = Some(transport);
                shared.status_tx.send_replace(ConnectionStatus::Connected);
                info!(attempt = attempt + 1, "Reconnected");
                return true;
            }
            Err(e) => {
                warn!(attempt = attempt + 1, "Reconnect attempt failed: {e}");
            }
        }
    }

    error!(
        max = policy.max_attempts,
        "Reconnect budget exhausted, giving up"
    );
    shared.status_tx.send_replace(ConnectionStatus::Failed);
    false
}

async fn run_heartbeat(shared: Arc<Shared>, token: CancellationToken) {
    let interval = shared.config.heartbeat_interval;
    if interval.is_zero() {
        return;
    }

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let transport = shared.transport.lock().await.clone();
        match transport {
            Some(transport) => {
                if let Err(e) = transport
                    .write_message(&ClientMessage::Ping {}.to_envelope())
                    .await
                {
                    // The read loop owns recovery; a failed ping is only noise
                    debug!("Heartbeat ping failed: {e}");
                }
            }
            None => {
                if *shared.status_tx.borrow() == ConnectionStatus::Failed {
                    break;
                }
            }
        }
    }
    debug!("Heartbeat stopped");
}
