//! Client configuration

use std::time::Duration;

/// Reconnection backoff policy
///
/// The delay for attempt `n` (zero-based) is `delay * multiplier^n`, capped
/// at `max_delay`. Exceeding `max_attempts` is terminal; the client stops
/// retrying and surfaces the failure once.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub max_attempts: u32,
    pub delay_ms: f64,
    pub max_delay_ms: f64,
    pub backoff_multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            delay_ms: 3_000.0,
            max_delay_ms: 30_000.0,
            backoff_multiplier: 1.5,
        }
    }
}

impl ReconnectPolicy {
    /// Backoff delay in milliseconds for the given zero-based attempt
    pub fn delay_for_ms(&self, attempt: u32) -> f64 {
        let exponential = self.delay_ms * self.backoff_multiplier.powi(attempt as i32);
        exponential.min(self.max_delay_ms)
    }

    /// Same delay as a `Duration`, for sleeping
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_secs_f64(self.delay_for_ms(attempt) / 1_000.0)
    }
}

/// Socket connection configuration
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Realtime endpoint address (host:port)
    pub addr: String,
    pub reconnect: ReconnectPolicy,
    /// Heartbeat ping interval (zero disables the heartbeat)
    pub heartbeat_interval: Duration,
    pub connect_timeout: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            addr: "localhost:5000".to_string(),
            reconnect: ReconnectPolicy::default(),
            heartbeat_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl SocketConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Self::default()
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}

/// Orchestration facade configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Periodic fetch-and-merge cadence
    pub refresh_interval: Duration,
    /// Offer expiry sweep cadence
    pub sweep_interval: Duration,
    /// "Expiring soon" threshold for priority/warning purposes
    pub expiry_warning_threshold_ms: i64,
    /// How long a completed idempotent result remains replayable
    pub idempotency_ttl: Duration,
    /// Completed-record cap; oldest evicted first
    pub idempotency_max_completed: usize,
    pub default_denial_reason: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(5),
            expiry_warning_threshold_ms: 15_000,
            idempotency_ttl: Duration::from_secs(300),
            idempotency_max_completed: 100,
            default_denial_reason: "Not interested".to_string(),
        }
    }
}

/// Top-level client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Remote authority base URL (e.g. "http://localhost:5000")
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout: u64,
    pub socket: SocketConfig,
    pub session: SessionConfig,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: 10,
            socket: SocketConfig::default(),
            session: SessionConfig::default(),
        }
    }

    pub fn with_socket(mut self, socket: SocketConfig) -> Self {
        self.socket = socket;
        self
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://localhost:5000")
    }
}
