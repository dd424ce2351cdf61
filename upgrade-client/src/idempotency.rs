//! Request idempotency
//!
//! Guards remote submissions against double-fire: an accept tapped twice
//! (or replayed after a flaky reconnect) must reach the authority exactly
//! once. Keys are derived from the action name and its serialized
//! parameters, so identical requests collide and distinct ones never do.
//!
//! Only successes are cached. A failed request clears its pending marker
//! and leaves nothing behind, so the caller may retry immediately.

use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use shared::util::now_millis;

/// Cached outcome of a completed request
#[derive(Debug, Clone)]
struct CompletedRecord {
    result: Value,
    timestamp: i64,
}

/// What the manager allows for a given key
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionGate {
    /// No prior record; the caller should execute and report back
    Executable,
    /// An identical request is currently in flight
    InProgress,
    /// An identical request already completed; replay its result
    AlreadyProcessed(Value),
}

/// Tracks in-flight and recently-completed request keys.
pub struct IdempotencyManager {
    pending: HashSet<String>,
    completed: HashMap<String, CompletedRecord>,
    ttl_ms: i64,
    max_completed: usize,
}

impl IdempotencyManager {
    pub fn new(ttl_ms: i64, max_completed: usize) -> Self {
        Self {
            pending: HashSet::new(),
            completed: HashMap::new(),
            ttl_ms,
            max_completed,
        }
    }

    /// Derive the idempotency key for an action and its parameters.
    pub fn key_for(action: &str, params: &impl Serialize) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(params)?;
        Ok(format!("{action}:{json}"))
    }

    /// Check what is allowed for this key right now.
    pub fn can_execute(&mut self, key: &str, now: i64) -> ExecutionGate {
        if self.pending.contains(key) {
            return ExecutionGate::InProgress;
        }
        if let Some(record) = self.completed.get(key) {
            if now - record.timestamp <= self.ttl_ms {
                return ExecutionGate::AlreadyProcessed(record.result.clone());
            }
            self.completed.remove(key);
        }
        ExecutionGate::Executable
    }

    /// Mark a key as in flight.
    pub fn mark_pending(&mut self, key: &str) {
        self.pending.insert(key.to_string());
    }

    /// Record a successful completion; the result becomes replayable.
    pub fn mark_completed(&mut self, key: &str, result: Value, now: i64) {
        self.pending.remove(key);
        self.completed.insert(
            key.to_string(),
            CompletedRecord {
                result,
                timestamp: now,
            },
        );
        self.evict_if_needed();
    }

    /// Record a failure. Failures are never cached; the key becomes
    /// executable again at once.
    pub fn mark_failed(&mut self, key: &str) {
        self.pending.remove(key);
    }

    fn evict_if_needed(&mut self) {
        while self.completed.len() > self.max_completed {
            let oldest = self
                .completed
                .iter()
                .min_by_key(|(_, r)| r.timestamp)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    debug!(%key, "Evicting oldest completed idempotency record");
                    self.completed.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Drop completed records past the TTL. Returns how many were removed.
    pub fn cleanup(&mut self, now: i64) -> usize {
        let before = self.completed.len();
        let ttl = self.ttl_ms;
        self.completed.retain(|_, r| now - r.timestamp <= ttl);
        before - self.completed.len()
    }

    #[cfg(test)]
    fn completed_len(&self) -> usize {
        self.completed.len()
    }
}

/// Run a request at most once per key.
///
/// Replays a cached result when present, returns
/// [`SyncError::DuplicateRequest`] when an identical request is in flight,
/// and otherwise marks the key pending before the request future is
/// awaited. Success caches the result; failure clears the marker so the
/// caller can retry.
pub async fn execute_idempotent<P, F, Fut>(
    manager: &Mutex<IdempotencyManager>,
    action: &str,
    params: &P,
    request: F,
) -> SyncResult<Value>
where
    P: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = SyncResult<Value>>,
{
    let key = IdempotencyManager::key_for(action, params)?;

    {
        let mut guard = manager.lock().await;
        match guard.can_execute(&key, now_millis()) {
            ExecutionGate::AlreadyProcessed(result) => {
                debug!(%key, "Replaying cached idempotent result");
                return Ok(result);
            }
            ExecutionGate::InProgress => return Err(SyncError::DuplicateRequest),
            ExecutionGate::Executable => guard.mark_pending(&key),
        }
    }

    match request().await {
        Ok(result) => {
            manager
                .lock()
                .await
                .mark_completed(&key, result.clone(), now_millis());
            Ok(result)
        }
        Err(err) => {
            manager.lock().await.mark_failed(&key);
            Err(err)
        }
    }
}
