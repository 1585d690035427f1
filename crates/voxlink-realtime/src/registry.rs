//! Session pool with check-out/check-in discipline.
//!
//! One session is exclusively owned by the exchange that checked it out;
//! checking out a key whose session is already in flight is reported as
//! [`SessionError::Busy`] rather than resolved by locking. Idle sessions
//! expire after a configurable period and are discarded on the next
//! check-out or sweep.

use crate::client::SessionClient;
use crate::error::SessionError;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

enum Slot {
    Idle {
        client: SessionClient,
        parked_at: Instant,
    },
    InFlight,
}

/// Registry of per-counterparty sessions.
pub struct SessionRegistry {
    slots: Mutex<HashMap<String, Slot>>,
    idle_expiry: Duration,
}

impl SessionRegistry {
    pub fn new(idle_expiry: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            idle_expiry,
        }
    }

    /// Checks out the session for `key`, marking it in flight.
    ///
    /// Returns `Ok(None)` when no usable session exists — the slot is
    /// still reserved, and the caller must either check a fresh session
    /// back in or call [`release`](Self::release).
    pub async fn check_out(&self, key: &str) -> Result<Option<SessionClient>, SessionError> {
        let mut slots = self.slots.lock().await;
        match slots.insert(key.to_string(), Slot::InFlight) {
            Some(Slot::InFlight) => {
                // Put the marker back untouched; the first exchange owns it.
                Err(SessionError::Busy(key.to_string()))
            }
            Some(Slot::Idle { client, parked_at }) => {
                if parked_at.elapsed() > self.idle_expiry || !client.is_ready() {
                    debug!(key, session = client.id(), "discarding stale session");
                    Ok(None)
                } else {
                    debug!(key, session = client.id(), "session checked out");
                    Ok(Some(client))
                }
            }
            None => Ok(None),
        }
    }

    /// Returns a session to the pool after an exchange.
    ///
    /// Sessions that are no longer ready are dropped instead of parked;
    /// an errored session must never be reused.
    pub async fn check_in(&self, key: &str, client: SessionClient) {
        let mut slots = self.slots.lock().await;
        if client.is_ready() {
            debug!(key, session = client.id(), "session checked in");
            slots.insert(
                key.to_string(),
                Slot::Idle {
                    client,
                    parked_at: Instant::now(),
                },
            );
        } else {
            info!(key, session = client.id(), state = ?client.state(), "dropping unusable session");
            slots.remove(key);
        }
    }

    /// Releases a reserved slot without parking a session (the exchange
    /// failed before producing a reusable one).
    pub async fn release(&self, key: &str) {
        self.slots.lock().await.remove(key);
    }

    /// Drops idle sessions older than the expiry period.
    pub async fn purge_expired(&self) {
        let mut slots = self.slots.lock().await;
        slots.retain(|key, slot| match slot {
            Slot::Idle { parked_at, .. } => {
                let keep = parked_at.elapsed() <= self.idle_expiry;
                if !keep {
                    debug!(key, "purging expired session");
                }
                keep
            }
            Slot::InFlight => true,
        });
    }

    /// Number of tracked slots (idle + in flight).
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }
}
