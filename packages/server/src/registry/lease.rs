//! Per-project advisory leases.
//!
//! A lease is a key written with `SET NX PX` holding a random token. It is
//! released with a compare-and-delete so a holder whose lease expired can
//! never remove a lease taken over by someone else.

use std::sync::Arc;
use std::time::Duration;

use common::backoff::Backoff;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{KeyValueStore, RegistryError};

const RETRY_BASE_MS: u64 = 50;
const RETRY_MAX_MS: u64 = 1000;

#[derive(Clone)]
pub struct LeaseManager {
    kv: Arc<dyn KeyValueStore>,
    prefix: String,
    ttl: Duration,
    wait: Duration,
}

impl LeaseManager {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        prefix: impl Into<String>,
        ttl: Duration,
        wait: Duration,
    ) -> Self {
        Self {
            kv,
            prefix: prefix.into(),
            ttl,
            wait,
        }
    }

    /// Acquire the lease for `project_id`, retrying with backoff for up to
    /// the configured wait. Fails with `Busy` when the wait is exhausted.
    pub async fn acquire(&self, project_id: &str) -> Result<Lease, RegistryError> {
        let key = format!("{}lease:project:{project_id}", self.prefix);
        let token = Uuid::new_v4().to_string();
        let mut backoff = Backoff::new(RETRY_BASE_MS, RETRY_MAX_MS, self.wait);

        loop {
            if self.kv.set_nx(&key, &token, Some(self.ttl)).await? {
                debug!(project_id, attempts = backoff.attempts() + 1, "Lease acquired");
                return Ok(Lease {
                    kv: self.kv.clone(),
                    key,
                    token,
                    released: false,
                });
            }
            match backoff.next_delay() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return Err(RegistryError::Busy(project_id.to_string())),
            }
        }
    }
}

/// A held lease. Call [`Lease::release`] when done; a lease dropped without
/// release is released from a spawned task.
pub struct Lease {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    token: String,
    released: bool,
}

impl Lease {
    pub async fn release(mut self) -> Result<(), RegistryError> {
        self.released = true;
        if !self.kv.delete_if_eq(&self.key, &self.token).await? {
            warn!(key = %self.key, "Lease expired before release");
        }
        Ok(())
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let kv = self.kv.clone();
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        handle.spawn(async move {
            if let Err(e) = kv.delete_if_eq(&key, &token).await {
                warn!(key = %key, error = %e, "Failed to release dropped lease");
            }
        });
    }
}
