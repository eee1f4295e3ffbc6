//! # In-Flight Guard Library
//!
//! Guarantees that at most one unit of work runs per key at any time. A
//! caller asks a registry for a permit; the registry either hands out an
//! [`InFlightPermit`] (the caller now owns the key) or answers `None`
//! (somebody else is already running for that key). The permit releases the
//! key when it is dropped, so every exit path (success, early return, error,
//! panic) frees the slot.
//!
//! ## Backends
//!
//! - [`LocalInFlightRegistry`]: process-local, backed by a `DashMap`. The
//!   insert-if-absent goes through the entry API, which holds the shard lock
//!   for the whole check-and-set.
//! - [`PgAdvisoryRegistry`]: shared between service instances. The permit
//!   holds an open transaction that owns
//!   `pg_try_advisory_xact_lock(namespace, key)`; ending the transaction
//!   releases the lock. Keys must fit in 32 bits.
//!
//! ## Usage Example
//!
//! ```ignore
//! use inflight_guard::{InFlightRegistry, LocalInFlightRegistry};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry: Arc<dyn InFlightRegistry> = Arc::new(LocalInFlightRegistry::new());
//!
//! match registry.try_acquire(42).await? {
//!     Some(_permit) => {
//!         // Only one task reaches this point for key 42 at a time.
//!         do_work().await;
//!     } // permit dropped here, key 42 is free again
//!     None => println!("already running"),
//! }
//! # Ok(())
//! # }
//! # async fn do_work() {}
//! ```

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

mod error;

pub use error::{GuardError, GuardResult};

/// Registry of keys that currently have work in flight
#[async_trait]
pub trait InFlightRegistry: Send + Sync {
    /// Try to take ownership of `key`.
    ///
    /// Returns `Ok(None)` when another holder already owns the key.
    async fn try_acquire(&self, key: i64) -> GuardResult<Option<InFlightPermit>>;

    /// Short backend label for logs
    fn backend(&self) -> &'static str;
}

/// Ownership token for one key. Dropping it releases the key.
pub struct InFlightPermit {
    key: i64,
    acquired_at: Instant,
    release: Release,
}

enum Release {
    Local(Arc<DashMap<i64, Instant>>),
    Advisory(Option<Transaction<'static, Postgres>>),
}

impl InFlightPermit {
    /// Key owned by this permit
    pub fn key(&self) -> i64 {
        self.key
    }

    /// Time elapsed since the permit was granted
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// Release the key now, waiting for the backend to confirm.
    ///
    /// Dropping the permit has the same effect; this variant lets callers
    /// observe advisory-lock release errors.
    pub async fn release(mut self) -> GuardResult<()> {
        if let Release::Advisory(tx) = &mut self.release {
            if let Some(tx) = tx.take() {
                tx.rollback().await?;
            }
        }
        Ok(())
    }
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        let held_ms = self.held_for().as_millis() as u64;
        match &mut self.release {
            Release::Local(slots) => {
                slots.remove(&self.key);
                debug!(key = self.key, held_ms = held_ms, "In-flight slot released");
            }
            Release::Advisory(tx) => {
                let Some(tx) = tx.take() else {
                    return;
                };
                let key = self.key;
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn(async move {
                            if let Err(e) = tx.rollback().await {
                                warn!(key = key, error = %e, "Failed to release advisory lock");
                            }
                        });
                    }
                    // Dropping the transaction queues its rollback on the pooled connection
                    Err(_) => drop(tx),
                }
            }
        }
    }
}

impl fmt::Debug for InFlightPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backend = match self.release {
            Release::Local(_) => "local",
            Release::Advisory(_) => "postgres",
        };
        f.debug_struct("InFlightPermit")
            .field("key", &self.key)
            .field("backend", &backend)
            .field("held_for", &self.held_for())
            .finish()
    }
}

/// Process-local registry
#[derive(Clone, Default)]
pub struct LocalInFlightRegistry {
    slots: Arc<DashMap<i64, Instant>>,
}

impl LocalInFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` currently has work in flight
    pub fn contains(&self, key: i64) -> bool {
        self.slots.contains_key(&key)
    }

    /// Number of keys in flight (for monitoring)
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[async_trait]
impl InFlightRegistry for LocalInFlightRegistry {
    async fn try_acquire(&self, key: i64) -> GuardResult<Option<InFlightPermit>> {
        let acquired_at = match self.slots.entry(key) {
            Entry::Occupied(existing) => {
                debug!(
                    key = key,
                    running_ms = existing.get().elapsed().as_millis() as u64,
                    "Key already in flight"
                );
                return Ok(None);
            }
            Entry::Vacant(slot) => *slot.insert(Instant::now()),
        };

        Ok(Some(InFlightPermit {
            key,
            acquired_at,
            release: Release::Local(Arc::clone(&self.slots)),
        }))
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}

/// First half of the two-key advisory lock used when none is configured
pub const DEFAULT_LOCK_NAMESPACE: i32 = 0x5245_4331;

/// Registry shared across instances through Postgres advisory locks
#[derive(Clone)]
pub struct PgAdvisoryRegistry {
    pool: PgPool,
    namespace: i32,
}

impl PgAdvisoryRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self::with_namespace(pool, DEFAULT_LOCK_NAMESPACE)
    }

    pub fn with_namespace(pool: PgPool, namespace: i32) -> Self {
        Self { pool, namespace }
    }

    pub fn namespace(&self) -> i32 {
        self.namespace
    }
}

/// Second half of the advisory lock pair for `key`
fn lock_key(key: i64) -> GuardResult<i32> {
    i32::try_from(key).map_err(|_| GuardError::KeyOutOfRange(key))
}

#[async_trait]
impl InFlightRegistry for PgAdvisoryRegistry {
    async fn try_acquire(&self, key: i64) -> GuardResult<Option<InFlightPermit>> {
        let lock = lock_key(key)?;
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT pg_try_advisory_xact_lock($1, $2) AS locked")
            .bind(self.namespace)
            .bind(lock)
            .fetch_one(&mut *tx)
            .await?;
        let locked: bool = row.try_get("locked")?;

        if !locked {
            tx.rollback().await?;
            debug!(key = key, "Advisory lock held by another session");
            return Ok(None);
        }

        Ok(Some(InFlightPermit {
            key,
            acquired_at: Instant::now(),
            release: Release::Advisory(Some(tx)),
        }))
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
