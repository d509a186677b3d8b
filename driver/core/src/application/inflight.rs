// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-Flight Operation Registry
//!
//! Admission control for resource-mutating CSI calls. Orchestrator sidecars
//! retry aggressively, so the same CreateVolume or NodePublishVolume can land
//! several times while the first attempt is still talking to the provider.
//! Every mutating handler claims an operation key here before its first side
//! effect; a second claim on a key that is still held is denied at once and
//! the caller gets `ABORTED`, which CSI clients treat as "retry later".
//!
//! There is no queue and no fairness: exactly one concurrent claimant wins and
//! the others are rejected. The mutex is held only for a single set operation
//! and never across an `.await`.
//!
//! Release is tied to [`InFlightGuard`]. Dropping the guard removes the key,
//! which covers normal return, `?` propagation, panics that unwind through
//! the handler, and cancellation of the handler future by the transport.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::domain::error::DriverError;

/// Set of operation keys currently held by running handlers
#[derive(Debug, Default)]
pub struct InFlight {
    keys: Mutex<HashSet<String>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim `key`.
    ///
    /// Returns `false` without modifying the set if the key is already held.
    pub fn insert(&self, key: &str) -> bool {
        let inserted = self.keys.lock().insert(key.to_string());
        if inserted {
            metrics::gauge!("fsx_csi_inflight_operations").increment(1.0);
        }
        inserted
    }

    /// Release `key`. Releasing a key that is not held is a no-op.
    pub fn delete(&self, key: &str) {
        if self.keys.lock().remove(key) {
            metrics::gauge!("fsx_csi_inflight_operations").decrement(1.0);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.lock().is_empty()
    }

    /// Claim `key` and return a guard that releases it on drop.
    pub fn try_acquire(self: &Arc<Self>, key: impl Into<String>) -> Option<InFlightGuard> {
        let key = key.into();
        if self.insert(&key) {
            Some(InFlightGuard {
                registry: Arc::clone(self),
                key,
            })
        } else {
            None
        }
    }

    /// Like [`InFlight::try_acquire`], but a denied claim becomes
    /// [`DriverError::OperationPending`] ready to be returned from a handler.
    pub fn admit(
        self: &Arc<Self>,
        operation: &'static str,
        key: impl Into<String>,
    ) -> Result<InFlightGuard, DriverError> {
        let key = key.into();
        match self.try_acquire(key.clone()) {
            Some(guard) => {
                debug!(operation, key = %key, "Operation admitted");
                Ok(guard)
            }
            None => {
                debug!(operation, key = %key, "Operation denied: key already in flight");
                metrics::counter!("fsx_csi_operations_rejected_total", "operation" => operation)
                    .increment(1);
                Err(DriverError::OperationPending(key))
            }
        }
    }
}

/// Holds one operation key for the lifetime of a handler
#[must_use = "the key is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct InFlightGuard {
    registry: Arc<InFlight>,
    key: String,
}

impl InFlightGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.delete(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_insert_is_exclusive() {
        let registry = InFlight::new();
        assert!(registry.insert("vol-1"));
        assert!(!registry.insert("vol-1"));
        assert!(registry.contains("vol-1"));
        assert_eq!(registry.len(), 1);

        registry.delete("vol-1");
        assert!(registry.is_empty());
        assert!(registry.insert("vol-1"));
    }

    #[test]
    fn test_delete_absent_key_is_noop() {
        let registry = InFlight::new();
        assert!(registry.insert("vol-1"));
        registry.delete("vol-2");
        registry.delete("vol-2");
        assert!(registry.contains("vol-1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_concurrent_same_key_has_one_winner() {
        const THREADS: usize = 32;

        for _ in 0..20 {
            let registry = Arc::new(InFlight::new());
            let barrier = Arc::new(Barrier::new(THREADS));
            let winners = Arc::new(AtomicUsize::new(0));

            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    let registry = Arc::clone(&registry);
                    let barrier = Arc::clone(&barrier);
                    let winners = Arc::clone(&winners);
                    thread::spawn(move || {
                        barrier.wait();
                        if registry.insert("fs-0123456789abcdef0") {
                            winners.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            assert_eq!(winners.load(Ordering::SeqCst), 1);
            assert_eq!(registry.len(), 1);
        }
    }

    #[test]
    fn test_disjoint_keys_do_not_contend() {
        let registry = Arc::new(InFlight::new());
        let barrier = Arc::new(Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    registry.try_acquire(format!("vol-{}", i))
                })
            })
            .collect();

        let guards: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(guards.iter().all(Option::is_some));
        assert_eq!(registry.len(), 16);

        drop(guards);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let registry = Arc::new(InFlight::new());
        {
            let guard = registry.try_acquire("vol-1").unwrap();
            assert_eq!(guard.key(), "vol-1");
            assert!(registry.try_acquire("vol-1").is_none());
        }
        assert!(!registry.contains("vol-1"));
        assert!(registry.try_acquire("vol-1").is_some());
    }

    #[test]
    fn test_guard_releases_on_error_path() {
        fn handler(registry: &Arc<InFlight>) -> Result<(), DriverError> {
            let _guard = registry.admit("DeleteVolume", "vol-1")?;
            Err(DriverError::NotFound("vol-1".to_string()))
        }

        let registry = Arc::new(InFlight::new());
        assert!(handler(&registry).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_admit_denial_is_operation_pending() {
        let registry = Arc::new(InFlight::new());
        let _held = registry.admit("CreateVolume", "pvc-1").unwrap();

        let err = registry.admit("DeleteVolume", "pvc-1").unwrap_err();
        assert!(matches!(err, DriverError::OperationPending(ref key) if key == "pvc-1"));
        assert_eq!(
            err.to_string(),
            "An operation with the given volume key pvc-1 already exists"
        );
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_guard_releases_on_panic() {
        let registry = Arc::new(InFlight::new());

        let task_registry = Arc::clone(&registry);
        let result = tokio::spawn(async move {
            let _guard = task_registry.try_acquire("vol-1").unwrap();
            panic!("handler blew up");
        })
        .await;

        assert!(result.unwrap_err().is_panic());
        assert!(!registry.contains("vol-1"));
        assert!(registry.try_acquire("vol-1").is_some());
    }

    #[tokio::test]
    async fn test_guard_releases_on_cancellation() {
        let registry = Arc::new(InFlight::new());

        let task_registry = Arc::clone(&registry);
        let (held_tx, held_rx) = tokio::sync::oneshot::channel();
        let task = tokio::spawn(async move {
            let _guard = task_registry.try_acquire("vol-1").unwrap();
            let _ = held_tx.send(());
            std::future::pending::<()>().await;
        });

        held_rx.await.unwrap();
        assert!(registry.contains("vol-1"));

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(registry.is_empty());
    }
}
