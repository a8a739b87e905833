use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::domain::errors::DomainError;
use crate::domain::idempotency::{validate_key, Claim, ResultSnapshot};
use crate::domain::ports::IdempotencyStore;

const COMPLETE_ATTEMPTS: usize = 3;

/// Result of a guarded call.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub result: ResultSnapshot,
    /// `true` when `result` was replayed from an earlier execution.
    pub replayed: bool,
}

/// At-most-once execution keyed by `(Idempotency-Key, endpoint fingerprint)`.
///
/// A concurrent caller holding the same key while the first execution runs
/// gets `DomainError::IdempotencyConflict` and is expected to retry; the
/// wrapped operation never runs twice for one live key.
pub struct IdempotencyGuard {
    store: Arc<dyn IdempotencyStore>,
    retention: Duration,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn IdempotencyStore>, retention: Duration) -> Self {
        Self { store, retention }
    }

    pub fn execute<F, E>(
        &self,
        key: &str,
        fingerprint: &str,
        operation: F,
    ) -> Result<Execution, E>
    where
        F: FnOnce() -> Result<ResultSnapshot, E>,
        E: From<DomainError>,
    {
        validate_key(key)?;
        let now = Utc::now();
        let retention = chrono::Duration::from_std(self.retention)
            .map_err(|e| DomainError::Internal(format!("retention out of range: {}", e)))?;

        match self.store.claim(key, fingerprint, now, now - retention)? {
            Claim::Completed(result) => {
                log::debug!("Replaying idempotent result for {} ({})", key, fingerprint);
                return Ok(Execution {
                    result,
                    replayed: true,
                });
            }
            Claim::InFlight => return Err(DomainError::IdempotencyConflict.into()),
            Claim::Acquired => {}
        }

        match operation() {
            Ok(result) => {
                // The operation has taken effect, so its result is returned
                // even when it cannot be stored for replay.
                self.store_result(key, fingerprint, &result);
                Ok(Execution {
                    result,
                    replayed: false,
                })
            }
            Err(e) => {
                // Failed executions are not cached; the key may be reused.
                if let Err(release_err) = self.store.release(key, fingerprint) {
                    log::error!(
                        "Could not release idempotency key {} ({}): {}",
                        key,
                        fingerprint,
                        release_err
                    );
                }
                Err(e)
            }
        }
    }

    fn store_result(&self, key: &str, fingerprint: &str, result: &ResultSnapshot) {
        let mut attempt = 1;
        loop {
            match self.store.complete(key, fingerprint, result) {
                Ok(()) => return,
                Err(e) if attempt < COMPLETE_ATTEMPTS => {
                    log::warn!(
                        "Storing idempotent result for {} ({}) failed, retrying: {}",
                        key,
                        fingerprint,
                        e
                    );
                    attempt += 1;
                }
                Err(e) => {
                    // The claim stays in flight until the retention window ends.
                    log::error!(
                        "ALERT could not store idempotent result for {} ({}): {}",
                        key,
                        fingerprint,
                        e
                    );
                    return;
                }
            }
        }
    }

    /// Drops records older than the retention window.
    pub fn prune_expired(&self) -> Result<usize, DomainError> {
        let retention = chrono::Duration::from_std(self.retention)
            .map_err(|e| DomainError::Internal(format!("retention out of range: {}", e)))?;
        self.store.prune(Utc::now() - retention)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    use serde_json::json;

    use super::*;
    use crate::infrastructure::in_memory::InMemoryIdempotencyStore;

    /// Delegates to the memory store; `complete` fails `failures` times first.
    struct FlakyCompleteStore {
        inner: InMemoryIdempotencyStore,
        failures: AtomicUsize,
    }

    impl FlakyCompleteStore {
        fn new(failures: usize) -> Self {
            Self {
                inner: InMemoryIdempotencyStore::new(),
                failures: AtomicUsize::new(failures),
            }
        }
    }

    impl IdempotencyStore for FlakyCompleteStore {
        fn claim(
            &self,
            key: &str,
            fingerprint: &str,
            now: chrono::DateTime<Utc>,
            expired_before: chrono::DateTime<Utc>,
        ) -> Result<Claim, DomainError> {
            self.inner.claim(key, fingerprint, now, expired_before)
        }

        fn complete(
            &self,
            key: &str,
            fingerprint: &str,
            result: &ResultSnapshot,
        ) -> Result<(), DomainError> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(DomainError::Internal("connection reset".into()));
            }
            self.inner.complete(key, fingerprint, result)
        }

        fn release(&self, key: &str, fingerprint: &str) -> Result<(), DomainError> {
            self.inner.release(key, fingerprint)
        }

        fn prune(&self, cutoff: chrono::DateTime<Utc>) -> Result<usize, DomainError> {
            self.inner.prune(cutoff)
        }
    }

    fn guard() -> IdempotencyGuard {
        IdempotencyGuard::new(
            Arc::new(InMemoryIdempotencyStore::new()),
            Duration::from_secs(3600),
        )
    }

    #[test]
    fn repeated_key_replays_without_executing() {
        let guard = guard();
        let calls = AtomicUsize::new(0);
        let op = || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, DomainError>(ResultSnapshot::new(201, json!({ "call": n })))
        };

        let first = guard.execute("key-1", "POST /orders", op).unwrap();
        let second = guard.execute("key-1", "POST /orders", op).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(first.result, second.result);
    }

    #[test]
    fn same_key_on_another_endpoint_executes() {
        let guard = guard();
        let calls = AtomicUsize::new(0);
        let op = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, DomainError>(ResultSnapshot::new(200, json!(null)))
        };
        guard.execute("key-1", "POST /orders", op).unwrap();
        guard.execute("key-1", "POST /payments/intent", op).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_operation_releases_the_key() {
        let guard = guard();
        let failed = guard.execute("key-2", "POST /orders", || {
            Err::<ResultSnapshot, _>(DomainError::InvalidInput("empty".into()))
        });
        assert!(matches!(failed, Err(DomainError::InvalidInput(_))));

        let retried = guard
            .execute("key-2", "POST /orders", || {
                Ok::<_, DomainError>(ResultSnapshot::new(201, json!({})))
            })
            .unwrap();
        assert!(!retried.replayed);
    }

    #[test]
    fn transient_complete_failure_still_records_the_result() {
        let guard = IdempotencyGuard::new(
            Arc::new(FlakyCompleteStore::new(1)),
            Duration::from_secs(3600),
        );
        let calls = AtomicUsize::new(0);
        let op = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, DomainError>(ResultSnapshot::new(201, json!({ "id": "order-1" })))
        };

        let first = guard.execute("key-3", "POST /orders", op).unwrap();
        let second = guard.execute("key-3", "POST /orders", op).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(second.replayed);
        assert_eq!(first.result, second.result);
    }

    #[test]
    fn successful_operation_is_reported_when_its_result_cannot_be_stored() {
        let guard = IdempotencyGuard::new(
            Arc::new(FlakyCompleteStore::new(usize::MAX)),
            Duration::from_secs(3600),
        );

        let execution = guard
            .execute("key-4", "POST /orders", || {
                Ok::<_, DomainError>(ResultSnapshot::new(201, json!({ "id": "order-2" })))
            })
            .unwrap();

        assert!(!execution.replayed);
        assert_eq!(execution.result.status, 201);
        assert_eq!(execution.result.body, json!({ "id": "order-2" }));
    }

    #[test]
    fn blank_key_is_invalid() {
        let result = guard().execute("  ", "POST /orders", || {
            Ok::<_, DomainError>(ResultSnapshot::new(201, json!({})))
        });
        assert!(matches!(result, Err(DomainError::InvalidInput(_))));
    }

    #[test]
    fn concurrent_callers_never_double_execute() {
        let guard = Arc::new(guard());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                let calls = calls.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    guard.execute("race", "POST /orders", || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(50));
                        Ok::<_, DomainError>(ResultSnapshot::new(201, json!({ "id": "only" })))
                    })
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            match result {
                Ok(execution) => assert_eq!(execution.result.body, json!({ "id": "only" })),
                Err(DomainError::IdempotencyConflict) => {}
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
    }
}
