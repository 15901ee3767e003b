/// Time-windowed integrity status cache for dashboard consumption.
///
/// Sits in front of an expensive ledger-wide verification routine owned
/// by the storage layer and rate-limits how often that check re-runs.
/// Many concurrent readers arriving after the window expires collapse
/// into a single recheck instead of each triggering one.
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::Result;

/// How long a verification result is served without rechecking.
pub const INTEGRITY_CACHE_WINDOW: Duration = Duration::from_secs(10);

/// External collaborator that verifies the entire ledger against the
/// chain. Its algorithm is owned by the storage layer; the cache only
/// consumes its `(is_valid, error)` answer.
#[async_trait]
pub trait LedgerVerifier: Send + Sync {
    async fn verify_ledger(&self) -> Result<bool>;
}

struct CacheState {
    is_valid: bool,
    last_checked: Option<Instant>,
}

pub struct IntegrityCache {
    window: Duration,
    verifier: Arc<dyn LedgerVerifier>,
    state: RwLock<CacheState>,
}

impl IntegrityCache {
    pub fn new(verifier: Arc<dyn LedgerVerifier>) -> Self {
        Self::with_window(INTEGRITY_CACHE_WINDOW, verifier)
    }

    pub fn with_window(window: Duration, verifier: Arc<dyn LedgerVerifier>) -> Self {
        Self {
            window,
            verifier,
            // Optimistic until the first check runs; `last_checked: None`
            // guarantees the first call refreshes.
            state: RwLock::new(CacheState {
                is_valid: true,
                last_checked: None,
            }),
        }
    }

    /// Current integrity status. Never fails: if the underlying check
    /// errors, the last known value is served and the window is left
    /// expired so the next caller retries — availability over precision.
    pub async fn get_status(&self) -> bool {
        // Fast path: shared read, no writer contention inside the window.
        {
            let state = self.state.read().await;
            if fresh(&state, self.window) {
                return state.is_valid;
            }
        }

        let mut state = self.state.write().await;
        // Another writer may have refreshed while we waited for the lock.
        if fresh(&state, self.window) {
            return state.is_valid;
        }

        match self.verifier.verify_ledger().await {
            Ok(is_valid) => {
                state.is_valid = is_valid;
                state.last_checked = Some(Instant::now());
                debug!(is_valid, "ledger integrity refreshed");
                is_valid
            }
            Err(e) => {
                warn!(error = %e, "ledger integrity check failed, serving last known value");
                state.is_valid
            }
        }
    }
}

fn fresh(state: &CacheState, window: Duration) -> bool {
    state
        .last_checked
        .map(|checked| checked.elapsed() < window)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Mutex;

    use super::*;
    use crate::error::AnchorError;

    /// Flips its answer on every invocation and counts calls.
    #[derive(Default)]
    struct ToggleVerifier {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl LedgerVerifier for ToggleVerifier {
        async fn verify_ledger(&self) -> Result<bool> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(call % 2 == 0)
        }
    }

    struct FailingVerifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LedgerVerifier for FailingVerifier {
        async fn verify_ledger(&self) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AnchorError::Connection("stub: node unreachable".into()))
        }
    }

    #[tokio::test]
    async fn test_within_window_serves_stale_value() {
        let verifier = Arc::new(ToggleVerifier::default());
        let cache = IntegrityCache::with_window(Duration::from_secs(60), verifier.clone());

        // The underlying answer toggles between calls, so identical
        // results prove the second read came from the cache.
        assert!(cache.get_status().await);
        assert!(cache.get_status().await);
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_window_refreshes_once() {
        let verifier = Arc::new(ToggleVerifier::default());
        let cache = IntegrityCache::with_window(Duration::from_millis(20), verifier.clone());

        assert!(cache.get_status().await);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!cache.get_status().await);
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_expiry_collapses_to_one_check() {
        let verifier = Arc::new(ToggleVerifier {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(25),
        });
        let cache = Arc::new(IntegrityCache::with_window(
            Duration::from_secs(60),
            verifier.clone(),
        ));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.get_status().await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_verifier_failure_degrades_to_last_known() {
        let verifier = Arc::new(FailingVerifier {
            calls: AtomicUsize::new(0),
        });
        let cache = IntegrityCache::with_window(Duration::from_secs(60), verifier.clone());

        // Initial optimistic value survives the failure.
        assert!(cache.get_status().await);
        // The failed refresh must not stamp the window: the next call
        // tries the verifier again instead of serving a "fresh" miss.
        assert!(cache.get_status().await);
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 2);
    }

    /// Succeeds once with `false`, then fails forever.
    struct FlakyVerifier {
        answers: Mutex<Vec<Result<bool>>>,
    }

    #[async_trait]
    impl LedgerVerifier for FlakyVerifier {
        async fn verify_ledger(&self) -> Result<bool> {
            self.answers
                .lock()
                .await
                .pop()
                .unwrap_or(Err(AnchorError::Connection("stub: gone".into())))
        }
    }

    #[tokio::test]
    async fn test_last_known_value_tracks_latest_success() {
        let verifier = Arc::new(FlakyVerifier {
            answers: Mutex::new(vec![Ok(false)]),
        });
        let cache = IntegrityCache::with_window(Duration::from_millis(10), verifier);

        assert!(!cache.get_status().await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        // Window expired, verifier now failing: serve the last success.
        assert!(!cache.get_status().await);
    }
}
