/// Confirmation tracking for submitted anchor transactions.
///
/// Each submission gets a supervised background task that polls the node
/// for a receipt until the transaction resolves or a deadline elapses.
/// The submitter is never blocked; callers that do want the terminal
/// outcome can look up the tracker handle by chain transaction hash and
/// await or abort it. A semaphore bounds how many polling loops run at
/// once so high anchor volume cannot spawn unbounded tasks.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::rpc::EthRpc;

/// Lifecycle of an anchor transaction. Reaches a terminal state exactly
/// once; only the tracker writes transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnchorStatus {
    /// Submitted, not yet mined.
    Pending,
    /// Mined with a success status flag.
    Confirmed,
    /// Mined, but execution reverted.
    Reverted,
    /// No receipt appeared within the polling deadline.
    TimedOut,
}

impl AnchorStatus {
    pub fn is_terminal(self) -> bool {
        self != AnchorStatus::Pending
    }
}

/// Tracked state of one submitted anchor transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorReceipt {
    /// Transaction hash on the chain.
    pub chain_tx_hash: String,
    /// Ledger transaction this anchor belongs to.
    pub transaction_id: String,
    pub status: AnchorStatus,
    /// Block the transaction landed in (terminal Confirmed/Reverted only).
    pub block_number: Option<u64>,
    /// Gas consumed (Confirmed only).
    pub gas_used: Option<u64>,
    pub submitted_at: DateTime<Utc>,
}

impl AnchorReceipt {
    fn pending(chain_tx_hash: String, transaction_id: String) -> Self {
        Self {
            chain_tx_hash,
            transaction_id,
            status: AnchorStatus::Pending,
            block_number: None,
            gas_used: None,
            submitted_at: Utc::now(),
        }
    }
}

/// Polling parameters, adjustable for tests.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Interval between receipt polls.
    pub poll_interval: Duration,
    /// Total time to wait for a receipt before declaring `TimedOut`.
    pub poll_deadline: Duration,
    /// Upper bound on concurrently polling trackers.
    pub max_concurrent: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            poll_deadline: Duration::from_secs(300),
            max_concurrent: 32,
        }
    }
}

/// Handle to one tracker task.
#[derive(Clone)]
pub struct TrackerHandle {
    rx: watch::Receiver<AnchorReceipt>,
    abort: AbortHandle,
}

impl TrackerHandle {
    /// Latest observed receipt state.
    pub fn latest(&self) -> AnchorReceipt {
        self.rx.borrow().clone()
    }

    /// Wait for the tracker to reach a terminal status.
    ///
    /// If the tracker was aborted first, returns the last observed state
    /// (still `Pending`).
    pub async fn await_terminal(&mut self) -> AnchorReceipt {
        if let Ok(receipt) = self.rx.wait_for(|r| r.status.is_terminal()).await {
            return receipt.clone();
        }
        // Tracker aborted before resolving; report the last observed state.
        self.rx.borrow().clone()
    }

    /// Stop polling. The transaction itself is unaffected.
    pub fn abort(&self) {
        self.abort.abort();
    }
}

/// Registry of live confirmation trackers, keyed by chain transaction hash.
pub struct TrackerRegistry {
    config: TrackerConfig,
    limiter: Arc<Semaphore>,
    tasks: Arc<Mutex<HashMap<String, TrackerHandle>>>,
}

impl TrackerRegistry {
    pub fn new(config: TrackerConfig) -> Self {
        let limiter = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            config,
            limiter,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start tracking a submitted transaction.
    ///
    /// Fire-and-forget from the submitter's perspective; the returned
    /// handle (also retrievable via [`handle`](Self::handle)) lets other
    /// callers await or abort the tracker.
    pub async fn spawn(
        &self,
        rpc: Arc<dyn EthRpc>,
        chain_tx_hash: String,
        transaction_id: String,
    ) -> TrackerHandle {
        let pending = AnchorReceipt::pending(chain_tx_hash.clone(), transaction_id);
        let (tx, rx) = watch::channel(pending.clone());

        let limiter = self.limiter.clone();
        let config = self.config.clone();
        let tasks = self.tasks.clone();
        let key = chain_tx_hash.clone();

        // Hold the registry lock across the insert so the task's eviction
        // below cannot run before its entry exists.
        let mut registered = self.tasks.lock().await;
        let task = tokio::spawn(async move {
            // Queue behind the concurrency bound rather than dropping the
            // tracker; the submitter has already returned.
            let _permit = match limiter.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let receipt = poll_until_terminal(rpc.as_ref(), pending, &config).await;
            report(&receipt);
            let _ = tx.send(receipt);
            // Terminal state published; the entry has served its purpose.
            tasks.lock().await.remove(&key);
        });

        let handle = TrackerHandle {
            rx,
            abort: task.abort_handle(),
        };
        registered.insert(chain_tx_hash, handle.clone());
        handle
    }

    /// Look up the tracker for a chain transaction hash. Entries evict
    /// themselves once the tracker reaches a terminal state, so `None`
    /// means either "never tracked" or "already resolved".
    pub async fn handle(&self, chain_tx_hash: &str) -> Option<TrackerHandle> {
        self.tasks.lock().await.get(chain_tx_hash).cloned()
    }

    /// Drop the registry entry for a transaction. Needed only for
    /// trackers that were aborted through their handle — resolved ones
    /// clean up after themselves.
    pub async fn remove(&self, chain_tx_hash: &str) -> Option<TrackerHandle> {
        self.tasks.lock().await.remove(chain_tx_hash)
    }

    /// Number of trackers still registered (unresolved or aborted).
    pub async fn active(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Abort every registered tracker. Used for orderly shutdown so no
    /// polling loop outlives the service.
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
    }
}

/// Poll for a receipt until the transaction resolves or the deadline
/// elapses. "No receipt yet" is the expected steady state, and transient
/// poll failures are retried on the next tick.
async fn poll_until_terminal(
    rpc: &dyn EthRpc,
    mut receipt: AnchorReceipt,
    config: &TrackerConfig,
) -> AnchorReceipt {
    let timed_out = AnchorReceipt {
        status: AnchorStatus::TimedOut,
        ..receipt.clone()
    };

    let polling = async {
        let mut ticker = tokio::time::interval(config.poll_interval);
        loop {
            ticker.tick().await;
            match rpc.transaction_receipt(&receipt.chain_tx_hash).await {
                Ok(Some(tx_receipt)) => {
                    if tx_receipt.succeeded {
                        receipt.status = AnchorStatus::Confirmed;
                        receipt.gas_used = tx_receipt.gas_used;
                    } else {
                        receipt.status = AnchorStatus::Reverted;
                    }
                    receipt.block_number = tx_receipt.block_number;
                    return receipt;
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(error = %e, "receipt poll failed, retrying");
                }
            }
        }
    };

    match tokio::time::timeout(config.poll_deadline, polling).await {
        Ok(resolved) => resolved,
        Err(_) => timed_out,
    }
}

fn report(receipt: &AnchorReceipt) {
    match receipt.status {
        AnchorStatus::Confirmed => info!(
            transaction_id = %receipt.transaction_id,
            tx_hash = %receipt.chain_tx_hash,
            block = receipt.block_number,
            gas_used = receipt.gas_used,
            "payment anchor confirmed"
        ),
        AnchorStatus::Reverted => warn!(
            transaction_id = %receipt.transaction_id,
            tx_hash = %receipt.chain_tx_hash,
            "payment anchor reverted on-chain"
        ),
        AnchorStatus::TimedOut => warn!(
            transaction_id = %receipt.transaction_id,
            tx_hash = %receipt.chain_tx_hash,
            "no receipt within polling deadline"
        ),
        AnchorStatus::Pending => {}
    }
}
