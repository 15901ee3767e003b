/// Anchor transaction pipeline.
///
/// Builds, signs, and submits one `anchorPayment` transaction per request:
/// fetch nonce, gas price, and chain id fresh from the node, encode the
/// calldata, sign bound to the chain id, submit, and hand the chain
/// transaction hash to the confirmation tracker. The caller gets the hash
/// back immediately; block inclusion is tracked in the background.
use std::sync::Arc;
use std::time::Duration;

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Bytes, TxKind, U256};
use alloy::signers::Signer;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{AnchorError, Result};
use crate::session::ChainSession;
use crate::tracker::TrackerRegistry;

/// Overall deadline for one anchor submission.
pub const ANCHOR_TIMEOUT: Duration = Duration::from_secs(30);

/// Fixed gas allowance for `anchorPayment`.
///
/// Deliberately conservative instead of dynamically estimated:
/// under-provisioning risks out-of-gas reverts, while unused allowance
/// is refunded.
pub const ANCHOR_GAS_LIMIT: u64 = 150_000;

/// One payment to anchor on-chain. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct AnchorRequest {
    /// Ledger-unique transaction identifier — the join key between the
    /// off-chain ledger and the on-chain anchor.
    pub transaction_id: String,
    /// Commitment to the payment's content, computed by the ledger.
    pub payment_hash: [u8; 32],
}

/// Submission pipeline for a single signing key.
///
/// Concurrent `anchor` calls are safe: the nonce-acquisition-through-
/// submission sequence runs under an internal lock so same-sender
/// transactions never collide on nonce. Build exactly one pipeline per
/// signing key.
pub struct AnchorPipeline {
    session: Arc<ChainSession>,
    trackers: Arc<TrackerRegistry>,
    submit_lock: Mutex<()>,
}

impl AnchorPipeline {
    pub fn new(session: Arc<ChainSession>, trackers: Arc<TrackerRegistry>) -> Self {
        Self {
            session,
            trackers,
            submit_lock: Mutex::new(()),
        }
    }

    /// Anchor a payment hash on-chain.
    ///
    /// Returns the chain transaction hash as soon as the node accepts the
    /// submission; confirmation is polled in the background by the
    /// tracker registry. Submission is never retried here — retry policy
    /// belongs to the caller.
    pub async fn anchor(&self, request: AnchorRequest) -> Result<String> {
        tokio::time::timeout(ANCHOR_TIMEOUT, self.submit(request))
            .await
            .map_err(|_| AnchorError::Timeout("anchor submission"))?
    }

    async fn submit(&self, request: AnchorRequest) -> Result<String> {
        let session = &self.session;
        let rpc = session.rpc();
        let sender = session.signer_address();

        // Nonce must be fetched fresh per call and must not be reused by
        // a concurrent anchor, so everything from the nonce read to the
        // submission happens under the lock.
        let guard = self.submit_lock.lock().await;

        let nonce = rpc
            .pending_nonce(sender)
            .await
            .map_err(|e| AnchorError::NonceFetch(e.to_string()))?;

        let gas_price = rpc
            .gas_price()
            .await
            .map_err(|e| AnchorError::GasPriceFetch(e.to_string()))?;

        // Fetched fresh so the signature is bound to the network we are
        // actually talking to — prevents cross-chain replay.
        let chain_id = rpc
            .chain_id()
            .await
            .map_err(|e| AnchorError::ChainIdFetch(e.to_string()))?;

        let calldata = session
            .abi()
            .encode_anchor_payment(&request.transaction_id, &request.payment_hash)?;

        let tx = TxLegacy {
            chain_id: Some(chain_id),
            nonce,
            gas_price,
            gas_limit: ANCHOR_GAS_LIMIT,
            to: TxKind::Call(session.contract()),
            value: U256::ZERO,
            input: Bytes::from(calldata),
        };

        let sig_hash = tx.signature_hash();
        let signature = session
            .signer()
            .sign_hash(&sig_hash)
            .await
            .map_err(|e| AnchorError::Signing(e.to_string()))?;

        let envelope = TxEnvelope::Legacy(tx.into_signed(signature));
        let mut raw = Vec::new();
        envelope.encode_2718(&mut raw);

        let chain_tx_hash = rpc
            .send_raw_transaction(raw)
            .await
            .map_err(|e| AnchorError::Submission(e.to_string()))?;

        drop(guard);

        info!(
            tx_hash = %chain_tx_hash,
            transaction_id = %request.transaction_id,
            nonce,
            "payment anchor submitted"
        );

        self.trackers
            .spawn(rpc.clone(), chain_tx_hash.clone(), request.transaction_id)
            .await;

        Ok(chain_tx_hash)
    }
}
