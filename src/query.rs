/// Read-only verification queries against the PaymentAnchor contract.
///
/// Both operations are side-effect-free contract calls: no signing, no
/// submission, no shared mutable state. They are independent of the
/// anchor pipeline and may run concurrently with it.
use std::time::Duration;

use crate::error::{AnchorError, Result};
use crate::session::ChainSession;

/// Deadline for a single read-only query.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Check whether the anchored hash for `transaction_id` matches
/// `expected_hash`.
///
/// `Ok(false)` is a valid, successful answer — the contract reports no
/// match. Only transport and decoding problems are errors, so a query
/// failure can never be mistaken for proof of tampering.
pub async fn verify(
    session: &ChainSession,
    transaction_id: &str,
    expected_hash: &[u8; 32],
) -> Result<bool> {
    let calldata = session.abi().encode_verify_payment(transaction_id, expected_hash)?;

    let ret = tokio::time::timeout(
        QUERY_TIMEOUT,
        session.rpc().call(session.contract(), calldata),
    )
    .await
    .map_err(|_| AnchorError::Timeout("verify query"))?
    .map_err(|e| AnchorError::Query(e.to_string()))?;

    session.abi().decode_verify_payment(&ret)
}

/// Fetch the anchored hash and block timestamp for `transaction_id`.
///
/// The hash is returned as lowercase hex. A return that does not decode
/// to exactly two fields means the deployed contract and the compiled-in
/// interface have drifted — that surfaces as a decoding error, never as
/// zero-valued data.
pub async fn get_anchor(session: &ChainSession, transaction_id: &str) -> Result<(String, i64)> {
    let calldata = session.abi().encode_get_payment_anchor(transaction_id)?;

    let ret = tokio::time::timeout(
        QUERY_TIMEOUT,
        session.rpc().call(session.contract(), calldata),
    )
    .await
    .map_err(|_| AnchorError::Timeout("anchor lookup"))?
    .map_err(|e| AnchorError::Query(e.to_string()))?;

    let (hash, timestamp) = session.abi().decode_get_payment_anchor(&ret)?;
    Ok((hex::encode(hash), timestamp))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use alloy::dyn_abi::DynSolValue;
    use alloy::primitives::{B256, U256};

    use super::*;
    use crate::rpc::stub::StubRpc;
    use crate::session::testutil::stub_session;

    fn encoded_bool(value: bool) -> Vec<u8> {
        DynSolValue::Bool(value).abi_encode()
    }

    fn encoded_anchor(hash: [u8; 32], timestamp: u64) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(B256::from(hash).as_slice());
        data.extend_from_slice(&U256::from(timestamp).to_be_bytes::<32>());
        data
    }

    #[tokio::test]
    async fn test_verify_no_match_is_ok_false() {
        let rpc = Arc::new(StubRpc::healthy());
        rpc.call_returns.lock().await.push_back(Ok(encoded_bool(false)));
        let session = stub_session(rpc).await;

        let matched = verify(&session, "PAY-0001", &[0x11; 32]).await.unwrap();
        assert!(!matched);
    }

    #[tokio::test]
    async fn test_verify_match() {
        let rpc = Arc::new(StubRpc::healthy());
        rpc.call_returns.lock().await.push_back(Ok(encoded_bool(true)));
        let session = stub_session(rpc).await;

        assert!(verify(&session, "PAY-0001", &[0x11; 32]).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_transport_failure_is_query_error() {
        let rpc = Arc::new(StubRpc::healthy());
        rpc.call_returns
            .lock()
            .await
            .push_back(Err(AnchorError::Connection("stub: refused".into())));
        let session = stub_session(rpc).await;

        assert!(matches!(
            verify(&session, "PAY-0001", &[0x11; 32]).await,
            Err(AnchorError::Query(_))
        ));
    }

    #[tokio::test]
    async fn test_get_anchor_returns_hex_hash_and_timestamp() {
        let hash = [0x7fu8; 32];
        let rpc = Arc::new(StubRpc::healthy());
        rpc.call_returns
            .lock()
            .await
            .push_back(Ok(encoded_anchor(hash, 1_700_000_000)));
        let session = stub_session(rpc).await;

        let (hex_hash, timestamp) = get_anchor(&session, "PAY-0001").await.unwrap();
        assert_eq!(hex_hash, hex::encode(hash));
        assert_eq!(timestamp, 1_700_000_000);
    }

    #[tokio::test]
    async fn test_get_anchor_verify_agree_on_same_hash() {
        let hash = [0x7fu8; 32];
        let rpc = Arc::new(StubRpc::healthy());
        {
            let mut calls = rpc.call_returns.lock().await;
            calls.push_back(Ok(encoded_anchor(hash, 1_700_000_000)));
            calls.push_back(Ok(encoded_bool(true)));
        }
        let session = stub_session(rpc).await;

        let (hex_hash, _) = get_anchor(&session, "PAY-0001").await.unwrap();
        let mut expected = [0u8; 32];
        hex::decode_to_slice(&hex_hash, &mut expected).unwrap();
        assert!(verify(&session, "PAY-0001", &expected).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_anchor_arity_mismatch_is_decoding_error() {
        let rpc = Arc::new(StubRpc::healthy());
        // One 32-byte word instead of two: contract/interface drift.
        rpc.call_returns.lock().await.push_back(Ok(vec![0u8; 32]));
        let session = stub_session(rpc).await;

        assert!(matches!(
            get_anchor(&session, "PAY-0001").await,
            Err(AnchorError::Decoding(_))
        ));
    }
}
