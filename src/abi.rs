/// Contract interface codec for the PaymentAnchor contract.
///
/// The interface description is a versioned, compiled-in constant — it is
/// never user input. Exactly three operations exist:
/// - `anchorPayment(string, bytes32)`: state-mutating
/// - `verifyPayment(string, bytes32) -> bool`: read-only
/// - `getPaymentAnchor(string) -> (bytes32, uint256)`: read-only
use alloy::dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy::json_abi::{Function, JsonAbi};
use alloy::primitives::B256;

use crate::error::{AnchorError, Result};

/// JSON ABI for the deployed PaymentAnchor contract, v1.
pub const PAYMENT_ANCHOR_ABI: &str = r#"[
    {
        "inputs": [
            {"internalType": "string", "name": "transactionId", "type": "string"},
            {"internalType": "bytes32", "name": "paymentHash", "type": "bytes32"}
        ],
        "name": "anchorPayment",
        "outputs": [],
        "stateMutability": "nonpayable",
        "type": "function"
    },
    {
        "inputs": [
            {"internalType": "string", "name": "transactionId", "type": "string"}
        ],
        "name": "getPaymentAnchor",
        "outputs": [
            {"internalType": "bytes32", "name": "", "type": "bytes32"},
            {"internalType": "uint256", "name": "", "type": "uint256"}
        ],
        "stateMutability": "view",
        "type": "function"
    },
    {
        "inputs": [
            {"internalType": "string", "name": "transactionId", "type": "string"},
            {"internalType": "bytes32", "name": "paymentHash", "type": "bytes32"}
        ],
        "name": "verifyPayment",
        "outputs": [
            {"internalType": "bool", "name": "", "type": "bool"}
        ],
        "stateMutability": "view",
        "type": "function"
    }
]"#;

/// Typed codec over the three PaymentAnchor operations.
///
/// Encodes call arguments into calldata and decodes raw return bytes
/// into typed results. Decoding mismatches are surfaced, never coerced.
#[derive(Debug, Clone)]
pub struct AnchorAbi {
    anchor_payment: Function,
    verify_payment: Function,
    get_payment_anchor: Function,
}

impl AnchorAbi {
    /// Parse the compiled-in interface description.
    ///
    /// Failure here is a startup invariant violation, not a runtime
    /// condition: the ABI constant ships with the binary.
    pub fn parse() -> Result<Self> {
        let abi: JsonAbi = serde_json::from_str(PAYMENT_ANCHOR_ABI)
            .map_err(|e| AnchorError::InvalidInterfaceDescription(e.to_string()))?;

        Ok(Self {
            anchor_payment: lookup(&abi, "anchorPayment")?,
            verify_payment: lookup(&abi, "verifyPayment")?,
            get_payment_anchor: lookup(&abi, "getPaymentAnchor")?,
        })
    }

    /// Encode calldata for `anchorPayment(transactionId, paymentHash)`.
    pub fn encode_anchor_payment(&self, transaction_id: &str, payment_hash: &[u8; 32]) -> Result<Vec<u8>> {
        self.anchor_payment
            .abi_encode_input(&[
                DynSolValue::String(transaction_id.to_string()),
                DynSolValue::FixedBytes(B256::from(*payment_hash), 32),
            ])
            .map_err(|e| AnchorError::Encoding(e.to_string()))
    }

    /// Encode calldata for `verifyPayment(transactionId, expectedHash)`.
    pub fn encode_verify_payment(&self, transaction_id: &str, expected_hash: &[u8; 32]) -> Result<Vec<u8>> {
        self.verify_payment
            .abi_encode_input(&[
                DynSolValue::String(transaction_id.to_string()),
                DynSolValue::FixedBytes(B256::from(*expected_hash), 32),
            ])
            .map_err(|e| AnchorError::Encoding(e.to_string()))
    }

    /// Encode calldata for `getPaymentAnchor(transactionId)`.
    pub fn encode_get_payment_anchor(&self, transaction_id: &str) -> Result<Vec<u8>> {
        self.get_payment_anchor
            .abi_encode_input(&[DynSolValue::String(transaction_id.to_string())])
            .map_err(|e| AnchorError::Encoding(e.to_string()))
    }

    /// Decode the boolean return of `verifyPayment`.
    pub fn decode_verify_payment(&self, data: &[u8]) -> Result<bool> {
        let values = self
            .verify_payment
            .abi_decode_output(data)
            .map_err(|e| AnchorError::Decoding(e.to_string()))?;

        match values.as_slice() {
            [DynSolValue::Bool(is_match)] => Ok(*is_match),
            other => Err(AnchorError::Decoding(format!(
                "verifyPayment: expected a single bool, got {} value(s)",
                other.len()
            ))),
        }
    }

    /// Decode the `(bytes32, uint256)` return of `getPaymentAnchor`.
    ///
    /// A return with anything other than exactly two fields means the
    /// deployed contract and the compiled-in interface have drifted.
    pub fn decode_get_payment_anchor(&self, data: &[u8]) -> Result<([u8; 32], i64)> {
        let values = self
            .get_payment_anchor
            .abi_decode_output(data)
            .map_err(|e| AnchorError::Decoding(e.to_string()))?;

        if values.len() != 2 {
            return Err(AnchorError::Decoding(format!(
                "getPaymentAnchor: expected 2 values, got {}",
                values.len()
            )));
        }

        let hash: [u8; 32] = values[0]
            .as_fixed_bytes()
            .filter(|(_, size)| *size == 32)
            .and_then(|(bytes, _)| bytes.try_into().ok())
            .ok_or_else(|| AnchorError::Decoding("getPaymentAnchor: first value is not bytes32".into()))?;

        let (timestamp, _) = values[1]
            .as_uint()
            .ok_or_else(|| AnchorError::Decoding("getPaymentAnchor: second value is not uint256".into()))?;
        let timestamp = i64::try_from(timestamp)
            .map_err(|_| AnchorError::Decoding("getPaymentAnchor: timestamp exceeds i64".into()))?;

        Ok((hash, timestamp))
    }
}

fn lookup(abi: &JsonAbi, name: &str) -> Result<Function> {
    abi.function(name)
        .and_then(|overloads| overloads.first())
        .cloned()
        .ok_or_else(|| AnchorError::InvalidInterfaceDescription(format!("missing function {name}")))
}
