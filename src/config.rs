/// Engine configuration.
///
/// Read once at startup and immutable thereafter. Absence of any field
/// is a fatal startup error; the engine never falls back to defaults
/// for the endpoint, contract, or signing key.
use crate::error::{AnchorError, Result};

/// Environment variable holding the node JSON-RPC endpoint.
pub const ENV_RPC_URL: &str = "ANCHOR_RPC_URL";
/// Environment variable holding the deployed PaymentAnchor contract address.
pub const ENV_CONTRACT_ADDRESS: &str = "ANCHOR_CONTRACT_ADDRESS";
/// Environment variable holding the signer private key (hex, 0x optional).
pub const ENV_PRIVATE_KEY: &str = "ANCHOR_PRIVATE_KEY";

/// Startup configuration for the anchor engine.
#[derive(Debug, Clone)]
pub struct AnchorConfig {
    /// Node JSON-RPC endpoint (e.g., Infura, Alchemy, local node).
    pub rpc_url: String,
    /// Deployed PaymentAnchor contract address (0x-prefixed hex).
    pub contract_address: String,
    /// Signer private key as hex. In production this would come from a KMS.
    pub private_key_hex: String,
}

impl AnchorConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            rpc_url: std::env::var(ENV_RPC_URL).unwrap_or_default(),
            contract_address: std::env::var(ENV_CONTRACT_ADDRESS).unwrap_or_default(),
            private_key_hex: std::env::var(ENV_PRIVATE_KEY).unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that every required field is present and non-empty.
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.trim().is_empty() {
            return Err(AnchorError::MissingConfiguration("rpc_url"));
        }
        if self.contract_address.trim().is_empty() {
            return Err(AnchorError::MissingConfiguration("contract_address"));
        }
        if self.private_key_hex.trim().is_empty() {
            return Err(AnchorError::MissingConfiguration("private_key"));
        }
        Ok(())
    }
}
