/// Chain session establishment.
///
/// A `ChainSession` bundles everything the engine needs to talk to the
/// chain: the node transport, the deployed contract address, the signing
/// key, and the parsed contract interface. It is constructed explicitly
/// at startup and passed by reference into every operation — read-only
/// after construction and safe for unsynchronized concurrent reads.
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use tracing::info;

use crate::abi::AnchorAbi;
use crate::config::AnchorConfig;
use crate::error::{AnchorError, Result};
use crate::rpc::{EthRpc, HttpRpc};

/// Deadline for the connect-time liveness check.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ChainSession {
    rpc: Arc<dyn EthRpc>,
    contract: Address,
    signer: PrivateKeySigner,
    chain_id: u64,
    abi: AnchorAbi,
}

impl ChainSession {
    /// Validate configuration, check node liveness, and parse the signing
    /// key and contract interface. Each failure mode carries its own
    /// error kind so startup problems are immediately attributable.
    pub async fn connect(config: &AnchorConfig, rpc: Arc<dyn EthRpc>) -> Result<Self> {
        config.validate()?;

        // Liveness check: the node must answer with its chain id.
        let chain_id = tokio::time::timeout(CONNECT_TIMEOUT, rpc.chain_id())
            .await
            .map_err(|_| AnchorError::Timeout("chain liveness check"))?
            .map_err(|e| AnchorError::Connection(e.to_string()))?;

        let contract: Address = config
            .contract_address
            .parse()
            .map_err(|e| AnchorError::InvalidContractAddress(format!("{e}")))?;

        let signer: PrivateKeySigner = config
            .private_key_hex
            .trim_start_matches("0x")
            .parse()
            .map_err(|e| AnchorError::InvalidKeyMaterial(format!("{e}")))?;

        let abi = AnchorAbi::parse()?;

        info!(
            chain_id,
            contract = %contract,
            signer = %signer.address(),
            "chain session established"
        );

        Ok(Self {
            rpc,
            contract,
            signer,
            chain_id,
            abi,
        })
    }

    /// Connect over HTTP JSON-RPC to the configured endpoint.
    pub async fn connect_http(config: &AnchorConfig) -> Result<Self> {
        let rpc = Arc::new(HttpRpc::new(&config.rpc_url)?);
        Self::connect(config, rpc).await
    }

    pub fn rpc(&self) -> &Arc<dyn EthRpc> {
        &self.rpc
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    /// Sender address derived from the signing key.
    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }

    /// Chain identifier observed at connect time, exposed for reporting.
    /// The pipeline still fetches a fresh value per anchor before signing.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn abi(&self) -> &AnchorAbi {
        &self.abi
    }
}

// Key material never appears in debug output; only the derived address.
impl std::fmt::Debug for ChainSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainSession")
            .field("contract", &self.contract)
            .field("chain_id", &self.chain_id)
            .field("signer", &self.signer.address())
            .finish_non_exhaustive()
    }
}

/// Write-once slot for service wiring.
///
/// The engine itself takes sessions by reference; this exists for hosts
/// that want a process-wide handle. Reads before `install` fail with
/// `NotInitialized` instead of panicking.
#[derive(Default)]
pub struct SharedSession {
    slot: OnceLock<Arc<ChainSession>>,
}

impl SharedSession {
    pub const fn new() -> Self {
        Self {
            slot: OnceLock::new(),
        }
    }

    pub fn install(&self, session: Arc<ChainSession>) -> Result<()> {
        self.slot
            .set(session)
            .map_err(|_| AnchorError::AlreadyInitialized)
    }

    pub fn get(&self) -> Result<Arc<ChainSession>> {
        self.slot.get().cloned().ok_or(AnchorError::NotInitialized)
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::{test_config, TEST_CONTRACT, TEST_KEY};
    use super::*;
    use crate::rpc::stub::StubRpc;

    #[tokio::test]
    async fn test_debug_output_redacts_key_material() {
        let session = ChainSession::connect(&test_config(), Arc::new(StubRpc::healthy()))
            .await
            .unwrap();
        let rendered = format!("{session:?}");
        assert!(rendered.contains("chain_id"));
        assert!(!rendered.contains(TEST_KEY));
    }

    #[tokio::test]
    async fn test_connect_succeeds_against_stub() {
        let session = ChainSession::connect(&test_config(), Arc::new(StubRpc::healthy()))
            .await
            .unwrap();
        assert_eq!(session.chain_id(), 11155111);
        assert_eq!(session.contract(), TEST_CONTRACT.parse::<Address>().unwrap());
    }

    #[tokio::test]
    async fn test_connect_rejects_empty_endpoint() {
        let mut config = test_config();
        config.rpc_url = String::new();
        let err = ChainSession::connect(&config, Arc::new(StubRpc::healthy()))
            .await
            .unwrap_err();
        assert!(matches!(err, AnchorError::MissingConfiguration("rpc_url")));
    }

    #[tokio::test]
    async fn test_connect_rejects_unreachable_node() {
        let rpc = StubRpc {
            fail_chain_id: true,
            ..StubRpc::healthy()
        };
        let err = ChainSession::connect(&test_config(), Arc::new(rpc))
            .await
            .unwrap_err();
        assert!(matches!(err, AnchorError::Connection(_)));
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_key() {
        let mut config = test_config();
        config.private_key_hex = "0xnot-a-key".into();
        let err = ChainSession::connect(&config, Arc::new(StubRpc::healthy()))
            .await
            .unwrap_err();
        assert!(matches!(err, AnchorError::InvalidKeyMaterial(_)));
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_contract_address() {
        let mut config = test_config();
        config.contract_address = "0x1234".into();
        let err = ChainSession::connect(&config, Arc::new(StubRpc::healthy()))
            .await
            .unwrap_err();
        assert!(matches!(err, AnchorError::InvalidContractAddress(_)));
    }

    #[tokio::test]
    async fn test_shared_session_before_install() {
        let shared = SharedSession::new();
        assert!(matches!(shared.get(), Err(AnchorError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_shared_session_install_once() {
        let shared = SharedSession::new();
        let session = Arc::new(
            ChainSession::connect(&test_config(), Arc::new(StubRpc::healthy()))
                .await
                .unwrap(),
        );
        shared.install(session.clone()).unwrap();
        assert!(shared.get().is_ok());
        assert!(matches!(
            shared.install(session),
            Err(AnchorError::AlreadyInitialized)
        ));
    }
}
