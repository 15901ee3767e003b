use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnchorError {
    #[error("missing configuration: {0}")]
    MissingConfiguration(&'static str),

    #[error("invalid contract address: {0}")]
    InvalidContractAddress(String),

    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("invalid contract interface description: {0}")]
    InvalidInterfaceDescription(String),

    #[error("node connection failed: {0}")]
    Connection(String),

    #[error("node rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("anchor engine not initialized")]
    NotInitialized,

    #[error("anchor engine already initialized")]
    AlreadyInitialized,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("nonce fetch failed: {0}")]
    NonceFetch(String),

    #[error("gas price fetch failed: {0}")]
    GasPriceFetch(String),

    #[error("chain id fetch failed: {0}")]
    ChainIdFetch(String),

    #[error("call encoding failed: {0}")]
    Encoding(String),

    #[error("return data decoding failed: {0}")]
    Decoding(String),

    #[error("transaction signing failed: {0}")]
    Signing(String),

    #[error("transaction submission failed: {0}")]
    Submission(String),

    #[error("verification query failed: {0}")]
    Query(String),

    #[error("{0} timed out")]
    Timeout(&'static str),
}

pub type Result<T> = std::result::Result<T, AnchorError>;
