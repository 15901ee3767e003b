use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use payanchor::config::AnchorConfig;
use payanchor::error::{AnchorError, Result};
use payanchor::pipeline::{AnchorPipeline, AnchorRequest};
use payanchor::query;
use payanchor::session::ChainSession;
use payanchor::tracker::{TrackerConfig, TrackerRegistry};

#[derive(Parser)]
#[command(name = "payanchor")]
#[command(about = "Blockchain anchor and verification engine for a payment ledger")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Anchor a payment hash on-chain and wait for confirmation
    Anchor {
        /// Ledger transaction identifier
        transaction_id: String,
        /// 32-byte payment hash (hex, 0x optional)
        payment_hash: String,
    },
    /// Check an anchored payment hash against the chain
    Verify {
        transaction_id: String,
        payment_hash: String,
    },
    /// Fetch the anchored hash and timestamp for a ledger transaction
    GetAnchor { transaction_id: String },
    /// Show chain identity for the configured session
    Status,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "command failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = AnchorConfig::from_env()?;
    let session = Arc::new(ChainSession::connect_http(&config).await?);

    match cli.command {
        Commands::Anchor {
            transaction_id,
            payment_hash,
        } => {
            let payment_hash = parse_payment_hash(&payment_hash)?;
            let trackers = Arc::new(TrackerRegistry::new(TrackerConfig::default()));
            let pipeline = AnchorPipeline::new(session, trackers.clone());

            let tx_hash = pipeline
                .anchor(AnchorRequest {
                    transaction_id,
                    payment_hash,
                })
                .await?;
            println!("submitted: {tx_hash}");

            if let Some(mut handle) = trackers.handle(&tx_hash).await {
                let receipt = handle.await_terminal().await;
                println!("status: {:?}", receipt.status);
                if let Some(block) = receipt.block_number {
                    println!("block: {block}");
                }
                if let Some(gas) = receipt.gas_used {
                    println!("gas used: {gas}");
                }
            }
        }
        Commands::Verify {
            transaction_id,
            payment_hash,
        } => {
            let payment_hash = parse_payment_hash(&payment_hash)?;
            let matched = query::verify(&session, &transaction_id, &payment_hash).await?;
            println!("verified: {matched}");
        }
        Commands::GetAnchor { transaction_id } => {
            let (hash, timestamp) = query::get_anchor(&session, &transaction_id).await?;
            println!("hash: 0x{hash}");
            println!("timestamp: {timestamp}");
        }
        Commands::Status => {
            println!("chain id: {}", session.chain_id());
            println!("contract: {}", session.contract());
            println!("signer: {}", session.signer_address());
        }
    }

    Ok(())
}

fn parse_payment_hash(hex_str: &str) -> Result<[u8; 32]> {
    let mut hash = [0u8; 32];
    hex::decode_to_slice(hex_str.trim_start_matches("0x"), &mut hash)
        .map_err(|e| AnchorError::Encoding(format!("payment hash must be 32 bytes of hex: {e}")))?;
    Ok(hash)
}
