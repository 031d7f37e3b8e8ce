//! cfund: command line front end for the fundraising client.
//!
//! With `features.dev_mode` the session runs against an in-memory ledger
//! and local encryption service, which start empty on every invocation.

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use cfund_config::CfundConfig;
use cfund_core::ledger::LedgerGatewayConfig;
use cfund_core::{FundraisingSession, LedgerGatewayClient, SessionSettings};
use cfund_keypair::{Keypair, WalletSigner};
use cfund_relayer::{RelayerClient, RelayerConfig};
use log::info;

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        return;
    }

    if args[1] == "sample-config" {
        println!("{}", CfundConfig::generate_sample());
        return;
    }

    if let Err(e) = run(&args[1], &args[2..]).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn print_usage() {
    println!("Usage: cfund <command> [args]");
    println!();
    println!("Commands:");
    println!("  campaigns                 List campaigns, most recent first");
    println!("  faucet                    Claim 1 cETH");
    println!("  donate <id> <amount>      Donate an amount (e.g. 2.5) to a campaign");
    println!("  raised <id>               Decrypt a campaign's total raised");
    println!("  points <id>               Decrypt your points in a campaign");
    println!("  sample-config             Print a sample config.toml");
    println!();
    println!("Wallet: CF_WALLET_SEED (64 hex chars), random if unset");
}

/// Wallet from CF_WALLET_SEED, or a throwaway one
fn load_wallet() -> Result<Keypair> {
    match env::var("CF_WALLET_SEED") {
        Ok(seed_hex) => {
            let seed: [u8; 32] = hex::decode(seed_hex.trim())
                .context("CF_WALLET_SEED is not hex")?
                .try_into()
                .map_err(|_| anyhow!("CF_WALLET_SEED must be 32 bytes"))?;
            Ok(Keypair::from_seed(&seed))
        }
        Err(_) => {
            info!("CF_WALLET_SEED not set, using a random wallet");
            Ok(Keypair::new_random())
        }
    }
}

async fn build_session(config: &CfundConfig) -> Result<FundraisingSession> {
    let settings = SessionSettings::from_config(config)?;
    let wallet: Arc<dyn WalletSigner> = Arc::new(load_wallet()?);

    if config.features.dev_mode {
        info!("Dev mode: in-memory ledger and local encryption service");
        let (session, _ledger) = FundraisingSession::dev(wallet, settings);
        return Ok(session);
    }

    let ledger = LedgerGatewayClient::new(LedgerGatewayConfig {
        gateway_url: config.network.ledger_url.clone(),
        request_timeout: config.request_timeout(),
    })?;
    let relayer = RelayerClient::new(RelayerConfig {
        relayer_url: config.network.relayer_url.clone(),
        request_timeout: config.request_timeout(),
    })?;
    relayer
        .connect()
        .await
        .context("Failed to reach the decryption relayer")?;

    Ok(FundraisingSession::new(
        Arc::new(ledger),
        Arc::new(relayer),
        wallet,
        settings,
    ))
}

fn campaign_id(args: &[String]) -> Result<u64> {
    args.first()
        .ok_or_else(|| anyhow!("missing campaign id"))?
        .parse()
        .context("campaign id must be a number")
}

async fn run(command: &str, args: &[String]) -> Result<()> {
    let config = CfundConfig::global();
    let session = build_session(config).await?;

    match command {
        "campaigns" => {
            let campaigns = session.campaigns().await?;
            if campaigns.is_empty() {
                println!("No campaigns yet");
            }
            for c in campaigns {
                println!(
                    "#{} {} [{}] goal {} cETH, creator {}",
                    c.id,
                    c.title,
                    if c.active { "active" } else { "inactive" },
                    cfund_amount::format_grouped(c.goal),
                    c.creator
                );
            }
        }
        "faucet" => {
            session.claim_faucet().await?;
        }
        "donate" => {
            let id = campaign_id(args)?;
            let amount = args.get(1).ok_or_else(|| anyhow!("missing amount"))?;
            session.donate(id, amount).await?;
        }
        "raised" => {
            let id = campaign_id(args)?;
            if let Some(raised) = session.decrypt_raised(id).await? {
                println!("Raised: {} cETH", cfund_amount::format_grouped(raised));
            }
        }
        "points" => {
            let id = campaign_id(args)?;
            if let Some(points) = session.decrypt_points(id).await? {
                println!("Points: {}", points);
            }
        }
        other => {
            print_usage();
            return Err(anyhow!("unknown command: {other}"));
        }
    }

    if let Some(status) = session.status().status {
        println!("{}", status);
    }
    Ok(())
}
