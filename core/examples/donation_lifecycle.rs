//! Full donation lifecycle against the in-memory dev stack.
//!
//! RUST_LOG=info cargo run -p cfund-core --example donation_lifecycle

use std::sync::Arc;
use std::time::Duration;

use cfund_core::{CampaignForm, FundraisingSession, InMemoryLedger, SessionSettings};
use cfund_keypair::{Keypair, WalletSigner};
use cfund_relayer::{Coprocessor, LocalEncryptionService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    // --- SHARED DEV STACK ---
    let settings = SessionSettings::default();
    let coprocessor = Arc::new(Coprocessor::new());
    let ledger = Arc::new(
        InMemoryLedger::new(
            settings.contracts.fundraising,
            settings.contracts.token,
            coprocessor.clone(),
        )
        .with_block_time(Duration::from_millis(200)),
    );
    let service = Arc::new(LocalEncryptionService::new(coprocessor));

    let session_for = |wallet: Keypair| {
        let signer: Arc<dyn WalletSigner> = Arc::new(wallet);
        FundraisingSession::new(ledger.clone(), service.clone(), signer, settings)
    };

    let creator_wallet = Keypair::new_random();
    let donor_wallet = Keypair::new_random();
    println!("Creator: {}", creator_wallet.identity());
    println!("Donor:   {}", donor_wallet.identity());
    let creator = session_for(creator_wallet);
    let donor = session_for(donor_wallet);

    // 1. Create a campaign
    let mut form = CampaignForm::new("Save The Ocean", "Funding coral reef restoration", "1");
    creator.create_campaign(&mut form).await?;
    print_status(&creator);

    // 2. Fund the donor and donate 2.5 cETH
    for _ in 0..3 {
        donor.claim_faucet().await?;
    }
    print_status(&donor);

    let mut events = donor.decryptions().subscribe();
    donor.donate(0, "2.5").await?;
    print_status(&donor);

    // 3. Decrypt what the donor is allowed to see
    let raised = donor.decrypt_raised(0).await?.unwrap_or_default();
    let points = donor.decrypt_points(0).await?.unwrap_or_default();
    while let Ok(change) = events.try_recv() {
        println!("  {:?} {:?} -> {:?}", change.key.kind, change.key.campaign_id, change.state);
    }

    for campaign in donor.campaigns().await? {
        println!(
            "#{} {}: raised {} of {} cETH, your points {}",
            campaign.id,
            campaign.title,
            cfund_amount::format_grouped(raised),
            cfund_amount::format_grouped(campaign.goal),
            points
        );
    }

    // 4. Only the creator may close it
    if let Err(e) = donor.set_campaign_active(0, false).await {
        println!("Donor closing campaign: {}", e);
    }
    creator.set_campaign_active(0, false).await?;
    println!("Closed, active = {}", creator.campaigns().await?[0].active);

    Ok(())
}

fn print_status(session: &FundraisingSession) {
    if let Some(status) = session.status().status {
        println!("{}", status);
    }
}
