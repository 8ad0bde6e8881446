mod config;
use agora_core::{AgentRuntime, BuyerAgent, MessageBus, SellerAgent};
use config::MarketplaceConfig;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging / tracing
    if let Err(e) = agora_core::telemetry::init_tracing("info,agora_core=info,marketplace=info") {
        eprintln!("tracing already initialised: {e}");
    }

    // Load configuration (defaults + optional TOML overlay + env)
    let cfg = MarketplaceConfig::load();
    info!(
        target: "marketplace", seller = %cfg.seller_id, buyers = cfg.buyer_ids.len(),
        "Starting marketplace demo"
    );

    let bus = Arc::new(MessageBus::new());
    let runtime = AgentRuntime::new(Arc::clone(&bus));

    // Seller first so early buyer requests have somewhere to land
    let seller = SellerAgent::new(cfg.seller.clone())?;
    let inventory = seller.inventory();
    runtime.create_agent(cfg.seller_id.clone(), seller).await?;

    let mut buyer_stats = Vec::with_capacity(cfg.buyer_ids.len());
    for id in &cfg.buyer_ids {
        let buyer = BuyerAgent::new(cfg.buyer_config())?;
        buyer_stats.push((id.clone(), buyer.stats()));
        if let Err(e) = runtime.create_agent(id.clone(), buyer).await {
            error!(target: "marketplace", buyer = %id, "Failed to start buyer: {}", e);
        }
    }

    info!(target: "marketplace", agents = runtime.len(), "Marketplace running; press Ctrl+C to stop");
    signal::ctrl_c().await?;

    info!(target: "marketplace", "Shutting down");
    runtime.shutdown().await;

    let ledger = inventory.lock().await.snapshot();
    info!(
        target: "marketplace", profit = %ledger.profit, units_sold = ledger.units_sold(),
        "Final ledger: {}", serde_json::to_string(&ledger)?
    );
    for (id, stats) in buyer_stats {
        let stats = stats.lock().await;
        info!(
            target: "marketplace", buyer = %id, requests = stats.requests_sent,
            confirmed = stats.confirmed, refused = stats.refused,
            retries = stats.retries_sent, spent = %stats.total_spent,
            "Buyer summary"
        );
    }
    Ok(())
}
