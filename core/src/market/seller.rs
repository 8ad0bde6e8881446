//! Seller agent: owns the inventory, answers purchase requests, restocks and
//! reports on a timer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::config::SellerConfig;
use super::inventory::{Inventory, LedgerSnapshot, SaleOutcome};
use super::protocol::{PurchaseConfirm, PurchaseRefusal, PurchaseRequest};
use crate::agent::{AgentHandle, AgentSetup, Behaviour, BehaviourContext, Schedule, Step, StepOutcome};
use crate::messaging::{Envelope, Performative, Template};
use crate::Result;

/// Inventory shared by the seller's behaviours
pub type SharedInventory = Arc<Mutex<Inventory>>;

pub struct SellerAgent {
    config: SellerConfig,
    inventory: SharedInventory,
}

impl SellerAgent {
    pub fn new(config: SellerConfig) -> Result<Self> {
        let inventory = Inventory::from_config(&config)?;
        Ok(Self::with_inventory(config, inventory))
    }

    /// Seller over a prepared inventory (per-product stock levels).
    pub fn with_inventory(config: SellerConfig, inventory: Inventory) -> Self {
        Self {
            config,
            inventory: Arc::new(Mutex::new(inventory)),
        }
    }

    /// Handle onto the live inventory, for observation
    pub fn inventory(&self) -> SharedInventory {
        Arc::clone(&self.inventory)
    }
}

#[async_trait]
impl AgentSetup for SellerAgent {
    async fn setup(&mut self, agent: &AgentHandle) -> Result<()> {
        let snapshot = self.inventory.lock().await.snapshot();
        info!(
            target: "seller", agent = %agent.identity(),
            products = snapshot.products.len(), profit = %snapshot.profit,
            "Seller starting"
        );

        agent.add_behaviour(
            Behaviour::cyclic(
                "purchase-handler",
                PurchaseHandler {
                    inventory: Arc::clone(&self.inventory),
                    receive_timeout: self.config.receive_timeout(),
                },
            )
            .with_template(Template::performative(Performative::Request)),
        );
        agent.add_behaviour(Behaviour::new(
            "restock",
            Schedule::periodic_after(self.config.restock_interval(), self.config.restock_interval()),
            Restock {
                inventory: Arc::clone(&self.inventory),
                amount: self.config.restock_amount,
            },
        ));
        agent.add_behaviour(Behaviour::periodic(
            "profit-report",
            self.config.report_interval(),
            ProfitReport {
                inventory: Arc::clone(&self.inventory),
            },
        ));
        Ok(())
    }
}

/// Answers every request with exactly one confirm or refuse.
pub struct PurchaseHandler {
    inventory: SharedInventory,
    receive_timeout: Duration,
}

impl PurchaseHandler {
    async fn answer(&self, request: &Envelope) -> Result<Envelope> {
        let order = match PurchaseRequest::parse(request) {
            Ok(order) => order,
            Err(e) => {
                warn!(target: "seller", from = %request.from, "Malformed request: {}", e);
                return request.reply_with(Performative::Refuse, &PurchaseRefusal::malformed());
            }
        };

        let outcome = self
            .inventory
            .lock()
            .await
            .sell(&order.product, order.quantity);

        match outcome {
            SaleOutcome::Sold { total, remaining } => {
                info!(
                    target: "seller", buyer = %request.from, product = %order.product,
                    quantity = order.quantity, total = %total, stock_left = remaining,
                    "Sold"
                );
                request.reply_with(
                    Performative::Confirm,
                    &PurchaseConfirm {
                        product: order.product,
                        quantity: order.quantity,
                        total,
                    },
                )
            }
            SaleOutcome::NotAvailable => {
                info!(target: "seller", buyer = %request.from, product = %order.product, "Refused: not available");
                request.reply_with(
                    Performative::Refuse,
                    &PurchaseRefusal::not_available(order.product, order.quantity),
                )
            }
            SaleOutcome::OutOfStock { available } => {
                info!(
                    target: "seller", buyer = %request.from, product = %order.product,
                    requested = order.quantity, available, "Refused: out of stock"
                );
                request.reply_with(
                    Performative::Refuse,
                    &PurchaseRefusal::out_of_stock(order.product, order.quantity, available),
                )
            }
            SaleOutcome::TotalOutOfRange => {
                warn!(
                    target: "seller", buyer = %request.from, product = %order.product,
                    requested = order.quantity, "Refused: sale total out of range"
                );
                request.reply_with(
                    Performative::Refuse,
                    &PurchaseRefusal::total_out_of_range(order.product, order.quantity),
                )
            }
        }
    }
}

#[async_trait]
impl Step for PurchaseHandler {
    async fn step(&mut self, ctx: &mut BehaviourContext) -> Result<StepOutcome> {
        let Some(request) = ctx.receive(self.receive_timeout).await else {
            return Ok(StepOutcome::Continue);
        };

        let reply = self.answer(&request).await?;
        if let Err(e) = ctx.send(reply) {
            warn!(target: "seller", to = %request.from, "Reply not delivered: {}", e);
        }
        Ok(StepOutcome::Continue)
    }
}

/// Periodic replenishment up to each product's ceiling
pub struct Restock {
    inventory: SharedInventory,
    amount: u32,
}

#[async_trait]
impl Step for Restock {
    async fn step(&mut self, ctx: &mut BehaviourContext) -> Result<StepOutcome> {
        let restocked = self.inventory.lock().await.restock(self.amount);
        if !restocked.is_empty() {
            info!(target: "seller", agent = %ctx.identity(), restocked = ?restocked, "Restocked");
        }
        Ok(StepOutcome::Continue)
    }
}

/// Periodic profit / sold / stock report from a snapshot
pub struct ProfitReport {
    inventory: SharedInventory,
}

#[async_trait]
impl Step for ProfitReport {
    async fn step(&mut self, ctx: &mut BehaviourContext) -> Result<StepOutcome> {
        // Lock only long enough to copy
        let snapshot: LedgerSnapshot = self.inventory.lock().await.snapshot();

        let sold: Vec<String> = snapshot
            .products
            .iter()
            .map(|(name, e)| format!("{}={}", name, e.units_sold))
            .collect();
        let stock: Vec<String> = snapshot
            .products
            .iter()
            .map(|(name, e)| format!("{}={}/{}", name, e.stock, e.max_stock))
            .collect();
        info!(
            target: "seller", agent = %ctx.identity(), profit = %snapshot.profit,
            sold = %sold.join(","), stock = %stock.join(","),
            "Ledger report"
        );
        Ok(StepOutcome::Continue)
    }
}
