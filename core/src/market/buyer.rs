//! Buyer agent: periodic purchase requests, a response listener and delayed
//! retries after stock or availability refusals.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::config::BuyerConfig;
use super::protocol::{PurchaseConfirm, PurchaseRefusal, PurchaseRequest};
use crate::agent::{AgentHandle, AgentSetup, Behaviour, BehaviourContext, Step, StepOutcome};
use crate::messaging::{AgentId, Envelope, Performative, Template};
use crate::Result;

/// Running tally of a buyer's purchases
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuyerStats {
    /// Requests emitted, retries included
    pub requests_sent: u64,
    pub retries_sent: u64,
    pub retries_scheduled: u64,
    pub confirmed: u64,
    pub refused: u64,
    pub total_spent: Decimal,
    pub last_confirm: Option<PurchaseConfirm>,
    pub last_refusal: Option<PurchaseRefusal>,
}

pub type SharedBuyerStats = Arc<Mutex<BuyerStats>>;

pub struct BuyerAgent {
    config: BuyerConfig,
    stats: SharedBuyerStats,
}

impl BuyerAgent {
    pub fn new(config: BuyerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            stats: Arc::new(Mutex::new(BuyerStats::default())),
        })
    }

    /// Handle onto the live statistics, for observation
    pub fn stats(&self) -> SharedBuyerStats {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl AgentSetup for BuyerAgent {
    async fn setup(&mut self, agent: &AgentHandle) -> Result<()> {
        info!(
            target: "buyer", agent = %agent.identity(), seller = %self.config.seller,
            catalog = self.config.products.len(), "Buyer starting"
        );

        agent.add_behaviour(Behaviour::periodic(
            "send-request",
            self.config.request_period(),
            SendRequest {
                config: self.config.clone(),
                stats: Arc::clone(&self.stats),
            },
        ));
        agent.add_behaviour(
            Behaviour::cyclic(
                "listen-response",
                ListenResponse {
                    config: self.config.clone(),
                    stats: Arc::clone(&self.stats),
                },
            )
            .with_template(Template::performatives([
                Performative::Confirm,
                Performative::Refuse,
            ])),
        );
        Ok(())
    }
}

/// Emit one purchase request. Returns whether the bus accepted it; delivery
/// failures are logged, never fatal.
async fn emit_request(
    ctx: &BehaviourContext,
    seller: &AgentId,
    request: &PurchaseRequest,
    stats: &SharedBuyerStats,
    retry: bool,
) -> Result<bool> {
    let envelope = Envelope::with_payload(ctx.identity().clone(), seller.clone(), Performative::Request, request)?;
    if let Err(e) = ctx.send(envelope) {
        warn!(
            target: "buyer", agent = %ctx.identity(), seller = %seller,
            product = %request.product, retry, "Request not delivered: {}", e
        );
        return Ok(false);
    }

    let mut stats = stats.lock().await;
    stats.requests_sent += 1;
    if retry {
        stats.retries_sent += 1;
    }
    Ok(true)
}

/// Periodic random purchase request
pub struct SendRequest {
    config: BuyerConfig,
    stats: SharedBuyerStats,
}

#[async_trait]
impl Step for SendRequest {
    async fn step(&mut self, ctx: &mut BehaviourContext) -> Result<StepOutcome> {
        let picked = {
            let mut rng = rand::thread_rng();
            self.config
                .products
                .choose(&mut rng)
                .cloned()
                .map(|product| PurchaseRequest::new(product, u64::from(self.config.quantity.sample(&mut rng))))
        };
        let Some(request) = picked else {
            return Ok(StepOutcome::Continue);
        };

        if emit_request(ctx, &self.config.seller, &request, &self.stats, false).await? {
            info!(
                target: "buyer", agent = %ctx.identity(), seller = %self.config.seller,
                product = %request.product, quantity = request.quantity, "Sent request"
            );
        }
        Ok(StepOutcome::Continue)
    }
}

/// Handles confirm / refuse replies and decides on retries
pub struct ListenResponse {
    config: BuyerConfig,
    stats: SharedBuyerStats,
}

impl ListenResponse {
    async fn on_confirm(&self, ctx: &BehaviourContext, reply: &Envelope) {
        let confirm = match reply.decode::<PurchaseConfirm>() {
            Ok(confirm) => confirm,
            Err(e) => {
                warn!(target: "buyer", agent = %ctx.identity(), "Unreadable confirmation: {}", e);
                return;
            }
        };
        info!(
            target: "buyer", agent = %ctx.identity(), product = %confirm.product,
            quantity = confirm.quantity, total = %confirm.total, "Purchase confirmed"
        );

        let mut stats = self.stats.lock().await;
        stats.confirmed += 1;
        stats.total_spent += confirm.total;
        stats.last_confirm = Some(confirm);
    }

    async fn on_refuse(&self, ctx: &BehaviourContext, reply: &Envelope) {
        let refusal = match reply.decode::<PurchaseRefusal>() {
            Ok(refusal) => refusal,
            Err(e) => {
                warn!(target: "buyer", agent = %ctx.identity(), "Unreadable refusal: {}", e);
                return;
            }
        };
        info!(
            target: "buyer", agent = %ctx.identity(), reason = ?refusal.reason,
            product = ?refusal.product, stock_available = ?refusal.stock_available,
            "Purchase refused"
        );

        let retry = match (&refusal.product, refusal.is_retryable()) {
            (Some(product), true) => {
                let mut rng = rand::thread_rng();
                rng.gen_bool(self.config.retry_probability).then(|| {
                    (
                        PurchaseRequest::new(product.clone(), refusal.requested_quantity.unwrap_or(1).max(1)),
                        self.config.retry_delay.sample(&mut rng),
                    )
                })
            }
            _ => None,
        };

        match &retry {
            Some((request, delay)) => {
                info!(
                    target: "buyer", agent = %ctx.identity(), product = %request.product,
                    delay_ms = delay.as_millis() as u64, "Will retry"
                );
                ctx.add_behaviour(Behaviour::one_shot(
                    "retry-purchase",
                    RetryPurchase {
                        seller: self.config.seller.clone(),
                        request: request.clone(),
                        delay: *delay,
                        stats: Arc::clone(&self.stats),
                    },
                ));
            }
            None if refusal.is_retryable() => {
                info!(target: "buyer", agent = %ctx.identity(), product = ?refusal.product, "Will not retry");
            }
            None => {}
        }

        let mut stats = self.stats.lock().await;
        stats.refused += 1;
        if retry.is_some() {
            stats.retries_scheduled += 1;
        }
        stats.last_refusal = Some(refusal);
    }
}

#[async_trait]
impl Step for ListenResponse {
    async fn step(&mut self, ctx: &mut BehaviourContext) -> Result<StepOutcome> {
        let Some(reply) = ctx.receive(self.config.receive_timeout()).await else {
            return Ok(StepOutcome::Continue);
        };

        match reply.performative {
            Performative::Confirm => self.on_confirm(ctx, &reply).await,
            Performative::Refuse => self.on_refuse(ctx, &reply).await,
            Performative::Request => {
                debug!(target: "buyer", agent = %ctx.identity(), from = %reply.from, "Ignoring request");
            }
        }
        Ok(StepOutcome::Continue)
    }
}

/// One delayed re-request; independent of every other retry in flight
pub struct RetryPurchase {
    seller: AgentId,
    request: PurchaseRequest,
    delay: Duration,
    stats: SharedBuyerStats,
}

#[async_trait]
impl Step for RetryPurchase {
    async fn step(&mut self, ctx: &mut BehaviourContext) -> Result<StepOutcome> {
        if !ctx.sleep(self.delay).await {
            return Ok(StepOutcome::Done);
        }
        if emit_request(ctx, &self.seller, &self.request, &self.stats, true).await? {
            info!(
                target: "buyer", agent = %ctx.identity(), product = %self.request.product,
                quantity = self.request.quantity, after_ms = self.delay.as_millis() as u64,
                "Retried request"
            );
        }
        Ok(StepOutcome::Done)
    }
}
