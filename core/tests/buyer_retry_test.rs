use agora_core::market::{
    BuyerStats, DelayRange, PurchaseConfirm, PurchaseRefusal, PurchaseRequest, QuantityRange,
    RefusalReason, SharedBuyerStats,
};
use agora_core::{
    Agent, AgentId, BuyerAgent, BuyerConfig, Envelope, Mailbox, MessageBus, Performative, Result,
};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// One Apple×2 request at start-up, then silence; retries wait exactly 4s.
fn apple_buyer(retry_probability: f64) -> BuyerConfig {
    BuyerConfig {
        seller: AgentId::from("seller"),
        products: vec!["Apple".into()],
        quantity: QuantityRange { min: 2, max: 2 },
        retry_probability,
        retry_delay: DelayRange {
            min_ms: 4_000,
            max_ms: 4_000,
        },
        request_period_ms: 3_600_000,
        receive_timeout_ms: 1_000,
    }
}

/// Starts a buyer against a fake seller mailbox and returns the first request.
async fn setup(
    config: BuyerConfig,
) -> Result<(Arc<MessageBus>, Mailbox, Agent, SharedBuyerStats, Envelope)> {
    let bus = Arc::new(MessageBus::new());
    let mut seller = bus.register(&AgentId::from("seller"))?;

    let buyer = BuyerAgent::new(config)?;
    let stats = buyer.stats();
    let agent = Agent::new("buyer", Arc::clone(&bus), buyer);
    agent.start().await?;

    let first = seller
        .receive(Duration::from_millis(100))
        .await
        .expect("buyer sends at start-up");
    Ok((bus, seller, agent, stats, first))
}

async fn snapshot(stats: &SharedBuyerStats) -> BuyerStats {
    // Let the buyer finish bookkeeping for anything it already handled
    tokio::time::sleep(Duration::from_millis(10)).await;
    stats.lock().await.clone()
}

#[tokio::test(start_paused = true)]
async fn out_of_stock_refusal_triggers_one_delayed_retry() -> Result<()> {
    let (bus, mut seller, agent, stats, first) = setup(apple_buyer(1.0)).await?;
    let request: PurchaseRequest = first.decode()?;
    assert_eq!(request, PurchaseRequest::new("Apple", 2));

    let refused_at = Instant::now();
    bus.send(first.reply_with(
        Performative::Refuse,
        &PurchaseRefusal::out_of_stock("Apple", 2, 1),
    )?)?;

    // Nothing before the retry delay
    assert!(seller.receive(Duration::from_secs(3)).await.is_none());

    let retry = seller
        .receive(Duration::from_secs(2))
        .await
        .expect("retry after delay");
    assert_eq!(retry.performative, Performative::Request);
    assert_eq!(retry.decode::<PurchaseRequest>()?, PurchaseRequest::new("Apple", 2));
    let waited = refused_at.elapsed();
    assert!(waited >= Duration::from_secs(4) && waited < Duration::from_millis(4_100));

    // Exactly one retry per refusal
    assert!(seller.receive(Duration::from_secs(10)).await.is_none());

    let s = snapshot(&stats).await;
    assert_eq!(s.requests_sent, 2);
    assert_eq!(s.retries_sent, 1);
    assert_eq!(s.refused, 1);
    assert_eq!(s.retries_scheduled, 1);
    assert_eq!(
        s.last_refusal.map(|r| (r.reason, r.stock_available)),
        Some((RefusalReason::OutOfStock, Some(1)))
    );

    agent.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn malformed_refusal_is_never_retried() -> Result<()> {
    let (bus, mut seller, agent, stats, first) = setup(apple_buyer(1.0)).await?;
    bus.send(first.reply_with(Performative::Refuse, &PurchaseRefusal::malformed())?)?;

    assert!(seller.receive(Duration::from_secs(20)).await.is_none());
    let s = snapshot(&stats).await;
    assert_eq!(s.refused, 1);
    assert_eq!(s.retries_scheduled, 0);
    assert_eq!(s.requests_sent, 1);

    agent.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn zero_retry_probability_never_retries() -> Result<()> {
    let (bus, mut seller, agent, stats, first) = setup(apple_buyer(0.0)).await?;
    bus.send(first.reply_with(
        Performative::Refuse,
        &PurchaseRefusal::out_of_stock("Apple", 2, 0),
    )?)?;

    assert!(seller.receive(Duration::from_secs(20)).await.is_none());
    assert_eq!(snapshot(&stats).await.retries_scheduled, 0);

    agent.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn not_available_retry_defaults_quantity_to_one() -> Result<()> {
    let (bus, mut seller, agent, _stats, first) = setup(apple_buyer(1.0)).await?;
    let refusal = PurchaseRefusal {
        product: Some("Melon".into()),
        reason: RefusalReason::NotAvailable,
        requested_quantity: None,
        stock_available: None,
    };
    bus.send(first.reply_with(Performative::Refuse, &refusal)?)?;

    let retry = seller
        .receive(Duration::from_secs(5))
        .await
        .expect("retry");
    assert_eq!(retry.decode::<PurchaseRequest>()?, PurchaseRequest::new("Melon", 1));

    agent.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn retries_are_independent_per_refusal() -> Result<()> {
    let (bus, mut seller, agent, stats, first) = setup(apple_buyer(1.0)).await?;

    // Two refusals for the same conversation: no dedup, two retries
    for _ in 0..2 {
        bus.send(first.reply_with(
            Performative::Refuse,
            &PurchaseRefusal::out_of_stock("Apple", 2, 0),
        )?)?;
    }

    let mut retries = 0;
    while seller.receive(Duration::from_secs(5)).await.is_some() {
        retries += 1;
    }
    assert_eq!(retries, 2);
    assert_eq!(snapshot(&stats).await.retries_sent, 2);

    agent.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn confirm_is_recorded() -> Result<()> {
    let (bus, _seller, agent, stats, first) = setup(apple_buyer(1.0)).await?;
    bus.send(first.reply_with(
        Performative::Confirm,
        &PurchaseConfirm {
            product: "Apple".into(),
            quantity: 2,
            total: dec!(2.0),
        },
    )?)?;

    let s = snapshot(&stats).await;
    assert_eq!(s.confirmed, 1);
    assert_eq!(s.total_spent, dec!(2.0));
    assert_eq!(s.last_confirm.map(|c| c.quantity), Some(2));

    agent.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stopping_buyer_cancels_pending_retry() -> Result<()> {
    let (bus, mut seller, agent, stats, first) = setup(apple_buyer(1.0)).await?;
    bus.send(first.reply_with(
        Performative::Refuse,
        &PurchaseRefusal::out_of_stock("Apple", 2, 0),
    )?)?;

    tokio::time::sleep(Duration::from_secs(1)).await;
    agent.stop().await;

    assert!(seller.receive(Duration::from_secs(10)).await.is_none());
    assert_eq!(stats.lock().await.retries_sent, 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn undelivered_requests_are_not_counted_as_sent() -> Result<()> {
    let bus = Arc::new(MessageBus::new());
    let buyer = BuyerAgent::new(BuyerConfig {
        request_period_ms: 1_000,
        ..apple_buyer(1.0)
    })?;
    let stats = buyer.stats();
    let agent = Agent::new("buyer", Arc::clone(&bus), buyer);
    agent.start().await?;

    // No seller on the bus: every periodic request fails delivery
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(stats.lock().await.requests_sent, 0);
    assert!(agent.is_alive(), "delivery failures are not fatal");

    agent.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn retry_to_departed_seller_is_not_counted() -> Result<()> {
    let (bus, _seller, agent, stats, first) = setup(apple_buyer(1.0)).await?;
    bus.send(first.reply_with(
        Performative::Refuse,
        &PurchaseRefusal::out_of_stock("Apple", 2, 0),
    )?)?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(bus.deregister(&AgentId::from("seller")));

    tokio::time::sleep(Duration::from_secs(5)).await;
    let s = snapshot(&stats).await;
    assert_eq!(s.retries_scheduled, 1);
    assert_eq!(s.retries_sent, 0);
    assert_eq!(s.requests_sent, 1);

    agent.stop().await;
    Ok(())
}

#[test]
fn invalid_config_is_rejected() {
    let cfg = BuyerConfig {
        retry_probability: -0.1,
        ..BuyerConfig::default()
    };
    assert!(BuyerAgent::new(cfg).is_err());
}
