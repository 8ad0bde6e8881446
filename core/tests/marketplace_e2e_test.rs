use agora_core::market::{DelayRange, QuantityRange, RefusalReason};
use agora_core::{
    AgentId, AgentRuntime, BuyerAgent, BuyerConfig, Inventory, MessageBus, Result, SellerAgent,
    SellerConfig,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn single_buyer_drains_stock_before_restock() -> Result<()> {
    let bus = Arc::new(MessageBus::new());
    let runtime = AgentRuntime::new(Arc::clone(&bus));

    let seller = SellerAgent::new(SellerConfig {
        products: BTreeMap::from([("Apple".to_string(), dec!(1.0))]),
        initial_stock: 10,
        max_stock: 20,
        restock_amount: 10,
        restock_interval_ms: 5_000,
        ..SellerConfig::default()
    })?;
    let inventory = seller.inventory();
    runtime.create_agent(AgentId::from("seller"), seller).await?;

    let buyer = BuyerAgent::new(BuyerConfig {
        products: vec!["Apple".into()],
        quantity: QuantityRange { min: 3, max: 3 },
        retry_probability: 0.0,
        request_period_ms: 1_000,
        ..BuyerConfig::for_seller("seller")
    })?;
    let stats = buyer.stats();
    runtime.create_agent(AgentId::from("buyer"), buyer).await?;

    // Requests at t = 0, 1, 2, 3: three sales, then 1 unit left
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    runtime.shutdown().await;
    assert!(runtime.is_empty());

    let s = stats.lock().await.clone();
    assert_eq!(s.requests_sent, 4);
    assert_eq!(s.confirmed, 3);
    assert_eq!(s.refused, 1);
    assert_eq!(s.total_spent, dec!(9.0));
    let refusal = s.last_refusal.expect("fourth request refused");
    assert_eq!(refusal.reason, RefusalReason::OutOfStock);
    assert_eq!(refusal.stock_available, Some(1));

    let ledger = inventory.lock().await.snapshot();
    assert_eq!(ledger.stock("Apple"), Some(1));
    assert_eq!(ledger.profit, dec!(9.0));
    assert_eq!(ledger.units_sold(), 9);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn empty_shelf_refusal_is_retried_against_real_seller() -> Result<()> {
    let bus = Arc::new(MessageBus::new());
    let runtime = AgentRuntime::new(Arc::clone(&bus));

    let mut inventory = Inventory::new();
    inventory.add_product("Apple", dec!(1.0), 0, 20)?;
    let seller = SellerAgent::with_inventory(
        SellerConfig {
            restock_interval_ms: 3_600_000,
            ..SellerConfig::default()
        },
        inventory,
    );
    runtime.create_agent(AgentId::from("seller"), seller).await?;

    let buyer = BuyerAgent::new(BuyerConfig {
        products: vec!["Apple".into()],
        quantity: QuantityRange { min: 2, max: 2 },
        retry_probability: 1.0,
        retry_delay: DelayRange {
            min_ms: 2_000,
            max_ms: 2_000,
        },
        request_period_ms: 3_600_000,
        ..BuyerConfig::for_seller("seller")
    })?;
    let stats = buyer.stats();
    runtime.create_agent(AgentId::from("buyer"), buyer).await?;

    // Original at t = 0, its retry at t = 2; the retry's own retry is due at t = 4
    tokio::time::sleep(Duration::from_millis(3_000)).await;
    {
        let s = stats.lock().await;
        assert_eq!(s.requests_sent, 2);
        assert_eq!(s.retries_sent, 1);
        assert_eq!(s.refused, 2);
        let last = s.last_refusal.as_ref().expect("refused");
        assert_eq!(last.reason, RefusalReason::OutOfStock);
        assert_eq!(last.requested_quantity, Some(2));
        assert_eq!(last.stock_available, Some(0));
    }
    assert_eq!(bus.stats(&AgentId::from("seller")).map(|s| s.total_delivered), Some(2));

    runtime.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn many_buyers_keep_the_ledger_consistent() -> Result<()> {
    let bus = Arc::new(MessageBus::new());
    let runtime = AgentRuntime::new(Arc::clone(&bus));

    let seller = SellerAgent::new(SellerConfig {
        restock_interval_ms: 5_000,
        report_interval_ms: 2_000,
        ..SellerConfig::default()
    })?;
    let inventory = seller.inventory();
    runtime.create_agent(AgentId::from("seller"), seller).await?;

    let mut all_stats = Vec::new();
    for i in 0..4 {
        let buyer = BuyerAgent::new(BuyerConfig {
            retry_probability: 1.0,
            // Whole seconds, so nothing is in flight at the half-second stop
            retry_delay: DelayRange {
                min_ms: 1_000,
                max_ms: 1_000,
            },
            ..BuyerConfig::for_seller("seller")
        })?;
        all_stats.push(buyer.stats());
        runtime
            .create_agent(AgentId::from(format!("buyer{i}")), buyer)
            .await?;
    }
    assert_eq!(runtime.len(), 5);

    tokio::time::sleep(Duration::from_millis(30_500)).await;
    runtime.shutdown().await;
    // Idempotent
    runtime.shutdown().await;

    let ledger = inventory.lock().await.snapshot();
    assert_eq!(ledger.profit, ledger.expected_profit());
    for entry in ledger.products.values() {
        assert!(entry.stock <= entry.max_stock);
    }

    let mut spent = Decimal::ZERO;
    let mut confirmed = 0;
    let mut refused = 0;
    for stats in &all_stats {
        let s = stats.lock().await;
        spent += s.total_spent;
        confirmed += s.confirmed;
        refused += s.refused;
        assert!(s.requests_sent >= 30, "one request per second at least");
    }
    assert!(confirmed > 0);
    assert!(refused > 0, "catalog includes products the seller does not stock");
    assert_eq!(spent, ledger.profit);

    for i in 0..4 {
        let id = AgentId::from(format!("buyer{i}"));
        assert!(!bus.is_registered(&id));
        let delivered = bus.stats(&id).map(|s| s.total_delivered).unwrap_or_default();
        assert!(delivered > 0);
    }
    Ok(())
}

#[tokio::test]
async fn runtime_rejects_duplicates_and_unknown_stops() -> Result<()> {
    let bus = Arc::new(MessageBus::new());
    let runtime = AgentRuntime::new(Arc::clone(&bus));

    runtime
        .create_agent(AgentId::from("seller"), SellerAgent::new(SellerConfig::default())?)
        .await?;
    let dup = runtime
        .create_agent(AgentId::from("seller"), SellerAgent::new(SellerConfig::default())?)
        .await;
    assert!(dup.is_err());

    assert!(runtime.stop_agent(&AgentId::from("ghost")).await.is_err());

    let seller = runtime.get(&AgentId::from("seller")).expect("managed");
    assert!(seller.is_alive());
    runtime.stop_agent(&AgentId::from("seller")).await?;
    assert!(!seller.is_alive());
    assert!(runtime.is_empty());
    Ok(())
}
