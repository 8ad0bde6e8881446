use std::collections::BTreeMap;
use std::time::Duration;

use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::messaging::AgentId;
use crate::{AgoraError, Result};

/// Seller configuration, consumed when the seller is constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SellerConfig {
    /// Product name -> unit price
    pub products: BTreeMap<String, Decimal>,
    /// Stock every product starts with
    pub initial_stock: u32,
    /// Ceiling restocking never exceeds
    pub max_stock: u32,
    /// Units added per product on each restock tick
    pub restock_amount: u32,
    pub restock_interval_ms: u64,
    /// Period of the profit/stock report
    pub report_interval_ms: u64,
    /// How long the purchase handler waits for a request per iteration
    pub receive_timeout_ms: u64,
}

impl Default for SellerConfig {
    fn default() -> Self {
        let products = [
            ("Apple", Decimal::new(10, 1)),
            ("Banana", Decimal::new(5, 1)),
            ("Grapefruit", Decimal::new(12, 1)),
            ("Orange", Decimal::new(8, 1)),
        ]
        .into_iter()
        .map(|(name, price)| (name.to_string(), price))
        .collect();

        Self {
            products,
            initial_stock: 10,
            max_stock: 20,
            restock_amount: 10,
            restock_interval_ms: 20_000,
            report_interval_ms: 10_000,
            receive_timeout_ms: 10_000,
        }
    }
}

impl SellerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.initial_stock > self.max_stock {
            return Err(AgoraError::Config(format!(
                "initial_stock {} exceeds max_stock {}",
                self.initial_stock, self.max_stock
            )));
        }
        if let Some((name, price)) = self.products.iter().find(|(_, p)| p.is_sign_negative()) {
            return Err(AgoraError::Config(format!(
                "product {} has negative price {}",
                name, price
            )));
        }
        if self.restock_interval_ms == 0 {
            return Err(AgoraError::Config("restock_interval_ms must be > 0".into()));
        }
        if self.report_interval_ms == 0 {
            return Err(AgoraError::Config("report_interval_ms must be > 0".into()));
        }
        if self.receive_timeout_ms == 0 {
            return Err(AgoraError::Config("receive_timeout_ms must be > 0".into()));
        }
        Ok(())
    }

    pub fn restock_interval(&self) -> Duration {
        Duration::from_millis(self.restock_interval_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}

/// Inclusive bounds for the quantity of a generated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityRange {
    pub min: u32,
    pub max: u32,
}

impl QuantityRange {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        rng.gen_range(self.min..=self.max)
    }
}

/// Inclusive bounds, in milliseconds, for the delay before a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        Duration::from_millis(rng.gen_range(self.min_ms..=self.max_ms))
    }
}

/// Buyer configuration, consumed when the buyer is constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuyerConfig {
    /// Identity of the seller requests go to
    pub seller: AgentId,
    /// Catalog requests are drawn from, uniformly
    pub products: Vec<String>,
    pub quantity: QuantityRange,
    /// Chance of retrying after a stock or availability refusal
    pub retry_probability: f64,
    pub retry_delay: DelayRange,
    pub request_period_ms: u64,
    /// How long the response listener waits per iteration
    pub receive_timeout_ms: u64,
}

impl Default for BuyerConfig {
    fn default() -> Self {
        Self {
            seller: AgentId::from("seller"),
            products: [
                "Apple",
                "Banana",
                "Grapefruit",
                "Orange",
                "Pear",
                "Melon",
                "Strawberry",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
            quantity: QuantityRange { min: 1, max: 5 },
            retry_probability: 0.5,
            retry_delay: DelayRange {
                min_ms: 3_000,
                max_ms: 10_000,
            },
            request_period_ms: 1_000,
            receive_timeout_ms: 5_000,
        }
    }
}

impl BuyerConfig {
    /// Default buyer pointed at `seller`.
    pub fn for_seller(seller: impl Into<AgentId>) -> Self {
        Self {
            seller: seller.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.seller.as_str().is_empty() {
            return Err(AgoraError::Config("seller identity must not be empty".into()));
        }
        if self.products.is_empty() {
            return Err(AgoraError::Config("buyer catalog must not be empty".into()));
        }
        if self.quantity.min == 0 || self.quantity.min > self.quantity.max {
            return Err(AgoraError::Config(format!(
                "invalid quantity range {}..={}",
                self.quantity.min, self.quantity.max
            )));
        }
        if !(0.0..=1.0).contains(&self.retry_probability) {
            return Err(AgoraError::Config(format!(
                "retry_probability {} outside [0, 1]",
                self.retry_probability
            )));
        }
        if self.retry_delay.min_ms > self.retry_delay.max_ms {
            return Err(AgoraError::Config(format!(
                "invalid retry delay range {}..={} ms",
                self.retry_delay.min_ms, self.retry_delay.max_ms
            )));
        }
        if self.request_period_ms == 0 {
            return Err(AgoraError::Config("request_period_ms must be > 0".into()));
        }
        if self.receive_timeout_ms == 0 {
            return Err(AgoraError::Config("receive_timeout_ms must be > 0".into()));
        }
        Ok(())
    }

    pub fn request_period(&self) -> Duration {
        Duration::from_millis(self.request_period_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}
