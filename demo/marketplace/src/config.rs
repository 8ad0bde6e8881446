use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use agora_core::market::{DelayRange, QuantityRange};
use agora_core::{AgentId, BuyerConfig, SellerConfig};
use rust_decimal::Decimal;

/// Configuration for the marketplace demo: one seller, several buyers
#[derive(Clone, Debug)]
pub struct MarketplaceConfig {
    pub seller_id: AgentId,
    pub buyer_ids: Vec<AgentId>,
    pub seller: SellerConfig,
    /// Template for every buyer; `seller` is overwritten with `seller_id`
    pub buyer: BuyerConfig,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            seller_id: AgentId::from("seller"),
            buyer_ids: vec![AgentId::from("buyer1"), AgentId::from("buyer2")],
            seller: SellerConfig::default(),
            buyer: BuyerConfig::default(),
        }
    }
}

impl MarketplaceConfig {
    /// Load configuration from a TOML file (path via MARKETPLACE_CONFIG or ./marketplace.toml),
    /// overlaying values onto defaults, then applying env overrides.
    pub fn load() -> Self {
        let default = Self::default();
        let path = std::env::var("MARKETPLACE_CONFIG").unwrap_or_else(|_| "marketplace.toml".into());
        let p = Path::new(&path);
        let cfg = if !p.exists() {
            tracing::info!(target: "marketplace", path = %path, "No TOML config found; using defaults/env");
            default
        } else {
            match fs::read_to_string(p) {
                Ok(s) => Self::from_toml_str(&s).unwrap_or_else(|e| {
                    tracing::warn!(target: "marketplace", error = %e, "Failed to parse TOML; using defaults");
                    Self::default()
                }),
                Err(e) => {
                    tracing::warn!(target: "marketplace", error = %e, "Failed to read TOML; using defaults");
                    default
                }
            }
        };
        cfg.with_env_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        let t: MarketplaceToml = toml::from_str(s)?;
        Ok(t.overlay(Self::default()))
    }

    /// Applies SELLER_ID, BUYER_IDS (comma separated), RETRY_PROBABILITY and
    /// RESTOCK_INTERVAL_MS. Unparseable values are ignored.
    pub fn with_env_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = var("SELLER_ID").filter(|s| !s.trim().is_empty()) {
            self.seller_id = AgentId::from(v.trim());
        }
        if let Some(v) = var("BUYER_IDS") {
            let ids: Vec<AgentId> = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(AgentId::from)
                .collect();
            if !ids.is_empty() {
                self.buyer_ids = ids;
            }
        }
        if let Some(p) = var("RETRY_PROBABILITY").and_then(|v| v.parse::<f64>().ok()) {
            self.buyer.retry_probability = p;
        }
        if let Some(ms) = var("RESTOCK_INTERVAL_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.seller.restock_interval_ms = ms;
        }
        self
    }

    /// Buyer configuration bound to this marketplace's seller
    pub fn buyer_config(&self) -> BuyerConfig {
        BuyerConfig {
            seller: self.seller_id.clone(),
            ..self.buyer.clone()
        }
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct MarketplaceToml {
    pub seller_id: Option<String>,
    pub buyer_ids: Option<Vec<String>>,
    pub seller: Option<SellerToml>,
    pub buyer: Option<BuyerToml>,
}

impl MarketplaceToml {
    fn overlay(self, mut base: MarketplaceConfig) -> MarketplaceConfig {
        if let Some(id) = self.seller_id {
            base.seller_id = AgentId::from(id);
        }
        if let Some(ids) = self.buyer_ids {
            base.buyer_ids = ids
                .into_iter()
                .filter(|s| !s.is_empty())
                .map(AgentId::from)
                .collect();
        }
        if let Some(s) = self.seller {
            s.apply(&mut base.seller);
        }
        if let Some(b) = self.buyer {
            b.apply(&mut base.buyer);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct SellerToml {
    pub products: Option<BTreeMap<String, Decimal>>,
    pub initial_stock: Option<u32>,
    pub max_stock: Option<u32>,
    pub restock_amount: Option<u32>,
    pub restock_interval_ms: Option<u64>,
    pub report_interval_ms: Option<u64>,
    pub receive_timeout_ms: Option<u64>,
}
impl SellerToml {
    fn apply(self, s: &mut SellerConfig) {
        if let Some(x) = self.products {
            s.products = x;
        }
        if let Some(x) = self.initial_stock {
            s.initial_stock = x;
        }
        if let Some(x) = self.max_stock {
            s.max_stock = x;
        }
        if let Some(x) = self.restock_amount {
            s.restock_amount = x;
        }
        if let Some(x) = self.restock_interval_ms {
            s.restock_interval_ms = x;
        }
        if let Some(x) = self.report_interval_ms {
            s.report_interval_ms = x;
        }
        if let Some(x) = self.receive_timeout_ms {
            s.receive_timeout_ms = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct BuyerToml {
    pub products: Option<Vec<String>>,
    pub min_quantity: Option<u32>,
    pub max_quantity: Option<u32>,
    pub retry_probability: Option<f64>,
    pub retry_delay_min_ms: Option<u64>,
    pub retry_delay_max_ms: Option<u64>,
    pub request_period_ms: Option<u64>,
    pub receive_timeout_ms: Option<u64>,
}
impl BuyerToml {
    fn apply(self, b: &mut BuyerConfig) {
        if let Some(x) = self.products {
            b.products = x.into_iter().filter(|p| !p.is_empty()).collect();
        }
        b.quantity = QuantityRange {
            min: self.min_quantity.unwrap_or(b.quantity.min),
            max: self.max_quantity.unwrap_or(b.quantity.max),
        };
        if let Some(x) = self.retry_probability {
            b.retry_probability = x;
        }
        b.retry_delay = DelayRange {
            min_ms: self.retry_delay_min_ms.unwrap_or(b.retry_delay.min_ms),
            max_ms: self.retry_delay_max_ms.unwrap_or(b.retry_delay.max_ms),
        };
        if let Some(x) = self.request_period_ms {
            b.request_period_ms = x;
        }
        if let Some(x) = self.receive_timeout_ms {
            b.receive_timeout_ms = x;
        }
    }
}
