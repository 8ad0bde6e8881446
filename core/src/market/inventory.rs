use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::config::SellerConfig;
use crate::{AgoraError, Result};

/// Stock and sales ledger for one product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    pub price: Decimal,
    pub stock: u32,
    pub max_stock: u32,
    pub units_sold: u64,
}

/// What a sale attempt did to the inventory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaleOutcome {
    /// Stock decremented; `remaining` is the stock after the sale
    Sold { total: Decimal, remaining: u32 },
    /// Product unknown to this seller
    NotAvailable,
    /// Not enough stock; nothing changed
    OutOfStock { available: u32 },
    /// Sale total or resulting profit exceeds the decimal range; nothing changed
    TotalOutOfRange,
}

/// One product's restock result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Restocked {
    pub product: String,
    pub added: u32,
    pub stock: u32,
}

/// Seller inventory and profit accumulator.
///
/// Invariants kept by every mutation:
/// - `stock <= max_stock` for every product
/// - `units_sold` never decreases
/// - `profit == sum(price * units_sold)`
///
/// The type has no interior locking; the seller owns it behind one mutex so a
/// sale's stock decrement and profit increment land in one critical section.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    products: BTreeMap<String, StockEntry>,
    profit: Decimal,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SellerConfig) -> Result<Self> {
        config.validate()?;
        let mut inventory = Self::new();
        for (name, price) in &config.products {
            inventory.add_product(name.clone(), *price, config.initial_stock, config.max_stock)?;
        }
        Ok(inventory)
    }

    pub fn add_product(
        &mut self,
        name: impl Into<String>,
        price: Decimal,
        stock: u32,
        max_stock: u32,
    ) -> Result<()> {
        let name = name.into();
        if stock > max_stock {
            return Err(AgoraError::Config(format!(
                "product {}: stock {} exceeds max_stock {}",
                name, stock, max_stock
            )));
        }
        if price.is_sign_negative() {
            return Err(AgoraError::Config(format!(
                "product {}: negative price {}",
                name, price
            )));
        }
        self.products.insert(
            name,
            StockEntry {
                price,
                stock,
                max_stock,
                units_sold: 0,
            },
        );
        Ok(())
    }

    /// Sells `quantity` units if enough stock is available.
    ///
    /// On success stock, units sold and profit change together; otherwise the
    /// inventory is untouched. Quantities above any possible stock level are
    /// out of stock.
    pub fn sell(&mut self, product: &str, quantity: u64) -> SaleOutcome {
        let Some(entry) = self.products.get_mut(product) else {
            return SaleOutcome::NotAvailable;
        };
        let quantity = match u32::try_from(quantity) {
            Ok(q) if q <= entry.stock => q,
            _ => {
                return SaleOutcome::OutOfStock {
                    available: entry.stock,
                }
            }
        };

        let Some((total, profit)) = entry
            .price
            .checked_mul(Decimal::from(quantity))
            .and_then(|total| self.profit.checked_add(total).map(|profit| (total, profit)))
        else {
            return SaleOutcome::TotalOutOfRange;
        };
        entry.stock -= quantity;
        entry.units_sold += u64::from(quantity);
        self.profit = profit;

        SaleOutcome::Sold {
            total,
            remaining: entry.stock,
        }
    }

    /// Adds `min(amount, max_stock - stock)` to every product below its
    /// ceiling. Returns the products that changed.
    pub fn restock(&mut self, amount: u32) -> Vec<Restocked> {
        let mut restocked = Vec::new();
        for (name, entry) in self.products.iter_mut() {
            if entry.stock >= entry.max_stock {
                continue;
            }
            let added = amount.min(entry.max_stock - entry.stock);
            if added == 0 {
                continue;
            }
            entry.stock += added;
            restocked.push(Restocked {
                product: name.clone(),
                added,
                stock: entry.stock,
            });
        }
        restocked
    }

    pub fn stock(&self, product: &str) -> Option<u32> {
        self.products.get(product).map(|e| e.stock)
    }

    pub fn entry(&self, product: &str) -> Option<&StockEntry> {
        self.products.get(product)
    }

    pub fn profit(&self) -> Decimal {
        self.profit
    }

    pub fn product_names(&self) -> impl Iterator<Item = &str> {
        self.products.keys().map(|k| k.as_str())
    }

    /// Read-only copy for reporting
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            profit: self.profit,
            products: self.products.clone(),
        }
    }
}

/// Point-in-time view of the seller's ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub profit: Decimal,
    pub products: BTreeMap<String, StockEntry>,
}

impl LedgerSnapshot {
    pub fn units_sold(&self) -> u64 {
        self.products.values().map(|e| e.units_sold).sum()
    }

    /// `sum(price * units_sold)`; equals `profit` whenever no sale is in flight
    pub fn expected_profit(&self) -> Decimal {
        self.products
            .values()
            .map(|e| e.price * Decimal::from(e.units_sold))
            .sum()
    }

    pub fn stock(&self, product: &str) -> Option<u32> {
        self.products.get(product).map(|e| e.stock)
    }
}
