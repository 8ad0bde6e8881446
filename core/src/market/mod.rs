//! Fruit marketplace built on the agent runtime.
//!
//! - `config`: seller / buyer tunables with serde defaults
//! - `protocol`: request, confirm and refuse payloads
//! - `inventory`: stock ledger and profit accounting
//! - `seller` / `buyer`: the two agent kinds

pub mod buyer;
pub mod config;
pub mod inventory;
pub mod protocol;
pub mod seller;

pub use buyer::{BuyerAgent, BuyerStats, SharedBuyerStats};
pub use config::{BuyerConfig, DelayRange, QuantityRange, SellerConfig};
pub use inventory::{Inventory, LedgerSnapshot, Restocked, SaleOutcome, StockEntry};
pub use protocol::{PurchaseConfirm, PurchaseRefusal, PurchaseRequest, RefusalReason};
pub use seller::{SellerAgent, SharedInventory};
