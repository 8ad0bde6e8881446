//! Purchase protocol payloads carried in envelope bodies.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::messaging::Envelope;
use crate::{AgoraError, Result};

/// Body of a `request` envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub product: String,
    /// Any positive integer; values beyond what a shelf can hold are refused
    /// as out of stock, not as malformed
    pub quantity: u64,
}

impl PurchaseRequest {
    pub fn new(product: impl Into<String>, quantity: u64) -> Self {
        Self {
            product: product.into(),
            quantity,
        }
    }

    /// Decodes and validates a request body. Anything that is not a product
    /// name plus a positive quantity is a protocol error.
    pub fn parse(envelope: &Envelope) -> Result<Self> {
        let request: Self = envelope.decode()?;
        if request.quantity == 0 {
            return Err(AgoraError::Protocol("quantity must be positive".into()));
        }
        Ok(request)
    }
}

/// Body of a `confirm` envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseConfirm {
    pub product: String,
    pub quantity: u64,
    pub total: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefusalReason {
    NotAvailable,
    OutOfStock,
    MalformedRequest,
    /// Price times quantity does not fit the ledger's decimal range
    TotalOutOfRange,
}

/// Body of a `refuse` envelope
///
/// Malformed-request refusals only carry the reason: the seller could not read
/// which product was asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRefusal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    pub reason: RefusalReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_quantity: Option<u64>,
    #[serde(default, alias = "stock", skip_serializing_if = "Option::is_none")]
    pub stock_available: Option<u32>,
}

impl PurchaseRefusal {
    pub fn not_available(product: impl Into<String>, requested_quantity: u64) -> Self {
        Self {
            product: Some(product.into()),
            reason: RefusalReason::NotAvailable,
            requested_quantity: Some(requested_quantity),
            stock_available: None,
        }
    }

    pub fn out_of_stock(product: impl Into<String>, requested_quantity: u64, available: u32) -> Self {
        Self {
            product: Some(product.into()),
            reason: RefusalReason::OutOfStock,
            requested_quantity: Some(requested_quantity),
            stock_available: Some(available),
        }
    }

    pub fn total_out_of_range(product: impl Into<String>, requested_quantity: u64) -> Self {
        Self {
            product: Some(product.into()),
            reason: RefusalReason::TotalOutOfRange,
            requested_quantity: Some(requested_quantity),
            stock_available: None,
        }
    }

    pub fn malformed() -> Self {
        Self {
            product: None,
            reason: RefusalReason::MalformedRequest,
            requested_quantity: None,
            stock_available: None,
        }
    }

    /// Stock and availability refusals naming a product may be retried;
    /// malformed or unpriceable requests would fail identically and never are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.reason,
            RefusalReason::NotAvailable | RefusalReason::OutOfStock
        ) && self.product.as_deref().is_some_and(|p| !p.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Performative;

    fn request(body: &str) -> Envelope {
        Envelope::new("buyer", "seller", Performative::Request, body)
    }

    #[test]
    fn parse_accepts_well_formed_request() {
        let req = PurchaseRequest::parse(&request(r#"{"product":"Apple","quantity":2}"#)).unwrap();
        assert_eq!(req, PurchaseRequest::new("Apple", 2));
    }

    #[test]
    fn parse_accepts_quantities_beyond_u32() {
        let req = PurchaseRequest::parse(&request(r#"{"product":"Apple","quantity":4294967296}"#)).unwrap();
        assert_eq!(req.quantity, 4_294_967_296);
    }

    #[test]
    fn total_out_of_range_is_not_retryable() {
        let refusal = PurchaseRefusal::total_out_of_range("Gold", 2);
        assert!(!refusal.is_retryable());
        let json = serde_json::to_value(&refusal).unwrap();
        assert_eq!(json["reason"], "total_out_of_range");
        assert_eq!(json["requested_quantity"], 2);
    }

    #[test]
    fn parse_rejects_malformed_bodies() {
        for body in [
            "not json",
            r#"{"product":"Apple"}"#,
            r#"{"quantity":2}"#,
            r#"{"product":"Apple","quantity":0}"#,
            r#"{"product":"Apple","quantity":-1}"#,
            r#"{"product":"Apple","quantity":"two"}"#,
            r#"{"product":7,"quantity":1}"#,
            r#"{"product":"Apple","quantity":1.5}"#,
        ] {
            let err = PurchaseRequest::parse(&request(body)).unwrap_err();
            assert!(matches!(err, AgoraError::Protocol(_)), "body {body} should be malformed");
        }
    }

    #[test]
    fn malformed_refusal_carries_only_the_reason() {
        let json = serde_json::to_string(&PurchaseRefusal::malformed()).unwrap();
        assert_eq!(json, r#"{"reason":"malformed_request"}"#);
        assert!(!PurchaseRefusal::malformed().is_retryable());
    }

    #[test]
    fn out_of_stock_refusal_wire_format() {
        let json = serde_json::to_value(PurchaseRefusal::out_of_stock("Apple", 3, 1)).unwrap();
        assert_eq!(json["reason"], "out_of_stock");
        assert_eq!(json["requested_quantity"], 3);
        assert_eq!(json["stock_available"], 1);
    }

    #[test]
    fn refusal_accepts_legacy_stock_field() {
        let refusal: PurchaseRefusal = serde_json::from_str(
            r#"{"product":"Pear","reason":"out_of_stock","stock":0,"requested_quantity":2}"#,
        )
        .unwrap();
        assert_eq!(refusal.stock_available, Some(0));
        assert!(refusal.is_retryable());
    }

    #[test]
    fn retryable_requires_product() {
        let refusal = PurchaseRefusal {
            product: None,
            reason: RefusalReason::OutOfStock,
            requested_quantity: Some(1),
            stock_available: Some(0),
        };
        assert!(!refusal.is_retryable());
        assert!(PurchaseRefusal::not_available("Melon", 1).is_retryable());
    }
}
