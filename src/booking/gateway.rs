//! Payment gateway contract

use std::{error::Error as StdError, time::Duration};

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// An order reserved with the gateway, to be paid by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub order_id: String,
    pub amount: u64,
    pub currency: String,
    pub receipt: String,

    /// Provider specific payload the client needs to open the checkout.
    pub meta: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway did not answer in time")]
    Timeout,

    #[error("gateway rejected the request: {0}")]
    Rejected(String),

    #[error("gateway response could not be understood: {0}")]
    InvalidResponse(String),

    #[error("gateway transport failure")]
    Transport(#[source] Box<dyn StdError + Send + Sync>),
}

/// Third-party payment provider.
#[automock]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Reserve an order for `amount` minor units. Must give up after `timeout`.
    async fn create_order(
        &self,
        amount: u64,
        currency: &str,
        receipt: &str,
        timeout: Duration,
    ) -> Result<GatewayOrder, GatewayError>;

    /// Signature the gateway attaches to a successful payment of `order_id`.
    fn expected_signature(&self, order_id: &str, payment_id: &str) -> String;
}

/// Compare signatures without leaking the position of the first mismatch.
#[must_use]
pub fn signatures_match(expected: &str, provided: &str) -> bool {
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_comparison() {
        assert!(signatures_match("abc123", "abc123"));
        assert!(!signatures_match("abc123", "abc124"));
        assert!(!signatures_match("abc123", "abc12"));
        assert!(!signatures_match("abc123", ""));
    }
}
