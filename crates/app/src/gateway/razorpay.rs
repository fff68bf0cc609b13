//! Razorpay Orders API client and payment signature scheme.

use std::{
    fmt::{self, Debug},
    time::Duration,
};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sanctum::booking::{GatewayError, GatewayOrder, PaymentGateway};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::instrument;
use zeroize::Zeroize;

type HmacSha256 = Hmac<Sha256>;

/// Razorpay API key secret. Zeroized on drop, never printed.
#[derive(Clone)]
pub struct KeySecret(String);

impl KeySecret {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for KeySecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeySecret(**redacted**)")
    }
}

impl Drop for KeySecret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Configuration for connecting to Razorpay.
#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    /// API root, e.g. `"https://api.razorpay.com"`.
    pub base_url: String,

    /// Public key id, used as the basic auth user.
    pub key_id: String,

    /// Key secret, used as the basic auth password and the signature key.
    pub key_secret: KeySecret,
}

/// HTTP client for the Razorpay Orders API.
#[derive(Clone)]
pub struct RazorpayGateway {
    config: RazorpayConfig,
    http: Client,
    signer: HmacSha256,
}

impl Debug for RazorpayGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RazorpayGateway")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RazorpayGateway {
    /// Create a new client from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be built or the key secret is unusable
    /// as an HMAC key.
    pub fn new(config: RazorpayConfig) -> Result<Self, RazorpayError> {
        let signer = HmacSha256::new_from_slice(config.key_secret.expose().as_bytes())
            .map_err(|_invalid| RazorpayError::InvalidKey)?;

        Ok(Self {
            http: Client::builder().build()?,
            config,
            signer,
        })
    }

    fn orders_url(&self) -> String {
        format!("{}/v1/orders", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    #[instrument(skip(self), err)]
    async fn create_order(
        &self,
        amount: u64,
        currency: &str,
        receipt: &str,
        timeout: Duration,
    ) -> Result<GatewayOrder, GatewayError> {
        let response = self
            .http
            .post(self.orders_url())
            .basic_auth(&self.config.key_id, Some(self.config.key_secret.expose()))
            .timeout(timeout)
            .json(&OrderRequest {
                amount,
                currency,
                receipt,
            })
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return Err(GatewayError::Rejected(format!(
                "order creation failed with status {status}: {text}"
            )));
        }

        let meta: serde_json::Value = response.json().await.map_err(transport_error)?;

        let order: OrderResponse = serde_json::from_value(meta.clone())
            .map_err(|error| GatewayError::InvalidResponse(error.to_string()))?;

        Ok(GatewayOrder {
            order_id: order.id,
            amount: order.amount,
            currency: order.currency,
            receipt: order.receipt.unwrap_or_else(|| receipt.to_string()),
            meta,
        })
    }

    fn expected_signature(&self, order_id: &str, payment_id: &str) -> String {
        let mut mac = self.signer.clone();

        mac.update(order_id.as_bytes());
        mac.update(b"|");
        mac.update(payment_id.as_bytes());

        hex::encode(mac.finalize().into_bytes())
    }
}

fn transport_error(error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::Timeout
    } else if error.is_decode() {
        GatewayError::InvalidResponse(error.to_string())
    } else {
        GatewayError::Transport(Box::new(error))
    }
}

#[derive(Debug, Serialize)]
struct OrderRequest<'a> {
    amount: u64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    amount: u64,
    currency: String,
    receipt: Option<String>,
}

/// Errors that can occur when building the Razorpay client.
#[derive(Debug, Error)]
pub enum RazorpayError {
    /// The HTTP client could not be built.
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    /// The key secret cannot key an HMAC.
    #[error("razorpay key secret is not a valid signing key")]
    InvalidKey,
}
