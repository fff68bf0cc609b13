//! Gateway Config

use std::time::Duration;

use clap::Args;
use sanctum::booking::CheckoutSettings;
use sanctum_app::gateway::{KeySecret, RazorpayConfig};

/// Razorpay and checkout settings.
#[derive(Debug, Args)]
pub(crate) struct GatewayConfig {
    /// Razorpay API root
    #[arg(
        long,
        env = "RAZORPAY_BASE_URL",
        default_value = "https://api.razorpay.com"
    )]
    pub razorpay_base_url: String,

    /// Razorpay key id
    #[arg(long, env = "RAZORPAY_KEY_ID")]
    pub razorpay_key_id: String,

    /// Razorpay key secret
    #[arg(long, env = "RAZORPAY_KEY_SECRET", hide_env_values = true)]
    pub razorpay_key_secret: String,

    /// Seconds to wait for the gateway before giving up on an order
    #[arg(long, env = "GATEWAY_TIMEOUT_SECONDS", default_value_t = 10)]
    pub gateway_timeout_seconds: u64,

    /// ISO 4217 currency code for every booking
    #[arg(long, env = "CHECKOUT_CURRENCY", default_value = "INR")]
    pub currency: String,
}

impl GatewayConfig {
    /// Split into client and checkout settings, moving the secret out of the config.
    pub(crate) fn into_parts(self) -> (RazorpayConfig, CheckoutSettings) {
        let razorpay = RazorpayConfig {
            base_url: self.razorpay_base_url,
            key_id: self.razorpay_key_id,
            key_secret: KeySecret::new(self.razorpay_key_secret),
        };

        let checkout = CheckoutSettings {
            currency: self.currency.to_ascii_uppercase(),
            gateway_timeout: Duration::from_secs(self.gateway_timeout_seconds),
        };

        (razorpay, checkout)
    }
}
