//! Payment gateway adapters.

mod razorpay;

pub use razorpay::{KeySecret, RazorpayConfig, RazorpayError, RazorpayGateway};
