//! PostgreSQL, Razorpay and filesystem adapters for the Sanctum core, and the
//! context that wires them together.

pub mod assets;
pub mod context;
pub mod database;
pub mod gateway;
pub mod stores;

#[cfg(test)]
mod test;
