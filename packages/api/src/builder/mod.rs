//! TrustKit builder API
//!
//! Fluent assembly of a [`TrustKit`](trustpin_core::TrustKit) from a policy document,
//! domains declared in code and the runtime settings.

pub mod core;
pub mod policy;
pub mod settings;

pub use self::core::*;
