//! # trustpin core
//!
//! Certificate pinning for rustls clients: a `network-security-config` policy model,
//! per-handshake trust evaluation and rate-limited failure reporting.
//!
//! ## Features
//!
//! - **Hierarchical policies** with nested `domain-config` inheritance
//! - **Most-specific-domain lookup** with `includeSubdomains` fallback
//! - **SPKI SHA-256 pins** checked against the validated chain, not the served one
//! - **Report-only mode** where failures are reported but connections proceed
//! - **Debug overrides** for development trust anchors
//! - **Failure reports** in the HPKP JSON format, de-duplicated per day
//! - **rustls verifier** that aborts enforced pin failures during the handshake
//!
//! ## Usage
//!
//! ```rust,no_run
//! use trustpin_core::{TrustKit, TrustKitConfig};
//!
//! # async fn run() -> Result<(), trustpin_core::TrustKitError> {
//! let policy = std::fs::read_to_string("network_security_config.xml").unwrap_or_default();
//! let trustkit = TrustKit::from_policy_document(&policy, TrustKitConfig::default())?;
//! let _stream = trustkit.connect("www.datatheorem.com", 443).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod config;
pub mod errors;
pub mod pinning;
pub mod policy;
pub mod prelude;
pub mod reporting;
pub mod trustkit;

pub use crate::prelude::*;
