//! # trustpin
//!
//! Certificate pinning for rustls clients, configured from an Android-style
//! `network-security-config` document or in code.
//!
//! A process installs one [`TrustKit`] with [`init`] (or [`TrustKitBuilder::init`]) and
//! reaches it from anywhere with [`instance`]. Every TLS connection built from
//! [`TrustKit::client_config`] then checks the server's public keys against the
//! pinned domain's policy, aborting enforced mismatches and reporting failures to
//! the configured collectors.
//!
//! ```no_run
//! use trustpin::TrustKitConfig;
//!
//! # async fn run() -> Result<(), trustpin::TrustKitError> {
//! let policy = std::fs::read_to_string("network_security_config.xml").unwrap_or_default();
//! let trustkit = trustpin::init_with_policy_document(&policy, TrustKitConfig::default())?;
//! let _stream = trustkit.connect("www.datatheorem.com", 443).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]

use std::sync::OnceLock;

pub mod builder;

pub use builder::TrustKitBuilder;
pub use trustpin_core::prelude::*;
pub use trustpin_core::{config, errors, pinning, policy, reporting};

static TRUSTKIT: OnceLock<TrustKit> = OnceLock::new();

/// Install `trustkit` as the process-wide instance
///
/// # Errors
///
/// Returns `StateError::AlreadyInitialized` if an instance is already installed;
/// `trustkit` is dropped and the installed instance is left untouched.
pub fn init(trustkit: TrustKit) -> Result<&'static TrustKit, StateError> {
    if TRUSTKIT.set(trustkit).is_err() {
        tracing::warn!("Rejected a second TrustKit initialization");
        return Err(StateError::AlreadyInitialized);
    }
    tracing::info!("TrustKit initialized");
    instance()
}

/// Parse `document` and install the result as the process-wide instance
///
/// # Errors
///
/// Returns `StateError::AlreadyInitialized` without parsing if an instance is already
/// installed, or any configuration error from the document.
pub fn init_with_policy_document(
    document: &str,
    config: TrustKitConfig,
) -> Result<&'static TrustKit, TrustKitError> {
    if is_initialized() {
        return Err(StateError::AlreadyInitialized.into());
    }
    let trustkit = TrustKit::from_policy_document(document, config)?;
    Ok(init(trustkit)?)
}

/// The process-wide instance
///
/// # Errors
///
/// Returns `StateError::NotInitialized` before [`init`] succeeds.
pub fn instance() -> Result<&'static TrustKit, StateError> {
    TRUSTKIT.get().ok_or(StateError::NotInitialized)
}

#[must_use]
pub fn is_initialized() -> bool {
    TRUSTKIT.get().is_some()
}
