//! Process-wide instance lifecycle
//!
//! Everything lives in one test: the instance can only be installed once per process.

use std::sync::Arc;

use rustls::pki_types::CertificateDer;
use trustpin::pinning::{BaselineValidator, TrustAnchorSource, ValidatedChain};
use trustpin::{BaselineError, StateError, TrustKitBuilder, TrustKitConfig, TrustKitError};

const DOCUMENT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<network-security-config>
    <domain-config>
        <domain includeSubdomains="true">datatheorem.com</domain>
        <pin-set>
            <pin digest="SHA-256">AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=</pin>
            <pin digest="SHA-256">AgICAgICAgICAgICAgICAgICAgICAgICAgICAgICAgI=</pin>
        </pin-set>
        <trustkit-config enforcePinning="true"/>
    </domain-config>
</network-security-config>"#;

struct Trusting;

impl BaselineValidator for Trusting {
    fn check_trusted(
        &self,
        _hostname: &str,
        served: &[CertificateDer<'_>],
    ) -> Result<ValidatedChain, BaselineError> {
        Ok(ValidatedChain::new(
            served.iter().map(|c| c.clone().into_owned()).collect(),
            TrustAnchorSource::System,
        ))
    }
}

fn builder() -> TrustKitBuilder {
    TrustKitBuilder::with_config(TrustKitConfig::without_default_report_uri())
        .baseline(Arc::new(Trusting))
        .policy_document(DOCUMENT)
}

#[test]
fn test_initialization_lifecycle() {
    assert!(!trustpin::is_initialized());
    assert!(matches!(trustpin::instance(), Err(StateError::NotInitialized)));

    // A configuration error leaves the process uninitialized
    let invalid = TrustKitBuilder::with_config(TrustKitConfig::without_default_report_uri())
        .baseline(Arc::new(Trusting))
        .init();
    assert!(matches!(invalid, Err(TrustKitError::Configuration(_))));
    assert!(!trustpin::is_initialized());

    let installed = builder().init().unwrap();
    assert!(trustpin::is_initialized());
    assert!(installed.policy_for("www.datatheorem.com").unwrap().is_some());

    let again = builder().init();
    assert!(matches!(
        again,
        Err(TrustKitError::State(StateError::AlreadyInitialized))
    ));
    let direct = trustpin::init(builder().build().unwrap());
    assert!(matches!(direct, Err(StateError::AlreadyInitialized)));
    let from_document = trustpin::init_with_policy_document(DOCUMENT, TrustKitConfig::default());
    assert!(matches!(
        from_document,
        Err(TrustKitError::State(StateError::AlreadyInitialized))
    ));

    let instance = trustpin::instance().unwrap();
    assert!(std::ptr::eq(instance, installed));
    assert_eq!(instance.resolver().len(), 1);
}
