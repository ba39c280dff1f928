//! Throw-away CA hierarchies for chain tests

use rcgen::{BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, Issuer, KeyPair};
use rustls::pki_types::CertificateDer;

/// A CA certificate and the issuer that signs with its key
pub(crate) struct TestCa {
    pub(crate) certificate: CertificateDer<'static>,
    pub(crate) issuer: Issuer<'static, KeyPair>,
}

fn named(common_name: &str, subject_alt_names: Vec<String>) -> CertificateParams {
    let mut params = CertificateParams::new(subject_alt_names).unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;
    params
}

fn ca_params(common_name: &str) -> CertificateParams {
    let mut params = named(common_name, Vec::new());
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params
}

pub(crate) fn root_ca(common_name: &str) -> TestCa {
    let key_pair = KeyPair::generate().unwrap();
    let params = ca_params(common_name);
    let certificate = params.clone().self_signed(&key_pair).unwrap().der().clone();
    TestCa {
        certificate,
        issuer: Issuer::new(params, key_pair),
    }
}

pub(crate) fn intermediate_ca(common_name: &str, parent: &TestCa) -> TestCa {
    let key_pair = KeyPair::generate().unwrap();
    let params = ca_params(common_name);
    let certificate = params
        .clone()
        .signed_by(&key_pair, &parent.issuer)
        .unwrap()
        .der()
        .clone();
    TestCa {
        certificate,
        issuer: Issuer::new(params, key_pair),
    }
}

pub(crate) fn leaf(hostname: &str, parent: &TestCa) -> CertificateDer<'static> {
    let key_pair = KeyPair::generate().unwrap();
    named(hostname, vec![hostname.to_string()])
        .signed_by(&key_pair, &parent.issuer)
        .unwrap()
        .der()
        .clone()
}

pub(crate) fn self_signed(hostname: &str) -> CertificateDer<'static> {
    let key_pair = KeyPair::generate().unwrap();
    named(hostname, vec![hostname.to_string()])
        .self_signed(&key_pair)
        .unwrap()
        .der()
        .clone()
}
