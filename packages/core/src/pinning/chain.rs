//! Rebuilds the validated chain from the certificates a server presented.
//!
//! Servers routinely send extra or out-of-order certificates. Pins are checked against
//! the path actually linking the leaf to a trust anchor: each step matches the issuer
//! name against the next subject and verifies the signature with that certificate's key.

use rustls::pki_types::{CertificateDer, TrustAnchor};
use rustls::RootCertStore;
use x509_parser::prelude::*;

use crate::policy::PublicKeyPin;

/// One trust anchor: full subject and SPKI encodings, plus the certificate when known
#[derive(Debug, Clone)]
struct Anchor {
    subject: Vec<u8>,
    spki: Vec<u8>,
    certificate: Option<CertificateDer<'static>>,
}

/// Trust anchors indexed by raw subject name
#[derive(Debug, Clone, Default)]
pub struct RootIndex {
    anchors: Vec<Anchor>,
}

impl RootIndex {
    /// Index full root certificates
    pub fn new<I>(certificates: I) -> Self
    where
        I: IntoIterator<Item = CertificateDer<'static>>,
    {
        let anchors = certificates
            .into_iter()
            .filter_map(|cert| {
                let (subject, spki) = match X509Certificate::from_der(cert.as_ref()) {
                    Ok((_, parsed)) => (
                        parsed.subject().as_raw().to_vec(),
                        parsed.public_key().raw.to_vec(),
                    ),
                    Err(e) => {
                        tracing::debug!("Skipping unparsable trust anchor: {}", e);
                        return None;
                    }
                };
                Some(Anchor {
                    subject,
                    spki,
                    certificate: Some(cert),
                })
            })
            .collect();
        Self { anchors }
    }

    /// Index every anchor of `store`, attaching the matching certificate from `known`
    /// where there is one. Bundled roots only carry the anchor's name and key.
    pub fn from_store(store: &RootCertStore, known: &[CertificateDer<'static>]) -> Self {
        let certified = Self::new(known.iter().cloned());
        let anchors = store
            .roots
            .iter()
            .map(|anchor| {
                let mut entry = anchor_entry(anchor);
                entry.certificate = certified
                    .anchors
                    .iter()
                    .find(|known| known.subject == entry.subject && known.spki == entry.spki)
                    .and_then(|known| known.certificate.clone());
                entry
            })
            .collect();
        Self { anchors }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    fn issuer_of(&self, cert: &X509Certificate<'_>) -> Option<&Anchor> {
        let issuer = cert.issuer().as_raw();
        self.anchors
            .iter()
            .filter(|anchor| anchor.subject.as_slice() == issuer)
            .find(|anchor| match SubjectPublicKeyInfo::from_der(&anchor.spki) {
                Ok((_, key)) => cert.verify_signature(Some(&key)).is_ok(),
                Err(_) => false,
            })
    }
}

fn anchor_entry(anchor: &TrustAnchor<'_>) -> Anchor {
    Anchor {
        subject: der_sequence(anchor.subject.as_ref()),
        spki: der_sequence(anchor.subject_public_key_info.as_ref()),
        certificate: None,
    }
}

/// Wrap `contents` in a DER SEQUENCE header; trust anchors store names and keys
/// without it
fn der_sequence(contents: &[u8]) -> Vec<u8> {
    let len = contents.len();
    let mut out = Vec::with_capacity(len + 6);
    out.push(0x30);
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    out.extend_from_slice(contents);
    out
}

fn is_self_signed(cert: &X509Certificate<'_>) -> bool {
    cert.subject().as_raw() == cert.issuer().as_raw() && cert.verify_signature(None).is_ok()
}

/// Path from the leaf to its trust anchor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPath {
    /// Leaf first; ends with the anchor certificate when it was served or is known
    pub certificates: Vec<CertificateDer<'static>>,
    /// Pin of the anchor key when only the anchor's name and key are available
    pub anchor_key: Option<PublicKeyPin>,
}

/// Chain from the leaf to the anchor, using `served` for intermediates and `roots` for
/// the final anchor when the server did not send it.
///
/// Certificates that are not part of the path are dropped. If the leaf cannot be
/// parsed, the served chain is returned unchanged.
#[must_use]
pub fn build_validated_chain(served: &[CertificateDer<'_>], roots: &RootIndex) -> ValidatedPath {
    let parsed: Vec<Option<X509Certificate<'_>>> = served
        .iter()
        .map(|der| X509Certificate::from_der(der.as_ref()).ok().map(|(_, cert)| cert))
        .collect();

    let Some(Some(leaf)) = parsed.first() else {
        return ValidatedPath {
            certificates: served.iter().map(|c| c.clone().into_owned()).collect(),
            anchor_key: None,
        };
    };

    let mut chain = vec![served[0].clone().into_owned()];
    let mut anchor_key = None;
    let mut used = vec![false; served.len()];
    used[0] = true;
    let mut current = leaf;

    while chain.len() <= served.len() {
        if is_self_signed(current) {
            break;
        }

        let next = parsed.iter().enumerate().find(|(idx, candidate)| {
            !used[*idx]
                && matches!(candidate, Some(issuer)
                    if issuer.subject().as_raw() == current.issuer().as_raw()
                        && current.verify_signature(Some(issuer.public_key())).is_ok())
        });

        match next {
            Some((idx, Some(issuer))) => {
                used[idx] = true;
                chain.push(served[idx].clone().into_owned());
                current = issuer;
            }
            _ => {
                if let Some(anchor) = roots.issuer_of(current) {
                    match &anchor.certificate {
                        Some(root) => chain.push(root.clone()),
                        None => anchor_key = Some(PublicKeyPin::from_spki(&anchor.spki)),
                    }
                }
                break;
            }
        }
    }

    ValidatedPath {
        certificates: chain,
        anchor_key,
    }
}
