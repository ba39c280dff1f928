//! Trust evaluation: baseline validation, pin checks and the rustls verifier

pub mod baseline;
pub mod chain;
pub mod evaluator;
pub mod result;
pub mod verifier;

#[cfg(test)]
pub(crate) mod test_pki;

pub use baseline::{
    load_system_roots, BaselineValidator, TrustAnchorSource, ValidatedChain, WebPkiBaseline,
};
pub use chain::{build_validated_chain, RootIndex, ValidatedPath};
pub use evaluator::{Evaluation, HandshakeContext, TrustEvaluator};
pub use result::PinValidationResult;
pub use verifier::{PinningServerCertVerifier, PIN_FAILURE_PREFIX};
