//! Pin validation failure report and its JSON wire format

use std::fmt;

use chrono::{DateTime, Utc};
use rustls::pki_types::CertificateDer;
use serde::{Serialize, Serializer};

use crate::config::AppIdentity;
use crate::errors::ReportError;
use crate::pinning::PinValidationResult;
use crate::policy::{DomainPolicy, PublicKeyPin};

/// `trustkit-version` field
pub const TRUSTKIT_VERSION: &str = env!("CARGO_PKG_VERSION");

const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Snapshot of one validation failure, as POSTed to the report URIs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FailureReport {
    pub app_bundle_id: String,
    pub app_version: String,
    pub app_vendor_id: String,
    pub app_platform: String,
    pub trustkit_version: String,
    pub hostname: String,
    pub port: u16,
    pub noted_hostname: String,
    pub include_subdomains: bool,
    pub enforce_pinning: bool,
    pub validation_result: PinValidationResult,
    #[serde(serialize_with = "serialize_date_time")]
    pub date_time: DateTime<Utc>,
    pub validated_certificate_chain: Vec<String>,
    pub served_certificate_chain: Vec<String>,
    #[serde(serialize_with = "serialize_known_pins")]
    pub known_pins: Vec<PublicKeyPin>,
}

/// Fields that identify a failure for rate limiting
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReportKey {
    pub noted_hostname: String,
    pub hostname: String,
    pub port: u16,
    pub validated_certificate_chain: Vec<String>,
    pub validation_result: PinValidationResult,
}

impl FailureReport {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        app: &AppIdentity,
        app_platform: &str,
        hostname: &str,
        port: u16,
        policy: &DomainPolicy,
        served: &[CertificateDer<'_>],
        validated: &[CertificateDer<'_>],
        validation_result: PinValidationResult,
        date_time: DateTime<Utc>,
    ) -> Self {
        Self {
            app_bundle_id: app.bundle_id.clone(),
            app_version: app.version.clone(),
            app_vendor_id: app.vendor_id.clone(),
            app_platform: app_platform.to_string(),
            trustkit_version: TRUSTKIT_VERSION.to_string(),
            hostname: hostname.to_string(),
            port,
            noted_hostname: policy.hostname().to_string(),
            include_subdomains: policy.include_subdomains(),
            enforce_pinning: policy.enforce_pinning(),
            validation_result,
            date_time,
            validated_certificate_chain: certificate_chain_pem(validated),
            served_certificate_chain: certificate_chain_pem(served),
            known_pins: policy.pins().iter().copied().collect(),
        }
    }

    #[must_use]
    pub fn rate_limit_key(&self) -> ReportKey {
        ReportKey {
            noted_hostname: self.noted_hostname.clone(),
            hostname: self.hostname.clone(),
            port: self.port,
            validated_certificate_chain: self.validated_certificate_chain.clone(),
            validation_result: self.validation_result,
        }
    }

    /// JSON request body
    pub fn to_json(&self) -> Result<Vec<u8>, ReportError> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string_pretty(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "FailureReport for {}", self.hostname),
        }
    }
}

/// PEM text of every certificate, leaf first
#[must_use]
pub fn certificate_chain_pem(chain: &[CertificateDer<'_>]) -> Vec<String> {
    chain
        .iter()
        .map(|der| {
            let block = pem::Pem::new("CERTIFICATE", der.as_ref().to_vec());
            pem::encode_config(
                &block,
                pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
            )
        })
        .collect()
}

fn serialize_date_time<S: Serializer>(date_time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&date_time.format(DATE_TIME_FORMAT))
}

fn serialize_known_pins<S: Serializer>(pins: &[PublicKeyPin], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(pins.iter().map(PublicKeyPin::to_hpkp_directive))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FailureReport {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let params = rcgen::CertificateParams::new(vec!["www.datatheorem.com".to_string()]).unwrap();
        let leaf = params.self_signed(&key_pair).unwrap().der().clone();

        let policy = DomainPolicy::builder("datatheorem.com")
            .include_subdomains(true)
            .pins([PublicKeyPin::from_digest([0; 32]), PublicKeyPin::from_digest([1; 32])])
            .enforce_pinning(true)
            .build()
            .unwrap();
        FailureReport::new(
            &AppIdentity::new("com.datatheorem.testapp", "1.2").with_vendor_id("vendor"),
            "LINUX",
            "www.datatheorem.com",
            443,
            &policy,
            &[leaf.clone()],
            &[leaf],
            PinValidationResult::Failed,
            "2017-10-18T08:05:01Z".parse().unwrap(),
        )
    }

    #[test]
    fn test_json_has_every_documented_key() {
        let json: serde_json::Value = serde_json::from_slice(&sample().to_json().unwrap()).unwrap();
        let object = json.as_object().unwrap();
        for key in [
            "app-bundle-id",
            "app-version",
            "app-vendor-id",
            "app-platform",
            "trustkit-version",
            "hostname",
            "port",
            "noted-hostname",
            "include-subdomains",
            "enforce-pinning",
            "validation-result",
            "date-time",
            "validated-certificate-chain",
            "served-certificate-chain",
            "known-pins",
        ] {
            assert!(object.contains_key(key), "missing {key}");
        }
        assert_eq!(object.len(), 15);
    }

    #[test]
    fn test_json_field_formats() {
        let json: serde_json::Value = serde_json::from_slice(&sample().to_json().unwrap()).unwrap();
        assert_eq!(json["validation-result"], 1);
        assert_eq!(json["port"], 443);
        assert_eq!(json["noted-hostname"], "datatheorem.com");
        assert_eq!(json["date-time"], "2017-10-18T08:05:01+0000");
        assert_eq!(
            json["known-pins"][0],
            "pin-sha256=\"AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=\""
        );
        let pem = json["served-certificate-chain"][0].as_str().unwrap();
        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----\n"));
    }

    #[test]
    fn test_rate_limit_key_ignores_timestamp() {
        let first = sample();
        let mut second = first.clone();
        second.date_time = Utc::now();
        second.served_certificate_chain.clear();
        assert_eq!(first.rate_limit_key(), second.rate_limit_key());
    }
}
