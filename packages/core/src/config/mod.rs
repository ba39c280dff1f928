//! Runtime configuration
//!
//! Everything that is not part of the policy document itself: who the application is,
//! whether debug overrides apply, and how reports are delivered.

pub mod app;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

pub use app::AppIdentity;

use crate::errors::ConfigurationError;
use crate::policy::{default_report_uri, CertificateSource, NoCertificates, ParserOptions, RawResourceDir};

/// Reports for the same failure are sent at most once per window
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Process-wide settings
#[derive(Debug, Clone)]
pub struct TrustKitConfig {
    pub app: AppIdentity,
    /// Honor `<debug-overrides>` in the policy document
    pub debuggable: bool,
    /// Collector added to every policy unless it sets `disableDefaultReportUri`
    pub default_report_uri: Option<Url>,
    /// Value of the `app-platform` report field
    pub app_platform: String,
    /// Load the OS trust store; `webpki-roots` is used when disabled or unavailable
    pub use_native_roots: bool,
    /// Directory backing `@raw/<name>` debug certificates
    pub raw_resource_dir: Option<PathBuf>,
    pub report_connect_timeout: Duration,
    pub report_timeout: Duration,
    pub rate_limit_window: Duration,
    /// Runtime used for background report dispatch; the ambient runtime or a
    /// dedicated thread is used otherwise
    pub runtime: Option<tokio::runtime::Handle>,
}

impl Default for TrustKitConfig {
    fn default() -> Self {
        Self {
            app: AppIdentity::default(),
            debuggable: false,
            default_report_uri: Some(default_report_uri()),
            app_platform: std::env::consts::OS.to_ascii_uppercase(),
            use_native_roots: true,
            raw_resource_dir: None,
            report_connect_timeout: Duration::from_secs(10),
            report_timeout: Duration::from_secs(30),
            rate_limit_window: DEFAULT_RATE_LIMIT_WINDOW,
            runtime: None,
        }
    }
}

impl TrustKitConfig {
    /// Debuggable build with debug overrides honored
    #[must_use]
    pub fn development() -> Self {
        Self {
            debuggable: true,
            ..Self::default()
        }
    }

    /// Report-free configuration, for tests and air-gapped deployments
    #[must_use]
    pub fn without_default_report_uri() -> Self {
        Self {
            default_report_uri: None,
            ..Self::default()
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::Validation` if:
    /// - the bundle id or version is empty
    /// - a timeout or the rate limit window is zero
    /// - the default report URI is not http(s)
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.app.bundle_id.trim().is_empty() {
            return Err(ConfigurationError::Validation("app bundle id cannot be empty".to_string()));
        }
        if self.app.version.trim().is_empty() {
            return Err(ConfigurationError::Validation("app version cannot be empty".to_string()));
        }
        if self.report_connect_timeout.is_zero() || self.report_timeout.is_zero() {
            return Err(ConfigurationError::Validation("report timeouts cannot be zero".to_string()));
        }
        if self.rate_limit_window.is_zero() {
            return Err(ConfigurationError::Validation(
                "rate limit window cannot be zero".to_string(),
            ));
        }
        if let Some(uri) = &self.default_report_uri {
            if !matches!(uri.scheme(), "http" | "https") {
                return Err(ConfigurationError::Validation(format!(
                    "default report uri must be http(s): {uri}"
                )));
            }
        }
        Ok(())
    }

    /// Source for `@raw/<name>` debug certificates
    #[must_use]
    pub fn certificate_source(&self) -> Arc<dyn CertificateSource> {
        match &self.raw_resource_dir {
            Some(dir) => Arc::new(RawResourceDir::new(dir.clone())),
            None => Arc::new(NoCertificates),
        }
    }

    #[must_use]
    pub fn parser_options(&self) -> ParserOptions {
        ParserOptions {
            default_report_uri: self.default_report_uri.clone(),
            debuggable: self.debuggable,
            certificate_source: self.certificate_source(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TrustKitConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.debuggable);
        assert_eq!(config.default_report_uri, Some(default_report_uri()));
        assert_eq!(config.app_platform, std::env::consts::OS.to_ascii_uppercase());
    }

    #[test]
    fn test_development_preset_is_debuggable() {
        let config = TrustKitConfig::development();
        assert!(config.debuggable);
        assert!(config.parser_options().debuggable);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = TrustKitConfig::default();
        config.app.bundle_id = String::new();
        assert!(config.validate().is_err());

        let mut config = TrustKitConfig::default();
        config.rate_limit_window = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = TrustKitConfig::default();
        config.default_report_uri = Url::parse("ftp://collector.example.com/").ok();
        assert!(config.validate().is_err());
    }
}
