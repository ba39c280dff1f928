//! Runtime settings
//!
//! Methods mirroring the fields of [`TrustKitConfig`]; anything not set keeps the
//! value of the configuration the builder started from.

use std::path::PathBuf;
use std::time::Duration;

use tokio::runtime::Handle;
use trustpin_core::config::{AppIdentity, TrustKitConfig};
use url::Url;

use super::core::TrustKitBuilder;

impl TrustKitBuilder {
    /// Replace the whole configuration
    #[must_use]
    pub fn config(mut self, config: TrustKitConfig) -> Self {
        self.config = config;
        self
    }

    /// Application identity copied into every report
    #[must_use]
    pub fn app(mut self, app: AppIdentity) -> Self {
        self.config.app = app;
        self
    }

    /// Override the per-installation identifier
    #[must_use]
    pub fn vendor_id(mut self, vendor_id: impl Into<String>) -> Self {
        self.config.app.vendor_id = vendor_id.into();
        self
    }

    /// Honor `<debug-overrides>`
    ///
    /// Off by default. Only enable for development builds: debug CAs become trusted
    /// and `overridePins` disables pin checks entirely.
    #[must_use]
    pub fn debuggable(mut self, debuggable: bool) -> Self {
        self.config.debuggable = debuggable;
        self
    }

    /// Collector added to policies that do not set `disableDefaultReportUri`;
    /// `None` disables it
    #[must_use]
    pub fn default_report_uri(mut self, uri: Option<Url>) -> Self {
        self.config.default_report_uri = uri;
        self
    }

    #[must_use]
    pub fn app_platform(mut self, platform: impl Into<String>) -> Self {
        self.config.app_platform = platform.into();
        self
    }

    /// Load the OS trust store instead of the bundled Mozilla roots
    #[must_use]
    pub fn native_roots(mut self, enabled: bool) -> Self {
        self.config.use_native_roots = enabled;
        self
    }

    /// Directory holding `@raw/<name>` debug certificates
    #[must_use]
    pub fn raw_resource_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.raw_resource_dir = Some(dir.into());
        self
    }

    /// Runtime that report uploads are spawned on
    #[must_use]
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.config.runtime = Some(handle);
        self
    }

    #[must_use]
    pub fn report_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.config.report_connect_timeout = connect;
        self.config.report_timeout = request;
        self
    }

    /// How long an identical report stays suppressed
    #[must_use]
    pub fn rate_limit_window(mut self, window: Duration) -> Self {
        self.config.rate_limit_window = window;
        self
    }
}
