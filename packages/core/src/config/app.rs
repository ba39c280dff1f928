//! Identity of the application embedding the pinning layer, as sent in reports

use std::fs;
use std::io;
use std::path::Path;

use uuid::Uuid;

/// Application identity carried by every failure report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    pub bundle_id: String,
    pub version: String,
    /// Random per-install identifier
    pub vendor_id: String,
}

impl Default for AppIdentity {
    fn default() -> Self {
        Self {
            bundle_id: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            vendor_id: Self::generate_vendor_id(),
        }
    }
}

impl AppIdentity {
    pub fn new(bundle_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            bundle_id: bundle_id.into(),
            version: version.into(),
            vendor_id: Self::generate_vendor_id(),
        }
    }

    #[must_use]
    pub fn with_vendor_id(mut self, vendor_id: impl Into<String>) -> Self {
        self.vendor_id = vendor_id.into();
        self
    }

    /// Random version 4 UUID in its canonical hyphenated form
    #[must_use]
    pub fn generate_vendor_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Read the vendor id stored at `path`, generating and storing one on first use
    pub fn load_or_create_vendor_id(path: &Path) -> io::Result<String> {
        match fs::read_to_string(path) {
            Ok(stored) if !stored.trim().is_empty() => return Ok(stored.trim().to_string()),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        tracing::info!("Generating new vendor identifier at {}", path.display());
        let vendor_id = Self::generate_vendor_id();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &vendor_id)?;
        Ok(vendor_id)
    }
}
