//! The `host` label attached to every sample.

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Label value used when the detected hostname is empty or not valid UTF-8.
pub const UNKNOWN_HOST: &str = "unknown";

#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to determine local hostname: {0}")]
    Lookup(#[source] io::Error),
}

/// Immutable host identifier, cheap to clone into every collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLabel(Arc<str>);

impl HostLabel {
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self(value.into())
    }

    /// Uses `explicit` when given, otherwise the machine's hostname.
    ///
    /// Detection only runs without an explicit value, so an override works
    /// even where the hostname lookup would fail.
    pub fn resolve(explicit: Option<String>) -> Result<Self, HostError> {
        Self::resolve_with(explicit, hostname::get)
    }

    fn resolve_with(
        explicit: Option<String>,
        detect: impl FnOnce() -> io::Result<OsString>,
    ) -> Result<Self, HostError> {
        if let Some(value) = explicit {
            return Ok(Self::new(value));
        }

        let detected = detect().map_err(HostError::Lookup)?;
        let name = detected
            .into_string()
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN_HOST.to_string());

        Ok(Self::new(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
