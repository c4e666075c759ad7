use crate::error::TransitError;

/// Configuration for a [`Context`](crate::Context).
///
/// Every field is optional. `ContextConfig::default()` places no limit on the
/// number of live proxies; use the builder methods to tighten it.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ContextConfig {
    /// Human-readable name attached to log records and stats.
    #[serde(default)]
    pub label: Option<String>,
    /// Maximum number of proxies the context keeps alive at once.
    #[serde(default)]
    pub max_live_proxies: Option<usize>,
    /// Number of registry slots reserved up front.
    #[serde(default)]
    pub registry_capacity: usize,
}

impl ContextConfig {
    /// Creates a configuration with no label and no limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the label used in diagnostics.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the maximum number of simultaneously live proxies.
    #[must_use]
    pub fn max_live_proxies(mut self, limit: usize) -> Self {
        self.max_live_proxies = Some(limit);
        self
    }

    /// Reserves `capacity` registry slots when the context is created.
    #[must_use]
    pub fn registry_capacity(mut self, capacity: usize) -> Self {
        self.registry_capacity = capacity;
        self
    }

    /// Checks whether one more proxy fits next to `live` existing ones.
    pub(crate) fn check_live_limit(&self, live: usize) -> Result<(), TransitError> {
        match self.max_live_proxies {
            Some(limit) if live >= limit => Err(TransitError::LimitExceeded { limit, live }),
            _ => Ok(()),
        }
    }
}
