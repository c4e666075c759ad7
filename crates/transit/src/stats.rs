use crate::context::ContextId;

/// Snapshot of a context's registry and counters at a point in time.
///
/// Counters only grow. At rest (no disposal in flight),
/// `live_proxies == proxies_created - proxies_disposed`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ContextStats {
    /// The context the snapshot was taken from.
    pub context: ContextId,
    /// The context's configured label.
    pub label: Option<String>,
    /// Proxies currently registered.
    pub live_proxies: usize,
    /// Proxies ever created.
    pub proxies_created: u64,
    /// Proxies whose disposal has completed.
    pub proxies_disposed: u64,
    /// Creation attempts the bridge refused.
    pub acquisition_failures: u64,
    /// Releases that reported an error.
    ///
    /// Each of these proxies still counts as disposed.
    pub release_failures: u64,
    /// Whether teardown has begun.
    pub closed: bool,
}

impl ContextStats {
    /// Proxies created but not yet disposed.
    #[must_use]
    pub fn outstanding(&self) -> u64 {
        self.proxies_created.saturating_sub(self.proxies_disposed)
    }
}
