//! Lifecycle tracing infrastructure.
//!
//! A [`Context`](crate::Context) is parameterized by a tracer type, so hosts pick
//! the amount of lifecycle visibility they want at construction time. With
//! [`NoopTracer`] (the default) every hook compiles away through
//! monomorphization.
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | Zero-cost no-op (production default) |
//! | [`LogTracer`] | Forwards every hook to `tracing` at a chosen level |
//! | [`CountingTracer`] | Atomic counters summarized as a [`LifecycleReport`] |
//! | [`RecordingTracer`] | Full [`LifecycleEvent`] recording for post-mortem checks |
//!
//! Hooks take `&self` because they fire from whichever thread creates, disposes
//! or tears down; stateful tracers synchronize internally.
//!
//! ```
//! use std::sync::Arc;
//! use transit::{Context, ContextConfig, RecordingTracer, retain::{Element, RetainTable}};
//!
//! let tracer = Arc::new(RecordingTracer::new());
//! let ctx = Context::with_tracer(RetainTable::<u8>::new(), ContextConfig::new(), Arc::clone(&tracer));
//! let proxy = ctx.create_proxy(Element::object(1)).unwrap();
//! proxy.dispose();
//! assert_eq!(tracer.event_count(), 2);
//! ```

use std::{
    error::Error,
    fmt,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use tracing::Level;

use crate::{context::ContextId, proxy::ProxyId};

/// Lifecycle event captured by [`RecordingTracer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A proxy was registered and handed out.
    ProxyCreated { context: ContextId, proxy: ProxyId },
    /// The bridge refused to acquire a handle.
    AcquisitionFailed { context: ContextId, message: String },
    /// A proxy finished disposal (whether or not the release itself succeeded).
    ProxyDisposed { context: ContextId, proxy: ProxyId },
    /// The bridge reported an error while releasing a proxy's handle.
    ReleaseFailed {
        context: ContextId,
        proxy: ProxyId,
        message: String,
    },
    /// Teardown closed the context with `live` proxies still registered.
    TeardownStarted { context: ContextId, live: usize },
    /// Teardown finished disposing its snapshot of `disposed` proxies.
    TeardownFinished { context: ContextId, disposed: usize },
}

/// Hooks invoked at each step of the proxy/context lifecycle.
///
/// All methods default to no-ops, so implementations override only what they
/// need.
pub trait LifecycleTracer: fmt::Debug + Send + Sync {
    /// Called after a proxy has been registered, before it is returned.
    ///
    /// Runs while the context's registry is locked, so it always precedes the
    /// proxy's disposal events. It must not call back into the context.
    #[inline]
    fn on_proxy_created(&self, _context: ContextId, _proxy: ProxyId) {}

    /// Called when the bridge fails to acquire a handle.
    #[inline]
    fn on_acquisition_failed(&self, _context: ContextId, _error: &(dyn Error + 'static)) {}

    /// Called once per proxy, after its disposal completed.
    #[inline]
    fn on_proxy_disposed(&self, _context: ContextId, _proxy: ProxyId) {}

    /// Called when releasing a proxy's handle failed. Disposal still completes.
    #[inline]
    fn on_release_failed(&self, _context: ContextId, _proxy: ProxyId, _error: &(dyn Error + 'static)) {}

    /// Called when a teardown closes the context.
    ///
    /// # Arguments
    /// * `live` - Number of proxies in the teardown snapshot
    #[inline]
    fn on_teardown_started(&self, _context: ContextId, _live: usize) {}

    /// Called when a teardown has disposed its snapshot.
    #[inline]
    fn on_teardown_finished(&self, _context: ContextId, _disposed: usize) {}
}

impl<T: LifecycleTracer + ?Sized> LifecycleTracer for Arc<T> {
    fn on_proxy_created(&self, context: ContextId, proxy: ProxyId) {
        (**self).on_proxy_created(context, proxy);
    }

    fn on_acquisition_failed(&self, context: ContextId, error: &(dyn Error + 'static)) {
        (**self).on_acquisition_failed(context, error);
    }

    fn on_proxy_disposed(&self, context: ContextId, proxy: ProxyId) {
        (**self).on_proxy_disposed(context, proxy);
    }

    fn on_release_failed(&self, context: ContextId, proxy: ProxyId, error: &(dyn Error + 'static)) {
        (**self).on_release_failed(context, proxy, error);
    }

    fn on_teardown_started(&self, context: ContextId, live: usize) {
        (**self).on_teardown_started(context, live);
    }

    fn on_teardown_finished(&self, context: ContextId, disposed: usize) {
        (**self).on_teardown_finished(context, disposed);
    }
}

// ============================================================================
// NoopTracer: zero-cost production default
// ============================================================================

/// A tracer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl LifecycleTracer for NoopTracer {}

// ============================================================================
// LogTracer: lifecycle log through `tracing`
// ============================================================================

/// Tracer that emits one `tracing` event per hook.
///
/// Release failures are always logged at `WARN` by the context itself; this
/// tracer adds the rest of the lifecycle at the configured level, which
/// defaults to `DEBUG`.
#[derive(Debug, Clone, Copy)]
pub struct LogTracer {
    level: Level,
}

impl LogTracer {
    /// Creates a log tracer emitting at `DEBUG`.
    #[must_use]
    pub fn new() -> Self {
        Self { level: Level::DEBUG }
    }

    /// Creates a log tracer emitting at `level`.
    #[must_use]
    pub fn with_level(level: Level) -> Self {
        Self { level }
    }

    /// Returns the level events are emitted at.
    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }
}

impl Default for LogTracer {
    fn default() -> Self {
        Self::new()
    }
}

/// `tracing` callsites need a constant level, so dispatch on the runtime one.
macro_rules! event_at {
    ($level:expr, $($rest:tt)+) => {{
        let level = $level;
        if level == Level::ERROR {
            tracing::error!($($rest)+);
        } else if level == Level::WARN {
            tracing::warn!($($rest)+);
        } else if level == Level::INFO {
            tracing::info!($($rest)+);
        } else if level == Level::DEBUG {
            tracing::debug!($($rest)+);
        } else {
            tracing::trace!($($rest)+);
        }
    }};
}

impl LifecycleTracer for LogTracer {
    fn on_proxy_created(&self, context: ContextId, proxy: ProxyId) {
        event_at!(self.level, %context, %proxy, "proxy created");
    }

    fn on_acquisition_failed(&self, context: ContextId, error: &(dyn Error + 'static)) {
        event_at!(self.level, %context, %error, "foreign handle acquisition failed");
    }

    fn on_proxy_disposed(&self, context: ContextId, proxy: ProxyId) {
        event_at!(self.level, %context, %proxy, "proxy disposed");
    }

    fn on_teardown_started(&self, context: ContextId, live: usize) {
        event_at!(self.level, %context, live, "context teardown started");
    }

    fn on_teardown_finished(&self, context: ContextId, disposed: usize) {
        event_at!(self.level, %context, disposed, "context teardown finished");
    }
}

// ============================================================================
// CountingTracer: lifecycle counters
// ============================================================================

/// Tracer that counts lifecycle events.
///
/// Retrieve results via [`CountingTracer::report`]. Counters are shared by
/// every context the tracer is attached to.
#[derive(Debug, Default)]
pub struct CountingTracer {
    created: AtomicU64,
    acquisition_failures: AtomicU64,
    disposed: AtomicU64,
    release_failures: AtomicU64,
    teardowns: AtomicU64,
    peak_live: AtomicU64,
}

/// Summary report from a [`CountingTracer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleReport {
    /// Proxies created.
    pub proxies_created: u64,
    /// Creation attempts the bridge refused.
    pub acquisition_failures: u64,
    /// Proxies disposed.
    pub proxies_disposed: u64,
    /// Releases that reported an error.
    pub release_failures: u64,
    /// Teardowns that closed a context.
    pub teardowns: u64,
    /// Highest number of simultaneously outstanding proxies observed.
    pub peak_live: u64,
}

impl LifecycleReport {
    /// Proxies created but not (yet) disposed.
    #[must_use]
    pub fn outstanding(&self) -> u64 {
        self.proxies_created.saturating_sub(self.proxies_disposed)
    }
}

impl CountingTracer {
    /// Creates a tracer with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots the counters.
    #[must_use]
    pub fn report(&self) -> LifecycleReport {
        LifecycleReport {
            proxies_created: self.created.load(Ordering::Relaxed),
            acquisition_failures: self.acquisition_failures.load(Ordering::Relaxed),
            proxies_disposed: self.disposed.load(Ordering::Relaxed),
            release_failures: self.release_failures.load(Ordering::Relaxed),
            teardowns: self.teardowns.load(Ordering::Relaxed),
            peak_live: self.peak_live.load(Ordering::Relaxed),
        }
    }
}

impl LifecycleTracer for CountingTracer {
    #[inline]
    fn on_proxy_created(&self, _context: ContextId, _proxy: ProxyId) {
        let created = self.created.fetch_add(1, Ordering::Relaxed) + 1;
        let outstanding = created.saturating_sub(self.disposed.load(Ordering::Relaxed));
        self.peak_live.fetch_max(outstanding, Ordering::Relaxed);
    }

    fn on_acquisition_failed(&self, _context: ContextId, _error: &(dyn Error + 'static)) {
        self.acquisition_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn on_proxy_disposed(&self, _context: ContextId, _proxy: ProxyId) {
        self.disposed.fetch_add(1, Ordering::Relaxed);
    }

    fn on_release_failed(&self, _context: ContextId, _proxy: ProxyId, _error: &(dyn Error + 'static)) {
        self.release_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn on_teardown_started(&self, _context: ContextId, _live: usize) {
        self.teardowns.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Display for LifecycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Proxy Lifecycle Report ===")?;
        writeln!(f, "Proxies created:      {}", self.proxies_created)?;
        writeln!(f, "Proxies disposed:     {}", self.proxies_disposed)?;
        writeln!(f, "Outstanding:          {}", self.outstanding())?;
        writeln!(f, "Peak live:            {}", self.peak_live)?;
        writeln!(f, "Acquisition failures: {}", self.acquisition_failures)?;
        writeln!(f, "Release failures:     {}", self.release_failures)?;
        write!(f, "Teardowns:            {}", self.teardowns)
    }
}

// ============================================================================
// RecordingTracer: full event recording
// ============================================================================

/// Tracer that records every lifecycle event in order.
///
/// Each hook takes a lock and allocates, so keep it to tests and short
/// debugging sessions.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Mutex<Vec<LifecycleEvent>>,
    /// Optional limit on number of events recorded.
    limit: Option<usize>,
}

impl RecordingTracer {
    /// Creates a recording tracer with no event limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a recording tracer that stops recording after `limit` events.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            events: Mutex::new(Vec::with_capacity(limit.min(1024))),
            limit: Some(limit),
        }
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.lock().clone()
    }

    /// Consumes the tracer and returns the recorded events.
    #[must_use]
    pub fn into_events(self) -> Vec<LifecycleEvent> {
        self.events.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the number of events recorded.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LifecycleEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, event: LifecycleEvent) {
        let mut events = self.lock();
        if self.limit.is_some_and(|l| events.len() >= l) {
            return;
        }
        events.push(event);
    }
}

impl LifecycleTracer for RecordingTracer {
    fn on_proxy_created(&self, context: ContextId, proxy: ProxyId) {
        self.record(LifecycleEvent::ProxyCreated { context, proxy });
    }

    fn on_acquisition_failed(&self, context: ContextId, error: &(dyn Error + 'static)) {
        self.record(LifecycleEvent::AcquisitionFailed {
            context,
            message: error.to_string(),
        });
    }

    fn on_proxy_disposed(&self, context: ContextId, proxy: ProxyId) {
        self.record(LifecycleEvent::ProxyDisposed { context, proxy });
    }

    fn on_release_failed(&self, context: ContextId, proxy: ProxyId, error: &(dyn Error + 'static)) {
        self.record(LifecycleEvent::ReleaseFailed {
            context,
            proxy,
            message: error.to_string(),
        });
    }

    fn on_teardown_started(&self, context: ContextId, live: usize) {
        self.record(LifecycleEvent::TeardownStarted { context, live });
    }

    fn on_teardown_finished(&self, context: ContextId, disposed: usize) {
        self.record(LifecycleEvent::TeardownFinished { context, disposed });
    }
}
