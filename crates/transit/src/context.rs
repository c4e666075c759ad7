//! Contexts: registries that issue proxies and tear them down in bulk.
//!
//! A [`Context`] owns a bridge and a registry of the proxies it created. The
//! registry holds only `Weak` references; each proxy owns its foreign handle
//! and keeps the context's shared state (and therefore the bridge) alive until
//! it has released that handle. Removing a proxy from the registry is pure
//! bookkeeping and never releases anything by itself.
//!
//! Locking discipline:
//! - the registry lock covers insert, remove, and the teardown snapshot;
//! - a proxy takes its own handle lock before the registry lock, never the
//!   other way around, so teardown disposes its snapshot only after dropping
//!   the registry lock;
//! - upgraded proxy references are never dropped while the registry lock is
//!   held, since the last drop of a proxy re-enters the registry.

use std::{
    error::Error,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
};

use ahash::RandomState;
use indexmap::IndexMap;

use crate::{
    bridge::ForeignBridge,
    config::ContextConfig,
    error::{ReleasePanicked, TransitError, TransitResult},
    proxy::{Proxy, ProxyId, ProxyInner},
    stats::ContextStats,
    tracer::{LifecycleTracer, NoopTracer},
};

static NEXT_CONTEXT_ID: AtomicU32 = AtomicU32::new(1);

/// Process-unique identifier of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ContextId(u32);

impl ContextId {
    fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw integer identifier.
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

struct Registry<B: ForeignBridge, Tr: LifecycleTracer> {
    /// Live proxies in creation order.
    proxies: IndexMap<ProxyId, Weak<ProxyInner<B, Tr>>, RandomState>,
    next_proxy: u64,
    closed: bool,
}

#[derive(Debug, Default)]
struct Counters {
    created: AtomicU64,
    disposed: AtomicU64,
    acquisition_failures: AtomicU64,
    release_failures: AtomicU64,
}

/// State shared between a [`Context`] and every proxy it issued.
pub(crate) struct Shared<B: ForeignBridge, Tr: LifecycleTracer> {
    id: ContextId,
    config: ContextConfig,
    bridge: B,
    tracer: Tr,
    registry: Mutex<Registry<B, Tr>>,
    /// Serializes teardowns so each one returns only after its snapshot is disposed.
    teardown: Mutex<()>,
    counters: Counters,
}

impl<B: ForeignBridge, Tr: LifecycleTracer> Shared<B, Tr> {
    pub(crate) fn id(&self) -> ContextId {
        self.id
    }

    fn lock_registry(&self) -> MutexGuard<'_, Registry<B, Tr>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Removes `proxy` from the registry if it is still there.
    ///
    /// Idempotent, and only bookkeeping: the caller keeps responsibility for
    /// releasing the handle.
    ///
    /// Removal shifts later entries to keep creation order, so it is linear in
    /// the number of live proxies and runs under the registry lock. Contexts
    /// holding many long-lived proxies pay that on every individual dispose;
    /// teardown drains the whole registry in one pass instead.
    pub(crate) fn release_proxy(&self, proxy: ProxyId) -> bool {
        self.lock_registry().proxies.shift_remove(&proxy).is_some()
    }

    /// Hands a handle back to the bridge, swallowing any error.
    ///
    /// A panicking bridge counts as a failed release, so disposal (and the rest
    /// of a teardown) always runs to completion.
    pub(crate) fn release_handle(&self, proxy: ProxyId, handle: B::Handle) {
        match panic::catch_unwind(AssertUnwindSafe(|| self.bridge.release(handle))) {
            Ok(Ok(())) => {}
            Ok(Err(error)) => self.release_failed(proxy, &error),
            Err(payload) => self.release_failed(proxy, &ReleasePanicked::from_payload(&*payload)),
        }
    }

    fn release_failed(&self, proxy: ProxyId, error: &(dyn Error + 'static)) {
        self.counters.release_failures.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            context = %self.id,
            label = self.config.label.as_deref(),
            %proxy,
            %error,
            "foreign handle release failed; proxy disposed anyway"
        );
        self.tracer.on_release_failed(self.id, proxy, error);
    }

    pub(crate) fn proxy_disposed(&self, proxy: ProxyId) {
        self.counters.disposed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(context = %self.id, %proxy, "proxy disposed");
        self.tracer.on_proxy_disposed(self.id, proxy);
    }
}

/// Registry that creates proxies and disposes whatever is left of them on
/// teardown.
///
/// Dropping a context tears it down. Proxies may outlive their context; they
/// are disposed by the teardown and report [`TransitError::UseAfterDispose`]
/// from then on.
///
/// A context is `Sync`; share it between threads by reference or wrap it in an
/// `Arc`.
pub struct Context<B: ForeignBridge, Tr: LifecycleTracer = NoopTracer> {
    shared: Arc<Shared<B, Tr>>,
}

impl<B: ForeignBridge> Context<B> {
    /// Creates a context with the default configuration and no tracer.
    #[must_use]
    pub fn new(bridge: B) -> Self {
        Self::with_config(bridge, ContextConfig::default())
    }

    /// Creates a context with the given configuration and no tracer.
    #[must_use]
    pub fn with_config(bridge: B, config: ContextConfig) -> Self {
        Context::with_tracer(bridge, config, NoopTracer)
    }
}

impl<B: ForeignBridge, Tr: LifecycleTracer> Context<B, Tr> {
    /// Creates a context that reports its lifecycle to `tracer`.
    #[must_use]
    pub fn with_tracer(bridge: B, config: ContextConfig, tracer: Tr) -> Self {
        let registry = Registry {
            proxies: IndexMap::with_capacity_and_hasher(config.registry_capacity, RandomState::new()),
            next_proxy: 1,
            closed: false,
        };
        let id = ContextId::next();
        tracing::debug!(context = %id, label = config.label.as_deref(), "context created");
        Self {
            shared: Arc::new(Shared {
                id,
                config,
                bridge,
                tracer,
                registry: Mutex::new(registry),
                teardown: Mutex::new(()),
                counters: Counters::default(),
            }),
        }
    }

    /// Returns this context's id.
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.shared.id
    }

    /// Returns the configuration the context was created with.
    #[must_use]
    pub fn config(&self) -> &ContextConfig {
        &self.shared.config
    }

    /// Returns the bridge proxies are acquired from.
    #[must_use]
    pub fn bridge(&self) -> &B {
        &self.shared.bridge
    }

    /// Returns the lifecycle tracer.
    #[must_use]
    pub fn tracer(&self) -> &Tr {
        &self.shared.tracer
    }

    /// Acquires a foreign handle for `value` and returns a registered proxy
    /// owning it.
    ///
    /// Acquisition and registration happen under the registry lock, so a
    /// concurrent teardown either sees the new proxy or makes this call fail
    /// with [`TransitError::ContextClosed`]. The tracer's
    /// [`on_proxy_created`](LifecycleTracer::on_proxy_created) hook runs under
    /// the same lock.
    ///
    /// # Errors
    ///
    /// - [`TransitError::ContextClosed`] once teardown has begun;
    /// - [`TransitError::LimitExceeded`] when `max_live_proxies` is reached
    ///   (the bridge is not called);
    /// - [`TransitError::Acquisition`] when the bridge fails. The registry is
    ///   unchanged in every error case.
    pub fn create_proxy(&self, value: B::Value) -> TransitResult<Proxy<B, Tr>> {
        let shared = &self.shared;
        let mut registry = shared.lock_registry();
        if registry.closed {
            drop(registry);
            tracing::debug!(context = %shared.id, "proxy creation rejected: context closed");
            return Err(TransitError::ContextClosed { context: shared.id });
        }
        if let Err(err) = shared.config.check_live_limit(registry.proxies.len()) {
            drop(registry);
            tracing::debug!(context = %shared.id, %err, "proxy creation rejected");
            return Err(err);
        }

        let handle = match shared.bridge.acquire(value) {
            Ok(handle) => handle,
            Err(error) => {
                drop(registry);
                shared.counters.acquisition_failures.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(context = %shared.id, %error, "foreign handle acquisition failed");
                shared.tracer.on_acquisition_failed(shared.id, &error);
                return Err(TransitError::acquisition(error));
            }
        };

        let id = ProxyId::new(registry.next_proxy);
        registry.next_proxy += 1;
        let inner = Arc::new(ProxyInner::new(id, Arc::clone(shared), handle));
        registry.proxies.insert(id, Arc::downgrade(&inner));
        // creation is reported before any teardown can see the proxy
        shared.counters.created.fetch_add(1, Ordering::Relaxed);
        shared.tracer.on_proxy_created(shared.id, id);
        drop(registry);

        tracing::trace!(context = %shared.id, proxy = %id, "proxy created");
        Ok(Proxy::from_inner(inner))
    }

    /// Closes the context and disposes every proxy still registered.
    ///
    /// Idempotent. After it returns, every proxy this context issued reports
    /// `disposed() == true` (proxies whose own disposal was already under way
    /// on another thread finish there) and the registry is empty. Concurrent
    /// teardowns serialize.
    pub fn teardown(&self) {
        let shared = &self.shared;
        let _serial = shared.teardown.lock().unwrap_or_else(PoisonError::into_inner);

        let mut registry = shared.lock_registry();
        let first = !registry.closed;
        registry.closed = true;
        let snapshot: Vec<Arc<ProxyInner<B, Tr>>> = registry
            .proxies
            .drain(..)
            .filter_map(|(_, proxy)| proxy.upgrade())
            .collect();
        drop(registry);

        if first {
            tracing::debug!(
                context = %shared.id,
                label = shared.config.label.as_deref(),
                live = snapshot.len(),
                "context teardown started"
            );
            shared.tracer.on_teardown_started(shared.id, snapshot.len());
        }

        let disposed = snapshot.iter().filter(|proxy| proxy.dispose()).count();
        drop(snapshot);

        if first {
            tracing::debug!(context = %shared.id, disposed, "context teardown finished");
            shared.tracer.on_teardown_finished(shared.id, disposed);
        }
    }

    /// Returns `true` once teardown has begun.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.lock_registry().closed
    }

    /// Returns the number of proxies currently registered.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.shared.lock_registry().proxies.len()
    }

    /// Returns `true` if `proxy` was issued by this context and is still
    /// registered.
    #[must_use]
    pub fn contains(&self, proxy: &Proxy<B, Tr>) -> bool {
        proxy.context_id() == self.shared.id && self.shared.lock_registry().proxies.contains_key(&proxy.id())
    }

    /// Returns handles to every registered proxy, in creation order.
    #[must_use]
    pub fn live_proxies(&self) -> Vec<Proxy<B, Tr>> {
        let registry = self.shared.lock_registry();
        let proxies: Vec<Arc<ProxyInner<B, Tr>>> =
            registry.proxies.values().filter_map(Weak::upgrade).collect();
        drop(registry);
        proxies.into_iter().map(Proxy::from_inner).collect()
    }

    /// Snapshots the context's counters.
    #[must_use]
    pub fn stats(&self) -> ContextStats {
        let (live_proxies, closed) = {
            let registry = self.shared.lock_registry();
            (registry.proxies.len(), registry.closed)
        };
        let counters = &self.shared.counters;
        ContextStats {
            context: self.shared.id,
            label: self.shared.config.label.clone(),
            live_proxies,
            proxies_created: counters.created.load(Ordering::Relaxed),
            proxies_disposed: counters.disposed.load(Ordering::Relaxed),
            acquisition_failures: counters.acquisition_failures.load(Ordering::Relaxed),
            release_failures: counters.release_failures.load(Ordering::Relaxed),
            closed,
        }
    }
}

impl<B: ForeignBridge, Tr: LifecycleTracer> Drop for Context<B, Tr> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<B: ForeignBridge, Tr: LifecycleTracer> fmt::Debug for Context<B, Tr> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (live, closed) = {
            let registry = self.shared.lock_registry();
            (registry.proxies.len(), registry.closed)
        };
        f.debug_struct("Context")
            .field("id", &self.shared.id)
            .field("label", &self.shared.config.label)
            .field("live", &live)
            .field("closed", &closed)
            .field("tracer", &self.shared.tracer)
            .finish_non_exhaustive()
    }
}
