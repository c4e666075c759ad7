//! Proxies: client-side handles to one foreign resource each.
//!
//! A proxy moves through exactly two states, `Live` and `Disposed`. Disposal is
//! reachable from three places: an explicit [`Proxy::dispose`] call, the owning
//! context's teardown, and the drop of the last clone of the proxy. All three
//! run the same idempotent routine, so they may race freely; exactly one of
//! them releases the handle.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{
    bridge::ForeignBridge,
    context::{ContextId, Shared},
    error::{TransitError, TransitResult},
    tracer::{LifecycleTracer, NoopTracer},
};

/// Identifier of a proxy within its context.
///
/// Ids are handed out in creation order and never reused by the same context.
/// They are only unique per context; pair them with a [`ContextId`] when
/// proxies from several contexts meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ProxyId(u64);

impl ProxyId {
    /// Creates a proxy ID from a raw integer.
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw integer identifier.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Observable lifecycle state of a proxy.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::IntoStaticStr,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProxyState {
    /// The proxy owns its foreign handle.
    Live,
    /// The handle has been released; the proxy can never become live again.
    Disposed,
}

/// Handle to one foreign-resource-backed value.
///
/// Cloning a proxy yields another handle to the same resource; disposing any
/// clone disposes them all. When the last clone is dropped the proxy disposes
/// itself.
pub struct Proxy<B: ForeignBridge, Tr: LifecycleTracer = NoopTracer> {
    inner: Arc<ProxyInner<B, Tr>>,
}

/// State shared by all clones of a proxy. The context's registry points here
/// through a `Weak`.
pub(crate) struct ProxyInner<B: ForeignBridge, Tr: LifecycleTracer> {
    id: ProxyId,
    context: Arc<Shared<B, Tr>>,
    /// `Some` while live. Taking the handle out is what serializes disposal.
    handle: Mutex<Option<B::Handle>>,
    disposed: AtomicBool,
}

impl<B: ForeignBridge, Tr: LifecycleTracer> ProxyInner<B, Tr> {
    pub(crate) fn new(id: ProxyId, context: Arc<Shared<B, Tr>>, handle: B::Handle) -> Self {
        Self {
            id,
            context,
            handle: Mutex::new(Some(handle)),
            disposed: AtomicBool::new(false),
        }
    }

    fn lock_handle(&self) -> MutexGuard<'_, Option<B::Handle>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs the disposal protocol. Returns `true` for the one call that
    /// actually released the handle.
    ///
    /// The handle lock is held until the flag is set, so concurrent callers
    /// return only after disposal has completed.
    pub(crate) fn dispose(&self) -> bool {
        let mut slot = self.lock_handle();
        let Some(handle) = slot.take() else {
            return false;
        };
        self.context.release_proxy(self.id);
        self.context.release_handle(self.id, handle);
        self.disposed.store(true, Ordering::Release);
        drop(slot);
        self.context.proxy_disposed(self.id);
        true
    }
}

impl<B: ForeignBridge, Tr: LifecycleTracer> Drop for ProxyInner<B, Tr> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<B: ForeignBridge, Tr: LifecycleTracer> Proxy<B, Tr> {
    pub(crate) fn from_inner(inner: Arc<ProxyInner<B, Tr>>) -> Self {
        Self { inner }
    }

    /// Returns this proxy's id within its context.
    #[must_use]
    pub fn id(&self) -> ProxyId {
        self.inner.id
    }

    /// Returns the id of the context that issued this proxy.
    #[must_use]
    pub fn context_id(&self) -> ContextId {
        self.inner.context.id()
    }

    /// Returns `true` once disposal has completed.
    ///
    /// A `dispose()` that has returned is visible here from every thread.
    #[must_use]
    pub fn disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Returns the proxy's lifecycle state.
    #[must_use]
    pub fn state(&self) -> ProxyState {
        if self.disposed() {
            ProxyState::Disposed
        } else {
            ProxyState::Live
        }
    }

    /// Releases the foreign handle and marks the proxy disposed.
    ///
    /// Calling this on a disposed proxy is a no-op. Release errors reported by
    /// the bridge are logged and counted, never returned.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Runs `f` with the live foreign handle.
    ///
    /// The proxy cannot be disposed while `f` runs; `f` must therefore not
    /// dispose this proxy itself.
    pub fn with_handle<R>(&self, f: impl FnOnce(&B::Handle) -> R) -> TransitResult<R> {
        let slot = self.inner.lock_handle();
        match slot.as_ref() {
            Some(handle) => Ok(f(handle)),
            None => Err(TransitError::UseAfterDispose { proxy: self.inner.id }),
        }
    }

    /// Runs `f` with mutable access to the live foreign handle.
    ///
    /// Same restrictions as [`Self::with_handle`].
    pub fn with_handle_mut<R>(&self, f: impl FnOnce(&mut B::Handle) -> R) -> TransitResult<R> {
        let mut slot = self.inner.lock_handle();
        match slot.as_mut() {
            Some(handle) => Ok(f(handle)),
            None => Err(TransitError::UseAfterDispose { proxy: self.inner.id }),
        }
    }
}

impl<B: ForeignBridge, Tr: LifecycleTracer> Clone for Proxy<B, Tr> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: ForeignBridge, Tr: LifecycleTracer> PartialEq for Proxy<B, Tr> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<B: ForeignBridge, Tr: LifecycleTracer> Eq for Proxy<B, Tr> {}

impl<B: ForeignBridge, Tr: LifecycleTracer> Hash for Proxy<B, Tr> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.context_id().hash(state);
        self.id().hash(state);
    }
}

impl<B: ForeignBridge, Tr: LifecycleTracer> fmt::Debug for Proxy<B, Tr> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("id", &self.id())
            .field("context", &self.context_id())
            .field("state", &self.state())
            .finish()
    }
}

impl<B: ForeignBridge, Tr: LifecycleTracer> fmt::Display for Proxy<B, Tr> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<proxy {} of {}>", self.id(), self.context_id())
    }
}
