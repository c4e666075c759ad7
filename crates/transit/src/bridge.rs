//! The capability a [`Context`](crate::Context) needs from the foreign runtime.
//!
//! Transit never allocates foreign representations itself. Whatever owns the
//! foreign runtime (an encoder, an FFI layer, a JS bridge) implements
//! [`ForeignBridge`] and hands it to a context, which then calls
//! [`ForeignBridge::acquire`] once per proxy it creates and lets each proxy call
//! [`ForeignBridge::release`] exactly once when it is disposed.

use std::{error::Error, sync::Arc};

/// Acquires and releases foreign handles on behalf of a context.
///
/// Implementations are shared between the context and every proxy it issues,
/// and both calls may arrive from arbitrary threads, hence the `Send + Sync`
/// bound.
pub trait ForeignBridge: Send + Sync {
    /// The host value a foreign representation is created for.
    type Value;
    /// The foreign handle owned by a live proxy.
    type Handle: Send;
    /// Error reported by either capability.
    type Error: Error + Send + Sync + 'static;

    /// Allocates (or references) the foreign representation of `value`.
    ///
    /// A failure here is terminal for that creation attempt: the context
    /// surfaces it as [`TransitError::Acquisition`](crate::TransitError::Acquisition)
    /// and does not register anything.
    fn acquire(&self, value: Self::Value) -> Result<Self::Handle, Self::Error>;

    /// Releases a handle previously returned by [`Self::acquire`].
    ///
    /// Called at most once per handle. Errors are reported as diagnostics and
    /// never propagated to whoever triggered the disposal.
    fn release(&self, handle: Self::Handle) -> Result<(), Self::Error>;
}

impl<B: ForeignBridge + ?Sized> ForeignBridge for Arc<B> {
    type Value = B::Value;
    type Handle = B::Handle;
    type Error = B::Error;

    #[inline]
    fn acquire(&self, value: Self::Value) -> Result<Self::Handle, Self::Error> {
        (**self).acquire(value)
    }

    #[inline]
    fn release(&self, handle: Self::Handle) -> Result<(), Self::Error> {
        (**self).release(handle)
    }
}
