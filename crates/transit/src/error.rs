use std::{any::Any, error::Error};

use crate::{context::ContextId, proxy::ProxyId};

/// Boxed error reported by a [`ForeignBridge`](crate::ForeignBridge).
pub type ForeignError = Box<dyn Error + Send + Sync + 'static>;

/// Errors surfaced by contexts and proxies.
///
/// Disposal never produces one of these: release failures are logged and
/// counted instead, so `dispose()` stays safe to call from teardown and `Drop`.
#[derive(Debug, thiserror::Error)]
pub enum TransitError {
    /// The bridge could not acquire a foreign handle. No proxy was created and
    /// the registry is unchanged.
    #[error("could not acquire foreign handle: {source}")]
    Acquisition {
        #[source]
        source: ForeignError,
    },
    /// An operation that needs the foreign handle ran on a disposed proxy.
    #[error("proxy {proxy} used after dispose")]
    UseAfterDispose { proxy: ProxyId },
    /// The context has been torn down and no longer issues proxies.
    #[error("context {context} is closed")]
    ContextClosed { context: ContextId },
    /// The configured live-proxy limit is reached.
    #[error("live proxy limit exceeded: {live} >= {limit}")]
    LimitExceeded { limit: usize, live: usize },
}

impl TransitError {
    pub(crate) fn acquisition(source: impl Error + Send + Sync + 'static) -> Self {
        Self::Acquisition {
            source: Box::new(source),
        }
    }
}

/// Release failure recorded when the bridge panicked instead of returning an error.
#[derive(Debug, thiserror::Error)]
#[error("bridge panicked while releasing: {message}")]
pub(crate) struct ReleasePanicked {
    message: String,
}

impl ReleasePanicked {
    pub(crate) fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|msg| (*msg).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Self { message }
    }
}

/// Result alias used throughout the crate.
pub type TransitResult<T> = Result<T, TransitError>;
