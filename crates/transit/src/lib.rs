#![doc = include_str!("../../../README.md")]

mod bridge;
mod config;
mod context;
mod error;
mod proxy;
pub mod retain;
mod stats;
pub mod tracer;

pub use crate::{
    bridge::ForeignBridge,
    config::ContextConfig,
    context::{Context, ContextId},
    error::{ForeignError, TransitError, TransitResult},
    proxy::{Proxy, ProxyId, ProxyState},
    stats::ContextStats,
    tracer::{
        CountingTracer, LifecycleEvent, LifecycleReport, LifecycleTracer, LogTracer, NoopTracer, RecordingTracer,
    },
};
