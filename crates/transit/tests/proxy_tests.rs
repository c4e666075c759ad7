//! Tests for the proxy disposal protocol: idempotence, use-after-dispose,
//! scope-exit disposal, and concurrent disposal.

mod common;

use std::sync::{Arc, Barrier};

use common::{FakeHandle, RecordingBridge};
use pretty_assertions::assert_eq;
use transit::{Context, ProxyState, TransitError};

fn context() -> (Arc<RecordingBridge>, Context<Arc<RecordingBridge>>) {
    common::init_tracing();
    let bridge = Arc::new(RecordingBridge::new());
    let ctx = Context::new(Arc::clone(&bridge));
    (bridge, ctx)
}

// ============================================================================
// Explicit dispose
// ============================================================================

#[test]
fn new_proxy_is_live_and_registered() {
    let (bridge, ctx) = context();
    let proxy = ctx.create_proxy(10).expect("should acquire");

    assert!(!proxy.disposed());
    assert_eq!(proxy.state(), ProxyState::Live);
    assert!(ctx.contains(&proxy));
    assert_eq!(bridge.acquired(), 1);
    assert_eq!(bridge.release_count(), 0);
}

#[test]
fn dispose_releases_and_unregisters() {
    let (bridge, ctx) = context();
    let proxy = ctx.create_proxy(10).expect("should acquire");

    proxy.dispose();

    assert!(proxy.disposed());
    assert_eq!(proxy.state(), ProxyState::Disposed);
    assert!(!ctx.contains(&proxy));
    assert_eq!(ctx.live_count(), 0);
    assert_eq!(bridge.released(), vec![10]);
}

#[test]
fn repeated_dispose_releases_exactly_once() {
    let (bridge, ctx) = context();
    let proxy = ctx.create_proxy(10).expect("should acquire");

    for _ in 0..5 {
        proxy.dispose();
    }

    assert!(proxy.disposed());
    assert_eq!(bridge.release_count_of(10), 1);
    assert_eq!(ctx.stats().proxies_disposed, 1);
}

#[test]
fn disposing_one_proxy_leaves_others_alone() {
    let (bridge, ctx) = context();
    let first = ctx.create_proxy(1).expect("should acquire");
    let second = ctx.create_proxy(2).expect("should acquire");

    first.dispose();

    assert!(!second.disposed());
    assert!(ctx.contains(&second));
    assert_eq!(second.with_handle(|h| *h).expect("live proxy"), FakeHandle(2));
    assert_eq!(bridge.released(), vec![1]);
}

// ============================================================================
// Handle access
// ============================================================================

#[test]
fn with_handle_sees_the_acquired_handle() {
    let (_bridge, ctx) = context();
    let proxy = ctx.create_proxy(42).expect("should acquire");

    assert_eq!(proxy.with_handle(|h| h.0).expect("live proxy"), 42);
}

#[test]
fn with_handle_mut_changes_what_is_released() {
    let (bridge, ctx) = context();
    let proxy = ctx.create_proxy(1).expect("should acquire");

    proxy.with_handle_mut(|h| h.0 = 99).expect("live proxy");
    proxy.dispose();

    assert_eq!(bridge.released(), vec![99]);
}

#[test]
fn handle_access_after_dispose_is_an_error() {
    let (_bridge, ctx) = context();
    let proxy = ctx.create_proxy(1).expect("should acquire");
    let id = proxy.id();
    proxy.dispose();

    let err = proxy.with_handle(|h| *h).expect_err("disposed proxy");
    assert!(matches!(err, TransitError::UseAfterDispose { proxy } if proxy == id));
    assert_eq!(err.to_string(), format!("proxy {id} used after dispose"));

    let err = proxy.with_handle_mut(|h| h.0 += 1).expect_err("disposed proxy");
    assert!(matches!(err, TransitError::UseAfterDispose { .. }));
}

// ============================================================================
// Scope exit and clones
// ============================================================================

#[test]
fn dropping_the_last_clone_disposes() {
    let (bridge, ctx) = context();
    let proxy = ctx.create_proxy(5).expect("should acquire");
    let clone = proxy.clone();

    drop(proxy);
    assert_eq!(bridge.release_count(), 0);
    assert_eq!(ctx.live_count(), 1);

    drop(clone);
    assert_eq!(bridge.released(), vec![5]);
    assert_eq!(ctx.live_count(), 0);
}

#[test]
fn scope_exit_after_explicit_dispose_does_not_release_again() {
    let (bridge, ctx) = context();
    {
        let proxy = ctx.create_proxy(5).expect("should acquire");
        proxy.dispose();
    }
    assert_eq!(bridge.release_count_of(5), 1);
}

#[test]
fn clones_share_state() {
    let (_bridge, ctx) = context();
    let proxy = ctx.create_proxy(5).expect("should acquire");
    let clone = proxy.clone();

    assert_eq!(proxy, clone);
    clone.dispose();
    assert!(proxy.disposed());
}

#[test]
fn proxies_with_equal_handles_are_distinct() {
    let (_bridge, ctx) = context();
    let a = ctx.create_proxy(5).expect("should acquire");
    let b = ctx.create_proxy(5).expect("should acquire");

    assert_ne!(a, b);
    assert_ne!(a.id(), b.id());
}

#[test]
fn proxy_display_names_id_and_context() {
    let (_bridge, ctx) = context();
    let proxy = ctx.create_proxy(5).expect("should acquire");

    assert_eq!(proxy.to_string(), format!("<proxy #{} of {}>", proxy.id().raw(), ctx.id()));
    assert_eq!(proxy.state().to_string(), "live");
}

#[test]
fn proxy_outlives_its_context() {
    let (bridge, ctx) = context();
    let proxy = ctx.create_proxy(5).expect("should acquire");

    drop(ctx);

    assert!(proxy.disposed());
    assert_eq!(bridge.released(), vec![5]);
    assert!(proxy.with_handle(|_| ()).is_err());
    proxy.dispose();
    assert_eq!(bridge.release_count(), 1);
}

// ============================================================================
// Concurrent disposal
// ============================================================================

#[test]
fn concurrent_dispose_releases_exactly_once() {
    const THREADS: usize = 16;

    for round in 0..20 {
        let (bridge, ctx) = context();
        let proxy = ctx.create_proxy(round).expect("should acquire");
        let barrier = Barrier::new(THREADS);

        std::thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    barrier.wait();
                    proxy.dispose();
                    // every caller observes completion once its dispose returns
                    assert!(proxy.disposed());
                });
            }
        });

        assert_eq!(bridge.release_count_of(round), 1);
        assert_eq!(ctx.stats().proxies_disposed, 1);
    }
}

#[test]
fn concurrent_dispose_and_drop_release_exactly_once() {
    let (bridge, ctx) = context();
    let proxies: Vec<_> = (0..64).map(|v| ctx.create_proxy(v).expect("should acquire")).collect();

    std::thread::scope(|s| {
        for proxy in &proxies {
            let clone = proxy.clone();
            s.spawn(move || clone.dispose());
        }
    });
    drop(proxies);

    let mut released = bridge.released();
    released.sort_unstable();
    assert_eq!(released, (0..64).collect::<Vec<_>>());
    assert_eq!(ctx.live_count(), 0);
}
