//! Shared test bridge that records every acquire and release.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::{
    collections::HashSet,
    fmt,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use transit::ForeignBridge;

/// Handle produced by [`RecordingBridge`]: the value it was acquired for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FakeHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeError {
    Refused(u64),
    ReleaseFailed(u64),
}

impl fmt::Display for FakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Refused(value) => write!(f, "refused to acquire {value}"),
            Self::ReleaseFailed(value) => write!(f, "could not release {value}"),
        }
    }
}

impl std::error::Error for FakeError {}

/// Bridge that hands out `FakeHandle(value)` and records releases.
#[derive(Debug, Default)]
pub struct RecordingBridge {
    acquired: AtomicUsize,
    released: Mutex<Vec<u64>>,
    refuse: Mutex<HashSet<u64>>,
    fail_releases: AtomicBool,
    panic_releases: AtomicBool,
}

impl RecordingBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `acquire` fail for `value`.
    pub fn refuse(&self, value: u64) {
        self.refuse.lock().unwrap().insert(value);
    }

    /// Makes every release report an error (after recording it).
    pub fn fail_releases(&self) {
        self.fail_releases.store(true, Ordering::SeqCst);
    }

    /// Makes every release panic (after recording it).
    pub fn panic_releases(&self) {
        self.panic_releases.store(true, Ordering::SeqCst);
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> Vec<u64> {
        self.released.lock().unwrap().clone()
    }

    pub fn release_count(&self) -> usize {
        self.released.lock().unwrap().len()
    }

    pub fn release_count_of(&self, value: u64) -> usize {
        self.released.lock().unwrap().iter().filter(|v| **v == value).count()
    }
}

impl ForeignBridge for RecordingBridge {
    type Value = u64;
    type Handle = FakeHandle;
    type Error = FakeError;

    fn acquire(&self, value: u64) -> Result<FakeHandle, FakeError> {
        if self.refuse.lock().unwrap().contains(&value) {
            return Err(FakeError::Refused(value));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(FakeHandle(value))
    }

    fn release(&self, handle: FakeHandle) -> Result<(), FakeError> {
        self.released.lock().unwrap().push(handle.0);
        assert!(
            !self.panic_releases.load(Ordering::SeqCst),
            "release exploded for {}",
            handle.0
        );
        if self.fail_releases.load(Ordering::SeqCst) {
            return Err(FakeError::ReleaseFailed(handle.0));
        }
        Ok(())
    }
}

/// Installs a test-writer subscriber so `tracing` output shows up on failures.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("transit=trace")
        .try_init();
}
