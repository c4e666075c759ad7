//! In-process retain table usable as a [`ForeignBridge`].
//!
//! This is the host-side half of the Transit JS bridge: elements that cannot be
//! encoded by value (objects with identity, callable functions) are parked in a
//! table and referenced across the bridge by a magic string id. Ids combine a
//! kind prefix with a counter that starts at 1 and never repeats:
//!
//! | Kind | Example id |
//! |------|------------|
//! | [`RetainKind::Object`] | `__TRANSIT_OBJECT_PROXY_1` |
//! | [`RetainKind::Function`] | `__TRANSIT_JS_FUNCTION_2` |
//!
//! Releasing an id that is not retained is an error, which a [`Context`]
//! reports as a release failure without failing the disposal.
//!
//! [`Context`]: crate::Context

use std::{
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};

use ahash::AHashMap;

use crate::bridge::ForeignBridge;

/// Id prefix of retained objects.
pub const OBJECT_PREFIX: &str = "__TRANSIT_OBJECT_PROXY_";
/// Id prefix of retained functions.
pub const FUNCTION_PREFIX: &str = "__TRANSIT_JS_FUNCTION_";

/// What kind of element an id refers to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr, serde::Serialize, serde::Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RetainKind {
    Object,
    Function,
}

impl RetainKind {
    /// Returns the magic prefix ids of this kind start with.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Object => OBJECT_PREFIX,
            Self::Function => FUNCTION_PREFIX,
        }
    }
}

/// An element handed to the table, tagged with its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element<T> {
    pub kind: RetainKind,
    pub payload: T,
}

impl<T> Element<T> {
    /// Wraps `payload` as an object element.
    pub fn object(payload: T) -> Self {
        Self {
            kind: RetainKind::Object,
            payload,
        }
    }

    /// Wraps `payload` as a function element.
    pub fn function(payload: T) -> Self {
        Self {
            kind: RetainKind::Function,
            payload,
        }
    }
}

/// Magic string id of a retained element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RetainId(String);

impl RetainId {
    fn new(kind: RetainKind, serial: u64) -> Self {
        Self(format!("{}{serial}", kind.prefix()))
    }

    /// Splits a magic id into its kind and serial number.
    ///
    /// Returns `None` for strings without a known prefix or whose suffix is
    /// not a canonical decimal serial (digits only, no leading zero).
    ///
    /// ```
    /// use transit::retain::{RetainId, RetainKind};
    ///
    /// assert_eq!(RetainId::parse("__TRANSIT_JS_FUNCTION_12"), Some((RetainKind::Function, 12)));
    /// assert_eq!(RetainId::parse("__TRANSIT_OBJECT_PROXY_x"), None);
    /// assert_eq!(RetainId::parse("__TRANSIT_OBJECT_PROXY_01"), None);
    /// ```
    #[must_use]
    pub fn parse(id: &str) -> Option<(RetainKind, u64)> {
        [RetainKind::Object, RetainKind::Function].into_iter().find_map(|kind| {
            let serial = id.strip_prefix(kind.prefix())?;
            let digits = !serial.is_empty() && serial.bytes().all(|b| b.is_ascii_digit());
            let padded = serial.len() > 1 && serial.starts_with('0');
            if !digits || padded {
                return None;
            }
            serial.parse().ok().map(|serial| (kind, serial))
        })
    }

    /// Reconstructs an id received back from the foreign side.
    #[must_use]
    pub fn from_wire(id: &str) -> Option<Self> {
        Self::parse(id).map(|(kind, serial)| Self::new(kind, serial))
    }

    /// Returns the id as sent over the bridge.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the kind encoded in the id's prefix.
    #[must_use]
    pub fn kind(&self) -> Option<RetainKind> {
        Self::parse(&self.0).map(|(kind, _)| kind)
    }
}

impl fmt::Display for RetainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors reported by a [`RetainTable`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetainError {
    /// The id is unknown or was already released.
    #[error("no retained element with id {0}")]
    NotRetained(RetainId),
    /// The table's capacity limit is reached.
    #[error("retain table is full ({limit} elements)")]
    Exhausted { limit: usize },
}

struct RetainState<T> {
    retained: AHashMap<RetainId, Element<T>>,
    last_retain_id: u64,
}

/// Table of retained elements keyed by magic id.
pub struct RetainTable<T> {
    state: Mutex<RetainState<T>>,
    limit: Option<usize>,
}

impl<T> RetainTable<T> {
    /// Creates an empty, unbounded table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RetainState {
                retained: AHashMap::new(),
                last_retain_id: 0,
            }),
            limit: None,
        }
    }

    /// Creates an empty table that refuses to hold more than `limit` elements.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new()
        }
    }

    fn lock(&self) -> MutexGuard<'_, RetainState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Parks `element` in the table and returns its new id.
    pub fn retain_element(&self, element: Element<T>) -> Result<RetainId, RetainError> {
        let mut state = self.lock();
        if let Some(limit) = self.limit
            && state.retained.len() >= limit
        {
            return Err(RetainError::Exhausted { limit });
        }
        state.last_retain_id += 1;
        let id = RetainId::new(element.kind, state.last_retain_id);
        state.retained.insert(id.clone(), element);
        Ok(id)
    }

    /// Removes the element retained under `id` and returns it.
    pub fn release_element(&self, id: &RetainId) -> Result<Element<T>, RetainError> {
        self.lock()
            .retained
            .remove(id)
            .ok_or_else(|| RetainError::NotRetained(id.clone()))
    }

    /// Returns `true` if `id` is currently retained.
    #[must_use]
    pub fn is_retained(&self, id: &RetainId) -> bool {
        self.lock().retained.contains_key(id)
    }

    /// Returns the number of retained elements.
    #[must_use]
    pub fn retained_count(&self) -> usize {
        self.lock().retained.len()
    }

    /// Runs `f` on the element retained under `id`, if any.
    pub fn with_element<R>(&self, id: &RetainId, f: impl FnOnce(&Element<T>) -> R) -> Option<R> {
        self.lock().retained.get(id).map(f)
    }

    /// Returns a copy of the payload retained under `id`.
    #[must_use]
    pub fn get(&self, id: &RetainId) -> Option<T>
    where
        T: Clone,
    {
        self.with_element(id, |element| element.payload.clone())
    }
}

impl<T> Default for RetainTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for RetainTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("RetainTable")
            .field("retained", &state.retained.len())
            .field("last_retain_id", &state.last_retain_id)
            .field("limit", &self.limit)
            .finish()
    }
}

impl<T: Send> ForeignBridge for RetainTable<T> {
    type Value = Element<T>;
    type Handle = RetainId;
    type Error = RetainError;

    fn acquire(&self, value: Element<T>) -> Result<RetainId, RetainError> {
        self.retain_element(value)
    }

    fn release(&self, handle: RetainId) -> Result<(), RetainError> {
        self.release_element(&handle).map(drop)
    }
}
