//! Global hook tables
//!
//! Three keyed tables of callbacks cross-cut every dispatch:
//! should-handle (suppression), before-handle and on-error. Keys are
//! caller-chosen; setting an existing key replaces its callback. Evaluation
//! order inside one table is unspecified.
//!
//! Per-event hooks ([`EventHooks`]) always run first, then the global ones.
//! Hooks are not error-wrapped: a panicking should-handle or before-handle
//! hook unwinds through `EventBus::fire`.

use crate::error::EventHandlerError;
use crate::event::{Event, EventHooks};
use crate::listener::DynListener;
use dashmap::DashMap;
use std::sync::Arc;

/// Called before a listener runs or is queued.
pub type BeforeHandleHook = Arc<dyn Fn(&dyn Event, &dyn DynListener) + Send + Sync>;

/// Returns `false` to skip a listener.
pub type ShouldHandleHook = Arc<dyn Fn(&dyn Event) -> bool + Send + Sync>;

/// Called for every failed listener attempt.
pub type ErrorHook = Arc<dyn Fn(&dyn Event, &EventHandlerError) + Send + Sync>;

/// A keyed table of callbacks.
pub struct HookTable<H> {
    entries: DashMap<String, H>,
}

impl<H> Default for HookTable<H> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<H: Clone> HookTable<H> {
    /// Insert or replace. Returns the replaced callback.
    pub fn set(&self, key: impl Into<String>, hook: H) -> Option<H> {
        self.entries.insert(key.into(), hook)
    }

    /// Remove by key. Returns whether a callback was removed.
    pub fn unset(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of the current callbacks; no lock is held while they run.
    pub fn snapshot(&self) -> Vec<H> {
        self.entries.iter().map(|entry| entry.value().clone()).collect()
    }
}

/// The three global tables.
#[derive(Default)]
pub struct HookTables {
    pub before_handle: HookTable<BeforeHandleHook>,
    pub should_handle: HookTable<ShouldHandleHook>,
    pub on_error: HookTable<ErrorHook>,
}

impl HookTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppression chain. Stops at the first `false`.
    pub fn should_handle(&self, event: &dyn Event) -> bool {
        if event.hooks().is_some_and(|hooks| !hooks.should_handle()) {
            return false;
        }

        self.should_handle.snapshot().iter().all(|hook| hook(event))
    }

    /// Before-handle chain.
    pub fn before_handle(&self, event: &dyn Event, listener: &dyn DynListener) {
        if let Some(hooks) = event.hooks() {
            hooks.before_handle(listener);
        }

        for hook in self.before_handle.snapshot() {
            hook(event, listener);
        }
    }

    /// Error chain.
    pub fn report_error(&self, event: &dyn Event, error: &EventHandlerError) {
        if let Some(hooks) = event.hooks() {
            EventHooks::on_error(hooks, error);
        }

        for hook in self.on_error.snapshot() {
            hook(event, error);
        }
    }
}
