//! Listener registry keyed by event type

use crate::listener::{DynListener, ListenerId};
use dashmap::DashMap;
use std::any::TypeId;
use std::sync::Arc;

/// Mapping from event type to its listeners in registration order.
///
/// Duplicates are allowed. Dispatch works on [`Registry::snapshot`], so
/// listeners may register or remove listeners while an event is in flight.
#[derive(Default)]
pub struct Registry {
    listeners: DashMap<TypeId, Vec<Arc<dyn DynListener>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener for an event type.
    pub fn register(&self, type_id: TypeId, listener: Arc<dyn DynListener>) {
        self.listeners.entry(type_id).or_default().push(listener);
    }

    /// Remove the first listener with the given identity. Returns whether
    /// anything was removed.
    pub fn remove(&self, type_id: TypeId, id: ListenerId) -> bool {
        let Some(mut listeners) = self.listeners.get_mut(&type_id) else {
            return false;
        };

        match listeners.iter().position(|listener| listener.id() == id) {
            Some(index) => {
                listeners.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove every listener for an event type.
    pub fn remove_all(&self, type_id: TypeId) {
        self.listeners.remove(&type_id);
    }

    /// Remove every listener.
    pub fn clear(&self) {
        self.listeners.clear();
    }

    pub fn count(&self, type_id: TypeId) -> usize {
        self.listeners
            .get(&type_id)
            .map(|listeners| listeners.len())
            .unwrap_or(0)
    }

    pub fn has(&self, type_id: TypeId) -> bool {
        self.count(type_id) > 0
    }

    /// Copy of the listener list for an event type.
    pub fn snapshot(&self, type_id: TypeId) -> Vec<Arc<dyn DynListener>> {
        self.listeners
            .get(&type_id)
            .map(|listeners| listeners.clone())
            .unwrap_or_default()
    }
}
