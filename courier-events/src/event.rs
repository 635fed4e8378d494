//! Event definitions and per-event hooks

use crate::error::EventHandlerError;
use crate::listener::DynListener;
use std::any::{Any, TypeId};
use std::fmt::Debug;

/// Event trait
///
/// All events must implement this trait to be fired through the event bus.
/// Dispatch is keyed on the concrete runtime type reached through
/// [`Event::as_any`], so a type-erased `Arc<dyn Event>` still reaches the
/// listeners of its concrete type.
pub trait Event: Send + Sync + Debug + 'static {
    /// Get event name, used in logs
    fn event_name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Cast to Any for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Per-event hooks, if this event carries any
    fn hooks(&self) -> Option<&dyn EventHooks> {
        None
    }
}

/// Optional per-event hooks.
///
/// They run before the global hooks of the same kind; both run.
pub trait EventHooks: Send + Sync {
    /// Return `false` to skip a listener for this event.
    fn should_handle(&self) -> bool {
        true
    }

    /// Called before a listener runs (or is queued).
    fn before_handle(&self, _listener: &dyn DynListener) {}

    /// Called for every failed listener attempt.
    fn on_error(&self, _error: &EventHandlerError) {}
}

/// Runtime type identity of an event.
pub fn event_type_id(event: &dyn Event) -> TypeId {
    event.as_any().type_id()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Ping {
        n: u32,
    }

    impl Event for Ping {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Debug)]
    struct Muted;

    impl EventHooks for Muted {
        fn should_handle(&self) -> bool {
            false
        }
    }

    impl Event for Muted {
        fn event_name(&self) -> &str {
            "muted"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn hooks(&self) -> Option<&dyn EventHooks> {
            Some(self)
        }
    }

    #[test]
    fn test_runtime_type_survives_erasure() {
        let erased: Arc<dyn Event> = Arc::new(Ping { n: 1 });

        assert_eq!(event_type_id(erased.as_ref()), TypeId::of::<Ping>());
        assert_eq!(erased.as_any().downcast_ref::<Ping>().map(|p| p.n), Some(1));
    }

    #[test]
    fn test_default_event_name() {
        assert!(Ping { n: 0 }.event_name().ends_with("Ping"));
        assert_eq!(Muted.event_name(), "muted");
    }

    #[test]
    fn test_hooks_capability() {
        assert!(Ping { n: 0 }.hooks().is_none());
        assert!(Muted.hooks().is_some_and(|hooks| !hooks.should_handle()));
    }
}
