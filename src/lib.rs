// Courier - in-process event dispatch for Rust
//
// Typed events are fired at registered listeners, which run inline, in
// isolation, or on named background lanes with retry and timeout policies.

// Re-export the dispatcher
pub use courier_events::*;

// Re-export the lane system
pub use courier_queue;
pub use courier_queue::{
    DEFAULT_RETRIES, DEFAULT_TIMEOUT, Job, JobId, JobState, LaneWorker, MAX_RETRIES, QueueError,
    QueueResult, QueueRouter,
};

// Needed by listener implementations
pub use async_trait::async_trait;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        DynListener,
        Event,
        EventBus,
        EventBusBuilder,
        EventHandlerError,
        EventHooks,
        FireReport,
        Listener,
        ListenerOptions,
        QueueConfig,
        async_trait,
    };
}
