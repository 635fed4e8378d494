//! Listener traits and configuration

use crate::error::EventHandlerError;
use crate::event::Event;
use async_trait::async_trait;
use courier_queue::DEFAULT_RETRIES;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// How a listener wants to be run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerOptions {
    /// Deregister after the first successful handling
    pub once: bool,

    /// Run through the queue system instead of inline
    pub queued: bool,

    /// Run through the isolation strategy instead of inline.
    /// Ignored when `queued` is set.
    pub isolated: bool,

    /// Requested lane; unknown lanes fall back to the configured fallback
    pub queue: Option<String>,

    /// Per-attempt timeout when queued; `None` uses the lane default (60s
    /// unless configured otherwise)
    pub timeout: Option<Duration>,

    /// Additional attempts after a queued failure, clamped to `[0, 30]`
    pub retries: u32,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            once: false,
            queued: false,
            isolated: false,
            queue: None,
            timeout: None,
            retries: DEFAULT_RETRIES,
        }
    }
}

impl ListenerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deregister after the first successful handling.
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    /// Route through the queue system.
    pub fn queued(mut self) -> Self {
        self.queued = true;
        self
    }

    /// Route through the isolation strategy.
    pub fn isolated(mut self) -> Self {
        self.isolated = true;
        self
    }

    /// Request a lane. Implies `queued`.
    pub fn on_queue(mut self, lane: impl Into<String>) -> Self {
        self.queued = true;
        self.queue = Some(lane.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

/// Listener for one event type.
///
/// A single type may implement `Listener` for several event types and be
/// registered against each of them independently.
#[async_trait]
pub trait Listener<E: Event>: Send + Sync + 'static {
    /// Handle the event
    async fn handle(&self, event: &E) -> Result<(), EventHandlerError>;

    /// Execution options, read on every dispatch
    fn options(&self) -> ListenerOptions {
        ListenerOptions::default()
    }

    /// Name used in logs and hooks
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Identity of a registered listener instance.
///
/// Two registrations share an id when they were made from the same `Arc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

impl ListenerId {
    /// Identity of the instance behind `listener`.
    pub fn of<L: ?Sized>(listener: &Arc<L>) -> Self {
        Self(Arc::as_ptr(listener) as *const () as usize)
    }
}

/// Type-erased listener
#[async_trait]
pub trait DynListener: Send + Sync {
    /// Handle event (type-erased)
    async fn handle_dyn(&self, event: &dyn Event) -> Result<(), EventHandlerError>;

    fn options(&self) -> ListenerOptions;

    fn name(&self) -> &str;

    fn id(&self) -> ListenerId;
}

/// Wrapper binding a listener to the event type it was registered for
pub struct TypedListener<E: Event, L: Listener<E>> {
    listener: Arc<L>,
    _phantom: PhantomData<fn(&E)>,
}

impl<E: Event, L: Listener<E>> TypedListener<E, L> {
    pub fn new(listener: Arc<L>) -> Self {
        Self {
            listener,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<E: Event, L: Listener<E>> DynListener for TypedListener<E, L> {
    async fn handle_dyn(&self, event: &dyn Event) -> Result<(), EventHandlerError> {
        match event.as_any().downcast_ref::<E>() {
            Some(typed_event) => Listener::<E>::handle(self.listener.as_ref(), typed_event).await,
            None => Err(EventHandlerError::ProcessingError(format!(
                "listener {} received unexpected event {}",
                Listener::<E>::name(self.listener.as_ref()),
                event.event_name()
            ))),
        }
    }

    fn options(&self) -> ListenerOptions {
        Listener::<E>::options(self.listener.as_ref())
    }

    fn name(&self) -> &str {
        Listener::<E>::name(self.listener.as_ref())
    }

    fn id(&self) -> ListenerId {
        ListenerId::of(&self.listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Ping;

    impl Event for Ping {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Debug)]
    struct Pong;

    impl Event for Pong {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Default)]
    struct Counter {
        pings: AtomicU32,
        pongs: AtomicU32,
    }

    #[async_trait]
    impl Listener<Ping> for Counter {
        async fn handle(&self, _event: &Ping) -> Result<(), EventHandlerError> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn options(&self) -> ListenerOptions {
            ListenerOptions::new().once()
        }
    }

    #[async_trait]
    impl Listener<Pong> for Counter {
        async fn handle(&self, _event: &Pong) -> Result<(), EventHandlerError> {
            self.pongs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &str {
            "pong-counter"
        }
    }

    #[test]
    fn test_default_options() {
        let options = ListenerOptions::default();

        assert!(!options.once);
        assert!(!options.queued);
        assert!(!options.isolated);
        assert_eq!(options.queue, None);
        assert_eq!(options.timeout, None);
        assert_eq!(options.retries, 3);
    }

    #[test]
    fn test_on_queue_implies_queued() {
        let options = ListenerOptions::new()
            .on_queue("emails")
            .with_retries(0)
            .with_timeout(Duration::from_secs(5));

        assert!(options.queued);
        assert_eq!(options.queue.as_deref(), Some("emails"));
        assert_eq!(options.retries, 0);
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_one_instance_many_event_types() {
        let counter = Arc::new(Counter::default());
        let ping: Box<dyn DynListener> = Box::new(TypedListener::<Ping, _>::new(counter.clone()));
        let pong: Box<dyn DynListener> = Box::new(TypedListener::<Pong, _>::new(counter.clone()));

        ping.handle_dyn(&Ping).await.unwrap();
        pong.handle_dyn(&Pong).await.unwrap();
        pong.handle_dyn(&Pong).await.unwrap();

        assert_eq!(counter.pings.load(Ordering::SeqCst), 1);
        assert_eq!(counter.pongs.load(Ordering::SeqCst), 2);
        assert_eq!(ping.id(), pong.id());
        assert!(ping.options().once);
        assert!(!pong.options().once);
        assert_eq!(pong.name(), "pong-counter");
    }

    #[tokio::test]
    async fn test_mismatched_event_is_an_error() {
        let listener = TypedListener::<Ping, _>::new(Arc::new(Counter::default()));
        let result = listener.handle_dyn(&Pong).await;

        assert!(matches!(result, Err(EventHandlerError::ProcessingError(_))));
    }

    #[test]
    fn test_listener_identity() {
        let a = Arc::new(Counter::default());
        let b = Arc::new(Counter::default());

        assert_eq!(ListenerId::of(&a), ListenerId::of(&a.clone()));
        assert_ne!(ListenerId::of(&a), ListenerId::of(&b));
    }
}
