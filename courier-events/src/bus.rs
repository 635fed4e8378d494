//! Event Bus implementation

use crate::error::EventHandlerError;
use crate::event::{Event, event_type_id};
use crate::hooks::{BeforeHandleHook, ErrorHook, HookTables, ShouldHandleHook};
use crate::isolation::{Isolation, SpawnIsolation};
use crate::listener::{DynListener, Listener, ListenerId, ListenerOptions, TypedListener};
use crate::registry::Registry;
use courier_queue::{BoxError, Job, QueueConfig, QueueRouter, panic_message};
use futures::FutureExt;
use std::any::TypeId;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Event bus for in-process event dispatch
///
/// Listeners run one after another in registration order. Inline and
/// isolated listeners are awaited by [`EventBus::fire`]; queued listeners
/// are handed to their lane and run later.
#[derive(Clone)]
pub struct EventBus {
    registry: Arc<Registry>,
    hooks: Arc<HookTables>,
    router: Arc<QueueRouter>,
    isolation: Arc<dyn Isolation>,
    config: Arc<EventBusConfig>,
}

/// Event bus configuration
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Enable per-fire logging
    pub enable_logging: bool,

    /// Lane configuration installed at construction
    pub queue: Option<QueueConfig>,

    /// Runtime that lane workers run on. Defaults to the runtime current
    /// when the lanes are configured or first used.
    pub runtime: Option<Handle>,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            enable_logging: true,
            queue: None,
            runtime: None,
        }
    }
}

/// What one `fire` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FireReport {
    /// Listeners run inline or isolated
    pub invoked: usize,

    /// Listeners handed to a lane
    pub queued: usize,

    /// Listeners skipped by a should-handle hook
    pub suppressed: usize,

    /// Inline or isolated listeners that failed
    pub failed: usize,
}

impl EventBus {
    /// Create new event bus
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Create event bus with custom config
    pub fn with_config(config: EventBusConfig) -> Self {
        Self::from_parts(config, Arc::new(SpawnIsolation))
    }

    fn from_parts(config: EventBusConfig, isolation: Arc<dyn Isolation>) -> Self {
        let router = QueueRouter::new();
        if let Some(runtime) = &config.runtime {
            router.set_runtime(runtime.clone());
        }
        if let Some(queue) = &config.queue {
            router.configure(queue.clone());
        }

        Self {
            registry: Arc::new(Registry::new()),
            hooks: Arc::new(HookTables::new()),
            router: Arc::new(router),
            isolation,
            config: Arc::new(config),
        }
    }

    /// Register a listener for an event type.
    ///
    /// Returns the shared instance; pass it to [`EventBus::remove`] to
    /// deregister.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let bus = EventBus::new();
    /// let listener = bus.on::<UserCreated, _>(WelcomeEmail::default());
    /// bus.remove::<UserCreated, _>(&listener);
    /// ```
    pub fn on<E, L>(&self, listener: L) -> Arc<L>
    where
        E: Event,
        L: Listener<E>,
    {
        let listener = Arc::new(listener);
        self.on_shared::<E, L>(Arc::clone(&listener));
        listener
    }

    /// Register an already shared listener, e.g. one instance for several
    /// event types.
    pub fn on_shared<E, L>(&self, listener: Arc<L>) -> ListenerId
    where
        E: Event,
        L: Listener<E>,
    {
        let id = ListenerId::of(&listener);
        let name = Listener::<E>::name(listener.as_ref()).to_string();
        self.registry
            .register(TypeId::of::<E>(), Arc::new(TypedListener::<E, L>::new(listener)));

        if self.config.enable_logging {
            debug!(
                listener = %name,
                event = std::any::type_name::<E>(),
                "Registered listener"
            );
        }

        id
    }

    /// Remove the first registration of `listener` for `E`. No-op if absent.
    pub fn remove<E, L>(&self, listener: &Arc<L>) -> bool
    where
        E: Event,
        L: Listener<E>,
    {
        self.registry
            .remove(TypeId::of::<E>(), ListenerId::of(listener))
    }

    /// Remove a listener registration by id.
    pub fn remove_by_id<E: Event>(&self, id: ListenerId) -> bool {
        self.registry.remove(TypeId::of::<E>(), id)
    }

    /// Remove all listeners for an event type
    pub fn remove_all<E: Event>(&self) {
        self.registry.remove_all(TypeId::of::<E>());

        if self.config.enable_logging {
            debug!(event = std::any::type_name::<E>(), "Removed all listeners");
        }
    }

    /// Clear all listeners
    pub fn clear(&self) {
        self.registry.clear();
        if self.config.enable_logging {
            info!("Cleared all event listeners");
        }
    }

    /// Get listener count for an event type
    pub fn listener_count<E: Event>(&self) -> usize {
        self.registry.count(TypeId::of::<E>())
    }

    pub fn has_listeners<E: Event>(&self) -> bool {
        self.registry.has(TypeId::of::<E>())
    }

    /// Set a global before-handle hook, replacing any hook with the same key.
    pub fn before_handle<F>(&self, key: impl Into<String>, hook: F)
    where
        F: Fn(&dyn Event, &dyn DynListener) + Send + Sync + 'static,
    {
        let hook: BeforeHandleHook = Arc::new(hook);
        self.hooks.before_handle.set(key, hook);
    }

    pub fn remove_before_handle(&self, key: &str) -> bool {
        self.hooks.before_handle.unset(key)
    }

    /// Set a global should-handle hook, replacing any hook with the same key.
    pub fn should_handle<F>(&self, key: impl Into<String>, hook: F)
    where
        F: Fn(&dyn Event) -> bool + Send + Sync + 'static,
    {
        let hook: ShouldHandleHook = Arc::new(hook);
        self.hooks.should_handle.set(key, hook);
    }

    pub fn remove_should_handle(&self, key: &str) -> bool {
        self.hooks.should_handle.unset(key)
    }

    /// Set a global on-error hook, replacing any hook with the same key.
    pub fn on_error<F>(&self, key: impl Into<String>, hook: F)
    where
        F: Fn(&dyn Event, &EventHandlerError) + Send + Sync + 'static,
    {
        let hook: ErrorHook = Arc::new(hook);
        self.hooks.on_error.set(key, hook);
    }

    pub fn remove_on_error(&self, key: &str) -> bool {
        self.hooks.on_error.unset(key)
    }

    /// Install or replace the lane configuration used by queued listeners.
    pub fn setup_queue(&self, config: QueueConfig) {
        self.router.configure(config);
    }

    /// Lane router backing queued listeners.
    pub fn queue_router(&self) -> &QueueRouter {
        &self.router
    }

    /// Wait until every lane has drained.
    pub async fn wait_for_queues(&self) {
        self.router.wait_idle().await;
    }

    /// Fire an event
    ///
    /// Resolves once every inline and isolated listener has settled.
    /// Listener failures are reported to the on-error hooks and never
    /// returned. A panicking should-handle or before-handle hook unwinds
    /// through this call.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let bus = EventBus::new();
    /// bus.fire(UserCreated { id: 7 }).await;
    /// ```
    pub async fn fire<E: Event>(&self, event: E) -> FireReport {
        self.fire_dyn(Arc::new(event)).await
    }

    /// Fire a type-erased event. Listeners are looked up by the event's
    /// concrete runtime type.
    pub async fn fire_dyn(&self, event: Arc<dyn Event>) -> FireReport {
        let type_id = event_type_id(event.as_ref());
        let listeners = self.registry.snapshot(type_id);
        let mut report = FireReport::default();

        if listeners.is_empty() {
            if self.config.enable_logging {
                debug!(event = event.event_name(), "No listeners registered for event");
            }
            return report;
        }

        if self.config.enable_logging {
            debug!(
                event = event.event_name(),
                listeners = listeners.len(),
                "Firing event"
            );
        }

        for listener in listeners {
            if !self.hooks.should_handle(event.as_ref()) {
                report.suppressed += 1;
                continue;
            }

            self.hooks.before_handle(event.as_ref(), listener.as_ref());

            let options = listener.options();
            if options.queued {
                self.enqueue(type_id, &event, &listener, &options);
                report.queued += 1;
                continue;
            }

            let result = if options.isolated {
                self.run_isolated(&event, &listener).await
            } else {
                run_inline(event.as_ref(), listener.as_ref()).await
            };
            report.invoked += 1;

            match result {
                Ok(()) => {
                    if options.once {
                        self.registry.remove(type_id, listener.id());
                    }
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        event = event.event_name(),
                        listener = listener.name(),
                        error = %err,
                        "Listener failed"
                    );
                    self.hooks.report_error(event.as_ref(), &err);
                }
            }
        }

        if self.config.enable_logging {
            debug!(event = event.event_name(), ?report, "Event fired");
        }

        report
    }

    async fn run_isolated(
        &self,
        event: &Arc<dyn Event>,
        listener: &Arc<dyn DynListener>,
    ) -> Result<(), EventHandlerError> {
        let event = Arc::clone(event);
        let listener = Arc::clone(listener);

        self.isolation
            .run(async move { listener.handle_dyn(event.as_ref()).await }.boxed())
            .await
    }

    fn enqueue(
        &self,
        type_id: TypeId,
        event: &Arc<dyn Event>,
        listener: &Arc<dyn DynListener>,
        options: &ListenerOptions,
    ) {
        let task_event = Arc::clone(event);
        let task_listener = Arc::clone(listener);
        let registry = Arc::clone(&self.registry);
        let once = options.once;

        let mut job = Job::new(listener.name(), move || {
            let event = Arc::clone(&task_event);
            let listener = Arc::clone(&task_listener);
            let registry = Arc::clone(&registry);
            async move {
                match listener.handle_dyn(event.as_ref()).await {
                    Ok(()) => {
                        if once {
                            registry.remove(type_id, listener.id());
                        }
                        Ok(())
                    }
                    Err(err) => Err(BoxError::from(err)),
                }
            }
        })
        .with_retries(options.retries);

        if let Some(timeout) = options.timeout {
            job = job.with_timeout(timeout);
        }

        let hooks = Arc::clone(&self.hooks);
        let failed_event = Arc::clone(event);
        let job = job.with_error_handler(move |err| {
            hooks.report_error(failed_event.as_ref(), &EventHandlerError::from(err));
        });

        // Routing failures have already been reported through the job's error handler.
        if let Err(err) = self.router.submit(options.queue.as_deref(), job) {
            warn!(
                event = event.event_name(),
                listener = listener.name(),
                error = %err,
                "Could not queue listener"
            );
        }
    }
}

async fn run_inline(event: &dyn Event, listener: &dyn DynListener) -> Result<(), EventHandlerError> {
    AssertUnwindSafe(listener.handle_dyn(event))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(EventHandlerError::Panicked(panic_message(payload))))
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("config", &self.config)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

/// Event bus builder
pub struct EventBusBuilder {
    config: EventBusConfig,
    isolation: Arc<dyn Isolation>,
}

impl EventBusBuilder {
    /// Create new event bus builder
    pub fn new() -> Self {
        Self {
            config: EventBusConfig::default(),
            isolation: Arc::new(SpawnIsolation),
        }
    }

    /// Enable/disable per-fire logging
    pub fn enable_logging(mut self, enabled: bool) -> Self {
        self.config.enable_logging = enabled;
        self
    }

    /// Install a lane configuration up front
    pub fn queue(mut self, config: QueueConfig) -> Self {
        self.config.queue = Some(config);
        self
    }

    /// Run lane workers on a specific runtime
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.config.runtime = Some(runtime);
        self
    }

    /// Use a custom isolation strategy for `isolated` listeners
    pub fn isolation(mut self, isolation: impl Isolation + 'static) -> Self {
        self.isolation = Arc::new(isolation);
        self
    }

    /// Build the event bus
    pub fn build(self) -> EventBus {
        EventBus::from_parts(self.config, self.isolation)
    }
}

impl Default for EventBusBuilder {
    fn default() -> Self {
        Self::new()
    }
}
