//! In-process event dispatch for Courier
//!
//! This crate routes typed events to registered listeners.
//!
//! ## Features
//!
//! - **Event Bus** - Fire events at listeners registered per event type
//! - **Hooks** - Keyed should-handle, before-handle and on-error callbacks,
//!   plus optional per-event overrides
//! - **Execution modes** - Inline, isolated, or queued on a named lane with
//!   retries and timeouts
//! - **Once listeners** - Deregister after the first successful handling
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier_events::*;
//! use async_trait::async_trait;
//! use std::any::Any;
//!
//! // Define an event
//! #[derive(Debug)]
//! struct UserCreated {
//!     email: String,
//! }
//!
//! impl Event for UserCreated {
//!     fn as_any(&self) -> &dyn Any { self }
//! }
//!
//! // Define a listener
//! struct WelcomeEmail;
//!
//! #[async_trait]
//! impl Listener<UserCreated> for WelcomeEmail {
//!     async fn handle(&self, event: &UserCreated) -> Result<(), EventHandlerError> {
//!         println!("Sending welcome email to {}", event.email);
//!         Ok(())
//!     }
//!
//!     fn options(&self) -> ListenerOptions {
//!         ListenerOptions::new().on_queue("emails").with_retries(5)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let bus = EventBus::new();
//!     bus.setup_queue(QueueConfig::new("default").with_lane("emails"));
//!     bus.on_error("log", |event, error| eprintln!("{}: {}", event.event_name(), error));
//!
//!     bus.on::<UserCreated, _>(WelcomeEmail);
//!     bus.fire(UserCreated { email: "alice@example.com".into() }).await;
//!
//!     bus.wait_for_queues().await;
//! }
//! ```
//!
//! ## Dispatch Order
//!
//! For each listener of the event's runtime type, in registration order:
//!
//! 1. per-event should-handle, then global should-handle hooks; any `false`
//!    skips the listener
//! 2. per-event before-handle, then global before-handle hooks
//! 3. queued listeners are handed to their lane; isolated and inline
//!    listeners are awaited
//! 4. failures go to per-event, then global on-error hooks; successful
//!    `once` listeners are removed
//!
//! ## Configuration
//!
//! ```rust,ignore
//! let bus = EventBusBuilder::new()
//!     .enable_logging(false)
//!     .queue(QueueConfig::from_env("COURIER_QUEUE")?)
//!     .isolation(ThreadIsolation::new())
//!     .build();
//! ```

pub mod bus;
pub mod error;
pub mod event;
pub mod hooks;
pub mod isolation;
pub mod listener;
pub mod registry;

pub use bus::{EventBus, EventBusBuilder, EventBusConfig, FireReport};
pub use courier_queue::QueueConfig;
pub use error::EventHandlerError;
pub use event::{Event, EventHooks, event_type_id};
pub use hooks::{BeforeHandleHook, ErrorHook, HookTable, HookTables, ShouldHandleHook};
pub use isolation::{IsolatedTask, Isolation, SpawnIsolation, ThreadIsolation};
pub use listener::{DynListener, Listener, ListenerId, ListenerOptions, TypedListener};
pub use registry::Registry;
