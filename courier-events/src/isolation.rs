//! Isolation strategies for listeners marked `isolated`.

use crate::error::EventHandlerError;
use courier_queue::panic_message;
use futures::future::{BoxFuture, FutureExt};
use std::panic::{AssertUnwindSafe, catch_unwind};
use tokio::sync::oneshot;

/// Future handed to an isolation strategy: one listener handling one event.
pub type IsolatedTask = BoxFuture<'static, Result<(), EventHandlerError>>;

/// Runs a listener invocation outside the caller's execution context.
///
/// The bus awaits the returned future before moving to the next listener.
pub trait Isolation: Send + Sync {
    fn run(&self, task: IsolatedTask) -> BoxFuture<'static, Result<(), EventHandlerError>>;
}

/// Runs the task as a separate Tokio task. Panics are reported as
/// [`EventHandlerError::Panicked`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SpawnIsolation;

impl Isolation for SpawnIsolation {
    fn run(&self, task: IsolatedTask) -> BoxFuture<'static, Result<(), EventHandlerError>> {
        let handle = tokio::spawn(task);
        async move {
            match handle.await {
                Ok(result) => result,
                Err(join_error) => Err(match join_error.try_into_panic() {
                    Ok(payload) => EventHandlerError::Panicked(panic_message(payload)),
                    Err(join_error) => EventHandlerError::Isolation(join_error.to_string()),
                }),
            }
        }
        .boxed()
    }
}

/// Runs the task on a dedicated OS thread with its own single-threaded
/// runtime. Nothing of the caller's runtime is shared.
#[derive(Debug, Clone, Default)]
pub struct ThreadIsolation {
    thread_name: Option<String>,
}

impl ThreadIsolation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }
}

impl Isolation for ThreadIsolation {
    fn run(&self, task: IsolatedTask) -> BoxFuture<'static, Result<(), EventHandlerError>> {
        let (tx, rx) = oneshot::channel();
        let builder = std::thread::Builder::new()
            .name(self.thread_name.clone().unwrap_or_else(|| "courier-isolated".to_string()));

        let spawned = builder.spawn(move || {
            let result = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => catch_unwind(AssertUnwindSafe(|| runtime.block_on(task)))
                    .unwrap_or_else(|payload| Err(EventHandlerError::Panicked(panic_message(payload)))),
                Err(e) => Err(EventHandlerError::Isolation(e.to_string())),
            };
            let _ = tx.send(result);
        });

        if let Err(e) = spawned {
            return futures::future::ready(Err(EventHandlerError::Isolation(e.to_string()))).boxed();
        }

        async move {
            rx.await.unwrap_or_else(|_| {
                Err(EventHandlerError::Isolation("isolated thread exited without a result".to_string()))
            })
        }
        .boxed()
    }
}
