//! Named in-process job lanes for Courier.
//!
//! Provides the lane system behind queued listeners:
//! - 🛣️ Named lanes with a fallback lane for unknown names
//! - 🔄 Automatic retries, requeued at the back of the lane
//! - ⏰ Per-attempt timeouts
//! - 👷 One lazily created worker per lane, disposed once the lane drains
//!
//! Jobs are held in memory only. Nothing survives a process restart.
//!
//! ## Lane Configuration
//!
//! ```
//! use courier_queue::QueueConfig;
//! use std::time::Duration;
//!
//! let config = QueueConfig::new("default")
//!     .with_lanes(["emails", "reports"])
//!     .with_default_timeout(Duration::from_secs(30));
//!
//! assert_eq!(config.resolve_lane(Some("emails")), "emails");
//! assert_eq!(config.resolve_lane(Some("sms")), "default");
//! assert_eq!(config.default_timeout, Duration::from_secs(30));
//! ```
//!
//! ## Submitting Jobs
//!
//! ```
//! use courier_queue::{Job, QueueConfig, QueueRouter};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let router = QueueRouter::with_config(QueueConfig::new("default").with_lane("emails"));
//!
//! let job = Job::new("send_welcome", || async {
//!     // Send email logic
//!     Ok(())
//! })
//! .with_retries(2)
//! .with_error_handler(|err| eprintln!("attempt failed: {err}"));
//!
//! router.submit(Some("emails"), job).unwrap();
//! router.wait_idle().await;
//! # }
//! ```

pub mod config;
pub mod error;
pub mod job;
pub mod router;
pub mod worker;

pub use config::{DEFAULT_TIMEOUT, QueueConfig};
pub use error::{BoxError, QueueError, QueueResult, panic_message};
pub use job::{DEFAULT_RETRIES, ErrorSink, Job, JobId, JobState, JobTask, MAX_RETRIES, clamp_retries};
pub use router::QueueRouter;
pub use worker::LaneWorker;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::QueueConfig;
    pub use crate::error::{QueueError, QueueResult};
    pub use crate::job::{Job, JobId, JobState};
    pub use crate::router::QueueRouter;
    pub use crate::worker::LaneWorker;
}
