//! Asynchronous job polling engine.
//!
//! Submits a research job to a [`RemoteJobService`], then polls its status with
//! exponential backoff until it completes, fails, times out or is cancelled.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use delve_polling::{Poller, RemoteJobService, SessionOptions};
//! # use delve_core::ResearchRequest;
//! # async fn run(service: Arc<dyn RemoteJobService>) -> Result<(), delve_core::PollingError> {
//! let poller = Poller::new(service);
//! let result = poller
//!     .research(&ResearchRequest::new("state of solid-state batteries"), SessionOptions::new())
//!     .await?;
//! println!("{}", result.text);
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod clock;
pub mod config;
pub mod delay;
pub mod fetcher;
pub mod poller;
pub mod progress;
pub mod service;
pub mod session;

pub use backoff::{BackoffSchedule, next_interval};
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::{ConfigError, PollingConfig};
pub use delay::cancellable_delay;
pub use fetcher::StatusFetcher;
pub use poller::{Poller, SessionHandle, SessionOptions};
pub use progress::{Fanout, ProgressReporter, ProgressUpdate, TracingReporter, WatchReporter};
pub use service::RemoteJobService;
pub use session::{PollingSession, SessionStart, SessionState};

pub use tokio_util::sync::CancellationToken;
