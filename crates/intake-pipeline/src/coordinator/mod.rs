//! Pipeline Coordinator: per-stage queues, worker pools and the service
//! facade that feeds them.

pub mod pool;
pub mod queue;
pub mod service;
pub mod workers;

pub use pool::{RateLimiter, StageHandler, WorkerPool};
pub use queue::{DeadLetter, Envelope, JobQueue};
pub use service::{FailedJob, IntakeService};
pub use workers::{PipelineContext, StageQueues};
