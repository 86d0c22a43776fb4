//! Notification pipeline.
//!
//! Every event, from the stream or the manual trigger, flows through:
//! 1. `NotificationOrchestrator::process()`: the ordered gate chain
//! 2. `RateLimiter`: fixed-window counters shared across workers
//! 3. `ChannelDispatcher`: delegated workflow or direct send
//!
//! **Every run ends in exactly one `PipelineOutcome`.** Nothing is retried here.

pub mod clock;
pub mod orchestrator;
pub mod rate_limit;
pub mod template;
pub mod types;

pub use orchestrator::{NotificationOrchestrator, OrchestratorDeps};
pub use rate_limit::RateLimiter;
pub use types::{Channel, Event, OutcomeStatus, PipelineOutcome, Recipient, TransactionId};
