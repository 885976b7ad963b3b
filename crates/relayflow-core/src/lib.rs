//! The RelayFlow send pipeline
//!
//! Quota gate, task queue, relay load balancer, worker pool, relay health
//! controller and the stats reconciler. Everything here talks to the
//! outside world through the storage traits, so the pipeline can run
//! against in-memory doubles in tests.

pub mod balancer;
pub mod health;
pub mod keys;
pub mod mailer;
pub mod queue;
pub mod quota;
pub mod stats;
pub mod worker;

#[cfg(test)]
mod testutil;

pub use balancer::LoadBalancer;
pub use health::HealthController;
pub use mailer::{MailTransport, Mailer, RelayProbe};
pub use queue::{EmailTask, TaskQueue};
pub use quota::{CachedTenant, QuotaDecision, QuotaEngine};
pub use stats::StatsService;
pub use worker::WorkerPool;
