//! Shared building blocks for the command engine.
//!
//! - [`AggregateId`]: opaque identifier of an aggregate instance
//! - [`Deadline`]: bounds every repository and bus call
//! - [`RetryConfig`]: exponential backoff used at infrastructure boundaries

pub mod deadline;
pub mod retry;
pub mod types;

pub use deadline::{Deadline, DeadlineExceeded};
pub use retry::{Exhausted, IsTransient, RetryConfig, retry_on_transient, retry_with_backoff};
pub use types::{AggregateId, ParseAggregateIdError};
