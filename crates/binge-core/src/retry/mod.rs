//! Retry accounting for failed download attempts.
//!
//! A failed attempt (`Outcome::Error`) consumes one unit of the job's attempt
//! budget and starts a cool-down; a cancelled attempt consumes nothing.

mod policy;

pub use policy::{RetryDecision, RetryPolicy};
