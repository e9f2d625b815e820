//! Classification of failures and capped exponential backoff.

mod backoff;
mod policy;

pub use backoff::RetryPolicy;
pub use policy::{ErrorHandlingPolicy, RetryDirective, build_error_handling_policy};
