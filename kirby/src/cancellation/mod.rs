//! Cooperative cancellation for provisioning calls.

mod token;

pub use token::{CancelCallback, CancellationToken};
