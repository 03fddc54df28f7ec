//! Error types for the resilient client.
//!
//! One enum covers every way a call can end badly, from caller mistakes caught
//! before the network to classified HTTP failures after retries.

mod categories;
mod error;

pub use categories::{CancelReason, ErrorCategory, TransportErrorKind};
pub use error::{ClientError, ClientResult};
