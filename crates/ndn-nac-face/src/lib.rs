//! # NDN NAC Face
//!
//! The network seam for access-control components.
//!
//! A [`Face`] expresses Interests and resolves them to Data, a timeout or a
//! network Nack. It also lets a component register a name prefix with an
//! [`InterestHandler`] and answer Interests with [`Face::put_data`].
//!
//! [`memory::MemoryNetwork`] is a forwarder plus content store that lives in
//! one process. Tests use it to observe every Interest and to script
//! timeouts and Nacks.

pub mod error;
pub mod face;
pub mod retry;

pub use error::{FaceError, NackReason, Result};
pub use face::{memory, Face, InterestHandler, RegisteredPrefixId};
pub use retry::{express_with_retry, RetryPolicy};
