//! Re-exports the types most callers need.
//!
//! # Example
//! ```rust,no_run
//! use authgate_rs::prelude::*;
//! ```

pub use crate::clock::{Clock, SystemClock};
pub use crate::error::{GuardError, GuardResult};
pub use crate::gateway::{AuthBackend, GatewayError, LoginGateway};
pub use crate::guard::Guard;
pub use crate::state::{GuardState, GuardStatus};
