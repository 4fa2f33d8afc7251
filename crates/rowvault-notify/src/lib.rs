//! Notification fan-out: configured notification channels are invoked at
//! run start, on a rate-limited per-table failure, and at run finish.
//! Resolves the `*_env`
//! secret indirection and delivers a generic JSON payload; per-provider
//! formatting beyond that is out of scope.

mod dispatcher;
mod error;
mod payload;

pub use dispatcher::NotifyDispatcher;
pub use error::NotifyError;
pub use payload::{NotifyEvent, NotifyPayload};
