//! Background polling of remote identity sessions.
//!
//! A [`Poller`] spawns one task per remote session on a bounded
//! [`WorkerPool`]; the [`SessionRegistry`] keeps at most one live poller per
//! local session key and answers non-blocking status queries.

pub mod poller;
pub mod pool;
pub mod registry;
pub mod retry;

pub use poller::{PollHandle, PollOutcome, Poller, PollerConfig};
pub use pool::WorkerPool;
pub use registry::{PollQuery, SessionRegistry};
pub use retry::{RetryPolicy, RetryState};
