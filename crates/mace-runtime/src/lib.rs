//! Submit service, queue manager, completion callback pipeline, advisory
//! tick lock, and retry/backoff policy — the process-boundary-spanning
//! half of the control plane (spec §4.2–§4.5).

pub mod callback;
pub mod lock;
pub mod queue;
pub mod retry;
pub mod submit;

pub use callback::{run_callback, CallbackOutcome};
pub use lock::TickLock;
pub use queue::{tick, TickMode, TickReport};
pub use retry::{retry_with_policy, RetryConfig, RetryPolicy};
pub use submit::SubmitService;
