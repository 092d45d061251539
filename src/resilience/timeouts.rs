//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap an outbound call with a hard deadline
//! - Cancel the call cleanly when the deadline elapses
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the timer is dropped with the future, so
//!   nothing stays scheduled once the call settles either way
//! - Timeout errors are distinct from other errors

use std::future::Future;
use std::time::Duration;

/// The deadline elapsed before the wrapped future resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineElapsed(pub Duration);

/// Run `fut` to completion or cancel it after `deadline`.
///
/// On expiry the inner future is dropped, which aborts any in-flight I/O it owns.
pub async fn with_deadline<F>(deadline: Duration, fut: F) -> Result<F::Output, DeadlineElapsed>
where
    F: Future,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| DeadlineElapsed(deadline))
}
