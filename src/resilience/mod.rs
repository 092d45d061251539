//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream:
//!     → timeouts.rs (enforce per-attempt deadline)
//!     → On 5xx or transport failure: backoff.rs (linear delay before next attempt)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Backoff waits are async sleeps, never blocking a runtime thread
//! - Transport failures and 5xx responses share one backoff schedule

pub mod backoff;
pub mod timeouts;
