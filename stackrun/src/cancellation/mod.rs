//! Interrupt handling and cleanup bookkeeping.
//!
//! This module provides:
//! - CancellationToken for cooperative cancellation of waits
//! - CleanupReport for the outcome of compensating actions

mod cleanup;
mod token;

pub use cleanup::CleanupReport;
pub use token::CancellationToken;
