//! Centralized error handling for the aggregator
//!
//! Errors are split by how far they are allowed to travel:
//!
//! - **AppError**: run-level failures. Only configuration problems (detected before
//!   any probing begins) and a run deadline that expires before any probe completes
//!   abort a run.
//! - **EntryError**: a malformed raw entry. Skipped and counted, never fatal.
//! - **ProbeError**: a failed probe attempt. Folded into `ProbeResult { reachable: false }`.
//!
//! # Usage
//!
//! ```rust
//! use m3u_aggregator::errors::{AppError, AppResult};
//!
//! fn check_pool(size: usize) -> AppResult<usize> {
//!     if size == 0 {
//!         return Err(AppError::configuration("worker pool size must be at least 1"));
//!     }
//!     Ok(size)
//! }
//!
//! assert!(check_pool(0).is_err());
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for entry normalization results
pub type EntryResult<T> = Result<T, EntryError>;

/// Convenience type alias for single probe attempts
pub type ProbeAttemptResult<T> = Result<T, ProbeError>;
