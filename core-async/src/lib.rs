//! Async runtime façade for the media core.
//!
//! Engine crates depend on this crate instead of naming Tokio directly, so the
//! set of runtime primitives the core relies on stays in one place:
//!
//! - `task`: spawning and join handles
//! - `time`: sleeps, intervals, timeouts
//! - `sync`: channels, locks and cooperative cancellation
//! - `runtime`: handles and a blocking entry point for synchronous callers
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};

/// Wait on several futures and run the branch of the first to complete.
pub use tokio::select;
