//! Time-related abstractions.
//!
//! Timers come from `tokio::time`, so tests can drive them deterministically
//! with a paused clock (`#[tokio::test(start_paused = true)]`).
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{sleep, Duration, Instant};
//!
//! async fn example() {
//!     let start = Instant::now();
//!     sleep(Duration::from_millis(5)).await;
//!     assert!(start.elapsed() >= Duration::from_millis(5));
//! }
//! ```

pub use tokio::time::{
    interval, sleep, sleep_until, timeout, Instant, Interval, MissedTickBehavior, Sleep,
};

pub use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Returns the current wall-clock time as milliseconds since `UNIX_EPOCH`.
///
/// Clocks set before the epoch report `0`.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
