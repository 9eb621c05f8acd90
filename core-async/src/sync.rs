//! Synchronization primitives.
//!
//! Every state machine in the core publishes its latest state on a
//! [`watch`] channel and drains commands from an [`mpsc`] queue, with
//! [`oneshot`] replies. Background loops are stopped through a
//! [`CancellationToken`].
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::{watch, CancellationToken};
//!
//! # async fn example() {
//! let (tx, mut rx) = watch::channel(0u64);
//! tx.send_replace(1);
//! rx.changed().await.unwrap();
//! assert_eq!(*rx.borrow(), 1);
//!
//! let token = CancellationToken::new();
//! let child = token.child_token();
//! token.cancel();
//! assert!(child.is_cancelled());
//! # }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};

pub use tokio_util::sync::{CancellationToken, DropGuard};
