//! # Queue Engine
//!
//! Builds playlists from the catalog, navigates them, and owns favorites,
//! shuffle and repeat.
//!
//! ## Overview
//!
//! - [`QueueCore`] is the synchronous state machine holding every queue rule
//! - [`QueueEngine`] runs it as an actor and hands out [`QueueHandle`]s
//! - [`CatalogIndex`] keeps the parent and id lookup tables
//! - [`browse`] renders the head-unit browse tree from the index
//!
//! ## Versioning
//!
//! [`QueueState::version`] increments exactly when queue membership or order
//! changes: a new build, a shuffle toggle, or a clear. Index moves, repeat
//! changes and favorite flips leave it alone, so observers can tell a reload
//! from a seek by comparing versions.

pub mod browse;
pub mod engine;
pub mod error;
pub mod index;
pub mod model;
pub mod queue;

pub use engine::{QueueEngine, QueueHandle};
pub use error::{LookupKind, QueueError, Result};
pub use index::CatalogIndex;
pub use model::{
    favorite_item_id, Navigation, QueueSource, QueueState, SortCriterion, ALL_ID, FAVORITES_ID,
    FAVORITE_ITEM_PREFIX, ROOT_ID,
};
pub use queue::QueueCore;
