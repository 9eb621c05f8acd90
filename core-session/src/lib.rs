//! # Session Bridge
//!
//! Publishes playback to the host's media-session protocol and turns
//! controller commands into playback calls.
//!
//! ## Overview
//!
//! - [`snapshot`] renders transport, capabilities, custom actions, metadata
//!   and the queue from engine state
//! - [`SessionBridge`] runs the publishing and dispatch actor
//! - [`ListenerRegistry`] fans playback transitions out to host listeners
//! - [`SessionState`] feeds the optional notification renderer
//!
//! ## Usage
//!
//! ```ignore
//! let session = SessionBridge::start(protocol, None, playback, clock, "car", None).await?;
//! session.register_listener(Arc::new(MyListener));
//! session.submit(SessionCommand::MediaButton(MediaKey::PlayPause))?;
//! session.release().await?;
//! ```

pub mod bridge;
pub mod error;
pub mod listeners;
pub mod snapshot;
pub mod state;

pub use bridge::{key_command, SessionBridge, SessionHandle};
pub use error::{Result, SessionError};
pub use listeners::{ListenerId, ListenerRegistry, MediaStateListener};
pub use state::SessionState;
