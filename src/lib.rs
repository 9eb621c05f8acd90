//! Workspace umbrella crate.
//!
//! Re-exports the [`core_service`] façade so host applications can depend on a
//! single crate and pick the bridge set through features. The default
//! `desktop-shims` feature pulls in the in-process implementations from
//! `bridge-desktop`; hosts that inject every collaborator themselves can turn
//! it off.

pub use core_service::*;
