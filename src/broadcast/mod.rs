//! # Live State Fan-out
//!
//! Keeps every connected keypad in sync with the panel. The broadcaster is the only
//! writer of the cached [`SystemState`](crate::alarm::SystemState); observers receive
//! copies and never hold authoritative state.
//!
//! - [`broadcaster`] - the single-owner task, its handle and the observer endpoint
//! - [`registry`] - observer bookkeeping with non-blocking delivery
//! - [`notice`] - the messages observers receive

pub mod broadcaster;
pub mod notice;
pub mod registry;

pub use broadcaster::{BroadcastSettings, BroadcasterHandle, Observer};
pub use notice::{Notice, StateSnapshot};
pub use registry::{ObserverId, ObserverRegistry};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("State broadcaster is no longer running")]
    Closed,
}
