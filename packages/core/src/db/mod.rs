//! Persistence and Change Notification
//!
//! The [`GraphStore`] trait is the async seam to the backing document store;
//! [`MemoryGraphStore`] is the in-process implementation. Change fan-out
//! (store writes and collaborator patches alike) flows through
//! [`DocumentChannel`] as versioned [`DocumentUpdate`] events.

pub mod events;
pub mod store;

pub use events::{DocumentChannel, DocumentUpdate, UpdateSource, CHANNEL_CAPACITY};
pub use store::{GraphStore, MemoryGraphStore};
