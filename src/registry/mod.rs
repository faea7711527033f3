//! Stream registry for publish/subscribe routing
//!
//! The registry is the only structure mutated by more than one
//! connection's logic at a time. The publish map and the subscribe map
//! carry separate locks so unrelated paths never contend.

pub mod error;
pub mod store;

pub use error::RegistryError;
pub use store::{LockedSubscribers, StreamRegistry};
