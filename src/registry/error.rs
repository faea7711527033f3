//! Typed registry results
//!
//! These are expected outcomes, not failures: callers translate them into
//! RTMP status responses on the command channel. None of them tear a
//! connection down.

use thiserror::Error;

/// Outcome of a publish/subscribe registration attempt
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("another publisher already holds this stream path")]
    AlreadyExists,

    #[error("session is already publishing this stream path")]
    AlreadyPublishing,

    #[error("session is already subscribed to this stream path")]
    AlreadySubscribing,
}
