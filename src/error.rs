//! Channel error types

use thiserror::Error;

/// Why a connect attempt did not produce a live channel.
///
/// None of these are fatal: the channel always accepts a later
/// [`reconnect`](crate::channel::Channel::reconnect).
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("network offline")]
    NetworkOffline,

    #[error("a connection attempt is already in progress")]
    AttemptInProgress,

    #[error("channel was torn down during the attempt")]
    TornDown,

    #[error("transport failed to open")]
    Transport(#[source] anyhow::Error),
}
