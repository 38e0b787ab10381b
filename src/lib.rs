pub mod auth;
pub mod banner;
pub mod channel;
pub mod commands;
pub mod config;
pub mod consts;
pub mod error;
pub mod events;
pub mod network;
pub mod presence;
pub mod state;
pub mod transport;

pub use channel::{Channel, ChannelBuilder, Phase};
pub use error::ChannelError;
pub use events::{Event, EventBus, EventKind, ListenerHandle};
