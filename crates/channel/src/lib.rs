//! Persistent, identity-scoped event channel.
//!
//! [`EventChannel`] is the seam the upload session talks to: emit named
//! events, subscribe handlers, check connectivity. [`WsChannel`] implements
//! it over a WebSocket with keepalive pings and bounded reconnection.

pub mod adapter;
pub mod channel;
pub mod error;
pub(crate) mod pumps;
pub(crate) mod reconnection;
pub mod registry;
pub mod types;
pub mod ws_client;

pub use adapter::{BoxFuture, EventChannel, EventHandler, HandlerId, InboundEvent};
pub use channel::WsChannel;
pub use error::ChannelError;
pub use registry::HandlerRegistry;
pub use types::{ChannelConfig, ChannelIdentity, ConnectionState, ReconnectConfig};
pub use ws_client::WsClient;
