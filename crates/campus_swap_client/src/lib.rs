//! Campus Swap client library: config, session store, REST client, realtime
//! chat channel. Used by the screens and the `campus-swap` CLI.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod messages;
pub mod models;
pub mod realtime;
pub mod session;
pub mod transport;

pub use api::ApiClient;
pub use config::{default_config_path, Config, ConfigError, ReconnectPolicy};
pub use error::ClientError;
pub use models::{
    AuthResponse, Category, ChatMessage, Conversation, Credentials, Listing, ListingDraft,
    OutgoingMessage, Profile, ProfileUpdate, Registration, User,
};
pub use realtime::{ChannelState, Delivery, DeliveryState, RealtimeChannel, Subscription};
pub use session::{FileStorage, MemoryStorage, SessionStore, Storage};
pub use transport::{Link, Transport, WsTransport};
