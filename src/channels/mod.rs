//! Platform collaborators and the Discord gateway handler.

pub mod channel;
pub mod discord;
pub mod handler;

pub use channel::*;
pub use discord::{DiscordStore, WebhookProxy};
pub use handler::DuckPondHandler;
