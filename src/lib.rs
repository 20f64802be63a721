//! Duck pond: relays messages that enough staff members react to with a duck
//! into a dedicated channel, posted under the original author's identity.

pub mod channels;
pub mod config;
pub mod error;
pub mod pond;
