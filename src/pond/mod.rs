//! The duck pond: staff-voted relay of messages into a showcase channel.

pub mod counter;
pub mod emoji;
pub mod engine;
pub mod locks;
pub mod marker;
pub mod model;
pub mod policy;
pub mod relay;

pub use counter::DuckCounter;
pub use emoji::EmojiMatcher;
pub use engine::{IgnoreReason, Outcome, RelayEngine};
pub use policy::AuthorizationPolicy;
pub use relay::{RelayReport, Relayer};
