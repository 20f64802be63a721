//! Error types for the duck pond relay.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised while bringing a platform collaborator online.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Authentication failed for channel {name}: {reason}")]
    AuthFailed { name: String, reason: String },
}

/// Failures of a single evaluation cycle. None of these is fatal to the
/// process; each is contained to the event that raised it.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The channel, message or member vanished.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    /// Transport failure while sending or reacting.
    #[error("Delivery failed during {operation}: {reason}")]
    Delivery { operation: String, reason: String },

    /// Attachment bytes can no longer be retrieved.
    #[error("Attachment {filename} could not be retrieved: {reason}")]
    AuthorizationLost { filename: String, reason: String },

    /// The destination rejected an upload as too large.
    #[error("Attachment {filename} exceeds the destination upload limit")]
    PayloadTooLarge { filename: String },
}

impl RelayError {
    #[must_use]
    pub fn not_found(entity: &'static str, id: u64) -> Self {
        Self::NotFound { entity, id }
    }

    #[must_use]
    pub fn delivery(operation: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Delivery {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn authorization_lost(filename: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::AuthorizationLost {
            filename: filename.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
