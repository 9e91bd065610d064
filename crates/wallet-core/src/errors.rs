//! Wallet Error Types
//!
//! One error enum for the whole engine. Variants follow how a failure is
//! absorbed: only [`WalletError::NotFound`] ever reaches the caller as a
//! blocking state, everything else degrades to previous or empty values.

use serde::{Deserialize, Serialize};

/// How a failure is handled by the sync engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Ends the session and is surfaced to the user.
    Fatal,
    /// Logged and replaced by an empty or previous value; retried on the next refresh.
    Degraded,
    /// Push channel trouble; only visible through the connectivity indicator.
    Connectivity,
}

/// Errors produced by the wallet sync engine and its effect handlers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum WalletError {
    /// The requested account does not exist on chain.
    #[error("account not found: {account}")]
    NotFound { account: String },

    /// Network failure or timeout on a pull query.
    #[error("transport error during {operation}: {reason}")]
    Transport { operation: String, reason: String },

    /// The push channel could not be opened or dropped.
    #[error("push channel unavailable: {reason}")]
    ChannelUnavailable { reason: String },

    /// Chain data did not have the expected shape.
    #[error("invalid chain data in {field}: {reason}")]
    Decode { field: String, reason: String },

    /// Cache persistence failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// Account name is not a valid chain account name.
    #[error("invalid account name {name:?}: {reason}")]
    InvalidAccount { name: String, reason: String },
}

/// Result alias used across the wallet crates.
pub type WalletResult<T> = std::result::Result<T, WalletError>;

impl WalletError {
    /// Create a not-found error
    pub fn not_found(account: impl Into<String>) -> Self {
        Self::NotFound {
            account: account.into(),
        }
    }

    /// Create a transport error for the named operation
    pub fn transport(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a channel-unavailable error
    pub fn channel_unavailable(reason: impl Into<String>) -> Self {
        Self::ChannelUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a decode error for the named field
    pub fn decode(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Classify the error for propagation decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound { .. } | Self::InvalidAccount { .. } => ErrorClass::Fatal,
            Self::ChannelUnavailable { .. } => ErrorClass::Connectivity,
            Self::Transport { .. }
            | Self::Decode { .. }
            | Self::Storage(_)
            | Self::Config(_) => ErrorClass::Degraded,
        }
    }

    /// True when the error must end the current session.
    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_missing_accounts_are_fatal() {
        assert!(WalletError::not_found("alice").is_fatal());
        assert!(!WalletError::transport("get_accounts", "timeout").is_fatal());
        assert!(!WalletError::decode("balance", "bad asset").is_fatal());
        assert_eq!(
            WalletError::channel_unavailable("refused").class(),
            ErrorClass::Connectivity
        );
    }

    #[test]
    fn display_includes_context() {
        let err = WalletError::transport("get_reward_fund", "timed out after 10s");
        assert_eq!(
            err.to_string(),
            "transport error during get_reward_fund: timed out after 10s"
        );
    }
}
