//! Error types for the tip jar wallet session

use crate::provider::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No wallet provider detected")]
    ProviderAbsent,

    #[error("User declined the request: {0}")]
    UserDeclined(String),

    #[error("Network switch failed: {0}")]
    NetworkSwitchFailed(ProviderError),

    #[error("Adding network failed: {0}")]
    NetworkAddFailed(ProviderError),

    #[error("Transaction rejected: {0}")]
    TransactionRejected(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Unexpected provider error: {0}")]
    UnexpectedProvider(ProviderError),

    #[error("Wallet is not connected")]
    NotConnected,

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Identity backend error: {0}")]
    Identity(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Absence and decline are normal states of a wallet UI, not failures worth alerting on.
    pub fn is_expected(&self) -> bool {
        matches!(self, Error::ProviderAbsent | Error::UserDeclined(_))
    }

    /// Message suitable for the user-visible error slot.
    ///
    /// Provider failures surface the provider's own message verbatim.
    pub fn display_message(&self) -> String {
        match self {
            Error::UserDeclined(message)
            | Error::TransactionRejected(message)
            | Error::TransactionFailed(message) => message.clone(),
            Error::NetworkSwitchFailed(e)
            | Error::NetworkAddFailed(e)
            | Error::UnexpectedProvider(e) => e.message.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::codes;

    #[test]
    fn expected_errors() {
        assert!(Error::ProviderAbsent.is_expected());
        assert!(Error::UserDeclined("no".to_string()).is_expected());
        assert!(!Error::NotConnected.is_expected());
        assert!(!Error::UnexpectedProvider(ProviderError::internal("boom")).is_expected());
    }

    #[test]
    fn display_message_uses_provider_text() {
        let err = Error::UnexpectedProvider(ProviderError::new(
            codes::RESOURCE_UNAVAILABLE,
            "Request already pending",
        ));
        assert_eq!(err.display_message(), "Request already pending");

        let err = Error::UserDeclined("User rejected the request.".to_string());
        assert_eq!(err.display_message(), "User rejected the request.");

        assert_eq!(Error::NotConnected.display_message(), "Wallet is not connected");
    }
}
