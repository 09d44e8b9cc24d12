//! Error types for third-party login

use thiserror::Error;
use tracing::debug;

/// Errors raised while validating the identity provider's address
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServerAddressError {
    /// No address is configured
    #[error("server address is not set")]
    Missing,

    /// The address is not a valid URL
    #[error("server address is invalid: {0}")]
    Invalid(String),

    /// The address does not use HTTPS
    #[error("server address must use HTTPS")]
    InsecureScheme,

    /// The address' host is not allow-listed
    #[error("server address host \"{0}\" is not in the list of allowed domains")]
    DomainNotAllowed(String),
}

/// Errors that can occur when exchanging a login code for an identifier
#[derive(Debug, Error)]
pub enum CodeExchangeError {
    /// The code is empty
    #[error("invalid argument: code is empty")]
    EmptyCode,

    /// The provider's address failed validation
    #[error("server address validation failed: {0}")]
    InvalidServerAddress(#[from] ServerAddressError),

    /// The request could not be sent or its body could not be read
    #[error("request to the identity provider failed")]
    Request(#[source] anyhow::Error),

    /// The provider answered with a status other than 200
    #[error("request failed with status code: {0}")]
    UnexpectedStatus(u16),

    /// The provider did not answer with JSON
    #[error("expected JSON response but got Content-Type: {0}")]
    UnexpectedContentType(String),

    /// The JSON body could not be decoded
    #[error("failed to decode JSON response")]
    InvalidResponse(#[source] anyhow::Error),

    /// The provider rejected the code
    #[error("{0}")]
    Rejected(String),

    /// The provider accepted the request but returned no identifier
    #[error("the code is invalid or has expired")]
    InvalidCode,
}

impl From<serde_json::Error> for CodeExchangeError {
    fn from(err: serde_json::Error) -> Self {
        debug!("serde_json::Error -> CodeExchangeError");

        CodeExchangeError::InvalidResponse(err.into())
    }
}
