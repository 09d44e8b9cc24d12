//! Mailer errors

use lettre::error::Error;
use thiserror::Error;
use tracing::debug;

use crate::domain::communication::email_addresses::EmailAddressError;

/// Errors that can occur while composing or delivering an email.
///
/// Delivery errors are returned as soon as a step fails; nothing is retried.
#[derive(Debug, Error)]
pub enum MailerError {
    /// The secure random source failed while generating the message id
    #[error("could not generate a message id")]
    RandomSourceFailure(#[source] rand::Error),

    /// The sender or one of the recipients is not a valid address
    #[error(transparent)]
    InvalidAddress(#[from] EmailAddressError),

    /// The connection or the SMTP client could not be established
    #[error("could not connect to the mail server")]
    ConnectionFailure(#[source] anyhow::Error),

    /// The server refused the credentials
    #[error("the mail server rejected the credentials")]
    AuthenticationFailure(#[source] anyhow::Error),

    /// The server refused the sender address
    #[error("sender \"{address}\" was rejected")]
    SenderRejected {
        /// The rejected sender
        address: String,
        /// The underlying protocol error
        #[source]
        source: anyhow::Error,
    },

    /// The server refused one of the recipients
    #[error("recipient \"{address}\" was rejected")]
    RecipientRejected {
        /// The rejected recipient
        address: String,
        /// The underlying protocol error
        #[source]
        source: anyhow::Error,
    },

    /// Writing or terminating the message body failed
    #[error("could not transfer the message body")]
    DataTransferFailure(#[source] anyhow::Error),

    /// The single-call submission failed
    #[error("could not submit the email")]
    SubmissionFailure(#[source] anyhow::Error),

    /// Unknown error
    #[error(transparent)]
    UnknownError(anyhow::Error),
}

impl From<anyhow::Error> for MailerError {
    fn from(err: anyhow::Error) -> Self {
        MailerError::UnknownError(err)
    }
}

impl From<Error> for MailerError {
    fn from(err: Error) -> Self {
        debug!("lettre::error::Error -> MailerError");

        MailerError::UnknownError(err.into())
    }
}

impl From<rand::Error> for MailerError {
    fn from(err: rand::Error) -> Self {
        debug!("rand::Error -> MailerError");

        MailerError::RandomSourceFailure(err)
    }
}
