//! Email Address

use std::{fmt, str::FromStr};

use lettre::Address;
use thiserror::Error;

use EmailAddressError::*;

/// An error that can occur when creating an email address
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmailAddressError {
    /// The email address is empty
    #[error("email is empty")]
    EmptyEmailAddress,

    /// The email address is invalid
    #[error("email \"{0}\" is invalid")]
    InvalidEmailAddress(String),
}

/// A single mailbox address, as used in an SMTP envelope
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailAddress(Address);

impl EmailAddress {
    /// Create a new email address, trimming surrounding whitespace
    pub fn new(raw: &str) -> Result<Self, EmailAddressError> {
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(EmptyEmailAddress);
        }

        Address::from_str(trimmed)
            .map(Self)
            .map_err(|_| InvalidEmailAddress(trimmed.to_string()))
    }

    /// The domain part of the address
    pub fn domain(&self) -> &str {
        self.0.domain()
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<EmailAddress> for Address {
    fn from(email: EmailAddress) -> Self {
        email.0
    }
}

impl From<EmailAddress> for String {
    fn from(email: EmailAddress) -> Self {
        email.0.to_string()
    }
}
