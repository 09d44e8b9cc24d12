//! Recipient lists

use super::{EmailAddress, EmailAddressError};

/// The recipients of a single message.
///
/// Callers pass recipients as one `;`-delimited string. The string is kept for the
/// visible `To` header while each address becomes its own `RCPT` target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recipients {
    header: String,
    addresses: Vec<EmailAddress>,
}

impl Recipients {
    /// Parse a `;`-delimited recipient string.
    ///
    /// Empty segments are skipped. Fails if any remaining segment is not a valid
    /// address, or if no address is left at all.
    pub fn parse(raw: &str) -> Result<Self, EmailAddressError> {
        let addresses = raw
            .split(';')
            .filter(|segment| !segment.trim().is_empty())
            .map(EmailAddress::new)
            .collect::<Result<Vec<_>, _>>()?;

        if addresses.is_empty() {
            return Err(EmailAddressError::EmptyEmailAddress);
        }

        Ok(Self {
            header: raw.replace(['\r', '\n'], " "),
            addresses,
        })
    }

    /// The value of the `To` header, as written by the caller
    pub fn header(&self) -> &str {
        &self.header
    }

    /// The individual addresses, in the order they were given
    pub fn addresses(&self) -> &[EmailAddress] {
        &self.addresses
    }
}
