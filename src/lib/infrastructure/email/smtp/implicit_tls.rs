//! Implicit TLS: the TLS handshake happens before any SMTP traffic

use lettre::{address::Envelope, transport::smtp::authentication::Credentials, Address};

use crate::domain::communication::{email_addresses::EmailAddressError, mailer::MailerError};

use super::{Delivery, SmtpConnector, SmtpSession, TransportConfig};

/// The implicit TLS strategy, stepping through the SMTP transaction explicitly
#[derive(Debug)]
pub struct ImplicitTls<C> {
    connector: C,
}

impl<C: SmtpConnector> ImplicitTls<C> {
    /// Creates the strategy on top of `connector`
    pub fn new(connector: C) -> Self {
        Self { connector }
    }
}

impl<C: SmtpConnector> Delivery for ImplicitTls<C> {
    fn deliver(
        &self,
        config: &TransportConfig,
        envelope: &Envelope,
        payload: &[u8],
    ) -> Result<(), MailerError> {
        let sender = envelope
            .from()
            .ok_or(MailerError::InvalidAddress(EmailAddressError::EmptyEmailAddress))?;

        let mut session = self
            .connector
            .connect(&config.host, config.port)
            .map_err(MailerError::ConnectionFailure)?;

        let result = transaction(
            session.as_mut(),
            &config.credentials(),
            sender,
            envelope.to(),
            payload,
        );

        session.close();

        result
    }
}

fn transaction(
    session: &mut dyn SmtpSession,
    credentials: &Credentials,
    sender: &Address,
    recipients: &[Address],
    payload: &[u8],
) -> Result<(), MailerError> {
    session
        .authenticate(credentials)
        .map_err(MailerError::AuthenticationFailure)?;

    session
        .mail(sender)
        .map_err(|source| MailerError::SenderRejected {
            address: sender.to_string(),
            source,
        })?;

    for recipient in recipients {
        session
            .rcpt(recipient)
            .map_err(|source| MailerError::RecipientRejected {
                address: recipient.to_string(),
                source,
            })?;
    }

    session
        .data(payload)
        .map_err(MailerError::DataTransferFailure)
}
