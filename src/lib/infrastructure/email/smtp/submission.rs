//! Direct submission: one blocking call does the whole exchange

use anyhow::Result;
use lettre::{
    address::Envelope,
    transport::smtp::{
        authentication::Mechanism,
        client::{Tls, TlsParameters},
    },
    SmtpTransport, Transport,
};

#[cfg(test)]
use mockall::mock;

use crate::domain::communication::mailer::MailerError;

use super::{Delivery, TransportConfig};

/// Performs handshake, authentication, envelope and data transfer in one call
pub trait Submitter: Send + Sync + 'static {
    /// Submits `payload` to every recipient of `envelope`
    fn submit(&self, config: &TransportConfig, envelope: &Envelope, payload: &[u8]) -> Result<()>;
}

/// Submitter backed by lettre's [`SmtpTransport`].
///
/// STARTTLS is used when the server offers it. A fresh transport is built for
/// every submission, so no connection outlives the call.
#[derive(Debug, Clone, Copy, Default)]
pub struct LettreSubmitter;

impl Submitter for LettreSubmitter {
    fn submit(&self, config: &TransportConfig, envelope: &Envelope, payload: &[u8]) -> Result<()> {
        let transport = SmtpTransport::builder_dangerous(&config.host)
            .port(config.port)
            .tls(Tls::Opportunistic(TlsParameters::new(config.host.clone())?))
            .credentials(config.credentials())
            .authentication(vec![Mechanism::Plain])
            .timeout(None)
            .build();

        transport.send_raw(envelope, payload)?;

        Ok(())
    }
}

/// The direct submission strategy
#[derive(Debug)]
pub struct DirectSubmission<S> {
    submitter: S,
}

impl<S: Submitter> DirectSubmission<S> {
    /// Creates the strategy on top of `submitter`
    pub fn new(submitter: S) -> Self {
        Self { submitter }
    }
}

impl<S: Submitter> Delivery for DirectSubmission<S> {
    fn deliver(
        &self,
        config: &TransportConfig,
        envelope: &Envelope,
        payload: &[u8],
    ) -> Result<(), MailerError> {
        self.submitter
            .submit(config, envelope, payload)
            .map_err(MailerError::SubmissionFailure)
    }
}

#[cfg(test)]
mock! {
    pub Submitter {}

    impl Submitter for Submitter {
        fn submit(&self, config: &TransportConfig, envelope: &Envelope, payload: &[u8]) -> Result<()>;
    }
}
