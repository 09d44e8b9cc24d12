//! SMTP email service implementation

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use chrono::Local;
use clap::{Parser, ValueEnum};
use lettre::{address::Envelope, transport::smtp::authentication::Credentials};
use rand::{rngs::OsRng, CryptoRng, RngCore};
use tracing::debug;

use crate::domain::communication::mailer::{Mailer, MailerError, OutboundMessage, Sender};

mod implicit_tls;
mod session;
mod submission;

pub use implicit_tls::ImplicitTls;
pub use session::{LettreConnector, LettreSession, SmtpConnector, SmtpSession};
pub use submission::{DirectSubmission, LettreSubmitter, Submitter};

/// The port on which servers expect TLS before any SMTP traffic
pub const IMPLICIT_TLS_PORT: u16 = 465;

/// How a message reaches the SMTP server
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TransportStrategy {
    /// Dial TLS first, then run the SMTP transaction step by step
    ImplicitTls,

    /// Hand the whole exchange to a single submission call, upgrading with
    /// STARTTLS when the server offers it
    Submission,
}

impl TransportStrategy {
    /// The strategy a server listening on `port` expects
    pub fn for_port(port: u16) -> Self {
        if port == IMPLICIT_TLS_PORT {
            Self::ImplicitTls
        } else {
            Self::Submission
        }
    }
}

/// SMTP configuration
#[derive(Clone, Default, Parser)]
pub struct SMTPConfig {
    /// The SMTP host
    #[clap(long = "smtp-server", env = "SMTP_SERVER")]
    pub host: String,

    /// The SMTP port
    #[clap(long = "smtp-port", env = "SMTP_PORT", default_value = "587")]
    pub port: u16,

    /// The account used to authenticate
    #[clap(long = "smtp-account", env = "SMTP_ACCOUNT")]
    pub account: String,

    /// The secret used to authenticate
    #[clap(long = "smtp-token", env = "SMTP_TOKEN", hide_env_values = true)]
    pub token: String,

    /// The sender address, defaults to the account
    #[clap(long = "smtp-from", env = "SMTP_FROM")]
    pub from: Option<String>,

    /// The name shown next to the sender address
    #[clap(long = "system-name", env = "SYSTEM_NAME", default_value = "")]
    pub system_name: String,

    /// Override the transport strategy derived from the port
    #[clap(long = "smtp-transport", env = "SMTP_TRANSPORT", value_enum)]
    pub transport: Option<TransportStrategy>,
}

impl fmt::Debug for SMTPConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SMTPConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("account", &self.account)
            .field("token", &"<redacted>")
            .field("from", &self.from)
            .field("system_name", &self.system_name)
            .field("transport", &self.transport)
            .finish()
    }
}

/// Resolved, immutable transport settings
#[derive(Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// The SMTP host, also used as the TLS server name
    pub host: String,

    /// The SMTP port
    pub port: u16,

    /// The account used to authenticate
    pub account: String,

    /// The secret used to authenticate
    pub secret: String,

    /// Who messages are sent from
    pub sender: Sender,

    /// How messages reach the server
    pub strategy: TransportStrategy,
}

impl TransportConfig {
    /// Credentials for `AUTH PLAIN`
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.account.clone(), self.secret.clone())
    }
}

impl From<SMTPConfig> for TransportConfig {
    fn from(config: SMTPConfig) -> Self {
        let address = config
            .from
            .filter(|from| !from.trim().is_empty())
            .unwrap_or_else(|| config.account.clone());

        Self {
            strategy: config
                .transport
                .unwrap_or_else(|| TransportStrategy::for_port(config.port)),
            host: config.host,
            port: config.port,
            account: config.account,
            secret: config.token,
            sender: Sender {
                address,
                display_name: config.system_name,
            },
        }
    }
}

impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("account", &self.account)
            .field("secret", &"<redacted>")
            .field("sender", &self.sender)
            .field("strategy", &self.strategy)
            .finish()
    }
}

/// A way of delivering a composed message
pub trait Delivery: Send + Sync {
    /// Delivers `payload` to every recipient of `envelope`
    fn deliver(
        &self,
        config: &TransportConfig,
        envelope: &Envelope,
        payload: &[u8],
    ) -> Result<(), MailerError>;
}

/// SMTP mailer
#[derive(Debug)]
pub struct SMTPMailer<C = LettreConnector, S = LettreSubmitter> {
    config: Arc<TransportConfig>,
    implicit_tls: Arc<ImplicitTls<C>>,
    submission: Arc<DirectSubmission<S>>,
}

impl SMTPMailer {
    /// Create a new SMTP mailer
    pub fn new(config: TransportConfig) -> Self {
        Self::with_transports(config, LettreConnector, LettreSubmitter)
    }
}

impl<C, S> SMTPMailer<C, S>
where
    C: SmtpConnector,
    S: Submitter,
{
    /// Create a new SMTP mailer on top of the given connector and submitter
    pub fn with_transports(config: TransportConfig, connector: C, submitter: S) -> Self {
        Self {
            config: Arc::new(config),
            implicit_tls: Arc::new(ImplicitTls::new(connector)),
            submission: Arc::new(DirectSubmission::new(submitter)),
        }
    }

    /// The transport settings
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn delivery(&self) -> &dyn Delivery {
        match self.config.strategy {
            TransportStrategy::ImplicitTls => self.implicit_tls.as_ref(),
            TransportStrategy::Submission => self.submission.as_ref(),
        }
    }

    /// Composes and delivers a message, blocking until the server has answered.
    ///
    /// Randomness for the message id is drawn from `rng` before any connection is
    /// opened.
    pub fn send_blocking<R>(
        &self,
        rng: &mut R,
        subject: &str,
        recipients: &str,
        html: &str,
    ) -> Result<(), MailerError>
    where
        R: RngCore + CryptoRng + ?Sized,
    {
        let message = OutboundMessage::compose(
            rng,
            &self.config.sender,
            subject,
            recipients,
            html,
            Local::now().fixed_offset(),
        )?;
        let envelope = message.envelope()?;

        debug!(
            message_id = message.message_id(),
            strategy = ?self.config.strategy,
            recipients = envelope.to().len(),
            "delivering email"
        );

        self.delivery()
            .deliver(&self.config, &envelope, &message.formatted())
    }
}

impl<C, S> Clone for SMTPMailer<C, S> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            implicit_tls: Arc::clone(&self.implicit_tls),
            submission: Arc::clone(&self.submission),
        }
    }
}

#[async_trait]
impl<C, S> Mailer for SMTPMailer<C, S>
where
    C: SmtpConnector,
    S: Submitter,
{
    async fn send_email(
        &self,
        subject: &str,
        recipients: &str,
        html: &str,
    ) -> Result<(), MailerError> {
        let mailer = self.clone();
        let (subject, recipients, html) =
            (subject.to_string(), recipients.to_string(), html.to_string());

        tokio::task::spawn_blocking(move || {
            mailer.send_blocking(&mut OsRng, &subject, &recipients, &html)
        })
        .await
        .map_err(|e| MailerError::UnknownError(e.into()))?
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use anyhow::anyhow;
    use lettre::Address;
    use testresult::TestResult;

    use super::{
        session::{MockSmtpConnector, MockSmtpSession},
        submission::MockSubmitter,
        *,
    };
    use crate::domain::communication::mailer::tests::FailingRng;

    pub(crate) fn transport_config(port: u16) -> TransportConfig {
        TransportConfig::from(SMTPConfig {
            host: "smtp.example.com".to_string(),
            port,
            account: "app@example.com".to_string(),
            token: "secret".to_string(),
            from: None,
            system_name: "Example App".to_string(),
            transport: None,
        })
    }

    pub(crate) fn envelope(recipients: &[&str]) -> Envelope {
        let to = recipients
            .iter()
            .map(|r| r.parse::<Address>())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        Envelope::new(Some("app@example.com".parse().unwrap()), to).unwrap()
    }

    fn accepting_session() -> MockSmtpSession {
        let mut session = MockSmtpSession::new();

        session.expect_authenticate().returning(|_| Ok(()));
        session.expect_mail().returning(|_| Ok(()));
        session.expect_rcpt().returning(|_| Ok(()));
        session.expect_data().returning(|_| Ok(()));
        session.expect_close().times(1).return_const(());

        session
    }

    #[test]
    fn test_strategy_for_port() {
        assert_eq!(TransportStrategy::for_port(465), TransportStrategy::ImplicitTls);
        assert_eq!(TransportStrategy::for_port(587), TransportStrategy::Submission);
        assert_eq!(TransportStrategy::for_port(25), TransportStrategy::Submission);
    }

    #[test]
    fn test_sender_defaults_to_account() {
        let config = transport_config(587);

        assert_eq!(config.sender.address, "app@example.com");
        assert_eq!(config.strategy, TransportStrategy::Submission);

        let blank_from = TransportConfig::from(SMTPConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            account: "app@example.com".to_string(),
            token: "secret".to_string(),
            from: Some("  ".to_string()),
            system_name: String::new(),
            transport: None,
        });

        assert_eq!(blank_from.sender.address, "app@example.com");
    }

    #[test]
    fn test_explicit_sender_and_strategy_win() {
        let config = TransportConfig::from(SMTPConfig {
            host: "smtp.example.com".to_string(),
            port: 2465,
            account: "account".to_string(),
            token: "secret".to_string(),
            from: Some("noreply@example.com".to_string()),
            system_name: String::new(),
            transport: Some(TransportStrategy::ImplicitTls),
        });

        assert_eq!(config.sender.address, "noreply@example.com");
        assert_eq!(config.strategy, TransportStrategy::ImplicitTls);
    }

    #[test]
    fn test_debug_output_redacts_secret() {
        let output = format!("{:?}", transport_config(465));

        assert!(!output.contains("secret\""));
        assert!(output.contains("<redacted>"));
    }

    #[test]
    fn test_port_465_uses_implicit_tls() -> TestResult {
        let mut connector = MockSmtpConnector::new();
        let session = accepting_session();

        connector
            .expect_connect()
            .times(1)
            .withf(|host, port| host == "smtp.example.com" && *port == 465)
            .return_once(move |_, _| Ok(Box::new(session) as Box<dyn SmtpSession>));

        let mut submitter = MockSubmitter::new();
        submitter.expect_submit().times(0);

        let mailer = SMTPMailer::with_transports(transport_config(465), connector, submitter);

        mailer.send_blocking(&mut OsRng, "Hello", "a@x.com;b@y.com", "<p>Hi</p>")?;

        Ok(())
    }

    #[test]
    fn test_other_ports_use_direct_submission() -> TestResult {
        let mut connector = MockSmtpConnector::new();
        connector.expect_connect().times(0);

        let mut submitter = MockSubmitter::new();
        submitter
            .expect_submit()
            .times(1)
            .withf(|_, envelope, payload| {
                envelope.to().len() == 2 && payload.starts_with(b"To: a@x.com;b@y.com\r\n")
            })
            .returning(|_, _, _| Ok(()));

        let mailer = SMTPMailer::with_transports(transport_config(587), connector, submitter);

        mailer.send_blocking(&mut OsRng, "Hello", "a@x.com;b@y.com", "<p>Hi</p>")?;

        Ok(())
    }

    #[test]
    fn test_submitted_payload_uses_crlf_line_endings() -> TestResult {
        let mut submitter = MockSubmitter::new();
        submitter
            .expect_submit()
            .times(1)
            .withf(|_, _, payload| {
                let line_endings = payload.windows(2).filter(|w| *w == b"\r\n").count();
                let line_feeds = payload.iter().filter(|&&b| b == b'\n').count();

                line_feeds == line_endings
                    && payload.ends_with(b"<p>b</p>")
                    && payload.windows(5).any(|w| w == b"\r\n.\r\n")
            })
            .returning(|_, _, _| Ok(()));

        let mailer = SMTPMailer::with_transports(
            transport_config(587),
            MockSmtpConnector::new(),
            submitter,
        );

        mailer.send_blocking(&mut OsRng, "Hello", "a@x.com", "<p>a</p>\n.\n<p>b</p>")?;

        Ok(())
    }

    #[test]
    fn test_random_source_failure_opens_no_connection() {
        let mut connector = MockSmtpConnector::new();
        connector.expect_connect().times(0);

        let mut submitter = MockSubmitter::new();
        submitter.expect_submit().times(0);

        let mailer = SMTPMailer::with_transports(transport_config(465), connector, submitter);

        let result = mailer.send_blocking(&mut FailingRng, "Hello", "a@x.com", "<p>Hi</p>");

        assert!(matches!(result, Err(MailerError::RandomSourceFailure(_))));
    }

    #[test]
    fn test_invalid_sender_opens_no_connection() {
        let mut connector = MockSmtpConnector::new();
        connector.expect_connect().times(0);

        let mut submitter = MockSubmitter::new();
        submitter.expect_submit().times(0);

        let mut config = transport_config(465);
        config.sender.address = "app".to_string();

        let mailer = SMTPMailer::with_transports(config, connector, submitter);

        let result = mailer.send_blocking(&mut OsRng, "Hello", "a@x.com", "<p>Hi</p>");

        assert!(matches!(result, Err(MailerError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn test_send_email_reports_submission_failure() {
        let mut connector = MockSmtpConnector::new();
        connector.expect_connect().times(0);

        let mut submitter = MockSubmitter::new();
        submitter
            .expect_submit()
            .times(1)
            .returning(|_, _, _| Err(anyhow!("421 service not available")));

        let mailer = SMTPMailer::with_transports(transport_config(587), connector, submitter);

        let result = mailer.send_email("Hello", "a@x.com", "<p>Hi</p>").await;

        assert!(matches!(result, Err(MailerError::SubmissionFailure(_))));
    }

    #[tokio::test]
    async fn test_concurrent_sends_share_nothing_but_config() -> TestResult {
        let mut submitter = MockSubmitter::new();
        submitter
            .expect_submit()
            .times(2)
            .returning(|_, _, _| Ok(()));

        let mailer = SMTPMailer::with_transports(
            transport_config(587),
            MockSmtpConnector::new(),
            submitter,
        );

        let (first, second) = tokio::join!(
            mailer.send_email("First", "a@x.com", "<p>1</p>"),
            mailer.send_email("Second", "b@y.com", "<p>2</p>"),
        );

        first?;
        second?;

        Ok(())
    }
}
