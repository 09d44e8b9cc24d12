//! SMTP sessions over an implicit TLS connection

use anyhow::Result;
use lettre::{
    transport::smtp::{
        authentication::{Credentials, Mechanism},
        client::{SmtpConnection, TlsParameters},
        commands::{Data, Mail, Rcpt},
        extension::ClientId,
    },
    Address,
};

#[cfg(test)]
use mockall::mock;

/// An open, greeted SMTP session
pub trait SmtpSession: Send {
    /// Authenticates with `AUTH PLAIN`
    fn authenticate(&mut self, credentials: &Credentials) -> Result<()>;

    /// Declares the sender (`MAIL FROM`)
    fn mail(&mut self, sender: &Address) -> Result<()>;

    /// Declares a single recipient (`RCPT TO`)
    fn rcpt(&mut self, recipient: &Address) -> Result<()>;

    /// Sends `DATA`, writes the payload and terminates the data stream
    fn data(&mut self, payload: &[u8]) -> Result<()>;

    /// Closes the session and its connection. Errors are ignored.
    fn close(&mut self);
}

/// Opens SMTP sessions
pub trait SmtpConnector: Send + Sync + 'static {
    /// Dials `host:port` over TLS, verifying the certificate against `host`, and
    /// completes the SMTP greeting.
    fn connect(&self, host: &str, port: u16) -> Result<Box<dyn SmtpSession>>;
}

/// Connector backed by lettre's blocking SMTP client
#[derive(Debug, Clone, Copy, Default)]
pub struct LettreConnector;

impl SmtpConnector for LettreConnector {
    fn connect(&self, host: &str, port: u16) -> Result<Box<dyn SmtpSession>> {
        let tls = TlsParameters::new(host.to_string())?;
        let connection =
            SmtpConnection::connect((host, port), None, &ClientId::default(), Some(&tls), None)?;

        Ok(Box::new(LettreSession(connection)))
    }
}

/// A session on a lettre [`SmtpConnection`]
pub struct LettreSession(SmtpConnection);

impl std::fmt::Debug for LettreSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("LettreSession").finish()
    }
}

impl SmtpSession for LettreSession {
    fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        self.0.auth(&[Mechanism::Plain], credentials)?;

        Ok(())
    }

    fn mail(&mut self, sender: &Address) -> Result<()> {
        self.0.command(Mail::new(Some(sender.clone()), vec![]))?;

        Ok(())
    }

    fn rcpt(&mut self, recipient: &Address) -> Result<()> {
        self.0.command(Rcpt::new(recipient.clone(), vec![]))?;

        Ok(())
    }

    fn data(&mut self, payload: &[u8]) -> Result<()> {
        self.0.command(Data)?;
        self.0.message(payload)?;

        Ok(())
    }

    fn close(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mock! {
    pub SmtpSession {}

    impl SmtpSession for SmtpSession {
        fn authenticate(&mut self, credentials: &Credentials) -> Result<()>;
        fn mail(&mut self, sender: &Address) -> Result<()>;
        fn rcpt(&mut self, recipient: &Address) -> Result<()>;
        fn data(&mut self, payload: &[u8]) -> Result<()>;
        fn close(&mut self);
    }
}

#[cfg(test)]
mock! {
    pub SmtpConnector {}

    impl SmtpConnector for SmtpConnector {
        fn connect(&self, host: &str, port: u16) -> Result<Box<dyn SmtpSession>>;
    }
}
