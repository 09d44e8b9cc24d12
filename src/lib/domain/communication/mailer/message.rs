//! Email message

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, FixedOffset};
use lettre::address::Envelope;
use rand::{CryptoRng, RngCore};

use crate::domain::communication::email_addresses::{EmailAddress, Recipients};

use super::MailerError;

/// RFC 1123 with a numeric zone, e.g. `Mon, 02 Jan 2006 15:04:05 -0700`
const RFC1123Z: &str = "%a, %d %b %Y %H:%M:%S %z";

const MESSAGE_ID_BYTES: usize = 16;

/// The identity messages are sent from
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sender {
    /// The envelope and `From` address.
    ///
    /// An address without an `@` still yields a message id (`<hex@>`), but no
    /// envelope can be built from it: sending fails with
    /// [`MailerError::InvalidAddress`] before a connection is opened.
    pub address: String,

    /// The name shown next to the address
    pub display_name: String,
}

/// A composed, sanitized message ready to be handed to a transport
#[derive(Clone, Debug)]
pub struct OutboundMessage {
    subject: String,
    recipients: Recipients,
    body_html: String,
    sender: Sender,
    message_id: String,
    date: String,
}

impl OutboundMessage {
    /// Composes a message.
    ///
    /// The subject and body are sanitized, the recipients parsed and a fresh
    /// message id drawn from `rng`. Nothing is sent.
    ///
    /// # Errors
    /// * [`MailerError::InvalidAddress`] if the recipients do not parse.
    /// * [`MailerError::RandomSourceFailure`] if `rng` fails.
    pub fn compose<R>(
        rng: &mut R,
        sender: &Sender,
        subject: &str,
        recipients: &str,
        body_html: &str,
        sent_at: DateTime<FixedOffset>,
    ) -> Result<Self, MailerError>
    where
        R: RngCore + CryptoRng + ?Sized,
    {
        let recipients = Recipients::parse(recipients)?;
        let message_id = generate_message_id(rng, sender_domain(&sender.address))?;

        Ok(Self {
            subject: sanitize_header(subject),
            recipients,
            body_html: sanitize_body(body_html),
            sender: sender.clone(),
            message_id,
            date: sent_at.format(RFC1123Z).to_string(),
        })
    }

    /// The sanitized subject
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The sanitized HTML body
    pub fn body_html(&self) -> &str {
        &self.body_html
    }

    /// The parsed recipients
    pub fn recipients(&self) -> &Recipients {
        &self.recipients
    }

    /// The `Message-ID` header value, angle brackets included
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// The `Date` header value
    pub fn date(&self) -> &str {
        &self.date
    }

    /// Builds the SMTP envelope: the sender once, then every recipient in order.
    pub fn envelope(&self) -> Result<Envelope, MailerError> {
        let from = EmailAddress::new(&self.sender.address)?;
        let to = self
            .recipients
            .addresses()
            .iter()
            .cloned()
            .map(Into::into)
            .collect();

        Ok(Envelope::new(Some(from.into()), to)?)
    }

    /// Renders the message in wire format.
    ///
    /// Headers are emitted in a fixed order, each terminated by CRLF. Body line
    /// endings are normalized to CRLF. The payload does not end in CRLF: the
    /// transport writes `\r\n.\r\n` when it closes the data stream.
    pub fn formatted(&self) -> Vec<u8> {
        format!(
            "To: {to}\r\n\
             From: {from}\r\n\
             Subject: {subject}\r\n\
             Message-ID: {message_id}\r\n\
             Date: {date}\r\n\
             Content-Type: text/html; charset=UTF-8\r\n\
             \r\n\
             {body}",
            to = self.recipients.header(),
            from = self.from_header(),
            subject = encode_header_word(&self.subject),
            message_id = self.message_id,
            date = self.date,
            body = crlf_line_endings(&self.body_html),
        )
        .into_bytes()
    }

    fn from_header(&self) -> String {
        let name = sanitize_header(self.sender.display_name.trim());
        let address = sanitize_header(&self.sender.address);

        if name.is_empty() {
            format!("<{address}>")
        } else if name.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ') {
            format!("{name} <{address}>")
        } else {
            format!("{} <{address}>", encode_header_word(&name))
        }
    }
}

/// Replaces every carriage return and line feed with a space.
pub fn sanitize_header(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

/// Rewrites every `\r\n`, lone `\r` and lone `\n` as `\r\n`.
fn crlf_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\n', "\r\n")
}

/// Encodes a header value as a UTF-8, base64 MIME encoded-word.
pub fn encode_header_word(value: &str) -> String {
    format!("=?UTF-8?B?{}?=", STANDARD.encode(value))
}

/// Cleans an HTML body with a policy suitable for user-generated content.
///
/// Scripts, event handlers and other active content are removed; formatting
/// markup is kept.
pub fn sanitize_body(html: &str) -> String {
    ammonia::clean(html)
}

/// The part of `address` after the first `@`, or an empty string.
pub fn sender_domain(address: &str) -> &str {
    address.split('@').nth(1).unwrap_or_default()
}

/// Generates a `<hex@domain>` message id from 16 random bytes.
pub fn generate_message_id<R>(rng: &mut R, domain: &str) -> Result<String, MailerError>
where
    R: RngCore + CryptoRng + ?Sized,
{
    let mut buf = [0u8; MESSAGE_ID_BYTES];
    rng.try_fill_bytes(&mut buf)?;

    Ok(format!("<{}@{}>", hex::encode(buf), domain))
}
