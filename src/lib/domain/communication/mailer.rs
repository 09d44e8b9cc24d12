//! Email service module

use async_trait::async_trait;

mod errors;
mod message;

pub use errors::MailerError;
pub use message::{
    encode_header_word, generate_message_id, sanitize_body, sanitize_header, sender_domain,
    OutboundMessage, Sender,
};

/// Email service
#[async_trait]
pub trait Mailer: Clone + Send + Sync + 'static {
    /// Send an HTML email
    ///
    /// # Arguments
    /// * `subject` - The subject of the email. Line breaks are replaced with spaces.
    /// * `recipients` - One or more recipient addresses, separated by `;`.
    /// * `html` - The HTML body of the email. Script-capable markup is removed.
    ///
    /// # Returns
    /// A [`Result`] which is [`Ok`] once the server accepted the message for every
    /// recipient, or an [`Err`] containing the first [`MailerError`] encountered.
    async fn send_email(&self, subject: &str, recipients: &str, html: &str)
        -> Result<(), MailerError>;
}
