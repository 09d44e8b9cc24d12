//! Identity provider contract

use async_trait::async_trait;

use super::CodeExchangeError;

/// A third-party login provider that vouches for users with short-lived codes
#[async_trait]
pub trait IdentityProvider: Clone + Send + Sync + 'static {
    /// Exchanges a login code for the provider's identifier of the user.
    ///
    /// # Arguments
    /// * `code` - The code the user obtained from the provider.
    ///
    /// # Returns
    /// A [`Result`] which is [`Ok`] containing the external identifier, or an [`Err`]
    /// containing a [`CodeExchangeError`] if the provider did not confirm the code.
    async fn identity_for_code(&self, code: &str) -> Result<String, CodeExchangeError>;
}
