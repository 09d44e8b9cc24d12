//! Third-party login

mod errors;
mod identity_provider;

pub use errors::{CodeExchangeError, ServerAddressError};
pub use identity_provider::IdentityProvider;
