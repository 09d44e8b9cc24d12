//! Adapters to external systems

pub mod email;
pub mod oauth;
