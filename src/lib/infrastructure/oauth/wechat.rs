//! WeChat login code exchange

use std::{fmt, time::Duration};

use async_trait::async_trait;
use clap::Parser;
use reqwest::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    Client, StatusCode,
};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::domain::auth::{CodeExchangeError, IdentityProvider, ServerAddressError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

const USER_PATH: &str = "/api/wechat/user";

/// WeChat login server configuration
#[derive(Clone, Default, Parser)]
pub struct WeChatConfig {
    /// The base address of the WeChat login server
    #[clap(long = "wechat-server-address", env = "WECHAT_SERVER_ADDRESS", default_value = "")]
    pub server_address: String,

    /// The token sent in the `Authorization` header
    #[clap(
        long = "wechat-server-token",
        env = "WECHAT_SERVER_TOKEN",
        default_value = "",
        hide_env_values = true
    )]
    pub server_token: String,

    /// Hosts the server address may point to
    #[clap(
        long = "wechat-allowed-domain",
        env = "WECHAT_ALLOWED_DOMAINS",
        value_delimiter = ','
    )]
    pub allowed_domains: Vec<String>,
}

impl fmt::Debug for WeChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeChatConfig")
            .field("server_address", &self.server_address)
            .field("server_token", &"<redacted>")
            .field("allowed_domains", &self.allowed_domains)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct WeChatLoginResponse {
    success: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: String,
}

/// Checks that `address` is an HTTPS URL on one of the `allowed` hosts.
///
/// The host, including an explicit port if there is one, must match an allowed
/// entry exactly.
pub fn validate_server_address(
    address: &str,
    allowed: &[String],
) -> Result<Url, ServerAddressError> {
    if address.is_empty() {
        return Err(ServerAddressError::Missing);
    }

    let url = Url::parse(address).map_err(|e| ServerAddressError::Invalid(e.to_string()))?;

    if url.scheme() != "https" {
        return Err(ServerAddressError::InsecureScheme);
    }

    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => return Err(ServerAddressError::Invalid("missing host".to_string())),
    };

    if !allowed.iter().any(|domain| *domain == host) {
        return Err(ServerAddressError::DomainNotAllowed(host));
    }

    Ok(url)
}

/// Client for the WeChat login server
#[derive(Debug, Clone)]
pub struct WeChatClient {
    client: Client,
    endpoint: Url,
    token: String,
}

impl WeChatClient {
    /// Creates a client, validating the configured server address
    pub fn new(config: &WeChatConfig) -> Result<Self, CodeExchangeError> {
        let base = validate_server_address(&config.server_address, &config.allowed_domains)?;

        Self::with_base_url(base, &config.server_token)
    }

    fn with_base_url(mut base: Url, token: &str) -> Result<Self, CodeExchangeError> {
        let path = format!("{}{USER_PATH}", base.path().trim_end_matches('/'));
        base.set_path(&path);

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CodeExchangeError::Request(e.into()))?;

        Ok(Self {
            client,
            endpoint: base,
            token: token.to_string(),
        })
    }
}

#[async_trait]
impl IdentityProvider for WeChatClient {
    async fn identity_for_code(&self, code: &str) -> Result<String, CodeExchangeError> {
        if code.is_empty() {
            return Err(CodeExchangeError::EmptyCode);
        }

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("code", code)])
            .header(AUTHORIZATION, &self.token)
            .send()
            .await
            .map_err(|e| CodeExchangeError::Request(e.into()))?;

        if response.status() != StatusCode::OK {
            debug!(status = %response.status(), "identity provider refused the request");

            return Err(CodeExchangeError::UnexpectedStatus(
                response.status().as_u16(),
            ));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if !content_type.starts_with("application/json") {
            return Err(CodeExchangeError::UnexpectedContentType(content_type));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| CodeExchangeError::Request(e.into()))?;

        let login: WeChatLoginResponse = serde_json::from_slice(&body)?;

        if !login.success {
            return Err(CodeExchangeError::Rejected(login.message));
        }

        if login.data.is_empty() {
            return Err(CodeExchangeError::InvalidCode);
        }

        Ok(login.data)
    }
}
