//! The gateway facade shared by every provider module.

use homepage_core::{Config, EndpointsConfig, MusicConfig};
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::error::GatewayError;
use crate::jsonp::JsonpBridge;

/// Empty query for endpoints that take no parameters.
pub(crate) const NO_QUERY: &[(&str, &str)] = &[];

/// Stateless access to the homepage's third-party APIs.
///
/// Cloning is cheap; clones share the HTTP connection pool and the JSONP
/// callback table.
#[derive(Debug, Clone)]
pub struct Gateway {
    pub(crate) client: Client,
    pub(crate) bridge: JsonpBridge,
    pub(crate) endpoints: EndpointsConfig,
    pub(crate) music: MusicConfig,
}

impl Gateway {
    pub fn new(config: &Config) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .user_agent(config.http.user_agent.as_str())
            .build()?;

        Ok(Self::with_client(client, config))
    }

    /// Build around an existing client (shared pools, custom TLS).
    pub fn with_client(client: Client, config: &Config) -> Self {
        Self {
            bridge: JsonpBridge::new(client.clone()),
            client,
            endpoints: config.endpoints.clone(),
            music: config.music.clone(),
        }
    }

    /// The JSONP bridge used for callback-only endpoints.
    pub fn bridge(&self) -> &JsonpBridge {
        &self.bridge
    }

    pub fn endpoints(&self) -> &EndpointsConfig {
        &self.endpoints
    }

    /// GET `url` with `query` and decode the JSON body.
    ///
    /// Non-2xx responses are rejected before the body is read.
    pub(crate) async fn get_json<T, Q>(&self, url: &str, query: &Q) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
        Q: serde::Serialize + ?Sized,
    {
        let response = self.client.get(url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
