//! Shared helpers for gateway integration tests.

#![allow(dead_code)]

use std::time::Duration;

use homepage_core::{Config, EndpointsConfig};
use homepage_gateway::Gateway;
use wiremock::{MockServer, Request, Respond, ResponseTemplate};

/// Answers like a JSONP endpoint: wraps `payload` in a call to whatever
/// name the request passed as `callback`.
pub struct JsonpResponder {
    pub payload: serde_json::Value,
    pub delay: Option<Duration>,
}

impl JsonpResponder {
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            payload,
            delay: None,
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Respond for JsonpResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let callback = request
            .url
            .query_pairs()
            .find(|(name, _)| name == "callback")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();

        let template = ResponseTemplate::new(200).set_body_raw(
            format!("{}({})", callback, self.payload),
            "application/javascript",
        );
        match self.delay {
            Some(delay) => template.set_delay(delay),
            None => template,
        }
    }
}

/// Gateway with the music proxy at `<mock>/api` and every provider on the mock.
pub fn gateway_for(server: &MockServer) -> Gateway {
    Gateway::new(&config_for(server)).unwrap()
}

pub fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.music.api_url = Some(format!("{}/api", server.uri()));
    config.endpoints = EndpointsConfig::all_at(&server.uri());
    config
}
