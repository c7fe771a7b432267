//! Weather and IP geolocation providers.
//!
//! Tencent's location service only speaks JSONP, so its calls go through the
//! bridge. AMap and the keyless fallback API are plain JSON over HTTP. All
//! payloads are returned untouched.

use homepage_core::{WeatherConfig, WeatherProviderKind};
use serde::Serialize;
use serde_json::Value;
use tracing::{instrument, warn};
use url::Url;

use crate::client::{Gateway, NO_QUERY};
use crate::error::GatewayError;
use crate::jsonp::DEFAULT_CALLBACK_PARAM;

/// Weather for wherever the caller's IP resolves to, tagged by the provider
/// that answered.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum LocalWeather {
    Tencent { location: Value, weather: Value },
    Amap { location: Value, weather: Value },
    Fallback { weather: Value },
}

impl Gateway {
    /// Tencent IP location (JSONP).
    #[instrument(skip(self, key), level = "info")]
    pub async fn get_tx_adcode(&self, key: &str) -> Result<Value, GatewayError> {
        self.tencent_jsonp("ws/location/v1/ip", &[("key", key)]).await
    }

    /// Tencent current weather for an adcode (JSONP).
    #[instrument(skip(self, key), level = "info")]
    pub async fn get_tx_weather(&self, key: &str, adcode: &str) -> Result<Value, GatewayError> {
        self.tencent_jsonp(
            "ws/weather/v1/",
            &[("key", key), ("adcode", adcode), ("type", "now")],
        )
        .await
    }

    /// AMap IP location.
    #[instrument(skip(self, key), level = "info")]
    pub async fn get_adcode(&self, key: &str) -> Result<Value, GatewayError> {
        let url = format!("{}/v3/ip", self.endpoints.amap.trim_end_matches('/'));
        self.get_json(&url, &[("key", key)]).await
    }

    /// AMap live weather for a city or adcode.
    #[instrument(skip(self, key), level = "info")]
    pub async fn get_weather(&self, key: &str, city: &str) -> Result<Value, GatewayError> {
        let url = format!(
            "{}/v3/weather/weatherInfo",
            self.endpoints.amap.trim_end_matches('/')
        );
        self.get_json(&url, &[("key", key), ("city", city)]).await
    }

    /// Keyless weather API.
    #[instrument(skip(self), level = "info")]
    pub async fn get_other_weather(&self) -> Result<Value, GatewayError> {
        self.get_json(&self.endpoints.other_weather, NO_QUERY).await
    }

    /// Locate by IP, then fetch weather from the configured provider.
    ///
    /// Without a key, or when the keyed provider fails, answers from the
    /// keyless API instead. That second call is not retried.
    #[instrument(skip(self, config), fields(provider = ?config.provider), level = "info")]
    pub async fn get_local_weather(
        &self,
        config: &WeatherConfig,
    ) -> Result<LocalWeather, GatewayError> {
        let keyed = match (config.provider, config.key()) {
            (WeatherProviderKind::Tencent, Some(key)) => Some(self.tencent_local(key).await),
            (WeatherProviderKind::Amap, Some(key)) => Some(self.amap_local(key).await),
            _ => None,
        };

        match keyed {
            Some(Ok(weather)) => return Ok(weather),
            Some(Err(e)) => warn!("Keyed weather provider failed, using fallback: {}", e),
            None => {}
        }

        let weather = self.get_other_weather().await?;
        Ok(LocalWeather::Fallback { weather })
    }

    async fn tencent_local(&self, key: &str) -> Result<LocalWeather, GatewayError> {
        let location = self.get_tx_adcode(key).await?;
        let adcode = tencent_adcode(&location)?;
        let weather = self.get_tx_weather(key, &adcode).await?;
        ensure_tencent_ok(&weather)?;
        Ok(LocalWeather::Tencent { location, weather })
    }

    async fn amap_local(&self, key: &str) -> Result<LocalWeather, GatewayError> {
        let location = self.get_adcode(key).await?;
        let adcode = amap_adcode(&location)?;
        let weather = self.get_weather(key, &adcode).await?;
        ensure_amap_ok(&weather)?;
        Ok(LocalWeather::Amap { location, weather })
    }

    async fn tencent_jsonp(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Value, GatewayError> {
        let base = format!("{}/{}", self.endpoints.tencent_map.trim_end_matches('/'), path);
        self.bridge
            .fetch_with_token(|token| {
                Url::parse_with_params(
                    &base,
                    params.iter().copied().chain([
                        ("output", "jsonp"),
                        (DEFAULT_CALLBACK_PARAM, token.as_str()),
                    ]),
                )
            })
            .await
    }
}

/// Tencent reports failures in-band with a non-zero `status`.
fn ensure_tencent_ok(payload: &Value) -> Result<(), GatewayError> {
    match payload.get("status").and_then(Value::as_i64) {
        Some(0) => Ok(()),
        _ => Err(GatewayError::structure(format!(
            "tencent status {}: {}",
            payload.get("status").unwrap_or(&Value::Null),
            payload.get("message").and_then(Value::as_str).unwrap_or("")
        ))),
    }
}

/// AMap reports success as `status: "1"`.
fn ensure_amap_ok(payload: &Value) -> Result<(), GatewayError> {
    match payload.get("status").and_then(Value::as_str) {
        Some("1") => Ok(()),
        _ => Err(GatewayError::structure(format!(
            "amap status {}: {}",
            payload.get("status").unwrap_or(&Value::Null),
            payload.get("info").and_then(Value::as_str).unwrap_or("")
        ))),
    }
}

fn tencent_adcode(location: &Value) -> Result<String, GatewayError> {
    ensure_tencent_ok(location)?;
    match &location["result"]["ad_info"]["adcode"] {
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        _ => Err(GatewayError::structure("result.ad_info.adcode is missing")),
    }
}

/// AMap answers `adcode: []` for IPs it cannot place.
fn amap_adcode(location: &Value) -> Result<String, GatewayError> {
    ensure_amap_ok(location)?;
    match &location["adcode"] {
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        _ => Err(GatewayError::structure("adcode is missing")),
    }
}
