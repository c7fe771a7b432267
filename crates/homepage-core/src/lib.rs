pub mod config;
pub mod error;

pub use config::{
    Config, EndpointsConfig, HttpConfig, MusicConfig, ValidationResult, WeatherConfig,
    WeatherProviderKind,
};
pub use error::{AppError, ConfigError, NetworkError, ReqwestErrorExt};

use anyhow::Result;

/// Initialize tracing/logging for the homepage binary
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Homepage core initialized");
    Ok(())
}
