//! Third-party API access for the homepage.
//!
//! Wraps the music proxy, the quote-of-the-day service and the weather and
//! geolocation providers behind [`Gateway`], normalizing playlists into
//! [`Track`]s and bridging JSONP-only endpoints through [`JsonpBridge`].

pub mod client;
pub mod error;
pub mod hitokoto;
pub mod jsonp;
pub mod player;
pub mod weather;

pub use client::Gateway;
pub use error::{GatewayError, JsonpError};
pub use jsonp::{CallbackToken, JsonpBridge};
pub use player::{RelayDescriptor, SongSource, Track};
pub use weather::LocalWeather;
