//! Playlist resolution through the music proxy.
//!
//! The proxy answers with an array of song descriptors. Usually each
//! descriptor's `url` is directly playable. Some upstreams instead put a
//! sentinel in the first descriptor's `url`:
//!
//! ```text
//! @<handle>@<callback param>@<callback function>@<secondary url>
//! ```
//!
//! The secondary URL is a JSONP endpoint whose payload lists candidate media
//! domains (`sip`) and one URL suffix per track (`midurlinfo[i].purl`), in
//! the same order as the descriptor array.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::client::Gateway;
use crate::error::GatewayError;

const SENTINEL: char = '@';
const INSECURE_DOMAIN_PREFIX: &str = "http://ws";

/// A playable track, ready for the player UI.
///
/// `lrc` is whatever the proxy sent: a lyric URL, inline lyrics, or an
/// object, depending on the upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    pub artist: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lrc: Option<Value>,
}

/// One element of the proxy's song list. Providers disagree on field names
/// and types, so a text field holding anything but a non-empty string counts
/// as missing rather than failing the whole list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawSong {
    #[serde(deserialize_with = "non_empty_string")]
    name: Option<String>,
    #[serde(deserialize_with = "non_empty_string")]
    title: Option<String>,
    #[serde(deserialize_with = "non_empty_string")]
    artist: Option<String>,
    #[serde(deserialize_with = "non_empty_string")]
    author: Option<String>,
    #[serde(deserialize_with = "non_empty_string")]
    url: Option<String>,
    #[serde(deserialize_with = "non_empty_string")]
    cover: Option<String>,
    #[serde(deserialize_with = "non_empty_string")]
    pic: Option<String>,
    lrc: Option<Value>,
}

impl RawSong {
    fn into_track(self, url: String) -> Track {
        Track {
            name: self.name.or(self.title).unwrap_or_default(),
            artist: self.artist.or(self.author).unwrap_or_default(),
            url,
            cover: self.cover.or(self.pic),
            lrc: self.lrc,
        }
    }
}

fn non_empty_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    })
}

/// Where the playable URLs of a song list come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SongSource {
    Direct(String),
    JsonpRelay(RelayDescriptor),
}

impl SongSource {
    pub fn decode(url: &str) -> Result<Self, GatewayError> {
        match url.strip_prefix(SENTINEL) {
            Some(rest) => RelayDescriptor::parse(rest).map(Self::JsonpRelay),
            None => Ok(Self::Direct(url.to_string())),
        }
    }
}

/// Decoded sentinel. Only `url` drives resolution; the other segments are
/// kept as the proxy sent them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayDescriptor {
    pub handle: String,
    pub callback_param: String,
    pub callback_function: String,
    pub url: String,
}

impl RelayDescriptor {
    fn parse(segments: &str) -> Result<Self, GatewayError> {
        let mut parts = segments.splitn(4, SENTINEL);
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(handle), Some(callback_param), Some(callback_function), Some(url))
                if !url.is_empty() =>
            {
                Ok(Self {
                    handle: handle.to_string(),
                    callback_param: callback_param.to_string(),
                    callback_function: callback_function.to_string(),
                    url: url.to_string(),
                })
            }
            _ => Err(GatewayError::structure(format!(
                "sentinel url has fewer than four segments: @{}",
                segments
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RelayPayload {
    req_0: RelayRequest,
}

#[derive(Debug, Deserialize)]
struct RelayRequest {
    data: RelayData,
}

#[derive(Debug, Deserialize)]
struct RelayData {
    sip: Vec<String>,
    midurlinfo: Vec<MidUrlInfo>,
}

#[derive(Debug, Deserialize)]
struct MidUrlInfo {
    purl: String,
}

impl RelayPayload {
    fn from_value(payload: Value) -> Result<Self, GatewayError> {
        serde_json::from_value(payload)
            .map_err(|e| GatewayError::structure(format!("relay payload: {}", e)))
    }
}

/// First domain not on the insecure `http://ws` hosts, else the first one,
/// upgraded to https.
pub fn select_domain(sip: &[String]) -> Result<String, GatewayError> {
    let chosen = sip
        .iter()
        .find(|domain| !domain.starts_with(INSECURE_DOMAIN_PREFIX))
        .or_else(|| sip.first())
        .ok_or_else(|| GatewayError::structure("req_0.data.sip is empty"))?;

    Ok(chosen.replacen("http://", "https://", 1))
}

fn normalize_direct(songs: Vec<RawSong>) -> Vec<Track> {
    songs
        .into_iter()
        .map(|mut song| {
            let url = song.url.take().unwrap_or_default();
            song.into_track(url)
        })
        .collect()
}

fn normalize_relayed(
    songs: Vec<RawSong>,
    domain: &str,
    midurlinfo: &[MidUrlInfo],
) -> Result<Vec<Track>, GatewayError> {
    if midurlinfo.len() < songs.len() {
        return Err(GatewayError::structure(format!(
            "req_0.data.midurlinfo has {} entries for {} songs",
            midurlinfo.len(),
            songs.len()
        )));
    }

    Ok(songs
        .into_iter()
        .zip(midurlinfo)
        .map(|(song, info)| song.into_track(format!("{}{}", domain, info.purl)))
        .collect())
}

impl Gateway {
    /// Fetch a song list from the music proxy and normalize it.
    ///
    /// `server`, `kind` and `id` are passed through as the `server`, `type`
    /// and `id` query parameters.
    #[instrument(skip(self), level = "info")]
    pub async fn get_player_list(
        &self,
        server: &str,
        kind: &str,
        id: &str,
    ) -> Result<Vec<Track>, GatewayError> {
        let api = self
            .music
            .api_url
            .as_deref()
            .ok_or(GatewayError::NotConfigured("music.api_url"))?;

        let songs: Vec<RawSong> = self
            .get_json(api, &[("server", server), ("type", kind), ("id", id)])
            .await?;

        let first_url = songs
            .first()
            .ok_or_else(|| GatewayError::structure("song list is empty"))?
            .url
            .as_deref()
            .ok_or_else(|| GatewayError::structure("first song has no url"))?;

        match SongSource::decode(first_url)? {
            SongSource::Direct(_) => {
                debug!(count = songs.len(), "Song urls are directly playable");
                Ok(normalize_direct(songs))
            }
            SongSource::JsonpRelay(relay) => {
                debug!(
                    count = songs.len(),
                    handle = %relay.handle,
                    "Resolving song urls through JSONP relay"
                );
                let payload = self.bridge.fetch_with_callback_param(&relay.url).await?;
                let data = RelayPayload::from_value(payload)?.req_0.data;
                let domain = select_domain(&data.sip)?;
                normalize_relayed(songs, &domain, &data.midurlinfo)
            }
        }
    }

    /// [`Gateway::get_player_list`] with the configured server, type and id.
    pub async fn get_configured_playlist(&self) -> Result<Vec<Track>, GatewayError> {
        let id = self
            .music
            .id
            .as_deref()
            .ok_or(GatewayError::NotConfigured("music.id"))?;
        self.get_player_list(&self.music.server, &self.music.kind, id)
            .await
    }
}
