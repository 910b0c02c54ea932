use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;

use super::models::{
    ApiErrorResponse, DevicesResponse, PlaybackStateResponse, StartPlaybackRequest,
    TransferRequest,
};
use super::TokenSource;
use crate::player::{
    PlayerError, PlayerReadiness, RemotePlayerState, RemoteTrack, StreamingPlayer,
};

const API_BASE: &str = "https://api.spotify.com/v1";
const REQUEST_TIMEOUT_SECONDS: u64 = 10;

/// Streaming backend over the Spotify Connect Web API player endpoints.
///
/// Credential acquisition and refresh live behind [`TokenSource`]; this
/// client only classifies failures: 401 is an auth error, a premium 403 is
/// "unavailable", a 404 from a player command means no active device.
pub struct SpotifyConnectPlayer {
    client: Client,
    tokens: std::sync::Arc<dyn TokenSource>,
    device_id: RwLock<Option<String>>,
    readiness: RwLock<PlayerReadiness>,
}

impl SpotifyConnectPlayer {
    pub fn new(tokens: std::sync::Arc<dyn TokenSource>) -> Result<Self, PlayerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()?;

        Ok(Self {
            client,
            tokens,
            device_id: RwLock::new(None),
            readiness: RwLock::new(PlayerReadiness::Initializing),
        })
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> Result<(StatusCode, String), PlayerError> {
        let token = self
            .tokens
            .bearer_token()
            .await
            .map_err(|e| PlayerError::Auth(e.to_string()))?;
        let url = format!("{}{}", API_BASE, path);

        let mut req = self
            .client
            .request(method, &url)
            .bearer_auth(token)
            .query(query);
        if let Some(body) = body {
            req = req.json(&body);
        }

        let response = req.send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if status.is_success() {
            return Ok((status, text));
        }

        Err(Self::classify_failure(status, &text, path))
    }

    fn classify_failure(status: StatusCode, body: &str, path: &str) -> PlayerError {
        let reason = serde_json::from_str::<ApiErrorResponse>(body)
            .ok()
            .map(|e| {
                e.error
                    .reason
                    .unwrap_or(e.error.message)
            })
            .unwrap_or_default();

        log::warn!("Spotify request {} failed ({}): {}", path, status, reason);

        match status {
            StatusCode::UNAUTHORIZED => PlayerError::Auth(reason),
            StatusCode::FORBIDDEN if reason.contains("PREMIUM") => {
                PlayerError::Unavailable(reason)
            }
            StatusCode::NOT_FOUND => PlayerError::NoActiveDevice(reason),
            _ => PlayerError::Command(format!("HTTP {} - {}", status, reason)),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, PlayerError> {
        let (status, text) = self.request(Method::GET, path, &[], None).await?;
        if status == StatusCode::NO_CONTENT || text.is_empty() {
            return Ok(None);
        }
        let parsed = serde_json::from_str(&text)
            .map_err(|e| PlayerError::Command(format!("Bad response from {}: {}", path, e)))?;
        Ok(Some(parsed))
    }

    fn device_query(&self) -> Vec<(&'static str, String)> {
        match self.device_id.read().clone() {
            Some(id) => vec![("device_id", id)],
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl StreamingPlayer for SpotifyConnectPlayer {
    async fn connect(&self) -> Result<(), PlayerError> {
        let devices = match self.get_json::<DevicesResponse>("/me/player/devices").await {
            Ok(Some(d)) => d.devices,
            Ok(None) => Vec::new(),
            Err(PlayerError::Unavailable(msg)) => {
                *self.readiness.write() = PlayerReadiness::Unavailable;
                log::warn!("Streaming playback unavailable: {}", msg);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        // Prefer the active device, fall back to the first usable one.
        let picked = devices
            .iter()
            .find(|d| d.is_active && !d.is_restricted)
            .or_else(|| devices.iter().find(|d| !d.is_restricted))
            .and_then(|d| d.id.clone());

        match picked {
            Some(id) => {
                log::info!("Registered Spotify playback device {}", id);
                *self.device_id.write() = Some(id);
                *self.readiness.write() = PlayerReadiness::Ready;
            }
            None => {
                log::info!("No Spotify playback device available yet");
                *self.readiness.write() = PlayerReadiness::Ready;
            }
        }

        Ok(())
    }

    fn readiness(&self) -> PlayerReadiness {
        *self.readiness.read()
    }

    async fn play(&self, stream_uri: &str, position_ms: u64) -> Result<(), PlayerError> {
        let body = serde_json::to_value(StartPlaybackRequest {
            uris: vec![stream_uri.to_string()],
            position_ms,
        })
        .map_err(|e| PlayerError::Command(e.to_string()))?;

        self.request(Method::PUT, "/me/player/play", &self.device_query(), Some(body))
            .await?;
        Ok(())
    }

    async fn pause(&self) -> Result<(), PlayerError> {
        self.request(Method::PUT, "/me/player/pause", &self.device_query(), None)
            .await?;
        Ok(())
    }

    async fn resume(&self) -> Result<(), PlayerError> {
        self.request(Method::PUT, "/me/player/play", &self.device_query(), None)
            .await?;
        Ok(())
    }

    async fn seek(&self, position_ms: u64) -> Result<(), PlayerError> {
        let mut query = vec![("position_ms", position_ms.to_string())];
        query.extend(self.device_query());
        self.request(Method::PUT, "/me/player/seek", &query, None)
            .await?;
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<(), PlayerError> {
        let percent = (volume.clamp(0.0, 1.0) * 100.0).round() as u8;
        let mut query = vec![("volume_percent", percent.to_string())];
        query.extend(self.device_query());
        self.request(Method::PUT, "/me/player/volume", &query, None)
            .await?;
        Ok(())
    }

    async fn transfer_to_device(&self) -> Result<(), PlayerError> {
        if self.device_id.read().is_none() {
            // Device list may have changed since connect.
            self.connect().await?;
        }

        let Some(id) = self.device_id.read().clone() else {
            return Err(PlayerError::NoActiveDevice(
                "No registered device to transfer to".to_string(),
            ));
        };

        let body = serde_json::to_value(TransferRequest {
            device_ids: vec![id.clone()],
            play: true,
        })
        .map_err(|e| PlayerError::Command(e.to_string()))?;

        log::info!("Transferring playback to device {}", id);
        self.request(Method::PUT, "/me/player", &[], Some(body))
            .await?;
        Ok(())
    }

    async fn get_state(&self) -> Result<Option<RemotePlayerState>, PlayerError> {
        let Some(state) = self
            .get_json::<PlaybackStateResponse>("/me/player")
            .await?
        else {
            return Ok(None);
        };

        if let Some(device) = &state.device {
            if let Some(id) = &device.id {
                // Follow the active device as it moves between clients.
                *self.device_id.write() = Some(id.clone());
            }
        }

        let track = state.item.map(|item| RemoteTrack {
            provider_id: item.id,
            title: item.name,
            artist: item
                .artists
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            album: item
                .album
                .as_ref()
                .map(|a| a.name.clone())
                .unwrap_or_default(),
            cover_url: item
                .album
                .as_ref()
                .and_then(|a| a.images.first())
                .map(|i| i.url.clone()),
            duration_ms: item.duration_ms,
            stream_uri: Some(item.uri),
        });

        Ok(Some(RemotePlayerState {
            is_playing: state.is_playing,
            position_ms: state.progress_ms.unwrap_or(0),
            duration_ms: track.as_ref().map(|t| t.duration_ms).unwrap_or(0),
            track,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_expired_token_as_auth() {
        let body = r#"{"error":{"status":401,"message":"The access token expired"}}"#;
        let err = SpotifyConnectPlayer::classify_failure(StatusCode::UNAUTHORIZED, body, "/me/player");
        assert!(matches!(err, PlayerError::Auth(_)));
    }

    #[test]
    fn classifies_missing_device_as_retriable() {
        let body = r#"{"error":{"status":404,"message":"Player command failed: No active device found","reason":"NO_ACTIVE_DEVICE"}}"#;
        let err =
            SpotifyConnectPlayer::classify_failure(StatusCode::NOT_FOUND, body, "/me/player/play");
        assert!(matches!(err, PlayerError::NoActiveDevice(_)));
    }

    #[test]
    fn classifies_premium_requirement_as_unavailable() {
        let body = r#"{"error":{"status":403,"message":"Player command failed: Premium required","reason":"PREMIUM_REQUIRED"}}"#;
        let err =
            SpotifyConnectPlayer::classify_failure(StatusCode::FORBIDDEN, body, "/me/player/play");
        assert!(matches!(err, PlayerError::Unavailable(_)));
    }
}
