pub mod adapter;
pub mod preview;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::errors::AppError;
use crate::models::Track;

/// Whether the streaming backend can take full-track playback right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerReadiness {
    /// Device registration has not completed yet.
    #[default]
    Initializing,
    /// The backend accepts playback commands. A device may still need to be
    /// transferred to at play time; that is handled by the play retry path.
    Ready,
    /// The backend cannot be used at all (e.g. account lacks streaming
    /// entitlement). Treated the same as a track without a stream URI.
    Unavailable,
}

/// Errors from the streaming backend, classified so the adapter can pick a
/// recovery path per failure class.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// No active device / no session loaded. Worth one device-transfer retry.
    #[error("No active playback device: {0}")]
    NoActiveDevice(String),

    /// Expired or invalid credential. Surfaced upward for re-auth.
    #[error("Streaming authentication failed: {0}")]
    Auth(String),

    /// The backend cannot serve this account (entitlement, region).
    #[error("Streaming unavailable: {0}")]
    Unavailable(String),

    /// Transient network/device failure of a single command.
    #[error("Playback command failed: {0}")]
    Command(String),
}

impl From<PlayerError> for AppError {
    fn from(e: PlayerError) -> Self {
        match e {
            PlayerError::Auth(msg) => AppError::StreamingAuth(msg),
            PlayerError::Unavailable(msg) => AppError::StreamingUnavailable(msg),
            PlayerError::NoActiveDevice(msg) | PlayerError::Command(msg) => {
                AppError::PlaybackCommand(msg)
            }
        }
    }
}

impl From<reqwest::Error> for PlayerError {
    fn from(e: reqwest::Error) -> Self {
        PlayerError::Command(e.to_string())
    }
}

/// Track identity and display metadata as last reported by the live session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteTrack {
    pub provider_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub cover_url: Option<String>,
    pub duration_ms: u64,
    pub stream_uri: Option<String>,
}

/// Live playback state republished to the controller on every poll tick.
#[derive(Debug, Clone, Serialize)]
pub struct RemotePlayerState {
    pub is_playing: bool,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub track: Option<RemoteTrack>,
}

/// Commands the controller sends to the adapter task.
#[derive(Debug, Clone)]
pub enum PlayerCommand {
    Play { track: Track, position_ms: u64 },
    Pause,
    Resume,
    Seek { position_ms: u64 },
    SetVolume(f32),
    SetSpeed(f32),
    Stop,
}

/// The full contract of a live streaming playback backend. The controller
/// and adapter depend on this abstraction, never on a concrete client.
#[async_trait]
pub trait StreamingPlayer: Send + Sync {
    /// Register/refresh the playback device and settle readiness.
    async fn connect(&self) -> Result<(), PlayerError>;

    fn readiness(&self) -> PlayerReadiness;

    /// Start playing a stream URI from the given offset on the registered
    /// device.
    async fn play(&self, stream_uri: &str, position_ms: u64) -> Result<(), PlayerError>;

    async fn pause(&self) -> Result<(), PlayerError>;

    async fn resume(&self) -> Result<(), PlayerError>;

    async fn seek(&self, position_ms: u64) -> Result<(), PlayerError>;

    /// Volume in [0,1].
    async fn set_volume(&self, volume: f32) -> Result<(), PlayerError>;

    /// Make the registered device the active playback target.
    async fn transfer_to_device(&self) -> Result<(), PlayerError>;

    /// Live session state; `None` when no session is loaded.
    async fn get_state(&self) -> Result<Option<RemotePlayerState>, PlayerError>;
}
