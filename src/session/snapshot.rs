use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ActiveView, Track};

/// Snapshots older than this are discarded wholesale on load.
pub const SNAPSHOT_MAX_AGE_MS: i64 = 24 * 60 * 60 * 1000;

pub const DEFAULT_VOLUME: f32 = 0.8;
pub const DEFAULT_SPEED: f32 = 1.0;

/// The durable unit: everything needed to restore the app after a reload.
///
/// Every field carries a serde default so blobs written by older versions
/// (missing newer fields) still load instead of being rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedSnapshot {
    pub active_view: ActiveView,
    pub search_query: String,
    pub selected_playlist_id: Option<String>,
    pub current_track: Option<Track>,
    pub queue: Vec<Track>,
    /// Index into `queue`; meaningless when the queue is empty.
    pub queue_position: usize,
    pub is_player_visible: bool,
    pub playback_position_seconds: f64,
    pub playback_speed: f32,
    pub volume: f32,
    pub autoplay: bool,
    pub last_updated_epoch_ms: i64,
    /// Opaque id of the browser/app session that produced the snapshot.
    pub session_id: String,
}

impl Default for PersistedSnapshot {
    fn default() -> Self {
        Self {
            active_view: ActiveView::Search,
            search_query: String::new(),
            selected_playlist_id: None,
            current_track: None,
            queue: Vec::new(),
            queue_position: 0,
            is_player_visible: false,
            playback_position_seconds: 0.0,
            playback_speed: DEFAULT_SPEED,
            volume: DEFAULT_VOLUME,
            autoplay: true,
            last_updated_epoch_ms: Utc::now().timestamp_millis(),
            session_id: Uuid::new_v4().to_string(),
        }
    }
}

impl PersistedSnapshot {
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.last_updated_epoch_ms
    }

    /// A snapshot is valid iff it was written less than 24h ago.
    pub fn is_valid(&self, now_ms: i64) -> bool {
        self.age_ms(now_ms) < SNAPSHOT_MAX_AGE_MS
    }
}

/// Read-only view of the stored snapshot's freshness, for diagnostics/UI.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SnapshotMetadata {
    pub age_ms: i64,
    pub is_valid: bool,
}
