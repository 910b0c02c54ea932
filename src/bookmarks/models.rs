use serde::{Deserialize, Serialize};

/// A named time-offset within a specific track.
///
/// Keyed by the provider track id rather than the local track id so markers
/// survive a track being deleted and re-imported.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bookmark {
    pub id: String,
    pub provider_track_id: String,
    pub owner_id: String,
    pub offset_seconds: i64,
    pub label: String,
    pub note: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Identity of the track whose bookmarks the index should mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackKey {
    pub provider_track_id: String,
    pub owner_id: String,
}
