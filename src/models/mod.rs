use serde::{Deserialize, Serialize};

/// The top-level view the user last had open. Persisted so a reload lands
/// back on the same screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveView {
    #[default]
    Search,
    Library,
    Recent,
    Tags,
    Playlists,
}

/// A denormalized, playback-ready description of a song.
///
/// Identity fields (`id`, `provider_id`) are owned by whichever component
/// fetched or created the record; the playback session only ever holds a
/// copy and never rewrites them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    /// Streaming-provider track id (e.g. a Spotify track id). Bookmarks are
    /// keyed by this rather than `id` so they survive a track re-import.
    pub provider_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    #[serde(rename = "cover_image")]
    pub cover_url: Option<String>,
    pub duration_ms: u64,
    /// Short preview clip, playable without any streaming entitlement.
    pub preview_url: Option<String>,
    /// Full-track streaming URI (e.g. "spotify:track:..."). Present only
    /// when full playback is possible.
    pub stream_uri: Option<String>,
    pub owner_id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Track {
    /// Full-track playback is possible through the streaming adapter.
    pub fn is_streamable(&self) -> bool {
        self.stream_uri.is_some()
    }

    /// Playable at all: either streamable or carrying a preview clip.
    pub fn is_playable(&self) -> bool {
        self.stream_uri.is_some() || self.preview_url.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub owner_id: String,
    pub tracks: Vec<Track>,
}

impl Playlist {
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Builds a minimal track for queue/controller tests.
    pub fn track(id: &str, preview: bool, stream: bool) -> Track {
        Track {
            id: id.to_string(),
            provider_id: format!("sp-{}", id),
            title: format!("Track {}", id),
            artist: "Test Artist".to_string(),
            album: "Test Album".to_string(),
            cover_url: None,
            duration_ms: 180_000,
            preview_url: preview.then(|| format!("https://p.scdn.co/{}", id)),
            stream_uri: stream.then(|| format!("spotify:track:{}", id)),
            owner_id: "user-1".to_string(),
            tags: Vec::new(),
            created_at: 0,
            updated_at: 0,
        }
    }
}
