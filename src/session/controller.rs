use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::bookmarks::models::TrackKey;
use crate::models::{ActiveView, Playlist, Track};
use crate::player::{PlayerCommand, PlayerReadiness, RemotePlayerState, RemoteTrack};
use crate::session::snapshot::PersistedSnapshot;
use crate::session::store::SnapshotStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// In-memory session state. Persisted fields are mirrored into
/// [`PersistedSnapshot`]; the rest is live-only and rebuilt on reload.
struct SessionState {
    active_view: ActiveView,
    search_query: String,
    selected_playlist_id: Option<String>,
    current_track: Option<Track>,
    queue: Vec<Track>,
    queue_position: usize,
    is_player_visible: bool,
    playback_position_seconds: f64,
    playback_speed: f32,
    volume: f32,
    autoplay: bool,
    session_id: String,

    // Live-only.
    is_playing: bool,
    readiness: PlayerReadiness,
    remote: Option<RemotePlayerState>,
    auth_required: bool,
    hydrated: bool,
    last_persisted_position: f64,
}

impl SessionState {
    fn new() -> Self {
        let defaults = PersistedSnapshot::default();
        Self {
            active_view: defaults.active_view,
            search_query: defaults.search_query,
            selected_playlist_id: defaults.selected_playlist_id,
            current_track: defaults.current_track,
            queue: defaults.queue,
            queue_position: defaults.queue_position,
            is_player_visible: defaults.is_player_visible,
            playback_position_seconds: defaults.playback_position_seconds,
            playback_speed: defaults.playback_speed,
            volume: defaults.volume,
            autoplay: defaults.autoplay,
            session_id: defaults.session_id,
            is_playing: false,
            readiness: PlayerReadiness::Initializing,
            remote: None,
            auth_required: false,
            hydrated: false,
            last_persisted_position: 0.0,
        }
    }

    fn current_provider_id(&self) -> Option<String> {
        self.current_track.as_ref().map(|t| t.provider_id.clone())
    }
}

/// Observable player state for UI consumers: one consistent snapshot of the
/// playback-related fields plus the live-only ones.
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackSessionState {
    pub current_track: Option<Track>,
    pub queue: Vec<Track>,
    pub queue_position: usize,
    pub is_player_visible: bool,
    pub playback_position_seconds: f64,
    pub playback_speed: f32,
    pub volume: f32,
    pub autoplay: bool,
    pub is_playing: bool,
    pub readiness: PlayerReadiness,
    pub remote: Option<RemotePlayerState>,
    pub auth_required: bool,
}

/// Authoritative in-memory state for the playback session.
///
/// Every public operation mutates state atomically under one lock, then
/// schedules a debounced persisted save; playback itself is delegated to the
/// adapter task over the command channel. Adapter and storage failures never
/// escape this type.
pub struct PlaybackSession {
    owner_id: String,
    store: Arc<SnapshotStore>,
    state: RwLock<SessionState>,
    player_tx: Mutex<Option<mpsc::UnboundedSender<PlayerCommand>>>,
    track_tx: watch::Sender<Option<TrackKey>>,
}

impl PlaybackSession {
    pub fn new(store: Arc<SnapshotStore>, owner_id: impl Into<String>) -> Arc<Self> {
        let (track_tx, _) = watch::channel(None);
        Arc::new(Self {
            owner_id: owner_id.into(),
            store,
            state: RwLock::new(SessionState::new()),
            player_tx: Mutex::new(None),
            track_tx,
        })
    }

    /// Wire up the adapter command channel after the adapter task is
    /// spawned.
    pub fn attach_player(&self, tx: mpsc::UnboundedSender<PlayerCommand>) {
        *self.player_tx.lock() = Some(tx);
    }

    /// Current-track identity channel the bookmark index follows.
    pub fn subscribe_current_track(&self) -> watch::Receiver<Option<TrackKey>> {
        self.track_tx.subscribe()
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Seed in-memory state from a restored snapshot, exactly once.
    ///
    /// The guard keeps a slow async load from clobbering actions the user
    /// already took in the meantime.
    pub fn hydrate(&self, snapshot: PersistedSnapshot) {
        let key = {
            let mut st = self.state.write();
            if st.hydrated {
                log::debug!("Ignoring repeated hydrate, session already seeded");
                return;
            }
            st.hydrated = true;
            st.active_view = snapshot.active_view;
            st.search_query = snapshot.search_query;
            st.selected_playlist_id = snapshot.selected_playlist_id;
            st.current_track = snapshot.current_track;
            st.queue = snapshot.queue;
            st.queue_position = if st.queue.is_empty() {
                0
            } else {
                snapshot.queue_position.min(st.queue.len() - 1)
            };
            st.is_player_visible = snapshot.is_player_visible;
            st.playback_position_seconds = snapshot.playback_position_seconds;
            st.playback_speed = snapshot.playback_speed;
            st.volume = snapshot.volume;
            st.autoplay = snapshot.autoplay;
            st.session_id = snapshot.session_id;
            st.current_provider_id()
        };
        self.publish_track(key);
        log::info!("Session state restored from snapshot");
    }

    // --- Playback operations ------------------------------------------------

    /// Replace the current track without starting playback. A change of
    /// provider identity triggers a bookmark refresh for the new track.
    pub fn set_current_track(&self, track: Option<Track>) {
        let (changed, snapshot) = {
            let mut st = self.state.write();
            let changed = st.current_provider_id()
                != track.as_ref().map(|t| t.provider_id.clone());
            if changed {
                st.playback_position_seconds = 0.0;
            }
            st.current_track = track;
            (changed.then(|| st.current_provider_id()), self.derive(&st))
        };
        if let Some(key) = changed {
            self.publish_track(key);
        }
        self.store.schedule_save(snapshot);
    }

    /// Replace queue and position atomically. The position is clamped into
    /// the queue bounds, or reset to 0 when the queue is empty.
    pub fn set_queue(&self, tracks: Vec<Track>, position: usize) {
        let snapshot = {
            let mut st = self.state.write();
            st.queue_position = if tracks.is_empty() {
                0
            } else {
                position.min(tracks.len() - 1)
            };
            st.queue = tracks;
            self.derive(&st)
        };
        self.store.schedule_save(snapshot);
    }

    /// Start playing a track. With a playlist, the queue becomes the
    /// playlist and the position the track's index within it (0 when not
    /// found); otherwise the track plays as a single-element queue.
    pub fn play(&self, track: Track, playlist: Option<&Playlist>) {
        let (changed, snapshot) = {
            let mut st = self.state.write();
            match playlist {
                Some(pl) if !pl.tracks.is_empty() => {
                    st.queue_position = pl
                        .tracks
                        .iter()
                        .position(|t| t.id == track.id)
                        .unwrap_or(0);
                    st.queue = pl.tracks.clone();
                }
                _ => {
                    st.queue = vec![track.clone()];
                    st.queue_position = 0;
                }
            }
            let changed =
                st.current_provider_id() != Some(track.provider_id.clone());
            st.current_track = Some(track.clone());
            st.is_player_visible = true;
            st.playback_position_seconds = 0.0;
            st.is_playing = true;
            (changed.then(|| st.current_provider_id()), self.derive(&st))
        };
        if let Some(key) = changed {
            self.publish_track(key);
        }
        self.store.schedule_save(snapshot);
        self.send_command(PlayerCommand::Play {
            track,
            position_ms: 0,
        });
    }

    /// Play an ordered collection from the given index. No-op when the
    /// collection is empty.
    pub fn play_collection(&self, tracks: Vec<Track>, start_index: usize) {
        if tracks.is_empty() {
            return;
        }
        let start = start_index.min(tracks.len() - 1);
        let track = tracks[start].clone();

        let (changed, snapshot) = {
            let mut st = self.state.write();
            st.queue = tracks;
            st.queue_position = start;
            let changed =
                st.current_provider_id() != Some(track.provider_id.clone());
            st.current_track = Some(track.clone());
            st.is_player_visible = true;
            st.playback_position_seconds = 0.0;
            st.is_playing = true;
            (changed.then(|| st.current_provider_id()), self.derive(&st))
        };
        if let Some(key) = changed {
            self.publish_track(key);
        }
        self.store.schedule_save(snapshot);
        self.send_command(PlayerCommand::Play {
            track,
            position_ms: 0,
        });
    }

    /// Step to the adjacent queue entry with wraparound and start playing
    /// it. Returns the new current track.
    pub fn advance(&self, direction: Direction) -> Option<Track> {
        let (track, changed, snapshot) = {
            let mut st = self.state.write();
            let n = st.queue.len();
            if n == 0 {
                return None;
            }
            let i = st.queue_position.min(n - 1);
            let next = match direction {
                Direction::Next => (i + 1) % n,
                Direction::Previous => (i + n - 1) % n,
            };
            let track = st.queue[next].clone();
            st.queue_position = next;
            let changed =
                st.current_provider_id() != Some(track.provider_id.clone());
            st.current_track = Some(track.clone());
            st.playback_position_seconds = 0.0;
            st.is_playing = true;
            (
                track,
                changed.then(|| st.current_provider_id()),
                self.derive(&st),
            )
        };
        if let Some(key) = changed {
            self.publish_track(key);
        }
        self.store.schedule_save(snapshot);
        self.send_command(PlayerCommand::Play {
            track: track.clone(),
            position_ms: 0,
        });
        Some(track)
    }

    /// Like [`advance`](Self::advance), but scans past tracks that carry
    /// neither a stream URI nor a preview clip. At most `queue.len()` probes;
    /// when nothing in the queue is playable this is a no-op.
    pub fn advance_skipping_unplayable(&self, direction: Direction) -> Option<Track> {
        let (track, changed, snapshot) = {
            let mut st = self.state.write();
            let n = st.queue.len();
            if n == 0 {
                return None;
            }
            let i = st.queue_position.min(n - 1);
            let mut target = None;
            for step in 1..=n {
                let idx = match direction {
                    Direction::Next => (i + step) % n,
                    Direction::Previous => (i + n - (step % n)) % n,
                };
                if st.queue[idx].is_playable() {
                    target = Some(idx);
                    break;
                }
            }
            let Some(next) = target else {
                log::debug!("No playable track in queue, staying put");
                return None;
            };
            let track = st.queue[next].clone();
            st.queue_position = next;
            let changed =
                st.current_provider_id() != Some(track.provider_id.clone());
            st.current_track = Some(track.clone());
            st.playback_position_seconds = 0.0;
            st.is_playing = true;
            (
                track,
                changed.then(|| st.current_provider_id()),
                self.derive(&st),
            )
        };
        if let Some(key) = changed {
            self.publish_track(key);
        }
        self.store.schedule_save(snapshot);
        self.send_command(PlayerCommand::Play {
            track: track.clone(),
            position_ms: 0,
        });
        Some(track)
    }

    /// Remove a queue entry, reindexing the current position. Removing the
    /// last remaining entry clears the current track and hides the player.
    pub fn remove_from_queue(&self, index: usize) {
        let (changed, snapshot, stop) = {
            let mut st = self.state.write();
            if index >= st.queue.len() {
                return;
            }
            st.queue.remove(index);

            let mut changed = None;
            let mut stop = false;
            if st.queue.is_empty() {
                st.queue_position = 0;
                if st.current_track.is_some() {
                    st.current_track = None;
                    changed = Some(None);
                }
                st.is_player_visible = false;
                st.is_playing = false;
                st.playback_position_seconds = 0.0;
                stop = true;
            } else if index < st.queue_position {
                st.queue_position -= 1;
            } else if index == st.queue_position {
                let next = index.min(st.queue.len() - 1);
                st.queue_position = next;
                let track = st.queue[next].clone();
                if st.current_provider_id() != Some(track.provider_id.clone()) {
                    st.playback_position_seconds = 0.0;
                    st.current_track = Some(track);
                    changed = Some(st.current_provider_id());
                }
            }
            (changed, self.derive(&st), stop)
        };
        if let Some(key) = changed {
            self.publish_track(key);
        }
        self.store.schedule_save(snapshot);
        if stop {
            self.send_command(PlayerCommand::Stop);
        }
    }

    /// Seek within the current track. Only forwarded while a streaming
    /// session is active; preview clips are not seekable, so this is a
    /// no-op for them.
    pub fn seek(&self, seconds: f64) {
        let snapshot = {
            let mut st = self.state.write();
            let streaming = st
                .current_track
                .as_ref()
                .map(|t| t.is_streamable())
                .unwrap_or(false)
                && st.readiness == PlayerReadiness::Ready;
            if !streaming {
                log::debug!("Ignoring seek, no streaming session active");
                return;
            }
            st.playback_position_seconds = seconds.max(0.0);
            self.derive(&st)
        };
        self.store.schedule_save(snapshot);
        self.send_command(PlayerCommand::Seek {
            position_ms: (seconds.max(0.0) * 1000.0) as u64,
        });
    }

    pub fn pause(&self) {
        self.state.write().is_playing = false;
        self.send_command(PlayerCommand::Pause);
    }

    pub fn resume(&self) {
        self.state.write().is_playing = true;
        self.send_command(PlayerCommand::Resume);
    }

    // --- Field setters ------------------------------------------------------

    pub fn set_player_visible(&self, visible: bool) {
        let snapshot = {
            let mut st = self.state.write();
            st.is_player_visible = visible;
            self.derive(&st)
        };
        self.store.schedule_save(snapshot);
    }

    pub fn set_playback_speed(&self, speed: f32) {
        let snapshot = {
            let mut st = self.state.write();
            st.playback_speed = speed;
            self.derive(&st)
        };
        self.store.schedule_save(snapshot);
        // Speed only affects preview playback; the streaming backend does
        // not expose a rate control.
        self.send_command(PlayerCommand::SetSpeed(speed));
    }

    pub fn set_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        let snapshot = {
            let mut st = self.state.write();
            st.volume = volume;
            self.derive(&st)
        };
        self.store.schedule_save(snapshot);
        self.send_command(PlayerCommand::SetVolume(volume));
    }

    pub fn set_playback_position_seconds(&self, seconds: f64) {
        let snapshot = {
            let mut st = self.state.write();
            st.playback_position_seconds = seconds.max(0.0);
            self.derive(&st)
        };
        self.store.schedule_save(snapshot);
    }

    pub fn set_autoplay(&self, autoplay: bool) {
        let snapshot = {
            let mut st = self.state.write();
            st.autoplay = autoplay;
            self.derive(&st)
        };
        self.store.schedule_save(snapshot);
    }

    pub fn set_active_view(&self, view: ActiveView) {
        let snapshot = {
            let mut st = self.state.write();
            st.active_view = view;
            self.derive(&st)
        };
        self.store.schedule_save(snapshot);
    }

    pub fn set_search_query(&self, query: impl Into<String>) {
        let snapshot = {
            let mut st = self.state.write();
            st.search_query = query.into();
            self.derive(&st)
        };
        self.store.schedule_save(snapshot);
    }

    pub fn set_selected_playlist(&self, playlist_id: Option<String>) {
        let snapshot = {
            let mut st = self.state.write();
            st.selected_playlist_id = playlist_id;
            self.derive(&st)
        };
        self.store.schedule_save(snapshot);
    }

    // --- Adapter feedback ---------------------------------------------------

    /// Mirror a live streaming state report. Track identity is re-checked
    /// against current state so a stale in-flight poll result cannot undo a
    /// newer user action (last writer wins on identity).
    pub fn apply_remote_state(&self, remote: RemotePlayerState) {
        let (changed, snapshot) = {
            let mut st = self.state.write();
            st.is_playing = remote.is_playing;
            let seconds = remote.position_ms as f64 / 1000.0;
            st.playback_position_seconds = seconds;

            let mut changed = None;
            if let Some(rt) = &remote.track {
                if st.current_provider_id().as_deref() != Some(rt.provider_id.as_str()) {
                    log::debug!(
                        "Live session moved to '{}' ({}), following",
                        rt.title,
                        rt.provider_id
                    );
                    st.current_track = Some(self.track_from_remote(rt));
                    if let Some(idx) = st
                        .queue
                        .iter()
                        .position(|t| t.provider_id == rt.provider_id)
                    {
                        st.queue_position = idx;
                    }
                    changed = Some(st.current_provider_id());
                }
            }
            st.remote = Some(remote);

            let snapshot = if changed.is_some() || self.should_persist_position(&mut st) {
                Some(self.derive(&st))
            } else {
                None
            };
            (changed, snapshot)
        };
        if let Some(key) = changed {
            self.publish_track(key);
        }
        if let Some(snapshot) = snapshot {
            self.store.schedule_save(snapshot);
        }
    }

    /// Mirror a preview-clip position tick.
    pub fn apply_preview_position(&self, position_ms: u64, playing: bool) {
        let snapshot = {
            let mut st = self.state.write();
            st.is_playing = playing;
            st.playback_position_seconds = position_ms as f64 / 1000.0;
            self.should_persist_position(&mut st).then(|| self.derive(&st))
        };
        if let Some(snapshot) = snapshot {
            self.store.schedule_save(snapshot);
        }
    }

    /// Position ticks arrive every second; persisting each would keep the
    /// debounce timer from ever firing quiet. Saves go through on
    /// even-numbered seconds or once the position has drifted 2s from the
    /// last persisted value.
    fn should_persist_position(&self, st: &mut SessionState) -> bool {
        let seconds = st.playback_position_seconds;
        let due = (seconds as u64) % 2 == 0
            || (seconds - st.last_persisted_position).abs() >= 2.0;
        if due {
            st.last_persisted_position = seconds;
        }
        due
    }

    pub fn set_readiness(&self, readiness: PlayerReadiness) {
        let mut st = self.state.write();
        if st.readiness != readiness {
            log::info!("Streaming readiness: {:?} -> {:?}", st.readiness, readiness);
            st.readiness = readiness;
        }
    }

    /// Expired/invalid credential reported by the adapter; the UI reads
    /// this off the live state and prompts re-authentication.
    pub fn record_auth_failure(&self) {
        let mut st = self.state.write();
        if !st.auth_required {
            log::warn!("Streaming session requires re-authentication");
            st.auth_required = true;
        }
    }

    pub fn clear_auth_failure(&self) {
        self.state.write().auth_required = false;
    }

    // --- Reads --------------------------------------------------------------

    /// Atomic snapshot of the persisted fields.
    pub fn snapshot(&self) -> PersistedSnapshot {
        self.derive(&self.state.read())
    }

    /// Atomic snapshot of the observable player state.
    pub fn live_state(&self) -> PlaybackSessionState {
        let st = self.state.read();
        PlaybackSessionState {
            current_track: st.current_track.clone(),
            queue: st.queue.clone(),
            queue_position: st.queue_position,
            is_player_visible: st.is_player_visible,
            playback_position_seconds: st.playback_position_seconds,
            playback_speed: st.playback_speed,
            volume: st.volume,
            autoplay: st.autoplay,
            is_playing: st.is_playing,
            readiness: st.readiness,
            remote: st.remote.clone(),
            auth_required: st.auth_required,
        }
    }

    pub fn autoplay(&self) -> bool {
        self.state.read().autoplay
    }

    // --- Internals ----------------------------------------------------------

    fn derive(&self, st: &SessionState) -> PersistedSnapshot {
        PersistedSnapshot {
            active_view: st.active_view,
            search_query: st.search_query.clone(),
            selected_playlist_id: st.selected_playlist_id.clone(),
            current_track: st.current_track.clone(),
            queue: st.queue.clone(),
            queue_position: st.queue_position,
            is_player_visible: st.is_player_visible,
            playback_position_seconds: st.playback_position_seconds,
            playback_speed: st.playback_speed,
            volume: st.volume,
            autoplay: st.autoplay,
            last_updated_epoch_ms: 0, // stamped by the store at schedule time
            session_id: st.session_id.clone(),
        }
    }

    fn track_from_remote(&self, rt: &RemoteTrack) -> Track {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Track {
            id: rt.provider_id.clone(),
            provider_id: rt.provider_id.clone(),
            title: rt.title.clone(),
            artist: rt.artist.clone(),
            album: rt.album.clone(),
            cover_url: rt.cover_url.clone(),
            duration_ms: rt.duration_ms,
            preview_url: None,
            stream_uri: rt.stream_uri.clone(),
            owner_id: self.owner_id.clone(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn publish_track(&self, provider_id: Option<String>) {
        let key = provider_id.map(|provider_track_id| TrackKey {
            provider_track_id,
            owner_id: self.owner_id.clone(),
        });
        self.track_tx.send_replace(key);
    }

    fn send_command(&self, command: PlayerCommand) {
        let tx = self.player_tx.lock();
        if let Some(tx) = tx.as_ref() {
            if tx.send(command).is_err() {
                log::warn!("Player adapter is gone, dropping command");
            }
        } else {
            log::debug!("No player adapter attached, dropping command");
        }
    }
}
