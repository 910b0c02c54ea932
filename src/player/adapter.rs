use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use super::preview::PreviewPlayer;
use super::{PlayerCommand, PlayerError, PlayerReadiness, StreamingPlayer};
use crate::session::controller::{Direction, PlaybackSession};

/// Cadence of live-position republication while a streaming session is up.
const POLL_INTERVAL_MS: u64 = 1_000;

/// Which engine currently owns playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Idle,
    Streaming,
    Preview,
}

/// Bridges the controller to the live streaming engine and the local
/// preview fallback.
///
/// Runs as a task fed by the controller's command channel; position and
/// track-change events flow back through the controller's `apply_*` methods.
/// Teardown aborts the task so no poll or command lands after logout.
pub struct ExternalPlayerAdapter {
    command_tx: mpsc::UnboundedSender<PlayerCommand>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ExternalPlayerAdapter {
    pub fn spawn(
        controller: Arc<PlaybackSession>,
        streaming: Arc<dyn StreamingPlayer>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let task = AdapterTask {
            controller,
            streaming,
            preview: PreviewPlayer::new(),
            route: Route::Idle,
        };
        let handle = tokio::spawn(task.run(command_rx));

        Self {
            command_tx,
            task: Mutex::new(Some(handle)),
        }
    }

    /// Sender for the controller to attach.
    pub fn command_sender(&self) -> mpsc::UnboundedSender<PlayerCommand> {
        self.command_tx.clone()
    }

    pub fn teardown(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
            log::info!("Player adapter stopped");
        }
    }
}

impl Drop for ExternalPlayerAdapter {
    fn drop(&mut self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }
}

struct AdapterTask {
    controller: Arc<PlaybackSession>,
    streaming: Arc<dyn StreamingPlayer>,
    preview: PreviewPlayer,
    route: Route,
}

impl AdapterTask {
    async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<PlayerCommand>) {
        self.connect().await;

        let mut ticker = interval(Duration::from_millis(POLL_INTERVAL_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    let Some(command) = command else {
                        // Controller dropped the channel, session is over.
                        break;
                    };
                    self.handle_command(command).await;
                }
                _ = ticker.tick() => {
                    self.poll().await;
                }
            }
        }
    }

    /// Device registration and readiness signaling.
    async fn connect(&mut self) {
        match self.streaming.connect().await {
            Ok(()) => {}
            Err(PlayerError::Auth(msg)) => {
                log::warn!("Streaming connect rejected credentials: {}", msg);
                self.controller.record_auth_failure();
            }
            Err(e) => {
                log::warn!("Streaming connect failed: {}", e);
            }
        }
        self.controller.set_readiness(self.streaming.readiness());
    }

    async fn handle_command(&mut self, command: PlayerCommand) {
        match command {
            PlayerCommand::Play { track, position_ms } => {
                self.start_playback(track, position_ms).await;
            }
            PlayerCommand::Pause => match self.route {
                Route::Streaming => {
                    if let Err(e) = self.streaming.pause().await {
                        self.log_command_failure("pause", e);
                    }
                }
                Route::Preview => self.preview.pause(),
                Route::Idle => {}
            },
            PlayerCommand::Resume => match self.route {
                Route::Streaming => {
                    if let Err(e) = self.streaming.resume().await {
                        self.log_command_failure("resume", e);
                    }
                }
                Route::Preview => self.preview.play(),
                Route::Idle => {
                    // Nothing loaded yet: resume a restored session from its
                    // last persisted position.
                    let live = self.controller.live_state();
                    if let Some(track) = live.current_track {
                        let position_ms =
                            (live.playback_position_seconds.max(0.0) * 1000.0) as u64;
                        self.start_playback(track, position_ms).await;
                    }
                }
            },
            PlayerCommand::Seek { position_ms } => match self.route {
                Route::Streaming => {
                    if let Err(e) = self.streaming.seek(position_ms).await {
                        self.log_command_failure("seek", e);
                    }
                }
                // Previews are not seekable.
                _ => log::debug!("Dropping seek, no streaming session active"),
            },
            PlayerCommand::SetVolume(volume) => {
                if self.streaming.readiness() == PlayerReadiness::Ready {
                    if let Err(e) = self.streaming.set_volume(volume).await {
                        self.log_command_failure("set_volume", e);
                    }
                }
            }
            PlayerCommand::SetSpeed(speed) => {
                // Speed control is preview-only; the streaming backend has
                // no rate call.
                self.preview.set_speed(speed);
            }
            PlayerCommand::Stop => {
                if self.route == Route::Streaming {
                    if let Err(e) = self.streaming.pause().await {
                        self.log_command_failure("stop", e);
                    }
                }
                self.preview.stop();
                self.route = Route::Idle;
            }
        }
    }

    /// Route a play request: streaming when the track and the backend both
    /// allow it, otherwise the local preview clip. Streaming failures fall
    /// back to preview rather than surfacing; only auth failures are
    /// recorded for the UI.
    async fn start_playback(&mut self, track: crate::models::Track, position_ms: u64) {
        if track.is_streamable() && self.streaming.readiness() == PlayerReadiness::Ready {
            // Checked by is_streamable above.
            let uri = track.stream_uri.clone().unwrap_or_default();
            match self.play_with_retry(&uri, position_ms).await {
                Ok(()) => {
                    self.preview.stop();
                    self.route = Route::Streaming;
                    return;
                }
                Err(PlayerError::Auth(msg)) => {
                    log::warn!("Streaming play rejected credentials: {}", msg);
                    self.controller.record_auth_failure();
                }
                Err(PlayerError::Unavailable(msg)) => {
                    log::warn!("Streaming became unavailable: {}", msg);
                    self.controller.set_readiness(PlayerReadiness::Unavailable);
                }
                Err(e) => {
                    log::warn!("Streaming play failed, falling back to preview: {}", e);
                }
            }
        }

        if self.preview.load(&track, position_ms) {
            self.preview.play();
            self.route = Route::Preview;
            log::info!("Playing preview clip for '{}'", track.title);
        } else {
            self.route = Route::Idle;
            self.controller.apply_preview_position(0, false);
            log::info!(
                "Track '{}' has neither stream URI nor preview, playback idle",
                track.title
            );
        }
    }

    /// A play failing with "no active device" gets a device transfer and
    /// exactly one retry before the failure stands.
    async fn play_with_retry(&self, uri: &str, position_ms: u64) -> Result<(), PlayerError> {
        match self.streaming.play(uri, position_ms).await {
            Err(PlayerError::NoActiveDevice(msg)) => {
                log::info!("No active device ({}), transferring and retrying", msg);
                self.streaming.transfer_to_device().await?;
                self.streaming.play(uri, position_ms).await
            }
            other => other,
        }
    }

    async fn poll(&mut self) {
        match self.route {
            Route::Streaming => match self.streaming.get_state().await {
                Ok(Some(state)) => self.controller.apply_remote_state(state),
                Ok(None) => {}
                Err(PlayerError::Auth(msg)) => {
                    log::warn!("Streaming poll rejected credentials: {}", msg);
                    self.controller.record_auth_failure();
                }
                Err(e) => {
                    log::debug!("Streaming poll failed: {}", e);
                }
            },
            Route::Preview => {
                if self.preview.is_finished() {
                    let position = self.preview.position_ms();
                    self.preview.stop();
                    self.route = Route::Idle;
                    self.controller.apply_preview_position(position, false);
                    if self.controller.autoplay() {
                        // Sends the next Play through our own channel.
                        self.controller.advance_skipping_unplayable(Direction::Next);
                    }
                } else {
                    self.controller
                        .apply_preview_position(self.preview.position_ms(), self.preview.is_playing());
                }
            }
            Route::Idle => {}
        }
    }

    /// Non-play commands are not retried; log and leave the UI on the last
    /// known state.
    fn log_command_failure(&self, command: &str, e: PlayerError) {
        if let PlayerError::Auth(msg) = &e {
            log::warn!("Streaming {} rejected credentials: {}", command, msg);
            self.controller.record_auth_failure();
        } else {
            log::warn!("Streaming {} failed, dropping: {}", command, e);
        }
    }
}
