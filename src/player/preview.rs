use tokio::time::Instant;

use crate::models::Track;

/// Preview clips are time-bounded regardless of the track's real length.
pub const PREVIEW_CLIP_MS: u64 = 30_000;

/// Local fallback player for tracks without a stream URI, modeled on an
/// audio element bound to the preview clip URL.
///
/// Position is derived from a monotonic clock instead of backend polling,
/// the way element-driven position events behave. Previews are not seekable;
/// the only position write allowed is the resume offset applied in `load`,
/// before playback starts.
pub struct PreviewPlayer {
    clip_url: Option<String>,
    provider_id: Option<String>,
    clip_duration_ms: u64,
    base_position_ms: u64,
    started_at: Option<Instant>,
    speed: f32,
}

impl PreviewPlayer {
    pub fn new() -> Self {
        Self {
            clip_url: None,
            provider_id: None,
            clip_duration_ms: PREVIEW_CLIP_MS,
            base_position_ms: 0,
            started_at: None,
            speed: 1.0,
        }
    }

    /// Bind a track's preview clip and apply the resume offset. Returns
    /// false when the track carries no preview clip.
    pub fn load(&mut self, track: &Track, resume_position_ms: u64) -> bool {
        let Some(url) = track.preview_url.clone() else {
            self.stop();
            return false;
        };

        self.clip_duration_ms = track.duration_ms.min(PREVIEW_CLIP_MS);
        self.clip_url = Some(url);
        self.provider_id = Some(track.provider_id.clone());
        // Resume offsets past the clip restart it from the top.
        self.base_position_ms = if resume_position_ms < self.clip_duration_ms {
            resume_position_ms
        } else {
            0
        };
        self.started_at = None;
        true
    }

    pub fn play(&mut self) {
        if self.clip_url.is_some() && self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    pub fn pause(&mut self) {
        self.base_position_ms = self.position_ms();
        self.started_at = None;
    }

    pub fn stop(&mut self) {
        self.clip_url = None;
        self.provider_id = None;
        self.base_position_ms = 0;
        self.started_at = None;
    }

    pub fn set_speed(&mut self, speed: f32) {
        // Re-baseline so already-elapsed time keeps its old rate.
        self.base_position_ms = self.position_ms();
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
        self.speed = speed;
    }

    pub fn is_playing(&self) -> bool {
        self.started_at.is_some() && !self.is_finished()
    }

    pub fn is_loaded(&self) -> bool {
        self.clip_url.is_some()
    }

    pub fn provider_id(&self) -> Option<&str> {
        self.provider_id.as_deref()
    }

    pub fn clip_duration_ms(&self) -> u64 {
        self.clip_duration_ms
    }

    /// Current playhead offset, capped at the clip length.
    pub fn position_ms(&self) -> u64 {
        let elapsed = match self.started_at {
            Some(started) => (started.elapsed().as_millis() as f64 * self.speed as f64) as u64,
            None => 0,
        };
        (self.base_position_ms + elapsed).min(self.clip_duration_ms)
    }

    pub fn is_finished(&self) -> bool {
        self.clip_url.is_some() && self.position_ms() >= self.clip_duration_ms
    }
}

impl Default for PreviewPlayer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::track;
    use tokio::time::{advance, Duration};

    #[tokio::test(start_paused = true)]
    async fn resume_offset_is_applied_before_start()  {
        let mut player = PreviewPlayer::new();
        assert!(player.load(&track("a", true, false), 12_000));

        assert_eq!(player.position_ms(), 12_000);
        player.play();
        advance(Duration::from_secs(3)).await;
        assert_eq!(player.position_ms(), 15_000);
    }

    #[tokio::test(start_paused = true)]
    async fn position_is_capped_at_clip_length() {
        let mut player = PreviewPlayer::new();
        player.load(&track("a", true, false), 0);
        player.play();

        advance(Duration::from_secs(45)).await;
        assert_eq!(player.position_ms(), PREVIEW_CLIP_MS);
        assert!(player.is_finished());
        assert!(!player.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_resume_offset_restarts_clip() {
        let mut player = PreviewPlayer::new();
        player.load(&track("a", true, false), 31_000);
        assert_eq!(player.position_ms(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn track_without_preview_does_not_load() {
        let mut player = PreviewPlayer::new();
        assert!(!player.load(&track("a", false, true), 0));
        assert!(!player.is_loaded());
    }

    #[tokio::test(start_paused = true)]
    async fn pause_freezes_position() {
        let mut player = PreviewPlayer::new();
        player.load(&track("a", true, false), 0);
        player.play();
        advance(Duration::from_secs(5)).await;
        player.pause();
        advance(Duration::from_secs(5)).await;
        assert_eq!(player.position_ms(), 5_000);
    }

    #[tokio::test(start_paused = true)]
    async fn speed_scales_elapsed_time() {
        let mut player = PreviewPlayer::new();
        player.load(&track("a", true, false), 0);
        player.set_speed(2.0);
        player.play();
        advance(Duration::from_secs(4)).await;
        assert_eq!(player.position_ms(), 8_000);
    }
}
