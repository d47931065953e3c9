//! Synthetic media source for previews and tests
//!
//! Plays a generated gradient pattern on the tokio clock. The frame index is
//! written into the blue channel so frames are distinguishable.

use super::{
    AudioSettings, AudioTrack, FrameSnapshot, MediaSource, SourceMetadata, VideoFrame,
};
use crate::{ReframeError, ReframeResult};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

/// Deterministic test-pattern player
#[derive(Debug)]
pub struct SyntheticSource {
    metadata: SourceMetadata,
    frame_rate: u32,
    playback_rate: f64,
    frame_callbacks: bool,
    playback_blocked: bool,
    audio_track: Option<AudioTrack>,
    audio: AudioSettings,
    /// Position while paused, and the origin of the current play run
    position: Duration,
    playing_since: Option<Instant>,
    /// Next frame index for per-frame callbacks
    next_index: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, duration: Duration) -> Self {
        Self {
            metadata: SourceMetadata {
                width,
                height,
                duration,
                name: None,
            },
            frame_rate: 30,
            playback_rate: 1.0,
            frame_callbacks: true,
            playback_blocked: false,
            audio_track: None,
            audio: AudioSettings::default(),
            position: Duration::ZERO,
            playing_since: None,
            next_index: 0,
        }
    }

    pub fn with_frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = frame_rate.max(1);
        self
    }

    /// Speed multiplier of the playback clock
    pub fn with_playback_rate(mut self, rate: f64) -> Self {
        self.playback_rate = if rate.is_finite() && rate > 0.0 { rate } else { 1.0 };
        self
    }

    pub fn with_frame_callbacks(mut self, enabled: bool) -> Self {
        self.frame_callbacks = enabled;
        self
    }

    pub fn with_audio(mut self, track: AudioTrack) -> Self {
        self.audio_track = Some(track);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = Some(name.into());
        self
    }

    pub fn with_audio_settings(mut self, settings: AudioSettings) -> Self {
        self.audio = settings;
        self
    }

    /// Make `play` fail, like a player refusing autoplay
    pub fn with_playback_blocked(mut self, blocked: bool) -> Self {
        self.playback_blocked = blocked;
        self
    }

    /// Number of frames in the clip
    pub fn frame_count(&self) -> u64 {
        let nanos = self.metadata.duration.as_nanos() as u64;
        let fps = self.frame_rate as u64;
        (nanos * fps).div_ceil(1_000_000_000)
    }

    /// Presentation time of frame `index`
    pub fn frame_time(&self, index: u64) -> Duration {
        Duration::from_nanos(index * 1_000_000_000 / self.frame_rate as u64)
    }

    fn index_at(&self, time: Duration) -> u64 {
        let nanos = time.as_nanos() as u64;
        nanos * self.frame_rate as u64 / 1_000_000_000
    }

    /// Generate the test pattern for frame `index`
    pub fn render_frame(&self, index: u64) -> VideoFrame {
        let (width, height) = (self.metadata.width, self.metadata.height);
        let mut data = vec![0u8; (width * height * 4) as usize];

        for y in 0..height {
            for x in 0..width {
                let idx = ((y * width + x) * 4) as usize;

                let r = ((x as f32 / width as f32) * 255.0) as u8;
                let g = ((y as f32 / height as f32) * 255.0) as u8;
                let b = (index % 256) as u8;

                data[idx] = r;
                data[idx + 1] = g;
                data[idx + 2] = b;
                data[idx + 3] = 255;
            }
        }

        VideoFrame {
            data,
            width,
            height,
            timestamp: self.frame_time(index),
        }
    }

    fn playback_elapsed(&self, since: Instant) -> Duration {
        since.elapsed().mul_f64(self.playback_rate)
    }

    fn stop_at_end(&mut self) {
        self.position = self.metadata.duration;
        self.playing_since = None;
    }
}

#[async_trait]
impl MediaSource for SyntheticSource {
    fn metadata(&self) -> Option<SourceMetadata> {
        Some(self.metadata.clone())
    }

    fn current_time(&self) -> Duration {
        match self.playing_since {
            Some(since) => (self.position + self.playback_elapsed(since)).min(self.metadata.duration),
            None => self.position,
        }
    }

    async fn seek(&mut self, position: Duration) -> ReframeResult<()> {
        self.position = position.min(self.metadata.duration);
        if self.playing_since.is_some() {
            self.playing_since = Some(Instant::now());
        }
        self.next_index = self.position.as_nanos() as u64 * self.frame_rate as u64
            / 1_000_000_000;
        if self.frame_time(self.next_index) < self.position {
            self.next_index += 1;
        }
        Ok(())
    }

    async fn play(&mut self) -> ReframeResult<()> {
        if self.playback_blocked {
            return Err(ReframeError::CaptureError(
                "playback was blocked by the player".to_string(),
            ));
        }
        if self.position >= self.metadata.duration {
            self.seek(Duration::ZERO).await?;
        }
        if self.playing_since.is_none() {
            self.playing_since = Some(Instant::now());
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.position = self.current_time();
        self.playing_since = None;
    }

    fn is_playing(&self) -> bool {
        self.playing_since.is_some()
    }

    fn audio_settings(&self) -> AudioSettings {
        self.audio
    }

    fn set_audio_settings(&mut self, settings: AudioSettings) -> ReframeResult<()> {
        if !(0.0..=1.0).contains(&settings.volume) {
            return Err(ReframeError::Configuration(format!(
                "volume out of range: {}",
                settings.volume
            )));
        }
        self.audio = settings;
        Ok(())
    }

    fn audio_track(&self) -> Option<AudioTrack> {
        self.audio_track.clone()
    }

    fn supports_frame_callbacks(&self) -> bool {
        self.frame_callbacks
    }

    async fn next_presented_frame(&mut self) -> ReframeResult<Option<VideoFrame>> {
        if !self.frame_callbacks {
            return Err(ReframeError::Unsupported("per-frame callbacks".to_string()));
        }
        let Some(since) = self.playing_since else {
            return Err(ReframeError::CaptureError(
                "waiting for a frame while playback is paused".to_string(),
            ));
        };

        let index = self.next_index;
        if index >= self.frame_count() {
            self.stop_at_end();
            return Ok(None);
        }

        let offset = self.frame_time(index).saturating_sub(self.position);
        let due = since + offset.div_f64(self.playback_rate);
        tokio::time::sleep_until(due).await;

        self.next_index = index + 1;
        Ok(Some(self.render_frame(index)))
    }

    fn current_frame(&mut self) -> ReframeResult<FrameSnapshot> {
        let now = self.current_time();
        if self.playing_since.is_some() && now >= self.metadata.duration {
            self.stop_at_end();
            return Ok(FrameSnapshot::Ended);
        }
        let index = self.index_at(now).min(self.frame_count().saturating_sub(1));
        Ok(FrameSnapshot::Frame(self.render_frame(index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_count_and_times() {
        let source = SyntheticSource::new(4, 4, Duration::from_secs(10)).with_frame_rate(30);
        assert_eq!(source.frame_count(), 300);
        assert_eq!(source.frame_time(30), Duration::from_secs(1));

        let odd = SyntheticSource::new(4, 4, Duration::from_millis(1050)).with_frame_rate(10);
        assert_eq!(odd.frame_count(), 11);
    }

    #[test]
    fn test_test_pattern_encodes_index() {
        let source = SyntheticSource::new(4, 2, Duration::from_secs(1));
        let frame = source.render_frame(7);
        assert!(frame.is_well_formed());
        assert_eq!(frame.data[2], 7);
        assert_eq!(frame.data[3], 255);
    }

    #[tokio::test]
    async fn test_seek_and_pause() {
        let mut source = SyntheticSource::new(4, 4, Duration::from_secs(10));
        source.seek(Duration::from_secs(4)).await.unwrap();
        assert_eq!(source.current_time(), Duration::from_secs(4));

        source.seek(Duration::from_secs(60)).await.unwrap();
        assert_eq!(source.current_time(), Duration::from_secs(10));

        source.play().await.unwrap();
        assert!(source.is_playing());
        source.pause();
        assert!(!source.is_playing());
    }

    #[tokio::test]
    async fn test_blocked_playback() {
        let mut source =
            SyntheticSource::new(4, 4, Duration::from_secs(1)).with_playback_blocked(true);
        assert!(matches!(
            source.play().await,
            Err(ReframeError::CaptureError(_))
        ));
        assert!(!source.is_playing());
    }

    #[tokio::test]
    async fn test_frames_stop_at_end() {
        let mut source = SyntheticSource::new(2, 2, Duration::from_millis(300))
            .with_frame_rate(10)
            .with_playback_rate(100.0);
        source.play().await.unwrap();

        let mut seen = 0;
        while source.next_presented_frame().await.unwrap().is_some() {
            seen += 1;
        }
        assert_eq!(seen, 3);
        assert!(!source.is_playing());
        assert_eq!(source.current_time(), Duration::from_millis(300));
    }

    #[test]
    fn test_volume_validation() {
        let mut source = SyntheticSource::new(2, 2, Duration::from_secs(1));
        let loud = AudioSettings {
            volume: 1.5,
            muted: false,
        };
        assert!(source.set_audio_settings(loud).is_err());
        let quiet = AudioSettings {
            volume: 0.01,
            muted: false,
        };
        assert!(source.set_audio_settings(quiet).is_ok());
        assert_eq!(source.audio_settings(), quiet);
    }
}
