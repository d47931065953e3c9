//! Source media playback
//!
//! A [`MediaSource`] is whatever plays the user's video: it owns the playback
//! clock, decodes frames, and exposes the audio track for capture.

use crate::ReframeResult;
use std::path::PathBuf;
use std::time::Duration;

pub mod pump;
pub mod synthetic;

pub use pump::{select_notifier, FrameNotifier, FrameTick, PaintPollNotifier, PreciseFrameNotifier};
pub use synthetic::SyntheticSource;

/// A decoded frame (RGBA, row-major)
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    /// Raw pixel data (RGBA format)
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Presentation time in the source media
    pub timestamp: Duration,
}

impl VideoFrame {
    /// Whether the buffer length matches the declared size
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == self.width as usize * self.height as usize * 4
    }
}

/// Facts about the loaded source, available once its metadata has been read
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMetadata {
    pub width: u32,
    pub height: u32,
    pub duration: Duration,
    /// Original file name, used to name the export
    pub name: Option<String>,
}

impl SourceMetadata {
    /// Whether the metadata is complete enough to render from
    pub fn is_ready(&self) -> bool {
        self.width > 0 && self.height > 0 && !self.duration.is_zero()
    }

    /// Width / height of the source frames
    pub fn aspect_ratio(&self) -> Option<f64> {
        (self.width > 0 && self.height > 0).then(|| self.width as f64 / self.height as f64)
    }

    /// Default preview position: the middle of the clip, a representative frame
    pub fn preview_position(&self) -> Duration {
        self.duration / 2
    }

    /// File stem for naming exports
    pub fn stem(&self) -> &str {
        self.name
            .as_deref()
            .and_then(|n| std::path::Path::new(n).file_stem())
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("video")
    }
}

/// User-facing audio controls of the player
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioSettings {
    /// 0.0-1.0
    pub volume: f32,
    pub muted: bool,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            muted: false,
        }
    }
}

/// Audio samples for encoding
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSamples {
    /// Interleaved audio samples (f32)
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
}

/// The source's audio, handed to the encoder for merging
#[derive(Debug, Clone, PartialEq)]
pub enum AudioTrack {
    /// Audio stream inside a media file on disk
    File(PathBuf),
    /// Decoded PCM
    Pcm(AudioSamples),
}

/// What the player is showing right now
#[derive(Debug, Clone, PartialEq)]
pub enum FrameSnapshot {
    Frame(VideoFrame),
    Ended,
}

/// Trait for the player that decodes and clocks the source video
///
/// Mirrors a media element: seek/play/pause, a current time, audio controls,
/// and one of two frame notification styles. Sources that can signal each
/// newly presented frame return `true` from `supports_frame_callbacks` and
/// implement `next_presented_frame`; all sources implement `current_frame`.
#[async_trait::async_trait]
pub trait MediaSource: Send {
    /// `None` until the source has loaded enough to know its size and duration
    fn metadata(&self) -> Option<SourceMetadata>;

    /// Current playback position
    fn current_time(&self) -> Duration;

    async fn seek(&mut self, position: Duration) -> ReframeResult<()>;

    async fn play(&mut self) -> ReframeResult<()>;

    fn pause(&mut self);

    fn is_playing(&self) -> bool;

    fn audio_settings(&self) -> AudioSettings;

    fn set_audio_settings(&mut self, settings: AudioSettings) -> ReframeResult<()>;

    /// The audio track, if the source has one
    fn audio_track(&self) -> Option<AudioTrack>;

    fn supports_frame_callbacks(&self) -> bool {
        false
    }

    /// Wait for the next presented frame; `None` once playback has ended
    async fn next_presented_frame(&mut self) -> ReframeResult<Option<VideoFrame>> {
        Err(crate::ReframeError::Unsupported(
            "per-frame callbacks".to_string(),
        ))
    }

    /// The frame on screen now, or `Ended` once playback reached the end
    fn current_frame(&mut self) -> ReframeResult<FrameSnapshot>;
}
