//! Video encoding for exports
//!
//! The capture loop talks to an [`EncoderBackend`], which answers capability
//! probes and opens a [`StreamEncoder`] for one export. Encoders are fed
//! composited canvases and hand back encoded container bytes as they arrive.

use crate::compositor::Canvas;
use crate::effects::TargetDimensions;
use crate::playback::AudioTrack;
use crate::ReframeResult;
use async_trait::async_trait;
use std::time::Duration;

#[cfg(feature = "encoding")]
pub mod sidecar;

#[cfg(feature = "encoding")]
pub use sidecar::SidecarBackend;

/// Output container format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    Mp4,
    Webm,
}

impl Container {
    pub fn extension(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Webm => "webm",
        }
    }
}

impl std::fmt::Display for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Container::Mp4 => write!(f, "MP4"),
            Container::Webm => write!(f, "WebM"),
        }
    }
}

/// Video codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoCodec {
    /// H.264/AVC - widely compatible
    H264,
    Vp9,
    Vp8,
}

impl VideoCodec {
    /// Codec tag used in MIME `codecs` parameters
    fn mime_tag(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "avc1.42E01E",
            VideoCodec::Vp9 => "vp9",
            VideoCodec::Vp8 => "vp8",
        }
    }
}

impl std::fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoCodec::H264 => write!(f, "H.264"),
            VideoCodec::Vp9 => write!(f, "VP9"),
            VideoCodec::Vp8 => write!(f, "VP8"),
        }
    }
}

/// Audio codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioCodec {
    /// AAC - widely compatible
    Aac,
    /// Opus - better quality at low bitrates
    Opus,
}

impl AudioCodec {
    fn mime_tag(&self) -> &'static str {
        match self {
            AudioCodec::Aac => "mp4a.40.2",
            AudioCodec::Opus => "opus",
        }
    }
}

impl std::fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioCodec::Aac => write!(f, "AAC"),
            AudioCodec::Opus => write!(f, "Opus"),
        }
    }
}

/// A container plus the codecs inside it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputFormat {
    pub container: Container,
    pub video: VideoCodec,
    pub audio: Option<AudioCodec>,
}

impl OutputFormat {
    pub const fn new(container: Container, video: VideoCodec, audio: Option<AudioCodec>) -> Self {
        Self {
            container,
            video,
            audio,
        }
    }

    /// MIME type with codecs, e.g. `video/mp4;codecs=avc1.42E01E,mp4a.40.2`
    pub fn mime_type(&self) -> String {
        let base = match self.container {
            Container::Mp4 => "video/mp4",
            Container::Webm => "video/webm",
        };
        match self.audio {
            Some(audio) => format!("{base};codecs={},{}", self.video.mime_tag(), audio.mime_tag()),
            None => format!("{base};codecs={}", self.video.mime_tag()),
        }
    }

    /// File extension of the container
    pub fn extension(&self) -> &'static str {
        self.container.extension()
    }

    /// Same container and video codec without an audio track
    pub fn video_only(&self) -> Self {
        Self {
            audio: None,
            ..*self
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.audio {
            Some(audio) => write!(f, "{} ({} + {})", self.container, self.video, audio),
            None => write!(f, "{} ({})", self.container, self.video),
        }
    }
}

/// Candidate formats, most preferred first
pub const OUTPUT_PREFERENCE: [OutputFormat; 6] = [
    OutputFormat::new(Container::Mp4, VideoCodec::H264, Some(AudioCodec::Aac)),
    OutputFormat::new(Container::Webm, VideoCodec::Vp9, Some(AudioCodec::Opus)),
    OutputFormat::new(Container::Webm, VideoCodec::Vp8, Some(AudioCodec::Opus)),
    OutputFormat::new(Container::Mp4, VideoCodec::H264, None),
    OutputFormat::new(Container::Webm, VideoCodec::Vp9, None),
    OutputFormat::new(Container::Webm, VideoCodec::Vp8, None),
];

/// Used when the backend reports none of the preferred formats
pub const BASELINE_FORMAT: OutputFormat =
    OutputFormat::new(Container::Webm, VideoCodec::Vp8, Some(AudioCodec::Opus));

/// Pick the first preferred format the backend supports
pub fn select_output_format(backend: &dyn EncoderBackend) -> OutputFormat {
    match OUTPUT_PREFERENCE.iter().find(|f| backend.supports(f)) {
        Some(format) => {
            tracing::debug!(backend = backend.name(), "Selected output format {}", format);
            *format
        }
        None => {
            tracing::warn!(
                backend = backend.name(),
                "No preferred output format supported, falling back to {}",
                BASELINE_FORMAT
            );
            BASELINE_FORMAT
        }
    }
}

/// Settings for one encoding session
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderConfig {
    pub format: OutputFormat,
    pub dimensions: TargetDimensions,
    /// Nominal frame rate of the output stream
    pub frame_rate: u32,
    /// Video bitrate in bits per second
    pub video_bitrate: u64,
    /// Audio bitrate in bits per second
    pub audio_bitrate: u64,
}

/// A piece of encoded container output, in stream order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub data: Vec<u8>,
}

impl EncodedChunk {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Something that can produce a video stream from canvases
pub trait EncoderBackend: Send + Sync {
    /// Name for logs
    fn name(&self) -> &'static str;

    /// Capability probe
    fn supports(&self, format: &OutputFormat) -> bool;

    /// Start encoding; `audio` is merged into the stream when given
    fn open(
        &self,
        config: &EncoderConfig,
        audio: Option<&AudioTrack>,
    ) -> ReframeResult<Box<dyn StreamEncoder>>;
}

/// One running encoding session
#[async_trait]
pub trait StreamEncoder: Send {
    /// Submit a composited frame presented at `timestamp` on the source timeline
    fn push_frame(&mut self, canvas: &Canvas, timestamp: Duration) -> ReframeResult<()>;

    /// Encoded output that has become available since the last call
    fn take_chunks(&mut self) -> Vec<EncodedChunk>;

    /// Flush and stop, returning the remaining output
    async fn finish(self: Box<Self>) -> ReframeResult<Vec<EncodedChunk>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct Probe(HashSet<OutputFormat>);

    impl EncoderBackend for Probe {
        fn name(&self) -> &'static str {
            "probe"
        }

        fn supports(&self, format: &OutputFormat) -> bool {
            self.0.contains(format)
        }

        fn open(
            &self,
            _config: &EncoderConfig,
            _audio: Option<&AudioTrack>,
        ) -> ReframeResult<Box<dyn StreamEncoder>> {
            Err(crate::ReframeError::Unsupported("probe only".to_string()))
        }
    }

    #[test]
    fn test_prefers_mp4_with_audio() {
        let all = Probe(OUTPUT_PREFERENCE.iter().copied().collect());
        assert_eq!(select_output_format(&all), OUTPUT_PREFERENCE[0]);
    }

    #[test]
    fn test_falls_through_preference_order() {
        let webm_only = Probe(
            [
                OutputFormat::new(Container::Webm, VideoCodec::Vp8, Some(AudioCodec::Opus)),
                OutputFormat::new(Container::Webm, VideoCodec::Vp8, None),
            ]
            .into_iter()
            .collect(),
        );
        let format = select_output_format(&webm_only);
        assert_eq!(format.video, VideoCodec::Vp8);
        assert_eq!(format.audio, Some(AudioCodec::Opus));

        let silent_mp4 = Probe([OUTPUT_PREFERENCE[3]].into_iter().collect());
        assert_eq!(select_output_format(&silent_mp4).audio, None);
    }

    #[test]
    fn test_baseline_when_nothing_supported() {
        let none = Probe(HashSet::new());
        let format = select_output_format(&none);
        assert_eq!(format, BASELINE_FORMAT);
        assert_eq!(format.extension(), "webm");
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(
            OUTPUT_PREFERENCE[0].mime_type(),
            "video/mp4;codecs=avc1.42E01E,mp4a.40.2"
        );
        assert_eq!(OUTPUT_PREFERENCE[5].mime_type(), "video/webm;codecs=vp8");
        assert_eq!(OUTPUT_PREFERENCE[1].video_only(), OUTPUT_PREFERENCE[4]);
    }
}
