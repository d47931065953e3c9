//! FFmpeg sidecar encoder
//!
//! Spawns ffmpeg reading raw RGBA frames on stdin and writing a streamable
//! container (fragmented MP4 or WebM) to stdout. Frames are paced onto the
//! nominal frame rate from their source timestamps: gaps are filled by
//! repeating the previous frame, duplicates dropped.

use super::{
    AudioCodec, Container, EncodedChunk, EncoderBackend, EncoderConfig, OutputFormat,
    StreamEncoder, VideoCodec,
};
use crate::compositor::Canvas;
use crate::playback::{AudioSamples, AudioTrack};
use crate::{ReframeError, ReframeResult};
use async_trait::async_trait;
use ffmpeg_sidecar::command::FfmpegCommand;
use std::collections::HashSet;
use std::io::{Read, Write};
use std::process::{Child, ChildStdin, Stdio};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use tempfile::NamedTempFile;

const READ_BUFFER_SIZE: usize = 64 * 1024;

impl VideoCodec {
    fn as_encoder(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
            VideoCodec::Vp9 => "libvpx-vp9",
            VideoCodec::Vp8 => "libvpx",
        }
    }
}

impl AudioCodec {
    fn as_encoder(&self) -> &'static str {
        match self {
            AudioCodec::Aac => "aac",
            AudioCodec::Opus => "libopus",
        }
    }
}

/// Encoder backend driving an ffmpeg binary
#[derive(Debug, Clone)]
pub struct SidecarBackend {
    encoders: HashSet<String>,
}

impl SidecarBackend {
    /// Locate (or download) ffmpeg and probe which encoders it ships
    pub fn new() -> ReframeResult<Self> {
        Self::ensure_ffmpeg()?;
        let encoders = Self::probe_encoders()?;
        tracing::info!("FFmpeg sidecar ready with {} encoders", encoders.len());
        Ok(Self { encoders })
    }

    /// Backend with a fixed encoder list, skipping the probe
    pub fn with_encoders<I, S>(encoders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            encoders: encoders.into_iter().map(Into::into).collect(),
        }
    }

    /// Ensure ffmpeg is available, download if needed
    pub fn ensure_ffmpeg() -> ReframeResult<()> {
        use ffmpeg_sidecar::download::auto_download;

        if ffmpeg_sidecar::command::ffmpeg_is_installed() {
            tracing::debug!("FFmpeg is already installed");
            return Ok(());
        }

        tracing::info!("FFmpeg not found, downloading...");
        auto_download().map_err(|e| {
            ReframeError::EncodingError(format!("Failed to download FFmpeg: {}", e))
        })?;

        tracing::info!("FFmpeg downloaded successfully");
        Ok(())
    }

    fn probe_encoders() -> ReframeResult<HashSet<String>> {
        let output = std::process::Command::new(ffmpeg_sidecar::paths::ffmpeg_path())
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| ReframeError::EncodingError(format!("Encoder probe failed: {}", e)))?;

        if !output.status.success() {
            return Err(ReframeError::EncodingError(format!(
                "Encoder probe exited with status: {}",
                output.status
            )));
        }
        Ok(parse_encoder_list(&String::from_utf8_lossy(&output.stdout)))
    }

    fn has(&self, encoder: &str) -> bool {
        self.encoders.contains(encoder)
    }
}

/// Encoder names from `ffmpeg -encoders` output
///
/// Listing lines look like ` V....D libx264   libx264 H.264 ...`; the header
/// above the `------` separator is skipped.
fn parse_encoder_list(listing: &str) -> HashSet<String> {
    listing
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("------"))
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
        .collect()
}

impl EncoderBackend for SidecarBackend {
    fn name(&self) -> &'static str {
        "ffmpeg-sidecar"
    }

    fn supports(&self, format: &OutputFormat) -> bool {
        let container_ok = matches!(
            (format.container, format.video),
            (Container::Mp4, VideoCodec::H264)
                | (Container::Webm, VideoCodec::Vp9)
                | (Container::Webm, VideoCodec::Vp8)
        );
        let audio_ok = match (format.container, format.audio) {
            (_, None) => true,
            (Container::Mp4, Some(AudioCodec::Aac)) | (Container::Webm, Some(AudioCodec::Opus)) => {
                format.audio.is_some_and(|a| self.has(a.as_encoder()))
            }
            _ => false,
        };
        container_ok && audio_ok && self.has(format.video.as_encoder())
    }

    fn open(
        &self,
        config: &EncoderConfig,
        audio: Option<&AudioTrack>,
    ) -> ReframeResult<Box<dyn StreamEncoder>> {
        if !self.supports(&config.format) {
            return Err(ReframeError::EncodingError(format!(
                "{} is not supported by this ffmpeg build",
                config.format
            )));
        }
        let audio = match (config.format.audio, audio) {
            (Some(_), Some(track)) => Some(AudioInput::prepare(track)?),
            _ => None,
        };
        Ok(Box::new(SidecarEncoder::spawn(config, audio)?))
    }
}

/// Audio handed to ffmpeg as a second input
#[derive(Debug)]
enum AudioInput {
    File(std::path::PathBuf),
    /// Keeps the temporary WAV alive until ffmpeg exits
    Wav(NamedTempFile),
}

impl AudioInput {
    fn prepare(track: &AudioTrack) -> ReframeResult<Self> {
        match track {
            AudioTrack::File(path) => {
                if !path.exists() {
                    return Err(ReframeError::EncodingError(format!(
                        "Audio source not found: {:?}",
                        path
                    )));
                }
                Ok(AudioInput::File(path.clone()))
            }
            AudioTrack::Pcm(samples) => Ok(AudioInput::Wav(write_wav(samples)?)),
        }
    }

    fn path(&self) -> &std::path::Path {
        match self {
            AudioInput::File(path) => path.as_path(),
            AudioInput::Wav(file) => file.path(),
        }
    }
}

/// Write PCM to a temporary WAV file
fn write_wav(buffer: &AudioSamples) -> ReframeResult<NamedTempFile> {
    if buffer.samples.is_empty() || buffer.channels == 0 || buffer.sample_rate == 0 {
        return Err(ReframeError::EncodingError("Audio track is empty".to_string()));
    }

    let file = tempfile::Builder::new().suffix(".wav").tempfile()?;
    let spec = hound::WavSpec {
        channels: buffer.channels,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(file.path(), spec).map_err(|e| {
        ReframeError::EncodingError(format!("Failed to create audio file: {}", e))
    })?;
    for sample in &buffer.samples {
        writer.write_sample(*sample).map_err(|e| {
            ReframeError::EncodingError(format!("Failed to write audio sample: {}", e))
        })?;
    }
    writer.finalize().map_err(|e| {
        ReframeError::EncodingError(format!("Failed to finalize audio file: {}", e))
    })?;

    tracing::debug!(
        "Audio file written: {} samples at {} Hz",
        buffer.samples.len(),
        buffer.sample_rate
    );
    Ok(file)
}

/// ffmpeg arguments for one encoding session
fn build_args(config: &EncoderConfig, audio_path: Option<&std::path::Path>) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pixel_format".into(),
        "rgba".into(),
        "-video_size".into(),
        config.dimensions.to_string(),
        "-framerate".into(),
        config.frame_rate.to_string(),
        "-i".into(),
        "pipe:0".into(),
    ];

    if let Some(path) = audio_path {
        args.extend(["-i".into(), path.to_string_lossy().into_owned()]);
        args.extend(["-map".into(), "0:v:0".into(), "-map".into(), "1:a?".into()]);
    }

    args.extend([
        "-c:v".into(),
        config.format.video.as_encoder().into(),
        "-b:v".into(),
        format!("{}k", config.video_bitrate / 1000),
        "-pix_fmt".into(),
        "yuv420p".into(),
    ]);
    match config.format.video {
        VideoCodec::H264 => args.extend(["-preset".into(), "veryfast".into()]),
        VideoCodec::Vp9 | VideoCodec::Vp8 => {
            args.extend(["-deadline".into(), "realtime".into(), "-cpu-used".into(), "8".into()])
        }
    }

    match (config.format.audio, audio_path) {
        (Some(codec), Some(_)) => {
            args.extend([
                "-c:a".into(),
                codec.as_encoder().into(),
                "-b:a".into(),
                format!("{}k", config.audio_bitrate / 1000),
                "-shortest".into(),
            ]);
        }
        _ => args.push("-an".into()),
    }

    match config.format.container {
        Container::Mp4 => args.extend([
            "-movflags".into(),
            "frag_keyframe+empty_moov+default_base_moof".into(),
            "-f".into(),
            "mp4".into(),
        ]),
        Container::Webm => args.extend(["-f".into(), "webm".into()]),
    }
    args.push("pipe:1".into());
    args
}

/// Running ffmpeg process
pub struct SidecarEncoder {
    process: Option<Child>,
    stdin: Option<ChildStdin>,
    chunks: mpsc::Receiver<Vec<u8>>,
    reader: Option<JoinHandle<()>>,
    logger: Option<JoinHandle<()>>,
    frame_rate: u32,
    frame_len: usize,
    frames_written: u64,
    _audio: Option<AudioInput>,
}

impl SidecarEncoder {
    fn spawn(config: &EncoderConfig, audio: Option<AudioInput>) -> ReframeResult<Self> {
        let args = build_args(config, audio.as_ref().map(AudioInput::path));

        let mut cmd = FfmpegCommand::new();
        cmd.args(&args);

        let mut child = cmd
            .as_inner_mut()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ReframeError::EncodingError(format!("Failed to start FFmpeg: {}", e)))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (Some(stdin), Some(mut stdout)) = (stdin, stdout) else {
            let _ = child.kill();
            return Err(ReframeError::EncodingError(
                "Failed to get FFmpeg pipes".to_string(),
            ));
        };

        let (tx, rx) = mpsc::channel();
        let reader = std::thread::spawn(move || {
            let mut buf = vec![0u8; READ_BUFFER_SIZE];
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("FFmpeg stdout read failed: {}", e);
                        break;
                    }
                }
            }
        });

        let logger = stderr.map(|mut stderr| {
            std::thread::spawn(move || {
                let mut text = String::new();
                if stderr.read_to_string(&mut text).is_ok() {
                    for line in text.lines().filter(|l| !l.trim().is_empty()) {
                        tracing::debug!(target: "ffmpeg", "{}", line);
                    }
                }
            })
        });

        tracing::info!(
            "Video encoder started: {} @ {} fps, format: {}, audio: {}",
            config.dimensions,
            config.frame_rate,
            config.format,
            audio.is_some()
        );

        Ok(Self {
            process: Some(child),
            stdin: Some(stdin),
            chunks: rx,
            reader: Some(reader),
            logger,
            frame_rate: config.frame_rate.max(1),
            frame_len: config.dimensions.rgba_len(),
            frames_written: 0,
            _audio: audio,
        })
    }
}

/// Output frames owed by source time `timestamp` at `frame_rate`, counting the first at zero
fn frames_due(timestamp: Duration, frame_rate: u32) -> u64 {
    // Frame times are truncated to whole nanoseconds
    (timestamp.as_secs_f64() * frame_rate as f64 + 1e-6).floor() as u64 + 1
}

/// Run a blocking pipe write without stalling other tasks on a multi-threaded runtime
fn blocking_write<T>(write: impl FnOnce() -> T) -> T {
    use tokio::runtime::{Handle, RuntimeFlavor};
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(write)
        }
        _ => write(),
    }
}

#[async_trait]
impl StreamEncoder for SidecarEncoder {
    fn push_frame(&mut self, canvas: &Canvas, timestamp: Duration) -> ReframeResult<()> {
        if canvas.data().len() != self.frame_len {
            return Err(ReframeError::EncodingError(format!(
                "Frame is {} bytes, encoder expects {}",
                canvas.data().len(),
                self.frame_len
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ReframeError::EncodingError("Encoder not started".to_string()))?;

        // Gaps in source time repeat this frame; duplicates write nothing
        let due = frames_due(timestamp, self.frame_rate);
        let frames_written = &mut self.frames_written;
        blocking_write(|| -> ReframeResult<()> {
            while *frames_written < due {
                stdin.write_all(canvas.data()).map_err(|e| {
                    ReframeError::EncodingError(format!("Failed to write frame: {}", e))
                })?;
                *frames_written += 1;

                if *frames_written % 100 == 0 {
                    tracing::debug!("Encoded {} frames", frames_written);
                }
            }
            Ok(())
        })
    }

    fn take_chunks(&mut self) -> Vec<EncodedChunk> {
        self.chunks.try_iter().map(EncodedChunk::new).collect()
    }

    async fn finish(mut self: Box<Self>) -> ReframeResult<Vec<EncodedChunk>> {
        // Closing stdin signals end of input
        drop(self.stdin.take());

        let process = self.process.take();
        let reader = self.reader.take();
        let logger = self.logger.take();
        let status = tokio::task::spawn_blocking(move || -> ReframeResult<_> {
            if let Some(reader) = reader {
                let _ = reader.join();
            }
            if let Some(logger) = logger {
                let _ = logger.join();
            }
            match process {
                Some(mut process) => process.wait().map(Some).map_err(|e| {
                    ReframeError::EncodingError(format!("FFmpeg process failed: {}", e))
                }),
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| ReframeError::EncodingError(format!("Encoder task failed: {}", e)))??;

        if let Some(status) = status {
            if !status.success() {
                return Err(ReframeError::EncodingError(format!(
                    "FFmpeg exited with status: {}",
                    status
                )));
            }
        }

        let chunks = self.take_chunks();
        tracing::info!("Encoding finalized: {} frames", self.frames_written);
        Ok(chunks)
    }
}

impl Drop for SidecarEncoder {
    fn drop(&mut self) {
        drop(self.stdin.take());

        // Kill ffmpeg process if still running
        if let Some(mut process) = self.process.take() {
            let _ = process.kill();
            let _ = process.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::TargetDimensions;
    use crate::encoder::OUTPUT_PREFERENCE;

    fn full_backend() -> SidecarBackend {
        SidecarBackend::with_encoders(["libx264", "libvpx-vp9", "libvpx", "aac", "libopus"])
    }

    fn config(format: OutputFormat) -> EncoderConfig {
        EncoderConfig {
            format,
            dimensions: TargetDimensions::new(1080, 1920).unwrap(),
            frame_rate: 30,
            video_bitrate: 8_000_000,
            audio_bitrate: 128_000,
        }
    }

    #[test]
    fn test_parse_encoder_list() {
        let listing = "Encoders:\n V..... = Video\n ------\n V....D libx264              libx264 H.264\n A....D aac                  AAC (Advanced Audio Coding)\n";
        let encoders = parse_encoder_list(listing);
        assert!(encoders.contains("libx264"));
        assert!(encoders.contains("aac"));
        assert!(!encoders.contains("="));
        assert_eq!(encoders.len(), 2);
    }

    #[test]
    fn test_supports_follows_encoders() {
        let backend = full_backend();
        assert!(backend.supports(&OUTPUT_PREFERENCE[0]));

        let vp8_only = SidecarBackend::with_encoders(["libvpx"]);
        assert!(!vp8_only.supports(&OUTPUT_PREFERENCE[0]));
        assert!(!vp8_only.supports(&OUTPUT_PREFERENCE[2]));
        assert!(vp8_only.supports(&OUTPUT_PREFERENCE[5]));
    }

    #[test]
    fn test_rejects_mismatched_container() {
        let backend = full_backend();
        let odd = OutputFormat::new(Container::Mp4, VideoCodec::Vp8, Some(AudioCodec::Opus));
        assert!(!backend.supports(&odd));
    }

    #[test]
    fn test_mp4_args_are_streamable() {
        let args = build_args(&config(OUTPUT_PREFERENCE[0]), None);
        let joined = args.join(" ");
        assert!(joined.contains("-pixel_format rgba"));
        assert!(joined.contains("-video_size 1080x1920"));
        assert!(joined.contains("empty_moov"));
        assert!(joined.contains("-an"));
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[test]
    fn test_audio_is_mapped_optionally() {
        let path = std::path::Path::new("/tmp/clip.wav");
        let args = build_args(&config(OUTPUT_PREFERENCE[1]), Some(path));
        let joined = args.join(" ");
        assert!(joined.contains("-map 1:a?"));
        assert!(joined.contains("-c:a libopus"));
        assert!(joined.contains("-f webm"));
        assert!(!joined.contains("-an"));
    }

    #[test]
    fn test_frames_due_paces_source_time() {
        assert_eq!(frames_due(Duration::ZERO, 30), 1);
        assert_eq!(frames_due(Duration::from_millis(33), 30), 1);
        assert_eq!(frames_due(Duration::from_millis(34), 30), 2);
        assert_eq!(frames_due(Duration::from_secs(1), 30), 31);
    }

    #[test]
    fn test_frames_due_follows_source_length() {
        // A 2 s clip at 30 fps owes 60 output frames however late each arrives
        let last = Duration::from_nanos(59 * 1_000_000_000 / 30);
        assert_eq!(frames_due(last, 30), 60);
        // A 24 fps source is stretched to 30 fps output without growing
        let last_24 = Duration::from_nanos(47 * 1_000_000_000 / 24);
        assert_eq!(frames_due(last_24, 30), 59);
    }

    #[test]
    fn test_pcm_audio_written_as_wav() {
        let samples = AudioSamples {
            samples: vec![0.0; 960],
            sample_rate: 48_000,
            channels: 2,
        };
        let file = write_wav(&samples).unwrap();
        let reader = hound::WavReader::open(file.path()).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.len(), 960);
    }

    #[test]
    fn test_empty_pcm_is_rejected() {
        let samples = AudioSamples {
            samples: vec![],
            sample_rate: 48_000,
            channels: 2,
        };
        assert!(write_wav(&samples).is_err());
    }
}
