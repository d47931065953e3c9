//! Capture session bookkeeping
//!
//! A [`CaptureSession`] collects encoded chunks and progress for one export
//! run; [`CaptureSession::finalize`] turns them into a downloadable
//! [`ExportArtifact`].

use crate::effects::TargetDimensions;
use crate::encoder::{EncodedChunk, OutputFormat};
use crate::{ReframeError, ReframeResult};
use chrono::{DateTime, Local};
use uuid::Uuid;

/// State of one capture run
#[derive(Debug)]
pub struct CaptureSession {
    id: Uuid,
    format: OutputFormat,
    target: TargetDimensions,
    chunks: Vec<EncodedChunk>,
    /// Fraction of the source played, 0.0-1.0, never decreasing
    progress: f64,
    frames: u64,
    started_at: DateTime<Local>,
}

impl CaptureSession {
    pub fn new(format: OutputFormat, target: TargetDimensions) -> Self {
        Self {
            id: Uuid::new_v4(),
            format,
            target,
            chunks: Vec::new(),
            progress: 0.0,
            frames: 0,
            started_at: Local::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Keep encoder output in arrival order; empty chunks are discarded
    pub fn append(&mut self, chunks: impl IntoIterator<Item = EncodedChunk>) {
        self.chunks
            .extend(chunks.into_iter().filter(|chunk| !chunk.is_empty()));
    }

    pub fn record_frame(&mut self) {
        self.frames += 1;
    }

    /// Move progress forward; returns the new value only when it increased
    pub fn advance_progress(&mut self, fraction: f64) -> Option<f64> {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            return None;
        };
        if fraction > self.progress {
            self.progress = fraction;
            Some(fraction)
        } else {
            None
        }
    }

    /// Total encoded bytes so far
    pub fn byte_len(&self) -> usize {
        self.chunks.iter().map(EncodedChunk::len).sum()
    }

    /// Assemble the output file
    pub fn finalize(self, stem: &str) -> ReframeResult<ExportArtifact> {
        let byte_len = self.byte_len();
        if byte_len == 0 {
            return Err(ReframeError::EmptyOutput);
        }

        let mut data = Vec::with_capacity(byte_len);
        for chunk in &self.chunks {
            data.extend_from_slice(&chunk.data);
        }

        let filename = artifact_filename(stem, self.target, self.format.extension(), &self.started_at);
        tracing::info!(
            session = %self.id,
            frames = self.frames,
            bytes = byte_len,
            "Export assembled as {}",
            filename
        );

        Ok(ExportArtifact {
            data,
            format: self.format,
            filename,
            mime_type: self.format.mime_type(),
            dimensions: self.target,
            frame_count: self.frames,
        })
    }
}

/// A finished export, ready to hand to the user
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    pub data: Vec<u8>,
    pub format: OutputFormat,
    pub filename: String,
    pub mime_type: String,
    pub dimensions: TargetDimensions,
    /// Frames composited during capture
    pub frame_count: u64,
}

impl ExportArtifact {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write the artifact into `dir` under its own filename
    pub fn save_to(&self, dir: &std::path::Path) -> ReframeResult<std::path::PathBuf> {
        let path = dir.join(&self.filename);
        std::fs::write(&path, &self.data)?;
        Ok(path)
    }
}

/// `<stem>_<W>x<H>_<YYYYmmdd-HHMMSS>.<ext>`
pub fn artifact_filename(
    stem: &str,
    dimensions: TargetDimensions,
    extension: &str,
    timestamp: &DateTime<Local>,
) -> String {
    format!(
        "{}_{}_{}.{}",
        stem,
        dimensions,
        timestamp.format("%Y%m%d-%H%M%S"),
        extension
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{OUTPUT_PREFERENCE, BASELINE_FORMAT};
    use chrono::TimeZone;

    fn session() -> CaptureSession {
        CaptureSession::new(OUTPUT_PREFERENCE[0], TargetDimensions::new(1080, 1920).unwrap())
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut s = session();
        assert_eq!(s.advance_progress(0.25), Some(0.25));
        assert_eq!(s.advance_progress(0.1), None);
        assert_eq!(s.advance_progress(0.25), None);
        assert_eq!(s.advance_progress(2.0), Some(1.0));
        assert_eq!(s.advance_progress(f64::NAN), None);
        assert_eq!(s.progress(), 1.0);
    }

    #[test]
    fn test_finalize_concatenates_in_order() {
        let mut s = session();
        s.append(vec![EncodedChunk::new(vec![1, 2]), EncodedChunk::new(vec![])]);
        s.append(vec![EncodedChunk::new(vec![3])]);
        s.record_frame();

        let artifact = s.finalize("clip").unwrap();
        assert_eq!(artifact.data, vec![1, 2, 3]);
        assert_eq!(artifact.frame_count, 1);
        assert!(artifact.filename.starts_with("clip_1080x1920_"));
        assert!(artifact.filename.ends_with(".mp4"));
        assert!(artifact.mime_type.starts_with("video/mp4"));
    }

    #[test]
    fn test_empty_output_is_an_error() {
        let mut s = session();
        s.append(vec![EncodedChunk::new(vec![])]);
        assert!(matches!(s.finalize("clip"), Err(ReframeError::EmptyOutput)));
    }

    #[test]
    fn test_artifact_filename() {
        let ts = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let name = artifact_filename(
            "holiday",
            TargetDimensions::new(1080, 1080).unwrap(),
            BASELINE_FORMAT.extension(),
            &ts,
        );
        assert_eq!(name, "holiday_1080x1080_20240309-140507.webm");
    }
}
