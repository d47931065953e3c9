pub mod compositor;
pub mod config;
pub mod effects;
pub mod encoder;
pub mod error;
pub mod generator;
pub mod orchestrator;
pub mod playback;
pub mod session;

pub use compositor::{render, Canvas};
pub use config::{BackgroundImage, ExportSettings, RenderConfig};
pub use effects::{fit_rect, AspectRatio, Color, DimensionSettings, DrawRect, FitMode, TargetDimensions};
pub use encoder::{EncoderBackend, OutputFormat, StreamEncoder};
pub use error::{ReframeError, ReframeResult};
pub use generator::BackgroundGenerator;
pub use orchestrator::{
    CancelHandle, CaptureOrchestrator, ExportOutcome, ExportState, ExportStatus, StatusCallback,
};
pub use playback::{MediaSource, SourceMetadata, SyntheticSource, VideoFrame};
pub use session::{CaptureSession, ExportArtifact};
