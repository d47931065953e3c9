//! Frame notification strategies for the capture loop
//!
//! Two capabilities, picked once per export:
//! - [`PreciseFrameNotifier`] waits on the source's own "frame presented" signal
//! - [`PaintPollNotifier`] samples the player on a fixed paint interval
//!
//! Both hand out frames in strictly increasing source time and never repeat one.

use super::{FrameSnapshot, MediaSource, VideoFrame};
use crate::ReframeResult;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

/// Result of waiting for the next frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameTick {
    Frame(VideoFrame),
    EndOfStream,
}

/// Source of "a new frame is available" notifications
#[async_trait::async_trait]
pub trait FrameNotifier: Send {
    /// Name for logs
    fn name(&self) -> &'static str;

    /// Suspend until the next unseen frame is presented, or the source ends
    async fn next_frame(&mut self, source: &mut dyn MediaSource) -> ReframeResult<FrameTick>;
}

/// Pick the most precise notifier the source supports
pub fn select_notifier(source: &dyn MediaSource, paint_interval: Duration) -> Box<dyn FrameNotifier> {
    let notifier: Box<dyn FrameNotifier> = if source.supports_frame_callbacks() {
        Box::new(PreciseFrameNotifier::new())
    } else {
        Box::new(PaintPollNotifier::new(paint_interval))
    };
    tracing::debug!("Frame notifier selected: {}", notifier.name());
    notifier
}

/// Uses the source's per-frame presentation callbacks
#[derive(Debug, Default)]
pub struct PreciseFrameNotifier {
    last_timestamp: Option<Duration>,
}

impl PreciseFrameNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl FrameNotifier for PreciseFrameNotifier {
    fn name(&self) -> &'static str {
        "frame-callback"
    }

    async fn next_frame(&mut self, source: &mut dyn MediaSource) -> ReframeResult<FrameTick> {
        loop {
            let Some(frame) = source.next_presented_frame().await? else {
                return Ok(FrameTick::EndOfStream);
            };
            if is_new(self.last_timestamp, frame.timestamp) {
                self.last_timestamp = Some(frame.timestamp);
                return Ok(FrameTick::Frame(frame));
            }
        }
    }
}

/// Samples the player once per paint interval
#[derive(Debug)]
pub struct PaintPollNotifier {
    interval: Interval,
    last_timestamp: Option<Duration>,
}

impl PaintPollNotifier {
    pub fn new(paint_interval: Duration) -> Self {
        let mut interval = tokio::time::interval(paint_interval.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            last_timestamp: None,
        }
    }
}

#[async_trait::async_trait]
impl FrameNotifier for PaintPollNotifier {
    fn name(&self) -> &'static str {
        "paint-poll"
    }

    async fn next_frame(&mut self, source: &mut dyn MediaSource) -> ReframeResult<FrameTick> {
        loop {
            self.interval.tick().await;
            match source.current_frame()? {
                FrameSnapshot::Ended => return Ok(FrameTick::EndOfStream),
                FrameSnapshot::Frame(frame) if is_new(self.last_timestamp, frame.timestamp) => {
                    self.last_timestamp = Some(frame.timestamp);
                    return Ok(FrameTick::Frame(frame));
                }
                // Same frame still on screen
                FrameSnapshot::Frame(_) => {}
            }
        }
    }
}

fn is_new(last: Option<Duration>, timestamp: Duration) -> bool {
    last.map_or(true, |last| timestamp > last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::SyntheticSource;

    async fn drain(
        notifier: &mut dyn FrameNotifier,
        source: &mut dyn MediaSource,
    ) -> Vec<Duration> {
        let mut stamps = Vec::new();
        while let FrameTick::Frame(frame) = notifier.next_frame(source).await.unwrap() {
            stamps.push(frame.timestamp);
        }
        stamps
    }

    #[tokio::test]
    async fn test_precise_notifier_delivers_every_frame() {
        let mut source = SyntheticSource::new(8, 8, Duration::from_secs(1))
            .with_frame_rate(10)
            .with_playback_rate(100.0);
        source.play().await.unwrap();

        let mut notifier = select_notifier(&source, Duration::from_millis(1));
        assert_eq!(notifier.name(), "frame-callback");

        let stamps = drain(notifier.as_mut(), &mut source).await;
        assert_eq!(stamps.len(), 10);
        assert_eq!(stamps[0], Duration::ZERO);
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_poll_notifier_is_strictly_increasing() {
        let mut source = SyntheticSource::new(8, 8, Duration::from_secs(1))
            .with_frame_rate(30)
            .with_playback_rate(10.0)
            .with_frame_callbacks(false);
        source.play().await.unwrap();

        let mut notifier = select_notifier(&source, Duration::from_millis(1));
        assert_eq!(notifier.name(), "paint-poll");

        let stamps = drain(notifier.as_mut(), &mut source).await;
        assert!(!stamps.is_empty());
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
        assert!(stamps.iter().all(|t| *t < Duration::from_secs(1)));
    }

    #[test]
    fn test_is_new() {
        assert!(is_new(None, Duration::ZERO));
        assert!(is_new(Some(Duration::ZERO), Duration::from_millis(1)));
        assert!(!is_new(Some(Duration::from_millis(1)), Duration::from_millis(1)));
    }
}
