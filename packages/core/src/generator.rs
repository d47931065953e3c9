//! Background image generation
//!
//! Letterboxed exports can ask for a generated backdrop described by a text
//! prompt. The generation service is pluggable; implementations receive their
//! credentials (API key, endpoint) at construction.

use crate::config::BackgroundImage;
use crate::ReframeResult;
use async_trait::async_trait;

/// Produces a background image from a prompt
#[async_trait]
pub trait BackgroundGenerator: Send + Sync {
    /// Generate an image for `prompt`
    ///
    /// Failures should be reported as `ReframeError::BackgroundGeneration`
    /// with a message fit to show the user.
    async fn generate(&self, prompt: &str) -> ReframeResult<BackgroundImage>;
}
