//! Rendered artifact and publication metadata types.

use serde::{Deserialize, Serialize};

/// Handle to a rendered video artifact.
///
/// The scheduler only threads this through from compositor to
/// publisher; the path is opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHandle {
    /// Location of the rendered file
    pub path: String,
}

impl ArtifactHandle {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }
}

/// Style configuration handed to the compositor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleConfig {
    /// Target output width in pixels
    pub width: u32,
    /// Target output height in pixels
    pub height: u32,
    /// Seconds each image stays on screen
    pub seconds_per_image: f64,
    /// Fraction of the frame height the overlay may occupy
    pub overlay_height_ratio: f64,
    /// Top margin as a fraction of the frame height
    pub top_margin_ratio: f64,
}

impl Default for StyleConfig {
    fn default() -> Self {
        // Portrait 9:16 defaults for short-form output
        Self {
            width: 1080,
            height: 1920,
            seconds_per_image: 5.0,
            overlay_height_ratio: 0.65,
            top_margin_ratio: 0.1,
        }
    }
}

/// Metadata attached to a published video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VideoMetadata {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl VideoMetadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}
