//! Shared data models for the shortcast pipeline.

mod ids;
mod image;
mod job;
mod video;

pub use ids::{JobId, RemoteVideoId, SourceId};
pub use image::ImageRef;
pub use job::{JobState, StageKind, VideoJob};
pub use video::{ArtifactHandle, StyleConfig, VideoMetadata};
