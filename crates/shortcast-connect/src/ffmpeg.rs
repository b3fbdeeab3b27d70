//! FFmpeg overlay compositor.
//!
//! Renders the job's images over a random background clip from the
//! configured folder: portrait output, each image shown centered near
//! the top for its own time window, in batch order.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use rand::prelude::IndexedRandom;
use tokio::process::Command;
use tracing::{debug, info};

use shortcast_engine::{Compositor, EngineError, EngineResult};
use shortcast_models::{ArtifactHandle, ImageRef, StyleConfig};

use crate::error::{ConnectError, ConnectResult};

const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "mov", "avi"];

/// Compositor configuration.
#[derive(Debug, Clone)]
pub struct CompositorConfig {
    /// Folder of background clips
    pub videos_dir: PathBuf,
    /// Folder rendered artifacts are written to
    pub output_dir: PathBuf,
    /// FFmpeg binary
    pub ffmpeg_bin: String,
}

impl CompositorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            videos_dir: PathBuf::from(
                std::env::var("SHORTCAST_VIDEOS_DIR")
                    .unwrap_or_else(|_| "data/input/videos".to_string()),
            ),
            output_dir: PathBuf::from(
                std::env::var("SHORTCAST_OUTPUT_DIR").unwrap_or_else(|_| "data/output".to_string()),
            ),
            ffmpeg_bin: std::env::var("SHORTCAST_FFMPEG_BIN")
                .unwrap_or_else(|_| "ffmpeg".to_string()),
        }
    }
}

/// Renders image batches over background video with FFmpeg.
pub struct OverlayCompositor {
    config: CompositorConfig,
}

impl OverlayCompositor {
    pub fn new(config: CompositorConfig) -> Self {
        Self { config }
    }

    async fn pick_background(&self) -> ConnectResult<PathBuf> {
        let mut dir = tokio::fs::read_dir(&self.config.videos_dir).await?;
        let mut candidates = Vec::new();

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if is_video_file(&path) {
                candidates.push(path);
            }
        }

        let mut rng = rand::rng();
        candidates.choose(&mut rng).cloned().ok_or_else(|| {
            ConnectError::Ffmpeg(format!(
                "no background videos in {}",
                self.config.videos_dir.display()
            ))
        })
    }
}

/// Build the filter graph: scale/crop the background to the target
/// frame, then chain one time-windowed overlay per image.
fn build_filter(images: &[ImageRef], style: &StyleConfig) -> String {
    let mut filter = format!(
        "[0:v]scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}[bg]",
        w = style.width,
        h = style.height,
    );

    let overlay_width = style.width;
    let overlay_max_height = (style.height as f64 * style.overlay_height_ratio) as u32;
    let top_margin = (style.height as f64 * style.top_margin_ratio) as u32;

    let mut last = "bg".to_string();
    for (i, _) in images.iter().enumerate() {
        let input = i + 1;
        let start = i as f64 * style.seconds_per_image;
        let end = start + style.seconds_per_image;
        filter.push_str(&format!(
            ";[{input}:v]scale='min(iw,{overlay_width})':'min(ih,{overlay_max_height})':force_original_aspect_ratio=decrease[img{i}]"
        ));
        filter.push_str(&format!(
            ";[{last}][img{i}]overlay=(W-w)/2:{top_margin}:enable='between(t,{start},{end})'[v{i}]"
        ));
        last = format!("v{i}");
    }

    format!("{filter};[{last}]copy[out]")
}

#[async_trait]
impl Compositor for OverlayCompositor {
    async fn compose(
        &self,
        images: &[ImageRef],
        style: &StyleConfig,
    ) -> EngineResult<ArtifactHandle> {
        let background = self
            .pick_background()
            .await
            .map_err(|e| EngineError::compose_failed(e.to_string()))?;

        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        let output = self
            .config
            .output_dir
            .join(format!("overlay_{}.mp4", Utc::now().format("%Y%m%d_%H%M%S%f")));

        let duration = images.len() as f64 * style.seconds_per_image;
        let filter = build_filter(images, style);

        let mut command = Command::new(&self.config.ffmpeg_bin);
        command.arg("-y").arg("-i").arg(&background);
        for image in images {
            command.arg("-loop").arg("1").arg("-i").arg(&image.uri);
        }
        command
            .arg("-filter_complex")
            .arg(&filter)
            .arg("-map")
            .arg("[out]")
            .arg("-map")
            .arg("0:a?")
            .arg("-t")
            .arg(format!("{duration:.2}"))
            .arg("-c:v")
            .arg("libx264")
            .arg("-c:a")
            .arg("aac")
            .arg("-pix_fmt")
            .arg("yuv420p")
            .arg(&output);

        info!(
            background = %background.display(),
            images = images.len(),
            output = %output.display(),
            "Rendering overlay video"
        );
        debug!("FFmpeg filter: {filter}");

        let result = command.output().await.map_err(|e| {
            EngineError::compose_failed(format!("failed to launch ffmpeg: {e}"))
        })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(EngineError::compose_failed(format!(
                "ffmpeg exited with {}: {tail}",
                result.status
            )));
        }

        Ok(ArtifactHandle::new(output.to_string_lossy().into_owned()))
    }
}

fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shortcast_models::SourceId;

    fn image(n: u32) -> ImageRef {
        ImageRef::new(SourceId::new(format!("src-{n}")), format!("/tmp/{n}.jpg"), Utc::now())
    }

    #[test]
    fn test_filter_windows_follow_batch_order() {
        let style = StyleConfig {
            seconds_per_image: 5.0,
            ..StyleConfig::default()
        };
        let filter = build_filter(&[image(1), image(2)], &style);

        assert!(filter.contains("between(t,0,5)"));
        assert!(filter.contains("between(t,5,10)"));
        // Second overlay chains onto the first.
        assert!(filter.contains("[v0][img1]"));
        assert!(filter.ends_with("[out]"));
    }

    #[test]
    fn test_filter_scales_background_to_frame() {
        let filter = build_filter(&[image(1)], &StyleConfig::default());
        assert!(filter.starts_with("[0:v]scale=1080:1920"));
        assert!(filter.contains("crop=1080:1920[bg]"));
    }

    #[tokio::test]
    async fn test_pick_background_requires_a_video() {
        let dir = tempfile::tempdir().unwrap();
        let compositor = OverlayCompositor::new(CompositorConfig {
            videos_dir: dir.path().to_path_buf(),
            output_dir: dir.path().join("out"),
            ffmpeg_bin: "ffmpeg".to_string(),
        });

        match compositor.pick_background().await {
            Err(ConnectError::Ffmpeg(msg)) => assert!(msg.contains("no background videos")),
            other => panic!("expected Ffmpeg error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_pick_background_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), b"x").await.unwrap();
        tokio::fs::write(dir.path().join("clip.mp4"), b"x").await.unwrap();

        let compositor = OverlayCompositor::new(CompositorConfig {
            videos_dir: dir.path().to_path_buf(),
            output_dir: dir.path().join("out"),
            ffmpeg_bin: "ffmpeg".to_string(),
        });

        let picked = compositor.pick_background().await.unwrap();
        assert_eq!(picked.file_name().unwrap(), "clip.mp4");
    }
}
