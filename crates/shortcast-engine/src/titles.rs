//! Video title selection.
//!
//! Titles come from an operator-maintained file, one per line; a
//! random line is picked per publish and the configured hashtags are
//! appended. Falls back to a stock title when the file is missing or
//! empty.

use std::path::PathBuf;

use rand::prelude::IndexedRandom;
use tracing::warn;

const FALLBACK_TITLE: &str = "Meme of the day";

/// Picks a publication title.
#[derive(Debug, Clone)]
pub struct TitlePicker {
    path: Option<PathBuf>,
    hashtags: Vec<String>,
}

impl TitlePicker {
    pub fn new(path: Option<PathBuf>, hashtags: Vec<String>) -> Self {
        Self { path, hashtags }
    }

    /// Pick a title with the hashtag suffix applied.
    pub async fn pick(&self) -> String {
        let base = self.pick_base().await;
        if self.hashtags.is_empty() {
            base
        } else {
            format!("{} {}", base, self.hashtags.join(" "))
        }
    }

    async fn pick_base(&self) -> String {
        let Some(path) = &self.path else {
            return FALLBACK_TITLE.to_string();
        };

        let contents = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Titles file {} unreadable, using fallback: {}", path.display(), e);
                return FALLBACK_TITLE.to_string();
            }
        };

        let titles: Vec<&str> = contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        let mut rng = rand::rng();
        titles
            .choose(&mut rng)
            .map(|t| t.to_string())
            .unwrap_or_else(|| FALLBACK_TITLE.to_string())
    }
}

impl Default for TitlePicker {
    fn default() -> Self {
        Self::new(
            None,
            vec!["#shorts".to_string(), "#memes".to_string(), "#funny".to_string()],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_fallback_without_file() {
        let picker = TitlePicker::new(None, vec!["#shorts".to_string()]);
        assert_eq!(picker.pick().await, "Meme of the day #shorts");
    }

    #[tokio::test]
    async fn test_picks_line_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Only title").unwrap();
        writeln!(file).unwrap();

        let picker = TitlePicker::new(Some(file.path().to_path_buf()), vec![]);
        assert_eq!(picker.pick().await, "Only title");
    }

    #[tokio::test]
    async fn test_empty_file_uses_fallback() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let picker = TitlePicker::new(Some(file.path().to_path_buf()), vec![]);
        assert_eq!(picker.pick().await, FALLBACK_TITLE);
    }
}
