//! YouTube Shorts publisher.
//!
//! Exchanges the stored refresh token for an access token per upload
//! and posts the rendered file with its snippet metadata. Upload
//! failures are classified for the engine: auth and content
//! rejections are terminal, rate limits and server errors retry.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, StatusCode};
use serde::Deserialize;
use tokio::fs::File;
use tracing::{info, warn};

use shortcast_engine::{EngineError, EngineResult, Publisher};
use shortcast_models::{ArtifactHandle, RemoteVideoId, VideoMetadata};

use crate::error::{ConnectError, ConnectResult};

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const UPLOAD_URL: &str =
    "https://www.googleapis.com/upload/youtube/v3/videos?uploadType=multipart&part=snippet,status";

// People & Blogs
const DEFAULT_CATEGORY_ID: &str = "22";

/// YouTube client configuration.
#[derive(Debug, Clone)]
pub struct YouTubeConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    /// Privacy status applied to uploads (public/unlisted/private)
    pub privacy_status: String,
    pub category_id: String,
}

impl YouTubeConfig {
    /// Create config from environment variables.
    pub fn from_env() -> ConnectResult<Self> {
        let client_id = std::env::var("GOOGLE_CLIENT_ID")
            .map_err(|_| ConnectError::config("GOOGLE_CLIENT_ID is not set"))?;
        let client_secret = std::env::var("GOOGLE_CLIENT_SECRET")
            .map_err(|_| ConnectError::config("GOOGLE_CLIENT_SECRET is not set"))?;
        let refresh_token = std::env::var("GOOGLE_REFRESH_TOKEN")
            .map_err(|_| ConnectError::config("GOOGLE_REFRESH_TOKEN is not set"))?;

        Ok(Self {
            client_id,
            client_secret,
            refresh_token,
            privacy_status: std::env::var("SHORTCAST_PRIVACY_STATUS")
                .unwrap_or_else(|_| "public".to_string()),
            category_id: std::env::var("SHORTCAST_CATEGORY_ID")
                .unwrap_or_else(|_| DEFAULT_CATEGORY_ID.to_string()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
}

/// Uploads rendered videos as Shorts.
pub struct YouTubePublisher {
    client: Client,
    config: YouTubeConfig,
}

impl YouTubePublisher {
    pub fn new(config: YouTubeConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    async fn access_token(&self) -> ConnectResult<String> {
        let response = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", self.config.refresh_token.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectError::Auth(format!(
                "token refresh failed ({status}): {body}"
            )));
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    fn snippet_body(&self, metadata: &VideoMetadata) -> serde_json::Value {
        serde_json::json!({
            "snippet": {
                "title": metadata.title,
                "description": metadata.description,
                "tags": metadata.tags,
                "categoryId": self.config.category_id,
            },
            "status": {
                "privacyStatus": self.config.privacy_status,
                "selfDeclaredMadeForKids": false,
            },
        })
    }
}

/// Build the streaming media part for an upload.
///
/// The rendered file is streamed, not buffered; renders run to
/// hundreds of megabytes. A missing or unreadable artifact is
/// terminal, retrying cannot heal it.
async fn media_part(path: &str) -> EngineResult<Part> {
    let file = File::open(path)
        .await
        .map_err(|e| EngineError::publish_terminal(format!("artifact {path} unreadable: {e}")))?;
    let length = file
        .metadata()
        .await
        .map_err(|e| EngineError::publish_terminal(format!("artifact {path} unreadable: {e}")))?
        .len();

    Part::stream_with_length(Body::from(file), length)
        .file_name("video.mp4")
        .mime_str("video/mp4")
        .map_err(|e| EngineError::publish_terminal(e.to_string()))
}

/// Map an upload HTTP status to the engine's publish error taxonomy.
fn classify_upload_failure(status: StatusCode, body: &str) -> EngineError {
    let message = format!("upload returned {status}: {body}");
    match status {
        // Credentials or request shape: retrying cannot help.
        StatusCode::UNAUTHORIZED | StatusCode::BAD_REQUEST => {
            EngineError::publish_terminal(message)
        }
        // 403 is quota/rate-limit for this API unless the body says
        // the content itself was rejected.
        StatusCode::FORBIDDEN => {
            if body.contains("quotaExceeded") || body.contains("rateLimitExceeded") {
                EngineError::publish_retryable(message)
            } else {
                EngineError::publish_terminal(message)
            }
        }
        StatusCode::TOO_MANY_REQUESTS => EngineError::publish_retryable(message),
        s if s.is_server_error() => EngineError::publish_retryable(message),
        _ => EngineError::publish_terminal(message),
    }
}

#[async_trait]
impl Publisher for YouTubePublisher {
    async fn publish(
        &self,
        artifact: &ArtifactHandle,
        metadata: &VideoMetadata,
    ) -> EngineResult<RemoteVideoId> {
        let token = match self.access_token().await {
            Ok(t) => t,
            Err(ConnectError::Auth(msg)) => return Err(EngineError::publish_terminal(msg)),
            Err(e) => return Err(EngineError::publish_retryable(e.to_string())),
        };

        let snippet = self.snippet_body(metadata);
        let form = Form::new()
            .part(
                "metadata",
                Part::text(snippet.to_string())
                    .mime_str("application/json")
                    .map_err(|e| EngineError::publish_terminal(e.to_string()))?,
            )
            .part("media", media_part(&artifact.path).await?);

        info!(title = %metadata.title, "Uploading video to YouTube");
        let response = self
            .client
            .post(UPLOAD_URL)
            .bearer_auth(&token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| EngineError::publish_retryable(format!("upload request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "YouTube upload failed");
            return Err(classify_upload_failure(status, &body));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| EngineError::publish_retryable(format!("upload response unreadable: {e}")))?;

        info!(video_id = %uploaded.id, "Upload successful");
        Ok(RemoteVideoId::new(uploaded.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_terminal_statuses() {
        assert!(!classify_upload_failure(StatusCode::UNAUTHORIZED, "").is_retryable());
        assert!(!classify_upload_failure(StatusCode::BAD_REQUEST, "invalid title").is_retryable());
        assert!(!classify_upload_failure(StatusCode::FORBIDDEN, "forbidden content").is_retryable());
    }

    #[test]
    fn test_classification_retryable_statuses() {
        assert!(classify_upload_failure(StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
        assert!(classify_upload_failure(StatusCode::INTERNAL_SERVER_ERROR, "").is_retryable());
        assert!(classify_upload_failure(StatusCode::SERVICE_UNAVAILABLE, "").is_retryable());
        assert!(classify_upload_failure(StatusCode::FORBIDDEN, "quotaExceeded").is_retryable());
    }

    #[tokio::test]
    async fn test_media_part_streams_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("render.mp4");
        tokio::fs::write(&path, b"not really mp4").await.unwrap();

        assert!(media_part(path.to_str().unwrap()).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_artifact_is_terminal() {
        let err = media_part("/nonexistent/render.mp4").await.unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("unreadable"));
    }

    #[test]
    fn test_snippet_body_shape() {
        let publisher = YouTubePublisher::new(YouTubeConfig {
            client_id: "id".into(),
            client_secret: "secret".into(),
            refresh_token: "refresh".into(),
            privacy_status: "public".into(),
            category_id: "22".into(),
        });

        let metadata = VideoMetadata::new("A title")
            .with_description("desc")
            .with_tags(vec!["#memes".into()]);
        let body = publisher.snippet_body(&metadata);

        assert_eq!(body["snippet"]["title"], "A title");
        assert_eq!(body["snippet"]["categoryId"], "22");
        assert_eq!(body["status"]["privacyStatus"], "public");
        assert_eq!(body["status"]["selfDeclaredMadeForKids"], false);
    }
}
