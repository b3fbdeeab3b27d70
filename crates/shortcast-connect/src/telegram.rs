//! Telegram bot client: image event source and status notifier.
//!
//! Long-polls `getUpdates` with offset tracking, picks the largest
//! rendition of each posted photo and downloads it into the images
//! directory. The photo's `file_unique_id` is the dedup key, so
//! redelivered updates collapse at intake.

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use shortcast_engine::{EventIntake, Notifier};
use shortcast_models::SourceId;

use crate::error::{ConnectError, ConnectResult};

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Telegram client configuration.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot token
    pub token: String,
    /// Chat that receives status notifications
    pub chat_id: String,
    /// Directory downloaded images are stored in
    pub images_dir: PathBuf,
    /// Long-poll timeout passed to getUpdates
    pub poll_timeout: Duration,
}

impl TelegramConfig {
    /// Create config from environment variables.
    pub fn from_env() -> ConnectResult<Self> {
        let token = std::env::var("TELEGRAM_TOKEN")
            .map_err(|_| ConnectError::config("TELEGRAM_TOKEN is not set"))?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID")
            .map_err(|_| ConnectError::config("TELEGRAM_CHAT_ID is not set"))?;
        let images_dir = std::env::var("SHORTCAST_IMAGES_DIR")
            .unwrap_or_else(|_| "data/input/images".to_string());
        let poll_timeout = std::env::var("TELEGRAM_POLL_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        Ok(Self {
            token,
            chat_id,
            images_dir: PathBuf::from(images_dir),
            poll_timeout: Duration::from_secs(poll_timeout),
        })
    }
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    date: i64,
    photo: Option<Vec<PhotoSize>>,
}

#[derive(Debug, Deserialize)]
struct PhotoSize {
    file_id: String,
    file_unique_id: String,
}

#[derive(Debug, Deserialize)]
struct FileResponse {
    ok: bool,
    result: Option<FileInfo>,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    file_path: Option<String>,
}

/// One normalized image event pulled from the channel.
#[derive(Debug, Clone)]
pub struct PostedImage {
    pub source_id: SourceId,
    pub uri: String,
    pub received_at: DateTime<Utc>,
}

/// Polls the bot API and feeds posted images into the intake.
pub struct TelegramSource {
    client: Client,
    config: TelegramConfig,
    offset: AtomicI64,
}

impl TelegramSource {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            offset: AtomicI64::new(0),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", TELEGRAM_API, self.config.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", TELEGRAM_API, self.config.token, file_path)
    }

    /// Poll once and download any newly posted photos.
    pub async fn poll_once(&self) -> ConnectResult<Vec<PostedImage>> {
        let offset = self.offset.load(Ordering::SeqCst);
        let response: UpdatesResponse = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", (offset + 1).to_string()),
                ("timeout", self.config.poll_timeout.as_secs().to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !response.ok {
            return Err(ConnectError::api(200, "getUpdates returned ok=false"));
        }

        let mut images = Vec::new();
        for update in response.result {
            self.offset.fetch_max(update.update_id, Ordering::SeqCst);

            let Some(message) = update.message else { continue };
            let Some(photos) = message.photo else { continue };
            // Renditions are ordered smallest to largest.
            let Some(photo) = photos.last() else { continue };

            let received_at = DateTime::from_timestamp(message.date, 0).unwrap_or_else(Utc::now);
            match self.download_photo(&photo.file_id, received_at).await {
                Ok(path) => {
                    debug!(file_unique_id = %photo.file_unique_id, "Downloaded photo to {path}");
                    images.push(PostedImage {
                        source_id: SourceId::new(photo.file_unique_id.clone()),
                        uri: path,
                        received_at,
                    });
                }
                Err(e) => {
                    // Skipped update stays consumed; the next repost of
                    // the image gets a fresh update.
                    warn!(file_id = %photo.file_id, "Failed to download photo: {e}");
                }
            }
        }

        Ok(images)
    }

    async fn download_photo(
        &self,
        file_id: &str,
        received_at: DateTime<Utc>,
    ) -> ConnectResult<String> {
        let file: FileResponse = self
            .client
            .get(self.method_url("getFile"))
            .query(&[("file_id", file_id)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let file_path = file
            .result
            .as_ref()
            .and_then(|f| f.file_path.as_deref())
            .filter(|_| file.ok)
            .ok_or_else(|| ConnectError::api(200, "getFile returned no file_path"))?;

        let bytes = self
            .client
            .get(self.file_url(file_path))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        tokio::fs::create_dir_all(&self.config.images_dir).await?;
        let extension = std::path::Path::new(file_path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg");
        let filename = format!("{}_{}.{}", received_at.format("%Y%m%d_%H%M%S"), file_id, extension);
        let target = self.config.images_dir.join(filename);
        tokio::fs::write(&target, &bytes).await?;

        Ok(target.to_string_lossy().into_owned())
    }

    /// Poll until shutdown, submitting every image to the intake.
    pub async fn run(&self, intake: EventIntake, mut shutdown: watch::Receiver<bool>) {
        info!("Starting Telegram poller");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Telegram poller stopping");
                        break;
                    }
                }
                result = self.poll_once() => {
                    match result {
                        Ok(images) => {
                            for image in images {
                                intake
                                    .submit(image.source_id, image.uri, image.received_at)
                                    .await;
                            }
                        }
                        Err(e) => {
                            warn!("Telegram poll failed, backing off: {e}");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }
    }
}

/// Sends status messages to the configured chat. Best effort: a
/// failed notification is logged and dropped.
pub struct TelegramNotifier {
    client: Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) {
        let url = format!("{}/bot{}/sendMessage", TELEGRAM_API, self.config.token);
        let result = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.config.chat_id,
                "text": message,
            }))
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match result {
            Ok(_) => debug!("Sent Telegram notification"),
            Err(e) => warn!("Failed to send Telegram notification: {e}"),
        }
    }
}
