//! Concrete collaborators for the shortcast engine.
//!
//! Telegram supplies the image events and receives status messages,
//! FFmpeg renders the overlay videos, YouTube hosts the result. Each
//! client implements the matching engine trait and keeps its protocol
//! details out of the core.

mod error;
mod ffmpeg;
mod telegram;
mod youtube;

pub use error::{ConnectError, ConnectResult};
pub use ffmpeg::{CompositorConfig, OverlayCompositor};
pub use telegram::{PostedImage, TelegramConfig, TelegramNotifier, TelegramSource};
pub use youtube::{YouTubeConfig, YouTubePublisher};
