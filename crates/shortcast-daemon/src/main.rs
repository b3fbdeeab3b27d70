//! Shortcast daemon binary.
//!
//! Wires the Telegram poller, the FFmpeg compositor and the YouTube
//! publisher into the scheduling engine and runs until SIGINT.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shortcast_connect::{
    CompositorConfig, OverlayCompositor, TelegramConfig, TelegramNotifier, TelegramSource,
    YouTubeConfig, YouTubePublisher,
};
use shortcast_engine::{
    shared_buffer, BatchAssembler, BatchPolicy, Compositor, EngineConfig, EventIntake, Notifier,
    PipelineRunner, PublishDefaults, Publisher, Scheduler, TitlePicker,
};
use shortcast_models::StyleConfig;
use shortcast_store::JobStore;

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("shortcast_store=info".parse().unwrap())
        .add_directive("shortcast_engine=info".parse().unwrap())
        .add_directive("shortcast_connect=info".parse().unwrap())
        .add_directive("shortcast_daemon=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting shortcastd");

    let config = EngineConfig::from_env();
    info!("Engine config: {:?}", config);

    let store = match JobStore::open(&config.data_dir).await {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to open job store: {}", e);
            std::process::exit(1);
        }
    };

    let telegram_config = match TelegramConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Telegram configuration invalid: {}", e);
            std::process::exit(1);
        }
    };

    let youtube_config = match YouTubeConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("YouTube configuration invalid: {}", e);
            std::process::exit(1);
        }
    };

    let buffer = shared_buffer();
    let intake = EventIntake::new(Arc::clone(&buffer), Arc::clone(&store));
    let assembler = BatchAssembler::new(
        Arc::clone(&buffer),
        Arc::clone(&store),
        BatchPolicy {
            min_images: config.min_images_per_batch,
            max_wait: config.max_batch_wait,
        },
    );

    let compositor = Arc::new(OverlayCompositor::new(CompositorConfig::from_env()));
    let publisher = Arc::new(YouTubePublisher::new(youtube_config));
    let notifier = Arc::new(TelegramNotifier::new(telegram_config.clone()));

    let titles = TitlePicker::new(
        std::env::var("SHORTCAST_TITLES_FILE").ok().map(PathBuf::from),
        hashtags_from_env(),
    );
    let publish_defaults = PublishDefaults {
        description: std::env::var("SHORTCAST_VIDEO_DESCRIPTION").unwrap_or_default(),
        tags: list_from_env("SHORTCAST_VIDEO_TAGS"),
    };

    let runner = Arc::new(
        PipelineRunner::new(
            Arc::clone(&store),
            compositor as Arc<dyn Compositor>,
            publisher as Arc<dyn Publisher>,
            config.clone(),
        )
        .with_notifier(notifier as Arc<dyn Notifier>)
        .with_titles(titles)
        .with_style(StyleConfig::default())
        .with_publish_defaults(publish_defaults),
    );

    let scheduler = Scheduler::new(Arc::clone(&store), assembler, runner, config);

    // Telegram poller gets its own shutdown channel; the scheduler
    // manages one internally.
    let (poller_shutdown, poller_shutdown_rx) = watch::channel(false);
    let source = Arc::new(TelegramSource::new(telegram_config));
    let poller = {
        let source = Arc::clone(&source);
        tokio::spawn(async move {
            source.run(intake, poller_shutdown_rx).await;
        })
    };

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        let _ = poller_shutdown.send(true);
    });

    let scheduler = Arc::new(scheduler);
    let loop_handle = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            scheduler.run().await;
        })
    };

    // The poller exits once the signal handler flips its channel; the
    // scheduler then drains in-flight stages.
    poller.await.ok();
    scheduler.shutdown();
    loop_handle.await.ok();

    info!("Daemon shutdown complete");
}

fn hashtags_from_env() -> Vec<String> {
    match std::env::var("SHORTCAST_HASHTAGS") {
        Ok(raw) => raw.split_whitespace().map(str::to_string).collect(),
        Err(_) => vec![
            "#shorts".to_string(),
            "#memes".to_string(),
            "#funny".to_string(),
        ],
    }
}

fn list_from_env(name: &str) -> Vec<String> {
    std::env::var(name)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
