//! Example: watch a video wall and print what changes
//!
//! This example demonstrates:
//! - Loading the wall layout and client settings from pmoconfig
//! - Starting the poll loop against the configured backend
//! - Following session events
//! - Projecting a 320x180 thumbnail onto the wall
//!
//! Run with: PMOWALL_CONFIG=/path/to/dir cargo run --example wall_watch

use pmoconfig::get_config;
use pmowall::{DisplayMode, SessionEvent, WallSession};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_config();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.get_log_min_level().to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let session = WallSession::connect(&config)?;
    println!("Wall: {}x{}", session.layout().width(), session.layout().height());

    let mut projector = session.projector();
    let scaled = projector.on_image_resized(320.0, 180.0)?;
    for screen in &scaled.screens {
        println!(
            "  {} at ({:.1}, {:.1}) {:.1}x{:.1}, tile {} / {}",
            screen.tv_id,
            screen.rect.x,
            screen.rect.y,
            screen.rect.width,
            screen.rect.height,
            screen.tile.css_size(),
            screen.tile.css_position()
        );
    }

    let events = session.subscribe();
    session.start();

    let printer = tokio::task::spawn_blocking(move || {
        while let Ok(event) = events.recv() {
            match event {
                SessionEvent::QueueChanged { current, queued } => {
                    match current {
                        Some(entry) => println!("Playing: {} [{}]", entry.title, entry.playlist_video_id),
                        None => println!("Nothing playing"),
                    }
                    for entry in queued {
                        println!("  queued: {} [{}]", entry.title, entry.playlist_video_id);
                    }
                }
                SessionEvent::VolumeChanged { vol_pct } => println!("Volume: {}%", vol_pct),
                SessionEvent::AnimationModeChanged { mode } => println!("Animation: {}", mode.as_str()),
                SessionEvent::ScreensaverChanged { enabled } => println!("Screensaver: {}", enabled),
                SessionEvent::VideoQueued { title, color_mode } => {
                    println!("Queued {} ({})", title, color_mode)
                }
                SessionEvent::ScreensChanged => {}
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    session.shutdown();

    let snapshot = session.snapshot();
    for (tv_id, screen) in snapshot.screens.iter() {
        let mode = screen.display_mode();
        println!(
            "{}: {}{}",
            tv_id,
            mode.as_str(),
            if mode == DisplayMode::Tile { "" } else { " (custom)" }
        );
    }

    // Dropping the session closes the event channel
    drop(session);
    printer.await?;
    Ok(())
}
