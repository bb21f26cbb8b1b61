//! Audio Player Application
//!
//! Receives a PCM stream over UDP or WebSocket and plays it on an output device.

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use radio_audio_streamer::{
    audio::device::list_output_devices,
    config::ConfigFile,
    network::AudioReceiver,
    pipeline::{self, PipelineEvent},
    ui::WebServer,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting radio audio player");

    // Config path from args, or the platform default
    let config_path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => ConfigFile::default_path()?,
    };
    let settings = ConfigFile::load_or_default(&config_path)?;
    let config = settings.config.clone();

    println!("\n=== Available Output Devices ===");
    for device in list_output_devices() {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}{}:", device.name, default_marker);
        println!("    ID: {}", device.id);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();

    // Without a working output the rest of the app still runs
    let pipeline = match pipeline::launch(settings) {
        Ok((handle, _task)) => Some(handle),
        Err(e) => {
            tracing::error!("Audio pipeline unavailable: {}", e);
            None
        }
    };

    if let Some(pipeline) = &pipeline {
        let mut events = pipeline.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match event {
                    PipelineEvent::BufferLevel { level } => {
                        tracing::debug!("Buffer level {:.2}", level)
                    }
                    PipelineEvent::Rebuffer { level, reason } => {
                        tracing::info!("Rebuffered at level {:.2} ({:?})", level, reason)
                    }
                    _ => {}
                }
            }
        });

        // A device that will not resume leaves the pipeline stopped; the
        // control API can start it later
        if let Err(e) = pipeline.start().await {
            tracing::error!("Failed to start playback: {}", e);
        }
    }

    let receiver = if config.network.enabled {
        let receiver = AudioReceiver::bind(&config.network)?;
        tracing::info!("Listening for audio on udp://{}", receiver.local_addr()?);
        let _receive_task = receiver.spawn(pipeline.clone());
        Some(receiver)
    } else {
        None
    };

    let (ui_addr, _web_handle) = WebServer::new(config.ui.clone(), pipeline.clone())
        .start_background()
        .await?;
    tracing::info!("Control API available at http://{}", ui_addr);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    if let Some(receiver) = &receiver {
        let stats = receiver.stats();
        tracing::info!(
            "Receiver stats: {} packets, {} bytes, {} invalid",
            stats.packets_received,
            stats.bytes_received,
            stats.invalid_packets
        );
    }

    if let Some(pipeline) = pipeline {
        let status = pipeline.status();
        tracing::info!(
            "Pipeline stats: {} underruns, {} overruns, {} rebuffers",
            status.underruns,
            status.overruns,
            status.rebuffers
        );
        if let Err(e) = pipeline.stop().await {
            tracing::warn!("Failed to stop playback: {}", e);
        }
        pipeline.shutdown().await;
    }

    Ok(())
}
