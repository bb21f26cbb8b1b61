//! Control-plane pipeline tests with a headless render output

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use radio_audio_streamer::audio::{
    stream_pair, BufferPolicy, RebufferReason, RenderOutcome, RenderOutput, StreamConsumer,
};
use radio_audio_streamer::config::ConfigFile;
use radio_audio_streamer::error::{AudioError, Error, PipelineError};
use radio_audio_streamer::pipeline::{self, PipelineEvent, PipelineHandle};

/// Render output that only records whether it is running
struct HeadlessOutput {
    running: Arc<AtomicBool>,
    fail_resume: bool,
}

impl RenderOutput for HeadlessOutput {
    fn resume(&mut self) -> Result<(), AudioError> {
        if self.fail_resume {
            return Err(AudioError::StreamError("device unplugged".to_string()));
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

fn policy(monitor_ms: u64) -> BufferPolicy {
    BufferPolicy {
        capacity: 200,
        reference_window: 100,
        priming_threshold: 50,
        underrun_level: 0.25,
        overrun_level: 1.75,
        monitor_period: Duration::from_millis(monitor_ms),
    }
}

fn launch(
    monitor_ms: u64,
    settings: Option<ConfigFile>,
) -> (PipelineHandle, StreamConsumer, Arc<AtomicBool>, tokio::task::JoinHandle<()>) {
    let (producer, consumer) = stream_pair(policy(monitor_ms), 75, 0).unwrap();
    let running = Arc::new(AtomicBool::new(false));
    let output = HeadlessOutput {
        running: running.clone(),
        fail_resume: false,
    };
    let (handle, task) = pipeline::spawn(producer, Box::new(output), settings);
    (handle, consumer, running, task)
}

async fn wait_for(
    events: &mut broadcast::Receiver<PipelineEvent>,
    matches: impl Fn(&PipelineEvent) -> bool,
) -> PipelineEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn test_lifecycle_and_ingest() {
    let (handle, mut consumer, running, task) = launch(60_000, None);
    let mut events = handle.subscribe();

    // Not running yet: samples are ignored
    handle.on_audio_data(vec![0.5; 60]).unwrap();
    handle.set_mute(false).await.unwrap();
    assert_eq!(handle.status().buffer_level, 0.0);

    handle.start().await.unwrap();
    assert!(running.load(Ordering::SeqCst));
    assert_eq!(wait_for(&mut events, |e| *e == PipelineEvent::Started).await, PipelineEvent::Started);

    handle.on_audio_data(vec![0.5; 60]).unwrap();
    handle.set_mute(false).await.unwrap();
    let status = handle.status();
    assert!(status.running);
    assert!((status.buffer_level - 0.6).abs() < 1e-6);

    let mut out = vec![0.0; 10];
    assert_eq!(consumer.render(&mut out), RenderOutcome::Played);
    assert_eq!(out, vec![0.375; 10]);

    handle.stop().await.unwrap();
    assert!(!running.load(Ordering::SeqCst));
    assert!(!handle.status().running);
    assert_eq!(consumer.render(&mut out), RenderOutcome::Priming);

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test]
async fn test_monitor_rebuffers_when_starved() {
    let (handle, _consumer, _running, task) = launch(20, None);
    let mut events = handle.subscribe();

    handle.start().await.unwrap();

    let event = wait_for(&mut events, |e| matches!(e, PipelineEvent::Rebuffer { .. })).await;
    assert_eq!(
        event,
        PipelineEvent::Rebuffer {
            level: 0.0,
            reason: RebufferReason::Underrun
        }
    );
    assert!(handle.status().rebuffers >= 1);
    assert!(handle.status().last_rebuffer.is_some());

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test]
async fn test_overrun_is_reported() {
    let (handle, _consumer, _running, task) = launch(60_000, None);
    let mut events = handle.subscribe();
    handle.start().await.unwrap();

    handle.on_audio_data(vec![0.1; 150]).unwrap();
    handle.on_audio_data(vec![0.1; 100]).unwrap();

    let event = wait_for(&mut events, |e| matches!(e, PipelineEvent::Overrun { .. })).await;
    assert_eq!(event, PipelineEvent::Overrun { dropped: 100 });
    handle.set_mute(false).await.unwrap();
    assert_eq!(handle.status().overruns, 1);

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test]
async fn test_volume_is_persisted() {
    let dir = std::env::temp_dir().join(format!("ras-pipeline-{}", std::process::id()));
    let path = dir.join("config.toml");
    let settings = ConfigFile::load_or_default(&path).unwrap();

    let (handle, _consumer, _running, task) = launch(60_000, Some(settings));

    assert_eq!(handle.set_volume(130).await.unwrap(), 100);
    assert_eq!(handle.set_volume(30).await.unwrap(), 30);
    handle.set_mute(true).await.unwrap();

    let status = handle.status();
    assert_eq!(status.volume, 30);
    assert!(status.muted);

    let reloaded = ConfigFile::load_or_default(&path).unwrap();
    assert_eq!(reloaded.config.volume.level, 30);

    handle.shutdown().await;
    task.await.unwrap();
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_failed_resume_keeps_pipeline_stopped() {
    let (producer, _consumer) = stream_pair(policy(60_000), 75, 0).unwrap();
    let output = HeadlessOutput {
        running: Arc::new(AtomicBool::new(false)),
        fail_resume: true,
    };
    let (handle, task) = pipeline::spawn(producer, Box::new(output), None);

    let result = handle.start().await;
    assert!(matches!(result, Err(Error::Audio(AudioError::StreamError(_)))));
    assert!(!handle.status().running);

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test]
async fn test_handle_reports_not_ready_after_shutdown() {
    let (handle, _consumer, _running, task) = launch(60_000, None);
    handle.shutdown().await;
    task.await.unwrap();

    assert!(matches!(handle.start().await, Err(Error::Pipeline(PipelineError::NotReady))));
    assert_eq!(handle.on_audio_data(vec![0.0; 4]), Err(PipelineError::NotReady));
}

/// Output whose device takes a while to open
struct SlowOutput;

impl RenderOutput for SlowOutput {
    fn resume(&mut self) -> Result<(), AudioError> {
        std::thread::sleep(Duration::from_millis(400));
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), AudioError> {
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_slow_device_does_not_stall_runtime() {
    let (producer, _consumer) = stream_pair(policy(60_000), 75, 0).unwrap();
    let (handle, task) = pipeline::spawn(producer, Box::new(SlowOutput), None);

    let ticks = Arc::new(AtomicUsize::new(0));
    let ticker = {
        let ticks = ticks.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(5)).await;
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    let before = ticks.load(Ordering::SeqCst);
    handle.start().await.unwrap();
    let during = ticks.load(Ordering::SeqCst) - before;
    assert!(during >= 10, "runtime stalled while opening device ({} ticks)", during);
    assert!(handle.status().running);

    ticker.abort();
    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test]
async fn test_audio_discarded_during_reset_is_counted() {
    let (handle, _consumer, _running, task) = launch(60_000, None);
    handle.start().await.unwrap();

    // No render period runs, so the reset stays outstanding
    handle.reset().await.unwrap();
    handle.on_audio_data(vec![0.1; 30]).unwrap();
    handle.on_audio_data(vec![0.1; 12]).unwrap();
    handle.set_mute(false).await.unwrap();

    let status = handle.status();
    assert_eq!(status.discarded_samples, 42);
    assert_eq!(status.buffer_level, 0.0);

    handle.shutdown().await;
    task.await.unwrap();
}
