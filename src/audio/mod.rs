//! Audio subsystem module

pub mod buffer;
pub mod consumer;
pub mod control;
pub mod device;
pub mod gain;
pub mod playback;
pub mod producer;

use std::sync::Arc;

pub use buffer::{ring_buffer, RingBuffer, RingReader, RingWriter};
pub use consumer::{ConsumerState, RenderOutcome, StreamConsumer};
pub use control::StreamControl;
pub use device::{find_output_device, list_output_devices, OutputDeviceInfo};
pub use gain::VolumeControl;
pub use playback::{AudioPlayback, PlaybackConfig, RenderOutput};
pub use producer::{BufferPolicy, IngestOutcome, MonitorReport, RebufferReason, StreamProducer};

use crate::error::AudioError;

/// Allocate the shared buffer and build both ends of a stream.
///
/// This is the one fatal path of the audio pipeline: if the buffer cannot be
/// allocated nothing is built and the caller carries on without audio.
pub fn stream_pair(
    policy: BufferPolicy,
    volume: u8,
    ramp_samples: u32,
) -> Result<(StreamProducer, StreamConsumer), AudioError> {
    let (writer, reader) = ring_buffer(policy.capacity)?;

    let volume = VolumeControl::new(volume);
    let control = Arc::new(StreamControl::new(volume.effective_gain()));

    let consumer = StreamConsumer::new(reader, control.clone(), policy.priming_threshold, ramp_samples);
    let producer = StreamProducer::new(writer, control, policy, volume);

    Ok((producer, consumer))
}
