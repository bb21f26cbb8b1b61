//! UDP audio receiver
//!
//! Every datagram is one binary audio frame (little-endian `f32` samples).
//! Frames are decoded and handed to the pipeline as they arrive; no chunk
//! size is assumed.

use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::config::NetworkConfig;
use crate::constants::MAX_DATAGRAM_SIZE;
use crate::error::NetworkError;
use crate::pipeline::PipelineHandle;
use crate::protocol::decode_audio_frame;

/// Receiver statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub packets_received: u64,
    pub bytes_received: u64,
    pub invalid_packets: u64,
}

#[derive(Debug, Default)]
struct Counters {
    packets: AtomicU64,
    bytes: AtomicU64,
    invalid: AtomicU64,
}

/// Receives audio datagrams and feeds them to the pipeline
pub struct AudioReceiver {
    socket: Arc<UdpSocket>,
    counters: Arc<Counters>,
}

impl AudioReceiver {
    /// Bind the receive socket described by `config`
    pub fn bind(config: &NetworkConfig) -> Result<Self, NetworkError> {
        let addr: SocketAddr = format!("{}:{}", config.bind_address, config.udp_port)
            .parse()
            .map_err(|_| {
                NetworkError::InvalidAddress(format!("{}:{}", config.bind_address, config.udp_port))
            })?;

        let socket = create_socket(addr, config.recv_buffer_size)?;
        let socket = UdpSocket::from_std(socket.into())
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

        Ok(Self {
            socket: Arc::new(socket),
            counters: Arc::new(Counters::default()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        self.socket
            .local_addr()
            .map_err(|e| NetworkError::BindFailed(e.to_string()))
    }

    pub fn stats(&self) -> ReceiverStats {
        ReceiverStats {
            packets_received: self.counters.packets.load(Ordering::Relaxed),
            bytes_received: self.counters.bytes.load(Ordering::Relaxed),
            invalid_packets: self.counters.invalid.load(Ordering::Relaxed),
        }
    }

    /// Receive until the socket fails or the pipeline goes away.
    /// Without a pipeline frames are still decoded and counted, then dropped.
    pub fn spawn(&self, pipeline: Option<PipelineHandle>) -> JoinHandle<Result<(), NetworkError>> {
        let socket = self.socket.clone();
        let counters = self.counters.clone();

        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            loop {
                let (len, peer) = socket
                    .recv_from(&mut buf)
                    .await
                    .map_err(|e| NetworkError::ReceiveFailed(e.to_string()))?;

                counters.packets.fetch_add(1, Ordering::Relaxed);
                counters.bytes.fetch_add(len as u64, Ordering::Relaxed);

                let samples = match decode_audio_frame(&buf[..len]) {
                    Ok(samples) => samples,
                    Err(e) => {
                        counters.invalid.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!("Invalid datagram from {}: {}", peer, e);
                        continue;
                    }
                };

                if let Some(pipeline) = &pipeline {
                    if pipeline.on_audio_data(samples).is_err() {
                        tracing::info!("Pipeline closed, stopping receiver");
                        return Ok(());
                    }
                }
            }
        })
    }
}

/// Create a non-blocking UDP socket with a large receive buffer
pub fn create_socket(addr: SocketAddr, recv_buffer_size: usize) -> Result<Socket, NetworkError> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    if let Err(e) = socket.set_recv_buffer_size(recv_buffer_size) {
        tracing::warn!("Could not set receive buffer to {} bytes: {}", recv_buffer_size, e);
    }

    socket
        .set_nonblocking(true)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
    socket
        .bind(&addr.into())
        .map_err(|e| NetworkError::BindFailed(format!("{}: {}", addr, e)))?;

    Ok(socket)
}
