//! Network subsystem for UDP audio transport

pub mod receiver;

pub use receiver::{create_socket, AudioReceiver, ReceiverStats};
