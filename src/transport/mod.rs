//! Shared abstraction over the two wire transports. The Multiplexer and
//! Reader only ever see these traits; neither knows whether the peer is
//! reached over a pipe or a loopback WebSocket.
//!
//! Send and receive are split into separate traits because they are used
//! by different threads under different locking disciplines: many
//! kernel-worker threads call `send` concurrently (serialized by the
//! transport's own outbound lock), while only the dedicated Reader thread
//! ever calls `receive`, so it needs no lock at all.

pub mod pipe;
pub mod websocket;

use crate::error::BridgeError;
use crate::wire::Request;

pub trait TransportSender: Send + Sync {
    /// Serializes and sends `request`, failing with
    /// [`BridgeError::FrameTooLarge`] before anything is written if the
    /// encoded request exceeds `max_frame_bytes`. Oversize requests surface
    /// locally as `EMSGSIZE`, never partially sent.
    fn send(&self, request: &Request) -> Result<(), BridgeError>;

    fn max_frame_bytes(&self) -> usize;
}

pub trait TransportReceiver: Send {
    /// Blocks until one full response frame is available and returns its
    /// raw JSON bytes, or an error on EOF/unrecoverable desync.
    fn receive(&mut self) -> Result<Vec<u8>, BridgeError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// An in-memory transport for exercising the Multiplexer/Reader
    /// without a real pipe or socket.
    pub struct LoopbackSender {
        pub sent: Mutex<Vec<Vec<u8>>>,
    }

    impl LoopbackSender {
        pub fn new() -> Self {
            LoopbackSender {
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    impl TransportSender for LoopbackSender {
        fn send(&self, request: &Request) -> Result<(), BridgeError> {
            let bytes = serde_json::to_vec(request)?;
            if bytes.len() > self.max_frame_bytes() {
                return Err(BridgeError::FrameTooLarge(bytes.len()));
            }
            self.sent.lock().unwrap().push(bytes);
            Ok(())
        }

        fn max_frame_bytes(&self) -> usize {
            1024 * 1024
        }
    }

    pub struct LoopbackReceiver {
        pub inbox: VecDeque<Vec<u8>>,
    }

    impl LoopbackReceiver {
        pub fn new() -> Self {
            LoopbackReceiver {
                inbox: VecDeque::new(),
            }
        }
    }

    impl TransportReceiver for LoopbackReceiver {
        fn receive(&mut self) -> Result<Vec<u8>, BridgeError> {
            self.inbox.pop_front().ok_or(BridgeError::ConnectionClosed)
        }
    }
}
