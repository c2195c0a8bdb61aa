//! Native-messaging transport: a 32-bit little-endian length prefix
//! followed by exactly that many bytes of JSON, over stdin/stdout.
//! Framing mirrors `send_request`/`await_response` in the original
//! host's `tabfs.c`.

use std::io::Read;
use std::io::Write;
use std::io::{self};
use std::sync::Mutex;

use crate::error::BridgeError;
use crate::transport::TransportReceiver;
use crate::transport::TransportSender;
use crate::wire::Request;

const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

pub struct PipeSender {
    stdout: Mutex<io::Stdout>,
}

impl PipeSender {
    pub fn new() -> Self {
        PipeSender {
            stdout: Mutex::new(io::stdout()),
        }
    }
}

impl TransportSender for PipeSender {
    fn send(&self, request: &Request) -> Result<(), BridgeError> {
        let body = serde_json::to_vec(request)?;
        if body.len() > MAX_MESSAGE_BYTES {
            return Err(BridgeError::FrameTooLarge(body.len()));
        }
        let len = (body.len() as u32).to_le_bytes();

        let mut stdout = self.stdout.lock().unwrap();
        stdout.write_all(&len)?;
        stdout.write_all(&body)?;
        stdout.flush()?;
        Ok(())
    }

    fn max_frame_bytes(&self) -> usize {
        MAX_MESSAGE_BYTES
    }
}

pub struct PipeReceiver {
    stdin: io::Stdin,
}

impl PipeReceiver {
    pub fn new() -> Self {
        PipeReceiver { stdin: io::stdin() }
    }
}

impl TransportReceiver for PipeReceiver {
    fn receive(&mut self) -> Result<Vec<u8>, BridgeError> {
        let mut len_bytes = [0u8; 4];
        self.stdin.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;

        if len > MAX_MESSAGE_BYTES {
            return Err(BridgeError::Protocol(format!(
                "peer announced a {len}-byte message, exceeding the {MAX_MESSAGE_BYTES}-byte limit"
            )));
        }

        let mut body = vec![0u8; len];
        self.stdin.read_exact(&mut body)?;
        Ok(body)
    }
}

pub fn new() -> (PipeSender, PipeReceiver) {
    (PipeSender::new(), PipeReceiver::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_message_bytes_matches_the_native_messaging_limit() {
        assert_eq!(MAX_MESSAGE_BYTES, 1024 * 1024);
    }
}
