//! WebSocket loopback transport. Listens on `127.0.0.1:8888`, accepts
//! exactly one upgrade on path `/` at a time; a new connection replaces
//! whatever was there before. Mirrors the accept/replace behavior of the
//! original host's `ws.c`, but as a background accept thread instead of a
//! hand-rolled `select()` loop, since `tungstenite` already gives us
//! blocking accept + framed read/write.

use std::net::TcpListener;
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use log::info;
use log::warn;
use tungstenite::Message;
use tungstenite::WebSocket;

use crate::error::BridgeError;
use crate::transport::TransportReceiver;
use crate::transport::TransportSender;
use crate::wire::Request;

const ADDR: &str = "127.0.0.1:8888";
pub const MAX_FRAME_BYTES: usize = 131_072;

/// Connection shared between the sending side (many kernel-worker
/// threads) and the accept loop.
struct Shared {
    current: Mutex<Option<WebSocket<TcpStream>>>,
}

pub struct WebsocketSender {
    shared: Arc<Shared>,
}

impl TransportSender for WebsocketSender {
    fn send(&self, request: &Request) -> Result<(), BridgeError> {
        let body = serde_json::to_vec(request)?;
        if body.len() > MAX_FRAME_BYTES {
            return Err(BridgeError::FrameTooLarge(body.len()));
        }

        let mut guard = self.shared.current.lock().unwrap();
        match guard.as_mut() {
            Some(ws) => ws
                .send(Message::Text(String::from_utf8_lossy(&body).into_owned()))
                .map_err(|e| BridgeError::Protocol(e.to_string())),
            None => Err(BridgeError::NotConnected),
        }
    }

    fn max_frame_bytes(&self) -> usize {
        MAX_FRAME_BYTES
    }
}

pub struct WebsocketReceiver {
    shared: Arc<Shared>,
}

impl TransportReceiver for WebsocketReceiver {
    fn receive(&mut self) -> Result<Vec<u8>, BridgeError> {
        loop {
            let mut guard = self.shared.current.lock().unwrap();
            let Some(ws) = guard.as_mut() else {
                drop(guard);
                thread::sleep(Duration::from_millis(20));
                continue;
            };

            match ws.read() {
                Ok(Message::Text(text)) => return Ok(text.into_bytes()),
                Ok(Message::Binary(bytes)) => return Ok(bytes),
                Ok(Message::Close(_)) => {
                    *guard = None;
                    continue;
                }
                Ok(_) => continue,
                Err(tungstenite::Error::Io(ref e))
                    if e.kind() == std::io::ErrorKind::WouldBlock =>
                {
                    drop(guard);
                    thread::sleep(Duration::from_millis(20));
                    continue;
                }
                Err(e) => {
                    warn!("websocket peer disconnected: {e}");
                    *guard = None;
                    return Err(BridgeError::ConnectionClosed);
                }
            }
        }
    }
}

fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    for stream in listener.incoming() {
        let Ok(stream) = stream else { continue };
        let _ = stream.set_read_timeout(Some(Duration::from_millis(50)));
        match tungstenite::accept(stream) {
            Ok(ws) => {
                info!("WebSocket peer connected, replacing any prior connection");
                *shared.current.lock().unwrap() = Some(ws);
            }
            Err(e) => warn!("WebSocket handshake failed: {e}"),
        }
    }
}

/// Binds the loopback listener and spawns the accept thread. Until a peer
/// connects, every `send` returns [`BridgeError::NotConnected`], which the
/// FS adapter maps to `-EIO`.
pub fn new() -> std::io::Result<(WebsocketSender, WebsocketReceiver)> {
    let listener = TcpListener::bind(ADDR)?;
    let shared = Arc::new(Shared {
        current: Mutex::new(None),
    });

    let accept_shared = Arc::clone(&shared);
    thread::Builder::new()
        .name("ws-accept".to_string())
        .spawn(move || accept_loop(listener, accept_shared))?;

    Ok((
        WebsocketSender {
            shared: Arc::clone(&shared),
        },
        WebsocketReceiver { shared },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_without_a_connection_reports_not_connected() {
        let shared = Arc::new(Shared {
            current: Mutex::new(None),
        });
        let sender = WebsocketSender { shared };
        let err = sender
            .send(&Request::bare("getattr", "/x"))
            .unwrap_err();
        assert!(matches!(err, BridgeError::NotConnected));
    }

    #[test]
    fn max_frame_bytes_matches_the_websocket_limit() {
        assert_eq!(MAX_FRAME_BYTES, 131_072);
    }
}
