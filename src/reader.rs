//! The single dedicated thread that drains the transport and hands
//! parsed responses to the Multiplexer. Never blocks on a waiter:
//! `Multiplexer::deliver` only ever does a non-blocking `try_send`-sized
//! single-shot send into a channel with capacity 1 that nothing else
//! writes to.

use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

use log::error;
use log::warn;

use crate::multiplexer::Multiplexer;
use crate::transport::TransportReceiver;
use crate::wire::Response;

pub fn spawn(mut receiver: Box<dyn TransportReceiver>, multiplexer: Arc<Multiplexer>) -> JoinHandle<()> {
    thread::Builder::new()
        .name("bridge-reader".to_string())
        .spawn(move || run(receiver.as_mut(), &multiplexer))
        .expect("failed to spawn reader thread")
}

fn run(receiver: &mut dyn TransportReceiver, multiplexer: &Multiplexer) {
    loop {
        let bytes = match receiver.receive() {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("transport reader exiting: {err}");
                multiplexer.fail_all();
                return;
            }
        };

        match serde_json::from_slice::<Response>(&bytes) {
            Ok(response) => multiplexer.deliver(response),
            Err(err) => {
                warn!("malformed response from peer, dropping: {err}");
            }
        }
    }
}
