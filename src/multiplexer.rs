//! Correlates outstanding requests to their eventual responses.
//!
//! Correlation ids come from a single process-wide monotonic counter.
//! `fuser`'s worker pool runs one kernel callback to completion per
//! thread, so no thread is ever waiting on two bridge calls at once —
//! a plain counter is enough to keep ids unique without per-thread
//! bookkeeping. Each call gets its own single-shot channel; the Reader
//! thread never blocks delivering into it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::mpsc;

use log::warn;

use crate::error::BridgeError;
use crate::transport::TransportSender;
use crate::wire::Request;
use crate::wire::Response;

/// What a waiter receives: either the peer's parsed response, or notice
/// that the transport died before one arrived.
pub enum Delivery {
    Response(Response),
    Failed,
}

type Waiter = mpsc::SyncSender<Delivery>;

struct Table {
    waiters: HashMap<u64, Waiter>,
}

pub struct Multiplexer {
    sender: Arc<dyn TransportSender>,
    table: Mutex<Table>,
    next_id: AtomicU64,
}

impl Multiplexer {
    pub fn new(sender: Arc<dyn TransportSender>) -> Self {
        Multiplexer {
            sender,
            table: Mutex::new(Table {
                waiters: HashMap::new(),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Submits `request`, blocking the calling (kernel worker) thread until
    /// a response arrives or the transport fails. Never holds the request
    /// table lock across the blocking receive.
    pub fn call(&self, mut request: Request) -> Result<Response, BridgeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        request.id = id;

        let (tx, rx) = mpsc::sync_channel(1);
        {
            let mut table = self.table.lock().unwrap();
            table.waiters.insert(id, tx);
        }

        if let Err(err) = self.sender.send(&request) {
            self.table.lock().unwrap().waiters.remove(&id);
            return Err(err);
        }

        match rx.recv() {
            Ok(Delivery::Response(response)) => Ok(response),
            Ok(Delivery::Failed) | Err(_) => Err(BridgeError::ConnectionClosed),
        }
    }

    /// Called by the Reader thread for every parsed response. Delivery is
    /// exactly-once and non-blocking: an unknown id (response for a call
    /// that already gave up, or a duplicate) is logged and dropped.
    pub fn deliver(&self, response: Response) {
        let waiter = self.table.lock().unwrap().waiters.remove(&response.id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(Delivery::Response(response));
            }
            None => warn!("response for unknown request id {}", response.id),
        }
    }

    /// Wakes every outstanding waiter with a transport-level failure and
    /// empties the table, so a dead transport never leaves a call blocked
    /// forever.
    pub fn fail_all(&self) {
        let mut table = self.table.lock().unwrap();
        for (_, tx) in table.waiters.drain() {
            let _ = tx.send(Delivery::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::tests::LoopbackSender;

    fn mux() -> Multiplexer {
        Multiplexer::new(Arc::new(LoopbackSender::new()))
    }

    #[test]
    fn deliver_wakes_the_matching_waiter_only() {
        let mux = mux();
        let (tx_a, rx_a) = mpsc::sync_channel(1);
        let (tx_b, rx_b) = mpsc::sync_channel(1);
        mux.table.lock().unwrap().waiters.insert(1, tx_a);
        mux.table.lock().unwrap().waiters.insert(2, tx_b);

        let mut resp = Response::default();
        resp.id = 2;
        mux.deliver(resp);

        assert!(rx_b.try_recv().is_ok());
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn fail_all_empties_the_table() {
        let mux = mux();
        let (tx, rx) = mpsc::sync_channel(1);
        mux.table.lock().unwrap().waiters.insert(7, tx);

        mux.fail_all();

        assert!(matches!(rx.try_recv(), Ok(Delivery::Failed)));
        assert!(mux.table.lock().unwrap().waiters.is_empty());
    }
}
