//! End-to-end scenarios over an in-memory transport, scripted as a
//! synchronous peer sitting where the real browser extension would be.
//! Exercises the Multiplexer against the request/response contract
//! directly, which is the part of the bridge actually worth driving
//! end-to-end without a real kernel mount.

use std::sync::Arc;
use std::thread;

use browserfs_bridge::multiplexer::Multiplexer;
use browserfs_bridge::transport::TransportSender;
use browserfs_bridge::wire::Request;
use browserfs_bridge::wire::Response;

/// A transport whose `send` immediately hands the request to a scripted
/// responder closure and queues the reply for delivery, standing in for
/// the Reader thread without needing a real socket.
struct ScriptedTransport<F: Fn(&Request) -> Option<Response> + Send + Sync> {
    respond: F,
    multiplexer: std::sync::Mutex<Option<Arc<Multiplexer>>>,
}

impl<F: Fn(&Request) -> Option<Response> + Send + Sync> TransportSender for ScriptedTransport<F> {
    fn send(&self, request: &Request) -> Result<(), browserfs_bridge::error::BridgeError> {
        if let Some(response) = (self.respond)(request) {
            if let Some(mux) = self.multiplexer.lock().unwrap().as_ref() {
                let mux = Arc::clone(mux);
                let response = response;
                thread::spawn(move || mux.deliver(response));
            }
        }
        Ok(())
    }

    fn max_frame_bytes(&self) -> usize {
        1024 * 1024
    }
}

fn scripted<F: Fn(&Request) -> Option<Response> + Send + Sync + 'static>(respond: F) -> Arc<Multiplexer> {
    let transport = Arc::new(ScriptedTransport {
        respond,
        multiplexer: std::sync::Mutex::new(None),
    });
    let mux = Arc::new(Multiplexer::new(transport.clone() as Arc<dyn TransportSender>));
    *transport.multiplexer.lock().unwrap() = Some(Arc::clone(&mux));
    mux
}

// S1: a getattr round-trip returns the stat fields the peer supplied.
#[test]
fn s1_getattr_round_trip() {
    let mux = scripted(|req| {
        assert_eq!(req.op, "getattr");
        assert_eq!(req.path, "/tabs/1/url.txt");
        Some(Response {
            id: req.id,
            error: 0,
            st_mode: Some(0o100644),
            st_nlink: Some(1),
            st_size: Some(42),
            ..Default::default()
        })
    });

    let response = mux
        .call(Request::bare("getattr", "/tabs/1/url.txt"))
        .unwrap();
    assert_eq!(response.st_size, Some(42));
}

// S2: concurrent callers each get their own response, never the other's.
#[test]
fn s2_concurrent_calls_do_not_cross_wires() {
    let mux = scripted(|req| {
        Some(Response {
            id: req.id,
            error: 0,
            st_size: Some(req.path.len() as u64),
            ..Default::default()
        })
    });

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let mux = Arc::clone(&mux);
            thread::spawn(move || {
                let path = format!("/tabs/{i}/title.txt");
                let resp = mux.call(Request::bare("getattr", path.clone())).unwrap();
                assert_eq!(resp.st_size, Some(path.len() as u64));
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
}

// S3: a read response carrying base64Encoded decodes to the original bytes.
#[test]
fn s3_base64_read_round_trip() {
    use base64::Engine;
    let payload = b"hello from the peer";
    let encoded = base64::engine::general_purpose::STANDARD.encode(payload);

    let mux = scripted(move |req| {
        assert_eq!(req.op, "read");
        Some(Response {
            id: req.id,
            error: 0,
            buf: Some(encoded.clone()),
            base64_encoded: true,
            ..Default::default()
        })
    });

    let resp = mux
        .call(
            Request::bare("read", "/tabs/1/dom.html")
                .with_size(64)
                .with_offset(0)
                .with_fh(7),
        )
        .unwrap();

    assert_eq!(resp.decode_buf().unwrap(), payload);
}

// S4: write returns an accepted count possibly smaller than requested.
#[test]
fn s4_write_partial_accept() {
    let mux = scripted(|req| {
        assert_eq!(req.op, "write");
        Some(Response {
            id: req.id,
            error: 0,
            size: Some(3),
            ..Default::default()
        })
    });

    let resp = mux
        .call(Request::bare("write", "/tabs/1/input.txt").with_buf(b"abcdef"))
        .unwrap();
    assert_eq!(resp.size, Some(3));
}

// S5: an error response surfaces with its raw errno intact.
#[test]
fn s5_error_response() {
    let mux = scripted(|req| {
        Some(Response {
            id: req.id,
            error: 2, // ENOENT
            ..Default::default()
        })
    });

    let resp = mux.call(Request::bare("open", "/nope").with_flags(0)).unwrap();
    assert!(resp.is_error());
    assert_eq!(resp.error, 2);
}

// S6: once the transport fails, outstanding and future calls see it.
#[test]
fn s6_disconnect_fails_outstanding_and_future_calls() {
    let mux = scripted(|_req| None); // peer never responds

    let mux_for_waiter = Arc::clone(&mux);
    let waiter = thread::spawn(move || mux_for_waiter.call(Request::bare("getattr", "/x")));

    // Give the call a moment to register before failing it out from under it.
    thread::sleep(std::time::Duration::from_millis(20));
    mux.fail_all();

    assert!(waiter.join().unwrap().is_err());
}
