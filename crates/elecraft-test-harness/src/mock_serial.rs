//! Mock transport for deterministic testing of the rig controller.
//!
//! [`MockTransport`] implements the [`Transport`] trait against in-memory
//! channels. Its [`MockHandle`] stays with the test: it injects inbound
//! bytes, observes writes, and simulates link failures. Request/response
//! pairs can be pre-loaded with [`MockHandle::expect`]; a matching write
//! queues the response for the next `receive()`.
//!
//! # Example
//!
//! ```
//! use elecraft_test_harness::MockTransport;
//!
//! let (transport, handle) = MockTransport::new();
//! handle.expect(b"FA;", b"FA00014074000;");
//! assert_eq!(handle.remaining_expectations(), 1);
//! # drop(transport);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use elecraft_core::error::{Error, Result};
use elecraft_core::transport::Transport;
use tokio::sync::mpsc;

/// Something delivered to the transport's receive side.
#[derive(Debug)]
enum Inbound {
    Data(Vec<u8>),
    Error(Error),
    Eof,
}

/// A pre-loaded request/response pair.
#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    response: Vec<u8>,
}

/// Callback that answers a write with optional inbound bytes.
pub type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

struct Shared {
    connected: bool,
    sent_log: Vec<Vec<u8>>,
    expectations: VecDeque<Expectation>,
    responder: Option<Responder>,
    send_error: Option<Error>,
    close_count: usize,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    // A panicking test thread must not hide the state from the others.
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A mock [`Transport`] backed by in-memory channels.
pub struct MockTransport {
    shared: Arc<Mutex<Shared>>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    written_tx: mpsc::UnboundedSender<Vec<u8>>,
    /// Bytes from an inbound chunk larger than the caller's buffer.
    leftover: Vec<u8>,
}

/// Test-side control of a [`MockTransport`].
pub struct MockHandle {
    shared: Arc<Mutex<Shared>>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    written_rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl MockTransport {
    /// Create a connected mock transport and its handle.
    pub fn new() -> (MockTransport, MockHandle) {
        let shared = Arc::new(Mutex::new(Shared {
            connected: true,
            sent_log: Vec::new(),
            expectations: VecDeque::new(),
            responder: None,
            send_error: None,
            close_count: 0,
        }));
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (written_tx, written_rx) = mpsc::unbounded_channel();

        let transport = MockTransport {
            shared: Arc::clone(&shared),
            inbound_tx: inbound_tx.clone(),
            inbound_rx,
            written_tx,
            leftover: Vec::new(),
        };
        let handle = MockHandle {
            shared,
            inbound_tx,
            written_rx,
        };
        (transport, handle)
    }

    fn fill(&mut self, buf: &mut [u8], data: Vec<u8>) -> usize {
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        if n < data.len() {
            self.leftover = data[n..].to_vec();
        }
        n
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let response = {
            let mut shared = lock(&self.shared);
            if !shared.connected {
                return Err(Error::NotConnected);
            }
            if let Some(e) = shared.send_error.take() {
                return Err(e);
            }
            shared.sent_log.push(data.to_vec());

            let matches_next = shared
                .expectations
                .front()
                .is_some_and(|exp| exp.request == data);
            if matches_next {
                shared.expectations.pop_front().map(|exp| exp.response)
            } else {
                shared.responder.as_mut().and_then(|respond| respond(data))
            }
        };

        let _ = self.written_tx.send(data.to_vec());
        if let Some(response) = response.filter(|r| !r.is_empty()) {
            let _ = self.inbound_tx.send(Inbound::Data(response));
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !lock(&self.shared).connected {
            return Err(Error::NotConnected);
        }

        if !self.leftover.is_empty() {
            let data = std::mem::take(&mut self.leftover);
            return Ok(self.fill(buf, data));
        }

        match tokio::time::timeout(timeout, self.inbound_rx.recv()).await {
            Ok(Some(Inbound::Data(data))) => Ok(self.fill(buf, data)),
            Ok(Some(Inbound::Error(e))) => Err(e),
            Ok(Some(Inbound::Eof)) | Ok(None) => Ok(0),
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        let mut shared = lock(&self.shared);
        shared.connected = false;
        shared.close_count += 1;
        self.leftover.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.shared).connected
    }
}

impl MockHandle {
    /// Deliver bytes to the transport's receive side, as if sent by the rig.
    pub fn push_inbound(&self, data: &[u8]) {
        let _ = self.inbound_tx.send(Inbound::Data(data.to_vec()));
    }

    /// Make the next `receive()` fail with `error`.
    pub fn push_error(&self, error: Error) {
        let _ = self.inbound_tx.send(Inbound::Error(error));
    }

    /// Simulate the device closing: the next `receive()` returns `Ok(0)`.
    pub fn close_remote(&self) {
        let _ = self.inbound_tx.send(Inbound::Eof);
    }

    /// Make the next `send()` fail with `error`.
    pub fn fail_next_send(&self, error: Error) {
        lock(&self.shared).send_error = Some(error);
    }

    /// Add an expected request/response pair.
    ///
    /// When `send()` is called with exactly `request`, `response` is queued
    /// for the next `receive()`. Pairs are consumed in order.
    pub fn expect(&self, request: &[u8], response: &[u8]) {
        lock(&self.shared).expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Number of expectations not yet consumed.
    pub fn remaining_expectations(&self) -> usize {
        lock(&self.shared).expectations.len()
    }

    /// Answer writes that match no expectation with `responder`.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        lock(&self.shared).responder = Some(Box::new(responder));
    }

    /// Every write so far, one element per `send()` call.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        lock(&self.shared).sent_log.clone()
    }

    /// Number of `send()` calls so far.
    pub fn sent_count(&self) -> usize {
        lock(&self.shared).sent_log.len()
    }

    /// Wait for the next write not yet returned by this method.
    ///
    /// Returns `None` once the transport has been dropped and every write
    /// has been observed.
    pub async fn next_write(&mut self) -> Option<Vec<u8>> {
        self.written_rx.recv().await
    }

    /// A write already made but not yet returned by [`next_write`](Self::next_write).
    pub fn try_next_write(&mut self) -> Option<Vec<u8>> {
        self.written_rx.try_recv().ok()
    }

    /// Whether the transport still considers itself connected.
    pub fn is_connected(&self) -> bool {
        lock(&self.shared).connected
    }

    /// How many times `close()` has been called.
    pub fn close_count(&self) -> usize {
        lock(&self.shared).close_count
    }
}
