//! Ordered response pipeline for one connection
//!
//! Requests on a connection may finish handling in any order, but their
//! responses must go out in the order the requests arrived. Every request
//! takes an in-flight permit and an arrival sequence number; finished
//! responses are held in a buffer keyed by sequence and released to the
//! writer only from the head.
//!
//! Correlation ids are not used for ordering because clients may skip or
//! reuse values.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};

use super::frame::ResponseFrame;

/// A response released to the writer, in arrival order.
///
/// Holds the request's in-flight permit until the envelope is dropped,
/// which the writer does only after the frame has been written.
#[derive(Debug)]
pub struct ResponseEnvelope {
    pub seq: u64,
    pub frame: ResponseFrame,
    _permit: InFlightPermit,
}

struct PipelineState {
    next_send_seq: u64,
    /// Finished responses waiting for an earlier sequence
    buffer: BTreeMap<u64, ResponseEnvelope>,
}

/// Per-connection request window and response reorder buffer
pub struct Pipeline {
    in_flight_semaphore: Arc<Semaphore>,
    next_request_seq: AtomicU64,
    state: Mutex<PipelineState>,
    response_tx: mpsc::UnboundedSender<ResponseEnvelope>,
}

impl Pipeline {
    /// Create a pipeline admitting at most `max_in_flight` requests at once.
    ///
    /// The receiver yields responses in arrival order. The channel needs no
    /// bound of its own: every envelope carries one of the `max_in_flight`
    /// permits.
    pub fn new(max_in_flight: usize) -> (Self, mpsc::UnboundedReceiver<ResponseEnvelope>) {
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let pipeline = Self {
            in_flight_semaphore: Arc::new(Semaphore::new(max_in_flight)),
            next_request_seq: AtomicU64::new(0),
            state: Mutex::new(PipelineState {
                next_send_seq: 0,
                buffer: BTreeMap::new(),
            }),
            response_tx,
        };
        (pipeline, response_rx)
    }

    /// Wait for room in the window and take the next arrival sequence number.
    ///
    /// Returns `None` once the window has been closed through a
    /// [`WindowCloser`].
    pub async fn acquire_permit(&self) -> Option<(InFlightPermit, u64)> {
        let permit = self
            .in_flight_semaphore
            .clone()
            .acquire_owned()
            .await
            .ok()?;
        let seq = self.next_request_seq.fetch_add(1, Ordering::Relaxed);
        Some((InFlightPermit { _permit: permit }, seq))
    }

    /// Handle that closes the request window.
    ///
    /// It does not keep the pipeline, and so the response channel, alive.
    pub fn closer(&self) -> WindowCloser {
        WindowCloser(self.in_flight_semaphore.clone())
    }

    /// Submit the response for request `seq`.
    ///
    /// Releases it, and any buffered successors, once every earlier sequence
    /// has been released. Sending happens under the state lock so concurrent
    /// submitters cannot reorder the channel.
    pub fn submit(&self, seq: u64, frame: ResponseFrame, permit: InFlightPermit) {
        let envelope = ResponseEnvelope {
            seq,
            frame,
            _permit: permit,
        };

        let mut state = self.state.lock();
        if seq != state.next_send_seq {
            state.buffer.insert(seq, envelope);
            return;
        }

        self.release(envelope);
        state.next_send_seq += 1;
        loop {
            let next = state.next_send_seq;
            match state.buffer.remove(&next) {
                Some(buffered) => {
                    self.release(buffered);
                    state.next_send_seq += 1;
                }
                None => break,
            }
        }
    }

    fn release(&self, envelope: ResponseEnvelope) {
        // A closed receiver means the writer is gone and the connection is
        // tearing down; the envelope and its permit are dropped here.
        let _ = self.response_tx.send(envelope);
    }
}

/// Stops a pipeline admitting requests
#[derive(Debug, Clone)]
pub struct WindowCloser(Arc<Semaphore>);

impl WindowCloser {
    /// Pending and later `acquire_permit` calls return `None`
    pub fn close(&self) {
        self.0.close();
    }
}

/// RAII guard for an in-flight request. Frees its window slot on drop.
#[derive(Debug)]
pub struct InFlightPermit {
    _permit: OwnedSemaphorePermit,
}
