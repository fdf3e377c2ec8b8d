// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

use super::PeerType;
use crate::types::{Port, PublicKey};
use crate::wire::Frame;
use std::{
    collections::VecDeque,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, PoisonError,
    },
};
use tokio::sync::{mpsc, watch, Notify};

/// A peer slot.
///
/// Outbound frames for the peer go through two queues: an unbounded FIFO for
/// protocol frames, which must never drop (control traffic is essential for
/// convergence), and a bounded LIFO for payload traffic, which prefers fresh
/// frames and evicts the oldest on overflow. The peer's writer task is the
/// single consumer of both.
#[derive(Debug)]
pub(crate) struct Peer {
    port: Port,
    public_key: PublicKey,
    zone: String,
    peer_type: PeerType,
    started: AtomicBool,
    proto_tx: mpsc::UnboundedSender<Frame>,
    traffic: TrafficQueue,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl Peer {
    pub(crate) fn new(
        port: Port,
        public_key: PublicKey,
        zone: String,
        peer_type: PeerType,
        proto_tx: mpsc::UnboundedSender<Frame>,
        traffic_capacity: usize,
    ) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            port,
            public_key,
            zone,
            peer_type,
            started: AtomicBool::new(true),
            proto_tx,
            traffic: TrafficQueue::new(traffic_capacity),
            cancel_tx,
            cancel_rx,
        }
    }

    pub(crate) fn port(&self) -> Port {
        self.port
    }

    pub(crate) fn public_key(&self) -> PublicKey {
        self.public_key
    }

    pub(crate) fn zone(&self) -> &str {
        &self.zone
    }

    /// True iff this slot is the local router (port 0).
    pub(crate) fn is_local(&self) -> bool {
        self.port.is_local()
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    fn accepts_frames(&self) -> bool {
        self.is_started() && !self.proto_tx.is_closed()
    }

    /// Enqueues a protocol frame. Returns false only if the peer is not
    /// accepting frames (stopped, or its writer is gone); the queue itself
    /// never drops.
    pub(crate) fn push_proto(&self, frame: Frame) -> bool {
        if !self.accepts_frames() {
            return false;
        }
        self.proto_tx.send(frame).is_ok()
    }

    /// Enqueues a traffic frame, evicting the oldest buffered frame on
    /// overflow. Returns false if the peer is stopped.
    pub(crate) fn push_traffic(&self, frame: Frame) -> bool {
        if !self.is_started() {
            return false;
        }
        self.traffic.push(frame)
    }

    /// Pops the freshest buffered traffic frame, waiting if the queue is
    /// empty. Returns `None` once the peer is stopped and drained.
    pub(crate) async fn next_traffic(&self) -> Option<Frame> {
        self.traffic.pop().await
    }

    /// Stops the peer: it no longer accepts frames and its tasks observe
    /// cancellation.
    pub(crate) fn stop(&self) {
        self.started.store(false, Ordering::Release);
        self.traffic.close();
        let _ = self.cancel_tx.send(true);
    }

    pub(crate) fn cancelled(&self) -> watch::Receiver<bool> {
        self.cancel_rx.clone()
    }

    #[cfg(test)]
    pub(crate) fn traffic_len(&self) -> usize {
        self.traffic.len()
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} on port {}", self.public_key, self.port)
    }
}

// LIFO with a hard capacity: push evicts the oldest, pop takes the newest.
// Single consumer; `close` uses `notify_one` so a parked pop wakes and
// observes the closed flag.
#[derive(Debug)]
struct TrafficQueue {
    inner: Mutex<VecDeque<Frame>>,
    notify: Notify,
    capacity: usize,
    closed: AtomicBool,
}

impl TrafficQueue {
    fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
            closed: AtomicBool::new(false),
        }
    }

    fn push(&self, frame: Frame) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let evicted = {
            let mut queue = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let evicted = if queue.len() >= self.capacity {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(frame);
            evicted
        };
        if evicted.is_some() {
            trace!("Traffic queue full, evicted the oldest frame");
        }
        self.notify.notify_one();
        true
    }

    async fn pop(&self) -> Option<Frame> {
        loop {
            let notified = self.notify.notified();
            if let Some(frame) = self
                .inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_back()
            {
                return Some(frame);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
