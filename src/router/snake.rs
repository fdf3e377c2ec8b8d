// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The virtual snake.
//!
//! Every node keeps a table of paths toward its two keyspace neighbours:
//! `ascending` toward the next higher key it knows of, `descending` toward
//! the next lower. Paths are negotiated with a bootstrap / bootstrap-ACK /
//! setup handshake, pinned to the tree epoch they were set up under, torn
//! down hop by hop, and expired lazily by the maintenance tick.

use super::cmd::Cmd;
use super::core::Core;
use crate::error::Result;
use crate::types::{log_markers::LogMarker, PathId, Port, PublicKey};
use crate::wire::snake::{SnakePathPayload, TeardownPayload};
use crate::wire::{Frame, FrameType};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use super::nexthop::dht_ordered;

/// Identifies one snake path: the lower-keyed endpoint plus the originator's
/// random path id.
#[derive(Ord, PartialOrd, Clone, Copy, Eq, PartialEq, Debug)]
pub(crate) struct SnakeIndex {
    pub(crate) public_key: PublicKey,
    pub(crate) path_id: PathId,
}

/// One hop of an installed snake path. `source` is the peer through which
/// lower-keyed traffic enters, `destination` the peer through which
/// higher-keyed traffic exits; either resolves to port 0 when this node is
/// an endpoint.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SnakeEntry {
    pub(crate) origin: PublicKey,
    pub(crate) source: Port,
    pub(crate) destination: Port,
    pub(crate) last_seen: Instant,
    pub(crate) root: PublicKey,
    pub(crate) root_sequence: u64,
}

impl SnakeEntry {
    pub(crate) fn valid(&self, expiry: Duration) -> bool {
        self.last_seen.elapsed() < expiry
    }
}

pub(crate) struct SnakeState {
    pub(crate) table: BTreeMap<SnakeIndex, SnakeEntry>,
    /// The outbound half of this node's snake links: a locally originated
    /// path toward the next higher key, keyed as `(local key, path id)`.
    pub(crate) ascending: Option<SnakeIndex>,
    /// The inbound half: a path from the next lower key, keyed as
    /// `(that key, path id)`.
    pub(crate) descending: Option<SnakeIndex>,
}

impl SnakeState {
    pub(crate) fn new() -> Self {
        Self {
            table: BTreeMap::new(),
            ascending: None,
            descending: None,
        }
    }
}

impl Core {
    /// The periodic maintenance pass. Expired neighbour paths are torn
    /// down; an ascending path that is missing, expired or pinned to a
    /// stale tree epoch triggers a fresh bootstrap. A node that is itself
    /// the root never bootstraps, there is no higher key to find.
    pub(crate) fn maintain_snake(&mut self) {
        let root = self.root_announcement();
        let can_bootstrap = self.tree.parent.is_some() && root.root != self.public_key;
        let mut will_bootstrap = false;

        if let Some(index) = self.snake.ascending {
            let state = self
                .snake
                .table
                .get(&index)
                .map(|entry| {
                    (
                        entry.valid(self.config.neighbour_expiry),
                        entry.root == root.root && entry.root_sequence == root.sequence,
                    )
                })
                .unwrap_or((false, false));
            match state {
                (false, _) => {
                    // expired: tear the path down, and still fall through to
                    // bootstrapping in the same tick
                    self.teardown_existing_path(index);
                    will_bootstrap = can_bootstrap;
                }
                (true, false) => {
                    will_bootstrap = can_bootstrap;
                }
                (true, true) => {}
            }
        } else {
            will_bootstrap = can_bootstrap;
        }

        if let Some(index) = self.snake.descending {
            let valid = self
                .snake
                .table
                .get(&index)
                .map(|entry| entry.valid(self.config.neighbour_expiry))
                .unwrap_or(false);
            if !valid {
                self.teardown_existing_path(index);
            }
        }

        if will_bootstrap {
            self.bootstrap_now();
        }
    }

    /// Sends a bootstrap looking for our keyspace successor, unless a valid
    /// ascending path for the current tree epoch already exists.
    pub(crate) fn bootstrap_now(&mut self) {
        if self.tree.parent.is_none() {
            return;
        }
        let root = self.root_announcement();
        if let Some(index) = self.snake.ascending {
            if let Some(entry) = self.snake.table.get(&index) {
                if entry.valid(self.config.neighbour_expiry)
                    && entry.root == root.root
                    && entry.root_sequence == root.sequence
                {
                    return;
                }
            }
        }

        let path_id = PathId::random();
        let payload = SnakePathPayload {
            path_id,
            root: root.root,
            root_sequence: root.sequence,
        };
        // the bootstrap is addressed to our own key: SNEK forwarding then
        // carries it to the closest key above ours
        let frame = Frame {
            destination_key: self.public_key,
            source: self.coords(),
            payload: payload.encode(),
            ..Frame::new(FrameType::VirtualSnakeBootstrap)
        };
        let next_hop = self.next_hop_snek(&frame, true);
        match self.peer(next_hop) {
            Some(peer) => {
                if peer.push_proto(frame) {
                    trace!("{} path_id={}", LogMarker::BootstrapSent, path_id);
                } else {
                    debug!("Bootstrap dropped, port {} not accepting frames", next_hop);
                }
            }
            None => debug!("Bootstrap dropped, no peer on port {}", next_hop),
        }
    }

    /// Routes a bootstrap one hop further through keyspace, handling it
    /// here only once no remote candidate improves on us.
    pub(crate) fn handle_bootstrap_frame(&mut self, sender: Port, frame: Frame) -> Result<Vec<Cmd>> {
        let next_hop = self.next_hop_snek(&frame, true);
        if next_hop.is_local() {
            return self.handle_bootstrap(sender, frame);
        }
        if let Some(peer) = self.peer(next_hop) {
            if !peer.push_proto(frame) {
                trace!("Bootstrap dropped, port {} not accepting frames", next_hop);
            }
        }
        Ok(Vec::new())
    }

    /// Tree-routes a bootstrap-ACK toward the bootstrap originator's
    /// coordinates, handling it here only when they are ours.
    pub(crate) fn handle_bootstrap_ack_frame(
        &mut self,
        sender: Port,
        frame: Frame,
    ) -> Result<Vec<Cmd>> {
        if frame.destination == self.coords() {
            return self.handle_bootstrap_ack(sender, frame);
        }
        let next_hop = self.next_hop_tree(sender, &frame.destination);
        if next_hop.is_local() {
            trace!("Bootstrap-ACK went as far as it could, dropping");
            return Ok(Vec::new());
        }
        if let Some(peer) = self.peer(next_hop) {
            if !peer.push_proto(frame) {
                trace!("Bootstrap-ACK dropped, port {} not accepting", next_hop);
            }
        }
        Ok(Vec::new())
    }

    /// A bootstrap reached us: we are the closest key above the originator
    /// that its frame could find. Answer with a bootstrap-ACK, tree-routed
    /// back to the originator's coordinates. No local table change.
    pub(crate) fn handle_bootstrap(&mut self, _sender: Port, frame: Frame) -> Result<Vec<Cmd>> {
        let bootstrap = SnakePathPayload::decode(&frame.payload)?;
        let root = self.root_announcement();
        let ack = SnakePathPayload {
            path_id: bootstrap.path_id,
            root: root.root,
            root_sequence: root.sequence,
        };
        let ack_frame = Frame {
            destination: frame.source.clone(),
            source: self.coords(),
            destination_key: frame.destination_key,
            source_key: self.public_key,
            payload: ack.encode(),
            ..Frame::new(FrameType::VirtualSnakeBootstrapAck)
        };
        let next_hop = self.next_hop_tree(Port::LOCAL, &ack_frame.destination);
        match self.peer(next_hop) {
            Some(peer) => {
                if peer.push_proto(ack_frame) {
                    trace!("{} to {}", LogMarker::BootstrapAckSent, frame.destination_key);
                }
            }
            None => debug!("Bootstrap-ACK dropped, no peer on port {}", next_hop),
        }
        Ok(Vec::new())
    }

    /// A bootstrap-ACK came back: decide whether the answering node makes a
    /// better ascending neighbour than the current one, and if so, send a
    /// setup toward it and adopt it.
    pub(crate) fn handle_bootstrap_ack(&mut self, _sender: Port, frame: Frame) -> Result<Vec<Cmd>> {
        let ack = SnakePathPayload::decode(&frame.payload)?;
        if frame.destination_key != self.public_key {
            // routed to our coordinates but meant for somebody else
            return Ok(Vec::new());
        }
        if frame.source_key == self.public_key {
            // our own ACK travelled a loop
            return Ok(Vec::new());
        }
        let root = self.root_announcement();
        if ack.root != root.root || ack.root_sequence != root.sequence {
            trace!("Bootstrap-ACK for a stale tree epoch, ignoring");
            return Ok(Vec::new());
        }

        let ascending = self.snake.ascending.and_then(|index| {
            self.snake
                .table
                .get(&index)
                .map(|entry| (index, entry.origin, entry.valid(self.config.neighbour_expiry)))
        });
        let update = match ascending {
            Some((index, origin, true)) => {
                if origin == frame.source_key && ack.path_id != index.path_id {
                    // the same neighbour refreshed with a new path
                    true
                } else {
                    // a key strictly between us and the current neighbour
                    dht_ordered(&self.public_key, &frame.source_key, &origin)
                }
            }
            _ => self.public_key < frame.source_key,
        };
        if !update {
            return Ok(Vec::new());
        }

        let setup = SnakePathPayload {
            path_id: ack.path_id,
            root: ack.root,
            root_sequence: ack.root_sequence,
        };
        let setup_frame = Frame {
            destination: frame.source.clone(),
            source_key: self.public_key,
            destination_key: frame.source_key,
            payload: setup.encode(),
            ..Frame::new(FrameType::VirtualSnakeSetup)
        };
        let next_hop = self.next_hop_tree(Port::LOCAL, &setup_frame.destination);
        let accepted = match self.peer(next_hop) {
            Some(peer) if !peer.is_local() && peer.is_started() => peer.push_proto(setup_frame),
            _ => false,
        };
        if !accepted {
            // the setup never left this node, so no entry may be installed
            debug!(
                "Setup toward {} could not be sent, not installing",
                frame.source_key
            );
            return Ok(Vec::new());
        }

        // drop every other outbound path before adopting the new neighbour,
        // or stale paths would linger and invite routing loops
        let stale: Vec<SnakeIndex> = self
            .snake
            .table
            .iter()
            .filter(|(index, entry)| {
                index.public_key == self.public_key && entry.origin != frame.source_key
            })
            .map(|(index, _)| *index)
            .collect();
        for index in stale {
            self.teardown_existing_path(index);
        }

        let index = SnakeIndex {
            public_key: self.public_key,
            path_id: ack.path_id,
        };
        let entry = SnakeEntry {
            origin: frame.source_key,
            source: Port::LOCAL,
            destination: next_hop,
            last_seen: Instant::now(),
            root: ack.root,
            root_sequence: ack.root_sequence,
        };
        let _ = self.snake.table.insert(index, entry);
        self.snake.ascending = Some(index);
        info!("{} towards {}", LogMarker::AscendingUpdated, frame.source_key);
        Ok(Vec::new())
    }

    /// A setup passing through (or ending at) this node.
    pub(crate) fn handle_setup(&mut self, sender: Port, frame: Frame) -> Result<Vec<Cmd>> {
        let setup = SnakePathPayload::decode(&frame.payload)?;
        let root = self.root_announcement();
        if setup.root != root.root || setup.root_sequence != root.sequence {
            self.send_rejection_teardown(sender, frame.source_key, setup.path_id);
            trace!("{} stale epoch from {}", LogMarker::SetupRejected, sender);
            return Ok(Vec::new());
        }

        let index = SnakeIndex {
            public_key: frame.source_key,
            path_id: setup.path_id,
        };
        if self.snake.table.contains_key(&index) {
            // duplicate path: drop what we have and refuse the new one
            self.teardown_existing_path(index);
            self.send_rejection_teardown(sender, frame.source_key, setup.path_id);
            trace!("{} duplicate path from {}", LogMarker::SetupRejected, sender);
            return Ok(Vec::new());
        }

        if frame.destination_key == self.public_key {
            // we are the setup's destination: the originator believes we are
            // its keyspace successor, so it must sit below us
            let descending = self.snake.descending.and_then(|existing| {
                self.snake.table.get(&existing).map(|entry| {
                    (
                        existing,
                        entry.origin,
                        entry.valid(self.config.neighbour_expiry),
                    )
                })
            });
            let update = match descending {
                Some((existing, origin, true)) => {
                    if origin == frame.source_key && setup.path_id != existing.path_id {
                        true
                    } else {
                        dht_ordered(&origin, &frame.source_key, &self.public_key)
                    }
                }
                _ => frame.source_key < self.public_key,
            };
            if !update {
                self.send_rejection_teardown(sender, frame.source_key, setup.path_id);
                trace!("{} not an update from {}", LogMarker::SetupRejected, sender);
                return Ok(Vec::new());
            }
            if let Some(existing) = self.snake.descending {
                self.teardown_existing_path(existing);
            }
            let entry = SnakeEntry {
                origin: frame.source_key,
                source: sender,
                destination: Port::LOCAL,
                last_seen: Instant::now(),
                root: setup.root,
                root_sequence: setup.root_sequence,
            };
            let _ = self.snake.table.insert(index, entry);
            self.snake.descending = Some(index);
            info!("{} from {}", LogMarker::DescendingUpdated, frame.source_key);
            return Ok(Vec::new());
        }

        // intermediate hop: the entry is only installed if the setup left
        // this node toward its destination
        let next_hop = self.next_hop_tree(sender, &frame.destination);
        let forwarded = match self.peer(next_hop) {
            Some(peer) if !peer.is_local() && peer.is_started() => peer.push_proto(frame.clone()),
            _ => false,
        };
        if !forwarded {
            self.send_rejection_teardown(sender, frame.source_key, setup.path_id);
            trace!("{} could not forward from {}", LogMarker::SetupRejected, sender);
            return Ok(Vec::new());
        }
        let entry = SnakeEntry {
            origin: frame.source_key,
            source: sender,
            destination: next_hop,
            last_seen: Instant::now(),
            root: setup.root,
            root_sequence: setup.root_sequence,
        };
        let _ = self.snake.table.insert(index, entry);
        trace!(
            "{} ({}, {}) via ports {}->{}",
            LogMarker::PathInstalled,
            frame.source_key,
            setup.path_id,
            sender,
            next_hop
        );
        Ok(Vec::new())
    }

    /// A teardown for one path, propagated along the installed hops.
    pub(crate) fn handle_teardown(&mut self, sender: Port, frame: Frame) -> Result<Vec<Cmd>> {
        let teardown = TeardownPayload::decode(&frame.payload)?;
        let (ports, needs_bootstrap) =
            self.teardown_path(sender, frame.destination_key, teardown.path_id);
        self.send_teardowns(&ports, frame.destination_key, teardown.path_id);
        if needs_bootstrap {
            Ok(vec![Cmd::Bootstrap])
        } else {
            Ok(Vec::new())
        }
    }

    /// Resolves a teardown against the designated pointers and the table.
    /// Returns the peers that must be notified next, and whether losing the
    /// path warrants an immediate bootstrap (only when it was our
    /// ascending).
    pub(crate) fn teardown_path(
        &mut self,
        from: Port,
        path_key: PublicKey,
        path_id: PathId,
    ) -> (Vec<Port>, bool) {
        let index = SnakeIndex {
            public_key: path_key,
            path_id,
        };

        if self.snake.ascending == Some(index) {
            if let Some(entry) = self.snake.table.get(&index) {
                if from.is_local() || from == entry.destination {
                    let destination = entry.destination;
                    self.snake.ascending = None;
                    let _ = self.snake.table.remove(&index);
                    info!(
                        "{} ascending ({}, {})",
                        LogMarker::PathTornDown,
                        path_key,
                        path_id
                    );
                    return (vec![destination], true);
                }
            }
        }

        if self.snake.descending == Some(index) {
            if let Some(entry) = self.snake.table.get(&index) {
                if from.is_local() || from == entry.source {
                    let source = entry.source;
                    self.snake.descending = None;
                    let _ = self.snake.table.remove(&index);
                    info!(
                        "{} descending ({}, {})",
                        LogMarker::PathTornDown,
                        path_key,
                        path_id
                    );
                    return (vec![source], false);
                }
            }
        }

        if let Some(entry) = self.snake.table.get(&index) {
            let (source, destination) = (entry.source, entry.destination);
            let notify = if from.is_local() {
                // only the duplicate-setup case tears an intermediate entry
                // down from the inside; both sides must hear about it
                Some(vec![destination, source])
            } else if from == source {
                Some(vec![destination])
            } else if from == destination {
                Some(vec![source])
            } else {
                None
            };
            if let Some(notify) = notify {
                let _ = self.snake.table.remove(&index);
                trace!("{} ({}, {})", LogMarker::PathTornDown, path_key, path_id);
                return (notify, false);
            }
        }

        (Vec::new(), false)
    }

    /// Tears down a path present in the table, notifying every hop that
    /// still needs to hear about it.
    pub(crate) fn teardown_existing_path(&mut self, index: SnakeIndex) {
        let (ports, _) = self.teardown_path(Port::LOCAL, index.public_key, index.path_id);
        self.send_teardowns(&ports, index.public_key, index.path_id);
    }

    /// A rejected frame is answered with a teardown pushed only to the peer
    /// it arrived through; nothing was installed downstream.
    pub(crate) fn send_rejection_teardown(&self, via: Port, path_key: PublicKey, path_id: PathId) {
        self.send_teardowns(&[via], path_key, path_id);
    }

    pub(crate) fn send_teardowns(&self, ports: &[Port], path_key: PublicKey, path_id: PathId) {
        for port in ports {
            if port.is_local() {
                continue;
            }
            let peer = match self.peer(*port) {
                Some(peer) => peer,
                None => continue,
            };
            let frame = Frame {
                destination_key: path_key,
                payload: TeardownPayload { path_id }.encode(),
                ..Frame::new(FrameType::VirtualSnakeTeardown)
            };
            let _ = peer.push_proto(frame);
        }
    }
}
