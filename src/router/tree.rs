// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The spanning tree.
//!
//! Every node tracks the latest signed root announcement per peer and picks
//! a parent advertising the strongest root. The chain of ports in the
//! parent's announcement is this node's coordinates; forwarding toward a set
//! of coordinates always takes a strictly tree-distance-decreasing hop.

use super::cmd::Cmd;
use super::core::Core;
use super::peer::Peer;
use crate::error::{Error, Result};
use crate::types::{log_markers::LogMarker, Port};
use crate::wire::{Coordinates, Frame, FrameType, RootAnnouncement};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;

pub(crate) struct TreeState {
    /// The peer on the path to the root, or `None` while we are root.
    pub(crate) parent: Option<Port>,
    /// The latest verified announcement per peer.
    pub(crate) announcements: BTreeMap<Port, RootAnnouncement>,
    /// Our own announcement sequence, advanced whenever we (re)take the
    /// root role.
    pub(crate) sequence: u64,
}

impl TreeState {
    pub(crate) fn new() -> Self {
        Self {
            parent: None,
            announcements: BTreeMap::new(),
            sequence: 0,
        }
    }
}

impl Core {
    /// The root announcement this node currently stands behind: the
    /// parent's, or a self-origin one while we are root.
    pub(crate) fn root_announcement(&self) -> RootAnnouncement {
        self.tree
            .parent
            .and_then(|port| self.tree.announcements.get(&port).cloned())
            .unwrap_or_else(|| RootAnnouncement::origin(self.public_key, self.tree.sequence))
    }

    /// This node's coordinates: the port path from the root.
    pub(crate) fn coords(&self) -> Coordinates {
        self.root_announcement().coords()
    }

    pub(crate) fn handle_tree_announcement(
        &mut self,
        sender: Port,
        frame: Frame,
    ) -> Result<Vec<Cmd>> {
        let (announcement, _) = RootAnnouncement::decode(&frame.payload)?;
        announcement.verify()?;
        let peer_key = match self.peer(sender) {
            Some(peer) => peer.public_key(),
            None => return Ok(Vec::new()),
        };
        if announcement.sender() != Some(peer_key) {
            return Err(Error::InvalidSignature);
        }

        // kept even when the chain runs through us: the ports still describe
        // where the peer sits, which downward tree routing depends on; such
        // a chain is merely excluded from parent selection
        let _ = self.tree.announcements.insert(sender, announcement);
        self.reconsider_parent(Some(sender));
        Ok(Vec::new())
    }

    /// Re-picks the parent from the stored announcements: strongest root
    /// first, then freshest sequence, then shortest path, then lowest port.
    /// Re-announces to every peer when our own position changed.
    pub(crate) fn reconsider_parent(&mut self, triggered_by: Option<Port>) {
        let previous = self.tree.parent;
        let best = self
            .tree
            .announcements
            .iter()
            .filter(|(port, announcement)| {
                announcement.root > self.public_key
                    && !announcement.contains(&self.public_key)
                    && self.peer(**port).map_or(false, |peer| peer.is_started())
            })
            .max_by(|(port_a, a), (port_b, b)| {
                a.root
                    .cmp(&b.root)
                    .then_with(|| a.sequence.cmp(&b.sequence))
                    .then_with(|| b.signatures.len().cmp(&a.signatures.len()))
                    .then_with(|| port_b.cmp(port_a))
            })
            .map(|(port, _)| *port);

        self.tree.parent = best;
        if best != previous {
            match best {
                Some(port) => info!("{} port={}", LogMarker::ParentSelected, port),
                None => {
                    self.tree.sequence += 1;
                    info!("{} sequence={}", LogMarker::BecameRoot, self.tree.sequence);
                }
            }
        }
        if best != previous || (best.is_some() && best == triggered_by) {
            self.send_tree_announcements();
        }
    }

    /// Announces our current position to every started peer.
    pub(crate) fn send_tree_announcements(&self) {
        let announcement = self.root_announcement();
        for peer in self.started_peers() {
            self.send_tree_announcement_to(peer, &announcement);
        }
    }

    pub(crate) fn send_tree_announcement_to(
        &self,
        peer: &Arc<Peer>,
        announcement: &RootAnnouncement,
    ) {
        let signed = announcement.append_signature(&self.keypair, u64::from(peer.port().0));
        let mut payload = Vec::new();
        signed.encode(&mut payload);
        let frame = Frame {
            payload: Bytes::from(payload),
            ..Frame::new(FrameType::TreeAnnouncement)
        };
        if !peer.push_proto(frame) {
            debug!("Announcement to port {} dropped, peer stopped", peer.port());
        }
    }

    /// Picks the next hop for a coordinate-addressed frame: the started peer
    /// whose coordinates are strictly closer to the destination than ours,
    /// never the peer the frame came from. Port 0 means the frame is for us
    /// (or has come as close as it will get).
    pub(crate) fn next_hop_tree(&self, from: Port, destination: &Coordinates) -> Port {
        let our_coords = self.coords();
        if *destination == our_coords {
            return Port::LOCAL;
        }
        let our_root = self.root_announcement().root;
        let mut best = Port::LOCAL;
        let mut best_distance = our_coords.distance_to(destination);
        for peer in self.started_peers() {
            if peer.port() == from {
                continue;
            }
            let announcement = match self.tree.announcements.get(&peer.port()) {
                Some(announcement) => announcement,
                None => continue,
            };
            if announcement.root != our_root {
                continue;
            }
            let distance = announcement.sender_coords().distance_to(destination);
            if distance < best_distance {
                best_distance = distance;
                best = peer.port();
            }
        }
        best
    }
}
