// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

use super::cmd::Cmd;
use super::peer::Peer;
use super::ping::{self, Pings};
use super::snake::{SnakeIndex, SnakeState};
use super::tree::TreeState;
use super::{Config, PeerType};
use crate::error::Result;
use crate::types::{Keypair, Port, PublicKey};
use crate::wire::{Frame, FrameType};
use std::sync::Arc;
use tokio::sync::mpsc;

/// All routing state, owned by the dispatcher under a single-writer
/// discipline: mutation only ever happens through the dispatcher's write
/// guard, so handlers see a consistent snapshot of the ports array, the tree
/// and the snake.
pub(crate) struct Core {
    pub(crate) keypair: Arc<Keypair>,
    pub(crate) public_key: PublicKey,
    pub(crate) config: Config,
    // 256 slots, indexed by port number; slot 0 is the local router and is
    // occupied for the whole lifetime of the Core
    pub(crate) ports: Vec<Option<Arc<Peer>>>,
    pub(crate) tree: TreeState,
    pub(crate) snake: SnakeState,
}

impl Core {
    /// Builds the core with the local peer installed on port 0, returning
    /// the local protocol queue's consumer half for the loopback task.
    pub(crate) fn new(
        keypair: Arc<Keypair>,
        config: Config,
    ) -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let public_key = PublicKey::from(keypair.as_ref());
        let (proto_tx, proto_rx) = mpsc::unbounded_channel();
        let local = Arc::new(Peer::new(
            Port::LOCAL,
            public_key,
            String::new(),
            PeerType::Remote,
            proto_tx,
            config.traffic_buffer,
        ));
        let mut ports: Vec<Option<Arc<Peer>>> = vec![None; 256];
        ports[Port::LOCAL.index()] = Some(local);
        (
            Self {
                keypair,
                public_key,
                config,
                ports,
                tree: TreeState::new(),
                snake: SnakeState::new(),
            },
            proto_rx,
        )
    }

    pub(crate) fn peer(&self, port: Port) -> Option<&Arc<Peer>> {
        self.ports[port.index()].as_ref()
    }

    pub(crate) fn local_peer(&self) -> &Arc<Peer> {
        self.ports[Port::LOCAL.index()]
            .as_ref()
            .expect("port 0 is occupied for the lifetime of the core")
    }

    /// All started remote peers.
    pub(crate) fn started_peers(&self) -> impl Iterator<Item = &Arc<Peer>> {
        self.ports
            .iter()
            .flatten()
            .filter(|peer| !peer.is_local() && peer.is_started())
    }

    /// Claims the lowest free port in `1..=255`.
    pub(crate) fn allocate_port(&self) -> Result<Port> {
        (1..=u8::MAX)
            .map(Port)
            .find(|port| self.ports[port.index()].is_none())
            .ok_or(crate::error::Error::NoFreePorts)
    }

    pub(crate) fn insert_peer(&mut self, peer: Arc<Peer>) {
        let index = peer.port().index();
        self.ports[index] = Some(peer);
    }

    /// Removes a peer: frees the slot, drops its tree announcement
    /// (re-selecting the parent if needed) and tears down every snake entry
    /// routed through it.
    pub(crate) fn remove_peer(&mut self, port: Port) -> (Option<Arc<Peer>>, Vec<Cmd>) {
        if port.is_local() {
            return (None, Vec::new());
        }
        let peer = match self.ports[port.index()].take() {
            Some(peer) => peer,
            None => return (None, Vec::new()),
        };

        let _ = self.tree.announcements.remove(&port);
        self.reconsider_parent(None);

        let affected: Vec<SnakeIndex> = self
            .snake
            .table
            .iter()
            .filter(|(_, entry)| entry.source == port || entry.destination == port)
            .map(|(index, _)| *index)
            .collect();
        let mut cmds = Vec::new();
        for index in affected {
            let (ports, needs_bootstrap) = self.teardown_path(port, index.public_key, index.path_id);
            self.send_teardowns(&ports, index.public_key, index.path_id);
            if needs_bootstrap {
                cmds.push(Cmd::Bootstrap);
            }
        }
        (Some(peer), cmds)
    }

    /// Forwards (or locally delivers) ping and payload traffic. Read-only
    /// with respect to routing state.
    pub(crate) fn forward(&self, sender: Port, frame: Frame, pings: &Pings) -> Result<()> {
        match frame.frame_type {
            FrameType::SnekPing | FrameType::SnekRouted => {
                if frame.destination_key == self.public_key {
                    return self.deliver_key_addressed(frame, pings);
                }
                let next_hop = self.next_hop_snek(&frame, false);
                self.forward_or_drop(next_hop, frame)
            }
            FrameType::TreePing | FrameType::TreeRouted => {
                if frame.destination == self.coords() {
                    return self.deliver_tree_addressed(frame, pings);
                }
                let next_hop = self.next_hop_tree(sender, &frame.destination);
                self.forward_or_drop(next_hop, frame)
            }
            _ => Ok(()),
        }
    }

    fn forward_or_drop(&self, next_hop: Port, frame: Frame) -> Result<()> {
        if next_hop.is_local() {
            // no remote candidate improves on us; the frame has gone as far
            // as it will go
            trace!(
                "Dropping {} frame, no hop improves on local",
                frame.frame_type
            );
            return Ok(());
        }
        if let Some(peer) = self.peer(next_hop) {
            let pushed = match frame.frame_type {
                FrameType::SnekPing | FrameType::TreePing => peer.push_proto(frame),
                _ => peer.push_traffic(frame),
            };
            if !pushed {
                trace!("Peer on port {} not accepting, frame dropped", next_hop);
            }
        }
        Ok(())
    }

    fn deliver_key_addressed(&self, frame: Frame, pings: &Pings) -> Result<()> {
        match frame.frame_type {
            FrameType::SnekPing => {
                if ping::is_response(&frame.payload) {
                    pings.complete_snek(&frame.source_key);
                } else {
                    let response = Frame {
                        source_key: frame.destination_key,
                        destination_key: frame.source_key,
                        payload: ping::response_payload(),
                        ..Frame::new(FrameType::SnekPing)
                    };
                    if response.destination_key == self.public_key {
                        // we pinged ourselves
                        pings.complete_snek(&response.source_key);
                    } else {
                        let next_hop = self.next_hop_snek(&response, false);
                        self.forward_or_drop(next_hop, response)?;
                    }
                }
            }
            FrameType::SnekRouted => {
                let _ = self.local_peer().push_traffic(frame);
            }
            _ => {}
        }
        Ok(())
    }

    fn deliver_tree_addressed(&self, frame: Frame, pings: &Pings) -> Result<()> {
        match frame.frame_type {
            FrameType::TreePing => {
                if ping::is_response(&frame.payload) {
                    pings.complete_tree(&frame.source);
                } else {
                    let response = Frame {
                        source: frame.destination.clone(),
                        destination: frame.source.clone(),
                        payload: ping::response_payload(),
                        ..Frame::new(FrameType::TreePing)
                    };
                    if response.destination == self.coords() {
                        pings.complete_tree(&response.source);
                    } else {
                        let next_hop = self.next_hop_tree(Port::LOCAL, &response.destination);
                        self.forward_or_drop(next_hop, response)?;
                    }
                }
            }
            FrameType::TreeRouted => {
                let _ = self.local_peer().push_traffic(frame);
            }
            _ => {}
        }
        Ok(())
    }
}
