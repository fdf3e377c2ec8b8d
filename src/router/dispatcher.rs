// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

use super::cmd::Cmd;
use super::core::Core;
use super::peer::Peer;
use super::ping::Pings;
use super::Config;
use crate::error::Result;
use crate::types::{log_markers::LogMarker, Keypair, Port, PublicKey};
use crate::wire::{Frame, FrameType};
use bytes::Bytes;
use dashmap::{mapref::entry::Entry, DashMap};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::MissedTickBehavior;

// `Cmd` dispatcher.
//
// All snake and tree state lives in `core`; commands that mutate it take the
// write guard, so no two mutations are ever concurrent and every handler
// sees a consistent snapshot. Forwarding of payload traffic only takes the
// read guard.
pub(crate) struct Dispatcher {
    pub(crate) core: RwLock<Core>,
    pub(crate) keypair: Arc<Keypair>,
    pub(crate) config: Config,
    pub(crate) pings: Pings,
    pub(crate) deliveries_tx: mpsc::Sender<(PublicKey, Bytes)>,
    // connection refcount per (public key, zone), read from arbitrary tasks
    active: DashMap<(PublicKey, String), usize>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Cancel all tasks still holding a handle to us.
        let _res = self.cancel_tx.send(true);
    }
}

impl Dispatcher {
    pub(crate) fn new(
        core: Core,
        keypair: Arc<Keypair>,
        config: Config,
        deliveries_tx: mpsc::Sender<(PublicKey, Bytes)>,
    ) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            core: RwLock::new(core),
            keypair,
            config,
            pings: Pings::default(),
            deliveries_tx,
            active: DashMap::new(),
            cancel_tx,
            cancel_rx,
        }
    }

    pub(crate) fn close(&self) {
        let _res = self.cancel_tx.send(true);
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    pub(crate) fn cancelled(&self) -> watch::Receiver<bool> {
        self.cancel_rx.clone()
    }

    /// Handles the given cmd and transitively any cmds produced during its
    /// handling, in FIFO order. Handler failures are recovered here: the
    /// offending frame is dropped and the loop continues.
    pub(crate) async fn process_cmd(&self, cmd: Cmd) -> Result<()> {
        let mut queue = VecDeque::new();
        queue.push_back(cmd);
        while let Some(cmd) = queue.pop_front() {
            trace!("Handling {}", cmd);
            match self.try_process(cmd).await {
                Ok(cmds) => queue.extend(cmds),
                Err(error) => {
                    warn!("Cmd handling failed, dropping: {:?}", error);
                }
            }
        }
        Ok(())
    }

    async fn try_process(&self, cmd: Cmd) -> Result<Vec<Cmd>> {
        match cmd {
            Cmd::HandleFrame { sender, frame } => match frame.frame_type {
                FrameType::TreeAnnouncement => {
                    self.core.write().await.handle_tree_announcement(sender, frame)
                }
                FrameType::VirtualSnakeBootstrap => {
                    self.core.write().await.handle_bootstrap_frame(sender, frame)
                }
                FrameType::VirtualSnakeBootstrapAck => {
                    self.core
                        .write()
                        .await
                        .handle_bootstrap_ack_frame(sender, frame)
                }
                FrameType::VirtualSnakeSetup => {
                    self.core.write().await.handle_setup(sender, frame)
                }
                FrameType::VirtualSnakeTeardown => {
                    self.core.write().await.handle_teardown(sender, frame)
                }
                FrameType::TreePing
                | FrameType::SnekPing
                | FrameType::TreeRouted
                | FrameType::SnekRouted => self
                    .core
                    .read()
                    .await
                    .forward(sender, frame, &self.pings)
                    .map(|()| Vec::new()),
            },
            Cmd::MaintainSnake => {
                self.core.write().await.maintain_snake();
                Ok(Vec::new())
            }
            Cmd::Bootstrap => {
                self.core.write().await.bootstrap_now();
                Ok(Vec::new())
            }
            Cmd::HandlePeerLost(port) => self.handle_peer_lost(port).await,
        }
    }

    async fn handle_peer_lost(&self, port: Port) -> Result<Vec<Cmd>> {
        let (peer, cmds) = self.core.write().await.remove_peer(port);
        if let Some(peer) = peer {
            peer.stop();
            self.decrement_active(peer.public_key(), peer.zone());
            info!("{} {}", LogMarker::PeerDetached, peer);
        }
        Ok(cmds)
    }

    /// Drives the 1 s snake maintenance tick until cancelled.
    pub(crate) fn start_maintenance(self: Arc<Self>) {
        let _handle = tokio::spawn(async move {
            let mut cancel = self.cancelled();
            let mut interval = tokio::time::interval(self.config.maintain_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.changed() => break,
                    _ = interval.tick() => {
                        if let Err(error) = self.process_cmd(Cmd::MaintainSnake).await {
                            error!("Snake maintenance failed: {:?}", error);
                        }
                    }
                }
            }
        });
    }

    /// Consumes port 0's queues: protocol frames loop back into the
    /// dispatcher, traffic frames surface as local deliveries.
    pub(crate) fn start_local_loop(
        self: Arc<Self>,
        local_peer: Arc<Peer>,
        mut proto_rx: mpsc::UnboundedReceiver<Frame>,
    ) {
        let _handle = tokio::spawn(async move {
            let mut cancel = self.cancelled();
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.changed() => break,
                    frame = proto_rx.recv() => match frame {
                        Some(frame) => {
                            let cmd = Cmd::HandleFrame { sender: Port::LOCAL, frame };
                            if let Err(error) = self.process_cmd(cmd).await {
                                error!("Loopback frame handling failed: {:?}", error);
                            }
                        }
                        None => break,
                    },
                    frame = local_peer.next_traffic() => match frame {
                        Some(frame) => {
                            // best effort: the application not consuming its
                            // deliveries is no reason to stall the router
                            let _ = self
                                .deliveries_tx
                                .try_send((frame.source_key, frame.payload));
                        }
                        None => break,
                    },
                }
            }
        });
    }

    pub(crate) fn increment_active(&self, public_key: PublicKey, zone: &str) {
        *self
            .active
            .entry((public_key, zone.to_string()))
            .or_insert(0) += 1;
    }

    pub(crate) fn decrement_active(&self, public_key: PublicKey, zone: &str) {
        if let Entry::Occupied(mut entry) = self.active.entry((public_key, zone.to_string())) {
            if *entry.get() <= 1 {
                let _ = entry.remove();
            } else {
                *entry.get_mut() -= 1;
            }
        }
    }

    pub(crate) fn is_active(&self, public_key: &PublicKey, zone: &str) -> bool {
        self.active
            .get(&(*public_key, zone.to_string()))
            .map_or(false, |count| *count > 0)
    }
}
