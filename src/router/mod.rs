// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The router actor and its per-peer attachment machinery.

mod cmd;
mod core;
mod dispatcher;
mod handshake;
mod nexthop;
mod peer;
mod ping;
mod snake;
mod tree;


use self::cmd::Cmd;
use self::core::Core;
use self::dispatcher::Dispatcher;
use self::peer::Peer;
use crate::error::{Error, Result};
use crate::types::{log_markers::LogMarker, Keypair, Port, PublicKey, PUBLIC_KEY_LEN};
use crate::wire::{Coordinates, Frame, FrameType, FRAME_HEADER_LEN, FRAME_MAGIC, MAX_FRAME_SIZE};
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};

/// Number of attachable peer ports; port 0 is the local router.
pub const PORT_COUNT: usize = 255;

/// Bound of each peer's LIFO traffic queue.
pub const TRAFFIC_BUFFER: usize = 255;

/// Capacity of the local delivery queue drained by [`Router::recv`].
const DELIVERY_BUFFER: usize = 256;

/// Tuning knobs, defaulting to the protocol constants.
#[derive(Clone, Debug)]
pub struct Config {
    /// Period of the snake maintenance tick.
    pub maintain_interval: Duration,
    /// Age at which a snake entry stops being valid and is torn down.
    pub neighbour_expiry: Duration,
    /// Read deadline for the pre-attach handshake.
    pub keepalive_interval: Duration,
    /// Bound of each peer's LIFO traffic queue.
    pub traffic_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            maintain_interval: Duration::from_secs(1),
            neighbour_expiry: Duration::from_secs(60 * 60),
            keepalive_interval: Duration::from_secs(3),
            traffic_buffer: TRAFFIC_BUFFER,
        }
    }
}

/// How a peer is connected to us.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PeerType {
    /// An ordinary remote peering.
    Remote,
    /// A link discovered over local multicast.
    Multicast,
}

/// An overlay router.
///
/// Owns the spanning-tree and virtual-snake state behind a single-writer
/// actor, attaches peers over arbitrary byte streams, and forwards
/// key-addressed and coordinate-addressed traffic between them. Must be
/// created inside a tokio runtime.
pub struct Router {
    dispatcher: Arc<Dispatcher>,
    public_key: PublicKey,
    deliveries: Mutex<mpsc::Receiver<(PublicKey, Bytes)>>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("public_key", &self.public_key)
            .finish()
    }
}

impl Router {
    /// Builds a router with the default configuration and starts its
    /// maintenance and loopback tasks.
    pub fn new(keypair: Keypair) -> Self {
        Self::with_config(keypair, Config::default())
    }

    /// Builds a router with the given configuration.
    pub fn with_config(keypair: Keypair, config: Config) -> Self {
        let keypair = Arc::new(keypair);
        let public_key = PublicKey::from(keypair.as_ref());
        let (core, local_proto_rx) = Core::new(keypair.clone(), config.clone());
        let local_peer = core.local_peer().clone();
        let (deliveries_tx, deliveries_rx) = mpsc::channel(DELIVERY_BUFFER);
        let dispatcher = Arc::new(Dispatcher::new(core, keypair, config, deliveries_tx));
        dispatcher.clone().start_maintenance();
        dispatcher.clone().start_local_loop(local_peer, local_proto_rx);
        Self {
            dispatcher,
            public_key,
            deliveries: Mutex::new(deliveries_rx),
        }
    }

    /// This node's public key.
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// This node's identity keypair.
    pub fn keypair(&self) -> &Keypair {
        &self.dispatcher.keypair
    }

    /// This node's current tree coordinates.
    pub async fn coords(&self) -> Coordinates {
        self.dispatcher.core.read().await.coords()
    }

    /// True iff at least one attached peer matches the key and zone.
    pub fn is_connected(&self, public_key: &PublicKey, zone: &str) -> bool {
        self.dispatcher.is_active(public_key, zone)
    }

    /// Handshakes over `stream` and attaches the authenticated peer.
    pub async fn connect<S>(
        &self,
        mut stream: S,
        zone: impl Into<String>,
        peer_type: PeerType,
    ) -> Result<Port>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let peer_key = handshake::exchange(
            &mut stream,
            &self.dispatcher.keypair,
            self.dispatcher.config.keepalive_interval,
        )
        .await?;
        self.attach(stream, peer_key, zone, peer_type).await
    }

    /// Attaches an already-authenticated peer: claims the lowest free port,
    /// pushes our current root announcement to it, and starts its reader
    /// and writer tasks.
    pub async fn attach<S>(
        &self,
        stream: S,
        public_key: PublicKey,
        zone: impl Into<String>,
        peer_type: PeerType,
    ) -> Result<Port>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        if self.dispatcher.is_closed() {
            return Err(Error::RouterClosed);
        }
        let zone = zone.into();
        let (read_half, write_half) = tokio::io::split(stream);
        let (proto_tx, proto_rx) = mpsc::unbounded_channel();

        let peer = {
            let mut core = self.dispatcher.core.write().await;
            let port = core.allocate_port()?;
            let peer = Arc::new(Peer::new(
                port,
                public_key,
                zone.clone(),
                peer_type,
                proto_tx,
                core.config.traffic_buffer,
            ));
            core.insert_peer(peer.clone());
            let announcement = core.root_announcement();
            core.send_tree_announcement_to(&peer, &announcement);
            peer
        };
        self.dispatcher.increment_active(public_key, &zone);

        let port = peer.port();
        let _handle = tokio::spawn(read_loop(
            read_half,
            self.dispatcher.clone(),
            peer.clone(),
        ));
        let _handle = tokio::spawn(write_loop(
            write_half,
            self.dispatcher.clone(),
            peer.clone(),
            proto_rx,
        ));
        info!("{} {}", LogMarker::PeerAttached, peer);
        Ok(port)
    }

    /// Detaches the peer on `port`, tearing down every snake path routed
    /// through it.
    pub async fn disconnect(&self, port: Port) {
        let _ = self.dispatcher.process_cmd(Cmd::HandlePeerLost(port)).await;
    }

    /// Shuts the router down; every peer task observes cancellation and
    /// exits.
    pub fn close(&self) {
        self.dispatcher.close();
    }

    /// Sends `payload` toward the node owning `destination`, key-addressed.
    /// Delivery is best effort.
    pub async fn send(&self, destination: PublicKey, payload: Bytes) -> Result<()> {
        if self.dispatcher.is_closed() {
            return Err(Error::RouterClosed);
        }
        if FRAME_HEADER_LEN + 2 * PUBLIC_KEY_LEN + payload.len() > MAX_FRAME_SIZE {
            return Err(Error::FrameTooLarge);
        }
        let frame = Frame {
            source_key: self.public_key,
            destination_key: destination,
            payload,
            ..Frame::new(FrameType::SnekRouted)
        };
        self.dispatcher
            .process_cmd(Cmd::HandleFrame {
                sender: Port::LOCAL,
                frame,
            })
            .await
    }

    /// Receives the next key-addressed payload delivered to this node,
    /// with the sender's key.
    pub async fn recv(&self) -> Result<(PublicKey, Bytes)> {
        self.deliveries
            .lock()
            .await
            .recv()
            .await
            .ok_or(Error::RouterClosed)
    }

    /// Pings the node owning `destination` through the snake, returning the
    /// round-trip time. At most one ping per destination may be in flight.
    pub async fn snek_ping(&self, destination: PublicKey, deadline: Duration) -> Result<Duration> {
        let rx = self.dispatcher.pings.begin_snek(destination)?;
        let frame = Frame {
            source_key: self.public_key,
            destination_key: destination,
            payload: ping::request_payload(),
            ..Frame::new(FrameType::SnekPing)
        };
        let started = Instant::now();
        self.dispatcher
            .process_cmd(Cmd::HandleFrame {
                sender: Port::LOCAL,
                frame,
            })
            .await?;
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(())) => Ok(started.elapsed()),
            Ok(Err(_)) => Err(Error::RouterClosed),
            Err(_) => {
                self.dispatcher.pings.abandon_snek(&destination);
                Err(Error::PingTimeout)
            }
        }
    }

    /// Pings the node at `destination` through the tree, returning the
    /// round-trip time.
    pub async fn tree_ping(&self, destination: Coordinates, deadline: Duration) -> Result<Duration> {
        let rx = self.dispatcher.pings.begin_tree(destination.clone())?;
        let source = self.coords().await;
        let frame = Frame {
            source,
            destination: destination.clone(),
            payload: ping::request_payload(),
            ..Frame::new(FrameType::TreePing)
        };
        let started = Instant::now();
        self.dispatcher
            .process_cmd(Cmd::HandleFrame {
                sender: Port::LOCAL,
                frame,
            })
            .await?;
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(())) => Ok(started.elapsed()),
            Ok(Err(_)) => Err(Error::RouterClosed),
            Err(_) => {
                self.dispatcher.pings.abandon_tree(&destination);
                Err(Error::PingTimeout)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}

async fn read_loop<R>(mut reader: R, dispatcher: Arc<Dispatcher>, peer: Arc<Peer>)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut root_cancel = dispatcher.cancelled();
    let mut peer_cancel = peer.cancelled();
    let port = peer.port();
    let mut buf = vec![0u8; MAX_FRAME_SIZE];
    loop {
        tokio::select! {
            biased;
            _ = root_cancel.changed() => break,
            _ = peer_cancel.changed() => break,
            result = read_frame(&mut reader, &mut buf) => match result {
                Ok(frame) => {
                    let cmd = Cmd::HandleFrame { sender: port, frame };
                    if let Err(error) = dispatcher.process_cmd(cmd).await {
                        error!("Handling frame from port {} failed: {:?}", port, error);
                    }
                }
                Err(error) => {
                    debug!("Read from port {} failed: {:?}", port, error);
                    let _ = dispatcher.process_cmd(Cmd::HandlePeerLost(port)).await;
                    break;
                }
            },
        }
    }
}

async fn read_frame<R>(reader: &mut R, buf: &mut [u8]) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let _ = reader.read_exact(&mut buf[..FRAME_HEADER_LEN]).await?;
    if buf[..4] != FRAME_MAGIC {
        return Err(Error::Unmarshal("bad magic"));
    }
    let total = u16::from_be_bytes([buf[6], buf[7]]) as usize;
    if total < FRAME_HEADER_LEN {
        return Err(Error::Unmarshal("frame length below header size"));
    }
    let _ = reader.read_exact(&mut buf[FRAME_HEADER_LEN..total]).await?;
    let (frame, _) = Frame::unmarshal(&buf[..total])?;
    Ok(frame)
}

async fn write_loop<W>(
    mut writer: W,
    dispatcher: Arc<Dispatcher>,
    peer: Arc<Peer>,
    mut proto_rx: mpsc::UnboundedReceiver<Frame>,
) where
    W: AsyncWrite + Send + Unpin + 'static,
{
    let mut root_cancel = dispatcher.cancelled();
    let mut peer_cancel = peer.cancelled();
    let mut buf = Vec::with_capacity(1024);
    loop {
        // protocol frames drain strictly before traffic
        let frame = tokio::select! {
            biased;
            _ = root_cancel.changed() => break,
            _ = peer_cancel.changed() => break,
            frame = proto_rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            frame = peer.next_traffic() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        if let Err(error) = write_frame(&mut writer, &frame, &mut buf).await {
            debug!("Write to port {} failed: {:?}", peer.port(), error);
            let _ = dispatcher
                .process_cmd(Cmd::HandlePeerLost(peer.port()))
                .await;
            break;
        }
    }
}

async fn write_frame<W>(writer: &mut W, frame: &Frame, buf: &mut Vec<u8>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    frame.marshal(buf)?;
    writer.write_all(buf).await?;
    writer.flush().await?;
    Ok(())
}
