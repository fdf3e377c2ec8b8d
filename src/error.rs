// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

use std::io;
use thiserror::Error;

/// The type returned by the router and frame handling methods.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Internal error.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum Error {
    #[error("All 255 peer ports are in use")]
    NoFreePorts,
    #[error("Peer spoke protocol version {theirs}, we speak {ours}")]
    HandshakeVersionMismatch { ours: u8, theirs: u8 },
    #[error("Peer capabilities {offered:#010b} do not cover required {required:#010b}")]
    HandshakeCapabilityMismatch { required: u8, offered: u8 },
    #[error("Peer handshake signature did not verify")]
    HandshakeSignature,
    #[error("A ping to this destination is already in progress")]
    PingAlreadyInProgress,
    #[error("Ping timed out")]
    PingTimeout,
    #[error("Frame or payload is too short: {0}")]
    PayloadTooShort(&'static str),
    #[error("Could not unmarshal frame: {0}")]
    Unmarshal(&'static str),
    #[error("Frame exceeds the maximum wire size")]
    FrameTooLarge,
    #[error("Signature did not verify")]
    InvalidSignature,
    #[error("The router has been closed")]
    RouterClosed,
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
