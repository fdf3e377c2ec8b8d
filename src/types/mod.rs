// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Identity and addressing primitives.

pub(crate) mod keys;
pub(crate) mod log_markers;

pub use keys::{gen_keypair, Keypair, PublicKey, PUBLIC_KEY_LEN, SIGNATURE_LEN};

use hex_fmt::HexFmt;
use std::fmt;

/// Constant byte length of a [`PathId`].
pub const PATH_ID_LEN: usize = 8;

/// A random nonce chosen by a bootstrap originator, disambiguating concurrent
/// snake paths between the same pair of keys.
#[derive(Ord, PartialOrd, Clone, Copy, Eq, PartialEq, Hash, custom_debug::Debug)]
pub struct PathId(#[debug(with = "Self::fmt_bytes")] [u8; PATH_ID_LEN]);

impl PathId {
    /// Generates a new `PathId` with random content.
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// Constructs a `PathId` from its wire bytes.
    pub fn from_bytes(bytes: [u8; PATH_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// The wire bytes of this id.
    pub fn as_bytes(&self) -> &[u8; PATH_ID_LEN] {
        &self.0
    }

    fn fmt_bytes(bytes: &[u8; PATH_ID_LEN], f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", HexFmt(bytes))
    }
}

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", HexFmt(&self.0))
    }
}

/// A peer slot number in `0..=255`.
///
/// Port 0 is reserved for the local router itself: it behaves as a peer for
/// routing purposes, is never dropped, and means "deliver locally".
#[derive(Ord, PartialOrd, Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct Port(pub u8);

impl Port {
    /// The local router's own port.
    pub const LOCAL: Port = Port(0);

    /// True iff this is the local router's port.
    pub fn is_local(self) -> bool {
        self.0 == 0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
