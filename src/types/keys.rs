// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

use crate::error::{Error, Result};
use ed25519_dalek::{Signer, Verifier};
use hex_fmt::HexFmt;
use std::fmt;

/// An ed25519 keypair identifying a node.
pub use ed25519_dalek::Keypair;

/// Constant byte length of a [`PublicKey`].
pub const PUBLIC_KEY_LEN: usize = ed25519_dalek::PUBLIC_KEY_LENGTH;

/// Constant byte length of an ed25519 signature on the wire.
pub const SIGNATURE_LEN: usize = ed25519_dalek::SIGNATURE_LENGTH;

/// Generates a fresh node identity keypair.
pub fn gen_keypair() -> Keypair {
    Keypair::generate(&mut rand::rngs::OsRng)
}

/// A node's public identity key.
///
/// Keys are totally ordered (lexicographically on their bytes); this order is
/// what the virtual snake is threaded on. The same bytes double as the
/// ed25519 verifying key for handshakes and announcement signatures.
#[derive(Ord, PartialOrd, Clone, Copy, Eq, PartialEq, Hash, custom_debug::Debug)]
pub struct PublicKey(#[debug(with = "Self::fmt_bytes")] [u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    /// The all-zeroes key, used on the wire where a frame type has no use for
    /// a key field.
    pub const ZERO: PublicKey = PublicKey([0u8; PUBLIC_KEY_LEN]);

    /// Constructs a `PublicKey` from its wire bytes.
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// The wire bytes of this key.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Verifies `signature` over `msg` against this key.
    pub fn verify(&self, msg: &[u8], signature: &[u8]) -> Result<()> {
        let key =
            ed25519_dalek::PublicKey::from_bytes(&self.0).map_err(|_| Error::InvalidSignature)?;
        let signature =
            ed25519_dalek::Signature::try_from(signature).map_err(|_| Error::InvalidSignature)?;
        key.verify(msg, &signature)
            .map_err(|_| Error::InvalidSignature)
    }

    fn fmt_bytes(bytes: &[u8; PUBLIC_KEY_LEN], f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:0.10}", HexFmt(bytes))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:0.10}", HexFmt(&self.0))
    }
}

impl From<&Keypair> for PublicKey {
    fn from(keypair: &Keypair) -> Self {
        Self(keypair.public.to_bytes())
    }
}

/// Signs `msg` with the node identity key, returning the wire signature bytes.
pub(crate) fn sign(keypair: &Keypair, msg: &[u8]) -> [u8; SIGNATURE_LEN] {
    keypair.sign(msg).to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_order_is_lexicographic() {
        let low = PublicKey::from_bytes([0u8; PUBLIC_KEY_LEN]);
        let mut bytes = [0u8; PUBLIC_KEY_LEN];
        bytes[PUBLIC_KEY_LEN - 1] = 1;
        let mid = PublicKey::from_bytes(bytes);
        let high = PublicKey::from_bytes([0xff; PUBLIC_KEY_LEN]);

        assert!(low < mid);
        assert!(mid < high);
    }

    #[test]
    fn sign_verify_roundtrip() {
        let keypair = gen_keypair();
        let key = PublicKey::from(&keypair);
        let signature = sign(&keypair, b"announcement");

        assert!(key.verify(b"announcement", &signature).is_ok());
        assert!(key.verify(b"tampered", &signature).is_err());
    }
}
