// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Signed root announcements.
//!
//! The node with the strongest key announces itself as root; every node
//! forwarding the announcement to a peer appends a signature naming the port
//! the announcement left through. The resulting chain enumerates the tree
//! path root → … → sender, and its destination ports are the receiver's
//! coordinates.

use super::coords::Coordinates;
use super::varu::{decode_varu64, encode_varu64};
use crate::error::{Error, Result};
use crate::types::{keys, Keypair, PublicKey, PUBLIC_KEY_LEN, SIGNATURE_LEN};

/// One hop of an announcement signature chain.
#[derive(Clone, PartialEq, Eq, custom_debug::Debug)]
pub struct AnnouncementSignature {
    /// The key that signed this hop.
    pub public_key: PublicKey,
    /// The signer's port through which the announcement was forwarded.
    pub destination_port: u64,
    /// ed25519 signature over the announcement up to and including this hop's
    /// key and port.
    #[debug(skip)]
    pub signature: [u8; SIGNATURE_LEN],
}

/// A root announcement as consumed from (and produced for) peers.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RootAnnouncement {
    /// The root's public key.
    pub root: PublicKey,
    /// The root's announcement sequence number.
    pub sequence: u64,
    /// The signature chain from root to sender; empty for a self-origin
    /// announcement that has not crossed a link yet.
    pub signatures: Vec<AnnouncementSignature>,
}

impl RootAnnouncement {
    /// The announcement a node makes about itself when it considers itself
    /// the root.
    pub fn origin(root: PublicKey, sequence: u64) -> Self {
        Self {
            root,
            sequence,
            signatures: Vec::new(),
        }
    }

    /// The coordinates of whoever this announcement was sent to: every
    /// destination port of the chain.
    pub fn coords(&self) -> Coordinates {
        Coordinates::new(self.signatures.iter().map(|s| s.destination_port).collect())
    }

    /// The coordinates of the sender of this announcement: the chain's ports
    /// minus the final hop.
    pub fn sender_coords(&self) -> Coordinates {
        let ports = self.signatures.iter().map(|s| s.destination_port);
        let count = self.signatures.len().saturating_sub(1);
        Coordinates::new(ports.take(count).collect())
    }

    /// The key that last signed this announcement, i.e. the peer it was
    /// received from. `None` for a self-origin announcement.
    pub fn sender(&self) -> Option<PublicKey> {
        self.signatures.last().map(|s| s.public_key)
    }

    /// True iff `key` appears anywhere in the chain (or is the root).
    pub fn contains(&self, key: &PublicKey) -> bool {
        self.root == *key || self.signatures.iter().any(|s| s.public_key == *key)
    }

    /// Returns this announcement extended by one hop: signed with `keypair`,
    /// leaving through `destination_port`.
    pub(crate) fn append_signature(&self, keypair: &Keypair, destination_port: u64) -> Self {
        let public_key = PublicKey::from(keypair);
        let input = self.signing_input(&public_key, destination_port);
        let signature = keys::sign(keypair, &input);
        let mut extended = self.clone();
        extended.signatures.push(AnnouncementSignature {
            public_key,
            destination_port,
            signature,
        });
        extended
    }

    /// Verifies the whole chain: the first signer must be the root, every
    /// signature must verify over its prefix, ports must be nonzero, and no
    /// key may sign twice.
    pub fn verify(&self) -> Result<()> {
        if let Some(first) = self.signatures.first() {
            if first.public_key != self.root {
                return Err(Error::InvalidSignature);
            }
        }
        let mut prefix = Self::origin(self.root, self.sequence);
        for hop in &self.signatures {
            if hop.destination_port == 0 {
                return Err(Error::Unmarshal("announcement via port zero"));
            }
            if prefix.signatures.iter().any(|s| s.public_key == hop.public_key) {
                return Err(Error::Unmarshal("announcement signature loop"));
            }
            let input = prefix.signing_input(&hop.public_key, hop.destination_port);
            hop.public_key.verify(&input, &hop.signature)?;
            prefix.signatures.push(hop.clone());
        }
        Ok(())
    }

    // The byte string a hop signs: the announcement so far, then the new
    // signer's key and port.
    fn signing_input(&self, next_key: &PublicKey, next_port: u64) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(self.root.as_bytes());
        encode_varu64(self.sequence, &mut out);
        for hop in &self.signatures {
            out.extend_from_slice(hop.public_key.as_bytes());
            encode_varu64(hop.destination_port, &mut out);
            out.extend_from_slice(&hop.signature);
        }
        out.extend_from_slice(next_key.as_bytes());
        encode_varu64(next_port, &mut out);
        out
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.root.as_bytes());
        encode_varu64(self.sequence, out);
        encode_varu64(self.signatures.len() as u64, out);
        for hop in &self.signatures {
            out.extend_from_slice(hop.public_key.as_bytes());
            encode_varu64(hop.destination_port, out);
            out.extend_from_slice(&hop.signature);
        }
    }

    /// Decodes an announcement from the front of `buf`, returning it and the
    /// number of bytes consumed.
    pub(crate) fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let root_bytes: [u8; PUBLIC_KEY_LEN] = buf
            .get(..PUBLIC_KEY_LEN)
            .and_then(|b| b.try_into().ok())
            .ok_or(Error::PayloadTooShort("announcement root"))?;
        let mut offset = PUBLIC_KEY_LEN;
        let (sequence, consumed) = decode_varu64(&buf[offset..])?;
        offset += consumed;
        let (count, consumed) = decode_varu64(&buf[offset..])?;
        offset += consumed;
        if count > u64::from(u8::MAX) {
            return Err(Error::Unmarshal("announcement chain too long"));
        }
        let mut signatures = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let public_key: [u8; PUBLIC_KEY_LEN] = buf
                .get(offset..offset + PUBLIC_KEY_LEN)
                .and_then(|b| b.try_into().ok())
                .ok_or(Error::PayloadTooShort("announcement signer key"))?;
            offset += PUBLIC_KEY_LEN;
            let (destination_port, consumed) = decode_varu64(&buf[offset..])?;
            offset += consumed;
            let signature: [u8; SIGNATURE_LEN] = buf
                .get(offset..offset + SIGNATURE_LEN)
                .and_then(|b| b.try_into().ok())
                .ok_or(Error::PayloadTooShort("announcement signature"))?;
            offset += SIGNATURE_LEN;
            signatures.push(AnnouncementSignature {
                public_key: PublicKey::from_bytes(public_key),
                destination_port,
                signature,
            });
        }
        Ok((
            Self {
                root: PublicKey::from_bytes(root_bytes),
                sequence,
                signatures,
            },
            offset,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::gen_keypair;

    fn three_hop_chain() -> (RootAnnouncement, Vec<Keypair>) {
        let keypairs: Vec<_> = (0..3).map(|_| gen_keypair()).collect();
        let root = PublicKey::from(&keypairs[0]);
        let announcement = RootAnnouncement::origin(root, 7)
            .append_signature(&keypairs[0], 2)
            .append_signature(&keypairs[1], 5)
            .append_signature(&keypairs[2], 1);
        (announcement, keypairs)
    }

    #[test]
    fn chain_verifies_and_exposes_coords() -> eyre::Result<()> {
        let (announcement, keypairs) = three_hop_chain();

        announcement.verify()?;
        assert_eq!(announcement.coords(), Coordinates::new(vec![2, 5, 1]));
        assert_eq!(announcement.sender_coords(), Coordinates::new(vec![2, 5]));
        assert_eq!(announcement.sender(), Some(PublicKey::from(&keypairs[2])));
        Ok(())
    }

    #[test]
    fn tampered_chain_is_rejected() {
        let (mut announcement, _) = three_hop_chain();
        announcement.signatures[1].destination_port = 9;
        assert!(announcement.verify().is_err());

        let (mut announcement, _) = three_hop_chain();
        announcement.sequence += 1;
        assert!(announcement.verify().is_err());
    }

    #[test]
    fn first_signer_must_be_root() {
        let (mut announcement, _) = three_hop_chain();
        announcement.root = PublicKey::ZERO;
        assert!(announcement.verify().is_err());
    }

    #[test]
    fn repeated_signer_is_rejected() {
        let keypair = gen_keypair();
        let root = PublicKey::from(&keypair);
        let announcement = RootAnnouncement::origin(root, 1)
            .append_signature(&keypair, 2)
            .append_signature(&keypair, 3);
        assert!(announcement.verify().is_err());
    }

    #[test]
    fn encode_decode_roundtrip() -> eyre::Result<()> {
        let (announcement, _) = three_hop_chain();
        let mut out = Vec::new();
        announcement.encode(&mut out);
        let (decoded, consumed) = RootAnnouncement::decode(&out)?;
        assert_eq!(decoded, announcement);
        assert_eq!(consumed, out.len());
        Ok(())
    }
}
