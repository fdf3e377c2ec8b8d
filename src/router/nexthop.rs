// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Key-addressed (SNEK) next-hop selection.
//!
//! Two structures are combined: climbing the spanning tree brings a frame
//! into the vicinity of the target key (every ancestor key is a candidate),
//! and the snake table refines the last mile in pure keyspace. A direct
//! peering to the current best key always wins over a multi-hop tree path.

use super::core::Core;
use crate::types::{Port, PublicKey};
use crate::wire::Frame;

/// True iff `b` lies strictly between `a` and `c` on the cyclic keyspace,
/// walking upward from `a` (wrapping at the maximum key) and reaching `b`
/// before `c`. Exactly one of the three rotations holds for distinct keys.
pub(crate) fn dht_ordered(a: &PublicKey, b: &PublicKey, c: &PublicKey) -> bool {
    (a < b && b < c) || (b < c && c < a) || (c < a && a < b)
}

impl Core {
    /// Picks the peer to forward a key-addressed frame through. Never
    /// returns "none": port 0 comes back when no remote candidate improves
    /// upon local state.
    ///
    /// Bootstraps are special-cased twice: they climb toward the root even
    /// though they are addressed to their own originator, and an exact key
    /// match must not capture them (the originator is looking for its
    /// keyspace successor, not itself).
    pub(crate) fn next_hop_snek(&self, frame: &Frame, bootstrap: bool) -> Port {
        let destination_key = frame.destination_key;
        if !bootstrap && destination_key == self.public_key {
            return Port::LOCAL;
        }
        let mut best_key = self.public_key;
        let mut best_port = Port::LOCAL;
        let root = self.root_announcement();

        // the parent first: bootstraps unconditionally start climbing, and
        // anything whose target sits between us and the root goes up too
        if let Some(parent) = self.tree.parent {
            if let Some(peer) = self.peer(parent) {
                if peer.is_started() {
                    if (bootstrap && best_key == destination_key)
                        || dht_ordered(&best_key, &destination_key, &root.root)
                    {
                        best_key = root.root;
                        best_port = parent;
                    }
                    if let Some(announcement) = self.tree.announcements.get(&parent) {
                        for hop in &announcement.signatures {
                            consider(
                                &destination_key,
                                bootstrap,
                                &mut best_key,
                                &mut best_port,
                                hop.public_key,
                                parent,
                            );
                        }
                    }
                }
            }
        }

        // every started peer's advertised ancestry
        for peer in self.started_peers() {
            if let Some(announcement) = self.tree.announcements.get(&peer.port()) {
                for hop in &announcement.signatures {
                    consider(
                        &destination_key,
                        bootstrap,
                        &mut best_key,
                        &mut best_port,
                        hop.public_key,
                        peer.port(),
                    );
                }
            }
        }

        // a direct peering to the best key beats a tree path toward it
        for peer in self.started_peers() {
            if peer.public_key() == best_key {
                best_port = peer.port();
            }
        }

        // snake entries observed locally
        for (index, entry) in self.snake.table.iter() {
            if entry.source.is_local() {
                continue;
            }
            let started = self
                .peer(entry.source)
                .map_or(false, |peer| peer.is_started());
            if !started || !entry.valid(self.config.neighbour_expiry) {
                continue;
            }
            consider(
                &destination_key,
                bootstrap,
                &mut best_key,
                &mut best_port,
                index.public_key,
                entry.source,
            );
        }

        best_port
    }
}

// The checked candidate rule: an exact match wins (never for bootstraps),
// otherwise the candidate must lie strictly between the destination and the
// current best in cyclic order.
fn consider(
    destination_key: &PublicKey,
    bootstrap: bool,
    best_key: &mut PublicKey,
    best_port: &mut Port,
    candidate: PublicKey,
    port: Port,
) {
    let exact = !bootstrap && candidate == *destination_key && *best_key != *destination_key;
    if exact || dht_ordered(destination_key, &candidate, best_key) {
        *best_key = candidate;
        *best_port = port;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PUBLIC_KEY_LEN;
    use proptest::prelude::*;

    fn key(n: u8) -> PublicKey {
        let mut bytes = [0u8; PUBLIC_KEY_LEN];
        bytes[0] = n;
        PublicKey::from_bytes(bytes)
    }

    #[test]
    fn betweenness_with_and_without_wrap() {
        // plain ascending
        assert!(dht_ordered(&key(1), &key(2), &key(3)));
        // wrapping at the top of the keyspace
        assert!(dht_ordered(&key(3), &key(4), &key(1)));
        assert!(dht_ordered(&key(4), &key(1), &key(3)));
        // not between
        assert!(!dht_ordered(&key(1), &key(3), &key(2)));
        // degenerate triples never hold
        assert!(!dht_ordered(&key(1), &key(1), &key(2)));
        assert!(!dht_ordered(&key(1), &key(2), &key(2)));
        assert!(!dht_ordered(&key(2), &key(2), &key(2)));
    }

    proptest! {
        #[test]
        fn exactly_one_rotation_holds(
            a in any::<[u8; PUBLIC_KEY_LEN]>(),
            b in any::<[u8; PUBLIC_KEY_LEN]>(),
            c in any::<[u8; PUBLIC_KEY_LEN]>(),
        ) {
            let (a, b, c) = (
                PublicKey::from_bytes(a),
                PublicKey::from_bytes(b),
                PublicKey::from_bytes(c),
            );
            prop_assume!(a != b && b != c && a != c);
            let rotations = [
                dht_ordered(&a, &b, &c),
                dht_ordered(&b, &c, &a),
                dht_ordered(&c, &a, &b),
            ];
            prop_assert_eq!(rotations.iter().filter(|held| **held).count(), 1);
        }
    }
}
