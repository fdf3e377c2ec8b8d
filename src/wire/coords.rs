// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

use super::varu::{decode_varu64, encode_varu64};
use crate::error::{Error, Result};
use std::fmt;

/// A node's position in the spanning tree: the switch ports traversed on the
/// path from the root down to the node. The root's coordinates are empty.
///
/// Wire encoding is a u16-BE byte length followed by the ports as varu64s.
#[derive(Clone, Default, PartialEq, Eq, Hash, Debug)]
pub struct Coordinates(Vec<u64>);

impl Coordinates {
    /// Constructs coordinates from a port path.
    pub fn new(ports: Vec<u64>) -> Self {
        Self(ports)
    }

    /// The port path from the root.
    pub fn ports(&self) -> &[u64] {
        &self.0
    }

    /// Number of hops below the root.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the root's coordinates.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The number of tree hops between two sets of coordinates: both walk up
    /// to their deepest common ancestor, so the distance is the sum of the
    /// lengths minus twice the shared prefix.
    pub fn distance_to(&self, other: &Coordinates) -> usize {
        let shared = self
            .0
            .iter()
            .zip(other.0.iter())
            .take_while(|(a, b)| a == b)
            .count();
        self.0.len() + other.0.len() - 2 * shared
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        let mut ports = Vec::new();
        for port in &self.0 {
            encode_varu64(*port, &mut ports);
        }
        let len = u16::try_from(ports.len()).map_err(|_| Error::FrameTooLarge)?;
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&ports);
        Ok(())
    }

    /// Decodes coordinates from the front of `buf`, returning them and the
    /// number of bytes consumed.
    pub(crate) fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < 2 {
            return Err(Error::PayloadTooShort("coordinates length prefix"));
        }
        let len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
        let body = buf
            .get(2..2 + len)
            .ok_or(Error::PayloadTooShort("coordinates body"))?;
        let mut ports = Vec::new();
        let mut offset = 0;
        while offset < body.len() {
            let (port, consumed) = decode_varu64(&body[offset..])?;
            ports.push(port);
            offset += consumed;
        }
        Ok((Self(ports), 2 + len))
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[")?;
        for (i, port) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", port)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn distance_counts_hops_through_common_ancestor() {
        let a = Coordinates::new(vec![1, 2, 3]);
        let b = Coordinates::new(vec![1, 2, 5, 7]);
        let root = Coordinates::default();

        assert_eq!(a.distance_to(&a), 0);
        assert_eq!(a.distance_to(&b), 3);
        assert_eq!(b.distance_to(&a), 3);
        assert_eq!(a.distance_to(&root), 3);
        assert_eq!(root.distance_to(&b), 4);
    }

    proptest! {
        #[test]
        fn roundtrip(ports in proptest::collection::vec(any::<u64>(), 0..16)) {
            let coords = Coordinates::new(ports);
            let mut out = Vec::new();
            coords.encode(&mut out).unwrap();
            let (decoded, consumed) = Coordinates::decode(&out).unwrap();
            prop_assert_eq!(decoded, coords);
            prop_assert_eq!(consumed, out.len());
        }
    }
}
