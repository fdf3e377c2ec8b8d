// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The wire format.
//!
//! Every frame starts with an 8-byte envelope: 4 magic bytes, a version
//! byte, a type byte and the total frame length as u16-BE. The body layout
//! is fixed per frame type. The format is frozen: marshalling a frame and
//! unmarshalling the bytes yields the identical frame, byte for byte, across
//! versions of this crate.

mod announcement;
mod coords;
pub(crate) mod snake;
pub(crate) mod varu;

pub use announcement::{AnnouncementSignature, RootAnnouncement};
pub use coords::Coordinates;

use crate::error::{Error, Result};
use crate::types::{PublicKey, PUBLIC_KEY_LEN};
use bytes::Bytes;
use std::fmt;

/// The 4 magic bytes opening every frame.
pub const FRAME_MAGIC: [u8; 4] = *b"mesh";

/// The wire format version this crate speaks.
pub const WIRE_VERSION: u8 = 1;

/// Byte length of the frame envelope.
pub const FRAME_HEADER_LEN: usize = 8;

/// The largest frame the envelope's u16 length can carry.
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// Wire-fixed frame type tags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum FrameType {
    /// A signed root announcement from a peer.
    TreeAnnouncement = 1,
    /// A coordinate-addressed ping, echoed by its destination.
    TreePing = 2,
    /// A key-addressed ping, echoed by its destination.
    SnekPing = 3,
    /// Coordinate-addressed payload traffic.
    TreeRouted = 4,
    /// Key-addressed payload traffic.
    SnekRouted = 5,
    /// A snake bootstrap, climbing toward the next higher key.
    VirtualSnakeBootstrap = 6,
    /// The tree-routed answer to a bootstrap.
    VirtualSnakeBootstrapAck = 7,
    /// Path installation, tree-routed from the bootstrap originator.
    VirtualSnakeSetup = 8,
    /// Path removal, following an installed path hop by hop.
    VirtualSnakeTeardown = 9,
}

impl FrameType {
    fn from_wire(tag: u8) -> Result<Self> {
        Ok(match tag {
            1 => Self::TreeAnnouncement,
            2 => Self::TreePing,
            3 => Self::SnekPing,
            4 => Self::TreeRouted,
            5 => Self::SnekRouted,
            6 => Self::VirtualSnakeBootstrap,
            7 => Self::VirtualSnakeBootstrapAck,
            8 => Self::VirtualSnakeSetup,
            9 => Self::VirtualSnakeTeardown,
            _ => return Err(Error::Unmarshal("unknown frame type")),
        })
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A parsed frame.
///
/// Which fields are meaningful depends on [`FrameType`]; fields a type does
/// not carry are left at their zero values and are not marshalled.
#[derive(Clone, PartialEq, Eq, custom_debug::Debug)]
pub struct Frame {
    /// The frame type tag.
    pub frame_type: FrameType,
    /// Source coordinates, for tree-routed types.
    pub source: Coordinates,
    /// Destination coordinates, for tree-routed types.
    pub destination: Coordinates,
    /// Source key, for key-addressed types.
    pub source_key: PublicKey,
    /// Destination key, for key-addressed types.
    pub destination_key: PublicKey,
    /// Opaque payload bytes.
    #[debug(skip)]
    pub payload: Bytes,
}

impl Frame {
    /// A frame of the given type with all fields at their zero values.
    pub fn new(frame_type: FrameType) -> Self {
        Self {
            frame_type,
            source: Coordinates::default(),
            destination: Coordinates::default(),
            source_key: PublicKey::ZERO,
            destination_key: PublicKey::ZERO,
            payload: Bytes::new(),
        }
    }

    /// Marshals the frame into `out`, clearing it first.
    pub fn marshal(&self, out: &mut Vec<u8>) -> Result<()> {
        out.clear();
        out.extend_from_slice(&FRAME_MAGIC);
        out.push(WIRE_VERSION);
        out.push(self.frame_type as u8);
        out.extend_from_slice(&[0, 0]); // length, patched below

        match self.frame_type {
            FrameType::TreeAnnouncement => {
                out.extend_from_slice(&self.payload);
            }
            FrameType::TreePing => {
                self.source.encode(out)?;
                self.destination.encode(out)?;
                out.extend_from_slice(&self.payload);
            }
            FrameType::SnekPing => {
                out.extend_from_slice(self.source_key.as_bytes());
                out.extend_from_slice(self.destination_key.as_bytes());
                out.extend_from_slice(&self.payload);
            }
            FrameType::TreeRouted => {
                self.source.encode(out)?;
                self.destination.encode(out)?;
                out.extend_from_slice(self.source_key.as_bytes());
                out.extend_from_slice(&self.payload);
            }
            FrameType::SnekRouted => {
                out.extend_from_slice(self.source_key.as_bytes());
                out.extend_from_slice(self.destination_key.as_bytes());
                out.extend_from_slice(&self.payload);
            }
            FrameType::VirtualSnakeBootstrap => {
                out.extend_from_slice(self.destination_key.as_bytes());
                self.source.encode(out)?;
                out.extend_from_slice(&self.payload);
            }
            FrameType::VirtualSnakeBootstrapAck => {
                self.destination.encode(out)?;
                self.source.encode(out)?;
                out.extend_from_slice(self.destination_key.as_bytes());
                out.extend_from_slice(self.source_key.as_bytes());
                out.extend_from_slice(&self.payload);
            }
            FrameType::VirtualSnakeSetup => {
                self.destination.encode(out)?;
                out.extend_from_slice(self.source_key.as_bytes());
                out.extend_from_slice(self.destination_key.as_bytes());
                out.extend_from_slice(&self.payload);
            }
            FrameType::VirtualSnakeTeardown => {
                out.extend_from_slice(self.destination_key.as_bytes());
                out.extend_from_slice(&self.payload);
            }
        }

        let total = u16::try_from(out.len()).map_err(|_| Error::FrameTooLarge)?;
        out[6..8].copy_from_slice(&total.to_be_bytes());
        Ok(())
    }

    /// Unmarshals one frame from the front of `buf`, returning it and the
    /// number of bytes consumed.
    pub fn unmarshal(buf: &[u8]) -> Result<(Self, usize)> {
        let header = buf
            .get(..FRAME_HEADER_LEN)
            .ok_or(Error::PayloadTooShort("frame header"))?;
        if header[..4] != FRAME_MAGIC {
            return Err(Error::Unmarshal("bad magic"));
        }
        if header[4] != WIRE_VERSION {
            return Err(Error::Unmarshal("unknown wire version"));
        }
        let frame_type = FrameType::from_wire(header[5])?;
        let total = u16::from_be_bytes([header[6], header[7]]) as usize;
        if total < FRAME_HEADER_LEN {
            return Err(Error::Unmarshal("frame length below header size"));
        }
        let body = buf
            .get(FRAME_HEADER_LEN..total)
            .ok_or(Error::PayloadTooShort("frame body"))?;

        let mut frame = Frame::new(frame_type);
        let mut offset = 0;
        match frame_type {
            FrameType::TreeAnnouncement => {}
            FrameType::TreePing => {
                let (source, consumed) = Coordinates::decode(body)?;
                offset += consumed;
                let (destination, consumed) = Coordinates::decode(&body[offset..])?;
                offset += consumed;
                frame.source = source;
                frame.destination = destination;
            }
            FrameType::SnekPing | FrameType::SnekRouted => {
                frame.source_key = read_key(body, &mut offset)?;
                frame.destination_key = read_key(body, &mut offset)?;
            }
            FrameType::TreeRouted => {
                let (source, consumed) = Coordinates::decode(body)?;
                offset += consumed;
                let (destination, consumed) = Coordinates::decode(&body[offset..])?;
                offset += consumed;
                frame.source = source;
                frame.destination = destination;
                frame.source_key = read_key(body, &mut offset)?;
            }
            FrameType::VirtualSnakeBootstrap => {
                frame.destination_key = read_key(body, &mut offset)?;
                let (source, consumed) = Coordinates::decode(&body[offset..])?;
                offset += consumed;
                frame.source = source;
            }
            FrameType::VirtualSnakeBootstrapAck => {
                let (destination, consumed) = Coordinates::decode(body)?;
                offset += consumed;
                let (source, consumed) = Coordinates::decode(&body[offset..])?;
                offset += consumed;
                frame.destination = destination;
                frame.source = source;
                frame.destination_key = read_key(body, &mut offset)?;
                frame.source_key = read_key(body, &mut offset)?;
            }
            FrameType::VirtualSnakeSetup => {
                let (destination, consumed) = Coordinates::decode(body)?;
                offset += consumed;
                frame.destination = destination;
                frame.source_key = read_key(body, &mut offset)?;
                frame.destination_key = read_key(body, &mut offset)?;
            }
            FrameType::VirtualSnakeTeardown => {
                frame.destination_key = read_key(body, &mut offset)?;
            }
        }
        frame.payload = Bytes::copy_from_slice(&body[offset..]);
        Ok((frame, total))
    }
}

fn read_key(body: &[u8], offset: &mut usize) -> Result<PublicKey> {
    let bytes: [u8; PUBLIC_KEY_LEN] = body
        .get(*offset..*offset + PUBLIC_KEY_LEN)
        .and_then(|b| b.try_into().ok())
        .ok_or(Error::PayloadTooShort("frame key field"))?;
    *offset += PUBLIC_KEY_LEN;
    Ok(PublicKey::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_frames() -> Vec<Frame> {
        let key_a = PublicKey::from_bytes([0x11; PUBLIC_KEY_LEN]);
        let key_b = PublicKey::from_bytes([0x22; PUBLIC_KEY_LEN]);
        vec![
            Frame {
                payload: Bytes::from_static(b"announcement bytes"),
                ..Frame::new(FrameType::TreeAnnouncement)
            },
            Frame {
                source: Coordinates::new(vec![1, 2]),
                destination: Coordinates::new(vec![3]),
                payload: Bytes::from_static(&[0]),
                ..Frame::new(FrameType::TreePing)
            },
            Frame {
                source_key: key_a,
                destination_key: key_b,
                payload: Bytes::from_static(&[1]),
                ..Frame::new(FrameType::SnekPing)
            },
            Frame {
                source: Coordinates::new(vec![7]),
                destination: Coordinates::new(vec![1, 1, 300]),
                source_key: key_a,
                payload: Bytes::from_static(b"tree traffic"),
                ..Frame::new(FrameType::TreeRouted)
            },
            Frame {
                source_key: key_b,
                destination_key: key_a,
                payload: Bytes::from_static(b"snek traffic"),
                ..Frame::new(FrameType::SnekRouted)
            },
            Frame {
                destination_key: key_a,
                source: Coordinates::new(vec![4, 2]),
                payload: Bytes::from_static(b"bootstrap"),
                ..Frame::new(FrameType::VirtualSnakeBootstrap)
            },
            Frame {
                destination: Coordinates::new(vec![4, 2]),
                source: Coordinates::new(vec![9]),
                destination_key: key_a,
                source_key: key_b,
                payload: Bytes::from_static(b"ack"),
                ..Frame::new(FrameType::VirtualSnakeBootstrapAck)
            },
            Frame {
                destination: Coordinates::new(vec![9]),
                source_key: key_a,
                destination_key: key_b,
                payload: Bytes::from_static(b"setup"),
                ..Frame::new(FrameType::VirtualSnakeSetup)
            },
            Frame {
                destination_key: key_a,
                payload: Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8]),
                ..Frame::new(FrameType::VirtualSnakeTeardown)
            },
        ]
    }

    #[test]
    fn marshal_unmarshal_is_identity_for_every_type() -> eyre::Result<()> {
        let mut out = Vec::new();
        for frame in sample_frames() {
            frame.marshal(&mut out)?;
            let (decoded, consumed) = Frame::unmarshal(&out)?;
            assert_eq!(consumed, out.len());
            assert_eq!(decoded, frame, "frame type {}", frame.frame_type);
        }
        Ok(())
    }

    #[test]
    fn envelope_layout_is_frozen() -> eyre::Result<()> {
        let frame = Frame {
            destination_key: PublicKey::from_bytes([0xee; PUBLIC_KEY_LEN]),
            payload: Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8]),
            ..Frame::new(FrameType::VirtualSnakeTeardown)
        };
        let mut out = Vec::new();
        frame.marshal(&mut out)?;

        assert_eq!(&out[..4], b"mesh");
        assert_eq!(out[4], WIRE_VERSION);
        assert_eq!(out[5], 9);
        assert_eq!(u16::from_be_bytes([out[6], out[7]]) as usize, out.len());
        assert_eq!(out.len(), FRAME_HEADER_LEN + PUBLIC_KEY_LEN + 8);
        Ok(())
    }

    #[test]
    fn rejects_bad_envelope() {
        let mut out = Vec::new();
        sample_frames()[0].marshal(&mut out).unwrap();

        let mut bad_magic = out.clone();
        bad_magic[0] = b'x';
        assert!(Frame::unmarshal(&bad_magic).is_err());

        let mut bad_version = out.clone();
        bad_version[4] = 0xff;
        assert!(Frame::unmarshal(&bad_version).is_err());

        let mut bad_type = out.clone();
        bad_type[5] = 0;
        assert!(Frame::unmarshal(&bad_type).is_err());

        assert!(Frame::unmarshal(&out[..out.len() - 1]).is_err());
    }

    proptest! {
        #[test]
        fn snek_routed_roundtrip(
            source in any::<[u8; PUBLIC_KEY_LEN]>(),
            destination in any::<[u8; PUBLIC_KEY_LEN]>(),
            payload in proptest::collection::vec(any::<u8>(), 0..512),
        ) {
            let frame = Frame {
                source_key: PublicKey::from_bytes(source),
                destination_key: PublicKey::from_bytes(destination),
                payload: Bytes::from(payload),
                ..Frame::new(FrameType::SnekRouted)
            };
            let mut out = Vec::new();
            frame.marshal(&mut out).unwrap();
            let (decoded, _) = Frame::unmarshal(&out).unwrap();
            prop_assert_eq!(decoded, frame);
        }
    }
}
