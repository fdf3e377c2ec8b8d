// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Payload codecs for the snake maintenance frames.

use super::varu::{decode_varu64, encode_varu64};
use crate::error::{Error, Result};
use crate::types::{PathId, PublicKey, PATH_ID_LEN, PUBLIC_KEY_LEN};
use bytes::Bytes;

/// The payload carried by bootstrap, bootstrap-ACK and setup frames:
/// `path_id (8) || root (32) || sequence (varu64)`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct SnakePathPayload {
    pub(crate) path_id: PathId,
    pub(crate) root: PublicKey,
    pub(crate) root_sequence: u64,
}

impl SnakePathPayload {
    pub(crate) fn encode(&self) -> Bytes {
        let mut out = Vec::with_capacity(PATH_ID_LEN + PUBLIC_KEY_LEN + 2);
        out.extend_from_slice(self.path_id.as_bytes());
        out.extend_from_slice(self.root.as_bytes());
        encode_varu64(self.root_sequence, &mut out);
        Bytes::from(out)
    }

    pub(crate) fn decode(buf: &[u8]) -> Result<Self> {
        let path_id: [u8; PATH_ID_LEN] = buf
            .get(..PATH_ID_LEN)
            .and_then(|b| b.try_into().ok())
            .ok_or(Error::PayloadTooShort("snake path id"))?;
        let root: [u8; PUBLIC_KEY_LEN] = buf
            .get(PATH_ID_LEN..PATH_ID_LEN + PUBLIC_KEY_LEN)
            .and_then(|b| b.try_into().ok())
            .ok_or(Error::PayloadTooShort("snake root key"))?;
        let (root_sequence, _) = decode_varu64(&buf[PATH_ID_LEN + PUBLIC_KEY_LEN..])?;
        Ok(Self {
            path_id: PathId::from_bytes(path_id),
            root: PublicKey::from_bytes(root),
            root_sequence,
        })
    }
}

/// The payload carried by teardown frames: `path_id (8)`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct TeardownPayload {
    pub(crate) path_id: PathId,
}

impl TeardownPayload {
    pub(crate) fn encode(&self) -> Bytes {
        Bytes::copy_from_slice(self.path_id.as_bytes())
    }

    pub(crate) fn decode(buf: &[u8]) -> Result<Self> {
        let path_id: [u8; PATH_ID_LEN] = buf
            .get(..PATH_ID_LEN)
            .and_then(|b| b.try_into().ok())
            .ok_or(Error::PayloadTooShort("teardown path id"))?;
        Ok(Self {
            path_id: PathId::from_bytes(path_id),
        })
    }
}
