// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Unsigned varint codec: little-endian 7-bit groups, high bit set on every
//! byte except the last. At most 10 bytes encode a `u64`.

use crate::error::{Error, Result};

pub(crate) const MAX_VARU64_LEN: usize = 10;

pub(crate) fn encode_varu64(mut value: u64, out: &mut Vec<u8>) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Decodes a varu64 from the front of `buf`, returning the value and the
/// number of bytes consumed.
pub(crate) fn decode_varu64(buf: &[u8]) -> Result<(u64, usize)> {
    let mut value = 0u64;
    let mut shift = 0u32;
    for (i, byte) in buf.iter().enumerate() {
        if i >= MAX_VARU64_LEN {
            return Err(Error::Unmarshal("varu64 overlong"));
        }
        let group = u64::from(byte & 0x7f);
        value = group
            .checked_shl(shift)
            .and_then(|shifted| value.checked_add(shifted))
            .ok_or(Error::Unmarshal("varu64 overflows u64"))?;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
    }
    Err(Error::PayloadTooShort("varu64 truncated"))
}
