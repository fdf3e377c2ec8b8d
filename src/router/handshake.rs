// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The pre-attach handshake.
//!
//! Both sides send four header bytes `{version, capabilities, 0, 0}`, their
//! 32-byte public key, and a 64-byte signature over the preceding bytes.
//! Versions must match exactly; our required capabilities must all be
//! offered. The read runs under the keepalive deadline, which is cleared
//! once the peer is attached.

use crate::error::{Error, Result};
use crate::types::{keys, Keypair, PublicKey, PUBLIC_KEY_LEN, SIGNATURE_LEN};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

pub(crate) const HANDSHAKE_VERSION: u8 = 1;
pub(crate) const HANDSHAKE_CAPABILITIES: u8 = 0b0000_0001;

const HEADER_LEN: usize = 4;
const SIGNED_LEN: usize = HEADER_LEN + PUBLIC_KEY_LEN;
const GREETING_LEN: usize = SIGNED_LEN + SIGNATURE_LEN;

/// Runs the handshake over `stream`, returning the peer's verified public
/// key.
pub(crate) async fn exchange<S>(
    stream: &mut S,
    keypair: &Keypair,
    read_deadline: Duration,
) -> Result<PublicKey>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let our_key = PublicKey::from(keypair);
    let mut ours = [0u8; GREETING_LEN];
    ours[0] = HANDSHAKE_VERSION;
    ours[1] = HANDSHAKE_CAPABILITIES;
    ours[HEADER_LEN..SIGNED_LEN].copy_from_slice(our_key.as_bytes());
    let signature = keys::sign(keypair, &ours[..SIGNED_LEN]);
    ours[SIGNED_LEN..].copy_from_slice(&signature);
    stream.write_all(&ours).await?;
    stream.flush().await?;

    let mut theirs = [0u8; GREETING_LEN];
    timeout(read_deadline, stream.read_exact(&mut theirs))
        .await
        .map_err(|_| {
            Error::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "handshake read deadline elapsed",
            ))
        })??;

    if theirs[0] != HANDSHAKE_VERSION {
        return Err(Error::HandshakeVersionMismatch {
            ours: HANDSHAKE_VERSION,
            theirs: theirs[0],
        });
    }
    if theirs[1] & HANDSHAKE_CAPABILITIES != HANDSHAKE_CAPABILITIES {
        return Err(Error::HandshakeCapabilityMismatch {
            required: HANDSHAKE_CAPABILITIES,
            offered: theirs[1],
        });
    }
    let key_bytes: [u8; PUBLIC_KEY_LEN] = theirs[HEADER_LEN..SIGNED_LEN]
        .try_into()
        .map_err(|_| Error::HandshakeSignature)?;
    let peer_key = PublicKey::from_bytes(key_bytes);
    peer_key
        .verify(&theirs[..SIGNED_LEN], &theirs[SIGNED_LEN..])
        .map_err(|_| Error::HandshakeSignature)?;
    Ok(peer_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::gen_keypair;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn both_sides_learn_the_right_key() -> eyre::Result<()> {
        let (mut left, mut right) = tokio::io::duplex(1024);
        let keypair_a = gen_keypair();
        let keypair_b = gen_keypair();
        let key_a = PublicKey::from(&keypair_a);
        let key_b = PublicKey::from(&keypair_b);

        let deadline = Duration::from_secs(1);
        let (got_b, got_a) = tokio::try_join!(
            exchange(&mut left, &keypair_a, deadline),
            exchange(&mut right, &keypair_b, deadline),
        )?;

        assert_eq!(got_b, key_b);
        assert_eq!(got_a, key_a);
        Ok(())
    }

    #[tokio::test]
    async fn wrong_version_is_rejected() {
        let (mut left, mut right) = tokio::io::duplex(1024);
        let keypair = gen_keypair();
        let deadline = Duration::from_secs(1);

        // hand-craft a greeting with a bad version byte
        let impostor = tokio::spawn(async move {
            let other = gen_keypair();
            let other_key = PublicKey::from(&other);
            let mut greeting = [0u8; GREETING_LEN];
            greeting[0] = HANDSHAKE_VERSION + 1;
            greeting[1] = HANDSHAKE_CAPABILITIES;
            greeting[HEADER_LEN..SIGNED_LEN].copy_from_slice(other_key.as_bytes());
            let signature = keys::sign(&other, &greeting[..SIGNED_LEN]);
            greeting[SIGNED_LEN..].copy_from_slice(&signature);
            right.write_all(&greeting).await
        });

        let result = exchange(&mut left, &keypair, deadline).await;
        assert_matches!(result, Err(Error::HandshakeVersionMismatch { .. }));
        assert!(impostor.await.expect("task").is_ok());
    }

    #[tokio::test]
    async fn bad_signature_is_rejected() {
        let (mut left, mut right) = tokio::io::duplex(1024);
        let keypair = gen_keypair();
        let deadline = Duration::from_secs(1);

        let impostor = tokio::spawn(async move {
            let other = gen_keypair();
            // claim a key the signature does not belong to
            let claimed = PublicKey::from(&gen_keypair());
            let mut greeting = [0u8; GREETING_LEN];
            greeting[0] = HANDSHAKE_VERSION;
            greeting[1] = HANDSHAKE_CAPABILITIES;
            greeting[HEADER_LEN..SIGNED_LEN].copy_from_slice(claimed.as_bytes());
            let signature = keys::sign(&other, &greeting[..SIGNED_LEN]);
            greeting[SIGNED_LEN..].copy_from_slice(&signature);
            right.write_all(&greeting).await
        });

        let result = exchange(&mut left, &keypair, deadline).await;
        assert_matches!(result, Err(Error::HandshakeSignature));
        assert!(impostor.await.expect("task").is_ok());
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let (mut left, _right) = tokio::io::duplex(1024);
        let keypair = gen_keypair();

        let result = exchange(&mut left, &keypair, Duration::from_millis(50)).await;
        assert_matches!(result, Err(Error::Io(_)));
    }
}
