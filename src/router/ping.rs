// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! In-flight ping rendezvous.
//!
//! A ping frame is echoed by its destination with source and destination
//! swapped; the originator completes the rendezvous keyed by the destination
//! it addressed. At most one ping per destination may be in flight, which
//! the map's entry API enforces.

use crate::error::{Error, Result};
use crate::types::PublicKey;
use crate::wire::Coordinates;
use bytes::Bytes;
use dashmap::{mapref::entry::Entry, DashMap};
use tokio::sync::oneshot;

const PING_RESPONSE: u8 = 1;

pub(crate) fn request_payload() -> Bytes {
    Bytes::from_static(&[0])
}

pub(crate) fn response_payload() -> Bytes {
    Bytes::from_static(&[PING_RESPONSE])
}

pub(crate) fn is_response(payload: &[u8]) -> bool {
    payload.first() == Some(&PING_RESPONSE)
}

/// The rendezvous maps for both ping flavours. Read and written from
/// arbitrary tasks, hence the concurrent maps.
#[derive(Debug, Default)]
pub(crate) struct Pings {
    snek: DashMap<PublicKey, oneshot::Sender<()>>,
    tree: DashMap<Coordinates, oneshot::Sender<()>>,
}

impl Pings {
    pub(crate) fn begin_snek(&self, destination: PublicKey) -> Result<oneshot::Receiver<()>> {
        match self.snek.entry(destination) {
            Entry::Occupied(_) => Err(Error::PingAlreadyInProgress),
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                let _ = slot.insert(tx);
                Ok(rx)
            }
        }
    }

    pub(crate) fn complete_snek(&self, destination: &PublicKey) {
        if let Some((_, tx)) = self.snek.remove(destination) {
            let _ = tx.send(());
        }
    }

    pub(crate) fn abandon_snek(&self, destination: &PublicKey) {
        let _ = self.snek.remove(destination);
    }

    pub(crate) fn begin_tree(&self, destination: Coordinates) -> Result<oneshot::Receiver<()>> {
        match self.tree.entry(destination) {
            Entry::Occupied(_) => Err(Error::PingAlreadyInProgress),
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                let _ = slot.insert(tx);
                Ok(rx)
            }
        }
    }

    pub(crate) fn complete_tree(&self, destination: &Coordinates) {
        if let Some((_, tx)) = self.tree.remove(destination) {
            let _ = tx.send(());
        }
    }

    pub(crate) fn abandon_tree(&self, destination: &Coordinates) {
        let _ = self.tree.remove(destination);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn one_ping_per_destination() {
        let pings = Pings::default();
        let destination = PublicKey::from_bytes([3; 32]);

        let rx = pings.begin_snek(destination).expect("first ping");
        assert_matches!(
            pings.begin_snek(destination),
            Err(Error::PingAlreadyInProgress)
        );

        pings.complete_snek(&destination);
        assert!(rx.await.is_ok());

        // completed, so a new ping may start
        assert!(pings.begin_snek(destination).is_ok());
    }

    #[tokio::test]
    async fn abandoned_ping_frees_the_slot() {
        let pings = Pings::default();
        let destination = Coordinates::new(vec![1, 2]);

        let _rx = pings.begin_tree(destination.clone()).expect("first ping");
        pings.abandon_tree(&destination);
        assert!(pings.begin_tree(destination).is_ok());
    }
}
