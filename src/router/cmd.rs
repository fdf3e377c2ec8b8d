// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

use crate::types::Port;
use crate::wire::Frame;
use std::fmt;

/// Command for the router actor. All snake and tree state mutation happens
/// through these, serialised by the dispatcher.
#[derive(Debug)]
pub(crate) enum Cmd {
    /// Handle `frame` received through the peer on `sender`.
    HandleFrame { sender: Port, frame: Frame },
    /// The periodic snake maintenance tick.
    MaintainSnake,
    /// Send a fresh bootstrap now, e.g. after the ascending path was torn
    /// down.
    Bootstrap,
    /// A peer's connection died or it was asked to detach.
    HandlePeerLost(Port),
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cmd::HandleFrame { sender, frame } => {
                write!(f, "HandleFrame {} from port {}", frame.frame_type, sender)
            }
            Cmd::MaintainSnake => write!(f, "MaintainSnake"),
            Cmd::Bootstrap => write!(f, "Bootstrap"),
            Cmd::HandlePeerLost(port) => write!(f, "HandlePeerLost {}", port),
        }
    }
}
