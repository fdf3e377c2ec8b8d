// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! An overlay mesh router for nodes identified by 32-byte ed25519 public keys.
//!
//! Two routing structures are maintained over the peering graph: a spanning
//! tree, giving every node a set of coordinates usable for greedy
//! coordinate-addressed forwarding, and a virtual snake, a doubly-linked
//! ordering of the whole network in keyspace that supports key-addressed
//! (SNEK) forwarding. The snake is maintained by a bootstrap / setup /
//! teardown protocol running between each node and its nearest keyspace
//! neighbours, driven by a periodic maintenance tick.
//!
//! The [`Router`] owns all routing state behind a single-writer actor; peers
//! are attached over any `AsyncRead + AsyncWrite` byte stream after a signed
//! handshake.

// Forbid some very bad patterns. Forbid is stronger than `deny`, preventing us from suppressing the
// lint with `#[allow(...)]` et-all.
#![forbid(
    arithmetic_overflow,
    mutable_transmutes,
    no_mangle_const_items,
    unknown_crate_types,
    unsafe_code
)]
// Turn on some additional warnings to encourage good style.
#![warn(
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results,
    clippy::unicode_not_nfc
)]

#[macro_use]
extern crate tracing;

mod error;
mod router;
mod types;
mod wire;

pub use error::{Error, Result};
pub use router::{Config, PeerType, Router, PORT_COUNT, TRAFFIC_BUFFER};
pub use types::{
    gen_keypair, Keypair, PathId, Port, PublicKey, PATH_ID_LEN, PUBLIC_KEY_LEN, SIGNATURE_LEN,
};
pub use wire::{
    AnnouncementSignature, Coordinates, Frame, FrameType, RootAnnouncement, FRAME_HEADER_LEN,
    FRAME_MAGIC, MAX_FRAME_SIZE, WIRE_VERSION,
};

use tracing_core::{Event, Subscriber};
use tracing_subscriber::{
    fmt::{
        format::Writer,
        time::{FormatTime, SystemTime},
        FmtContext, FormatEvent, FormatFields, FormattedFields,
    },
    registry::LookupSpan,
};

#[cfg(test)]
use std::sync::Once;

// continuation prefix for the span/field lines under an event header
const SPAN_INDENT: &str = "\t> ";

/// Event formatter used by router nodes and tests: a header line with the
/// level, time and source location, then the span chain (with each span's
/// fields) and the event's own fields on indented continuation lines.
/// Multi-node test logs interleave, so every line a node prints carries its
/// spans.
#[derive(Default, Debug)]
pub struct LogFormatter;

impl<S, N> FormatEvent<S, N> for LogFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        write!(writer, " {} ", meta.level())?;
        SystemTime::default().format_time(&mut writer)?;
        writeln!(
            writer,
            " [{}:L{}]:",
            meta.file().unwrap_or("<unknown>"),
            meta.line().unwrap_or(0),
        )?;

        write!(writer, "{}", SPAN_INDENT)?;
        ctx.visit_spans(|span| {
            write!(writer, "{} ", span.name())?;
            if let Some(fields) = span.extensions().get::<FormattedFields<N>>() {
                if !fields.is_empty() {
                    write!(writer, "{{{}}}", fields)?;
                }
            }
            write!(writer, "\n{}", SPAN_INDENT)
        })?;

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

#[cfg(test)]
static LOGGER: Once = Once::new();

#[cfg(test)]
/// Installs the test tracing subscriber, honouring `RUST_LOG`. Every test
/// may call this; only the first call installs anything.
pub(crate) fn init_test_logger() {
    LOGGER.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_thread_names(true)
            .with_target(false)
            .with_ansi(false)
            .event_format(LogFormatter)
            .init();
    });
}
