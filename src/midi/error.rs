use std::io;

use thiserror::Error;

/// Errors produced while decoding a MIDI file.
///
/// Every decode error is fatal for the whole parse; there is no
/// partial-track recovery.
#[derive(Debug, Error)]
pub enum FormatError {
    /// A chunk began with the wrong 4-byte tag.
    #[error("bad chunk tag: expected `{}`, found `{}`", tag(.expected), tag(.found))]
    BadChunkTag {
        expected: [u8; 4],
        found: [u8; 4],
    },

    /// The byte stream is inconsistent with the format: a truncated read,
    /// an oversized variable-length quantity, an event running past its
    /// chunk's declared end, and the like.
    #[error("malformed midi data at byte {offset}: {reason}")]
    Malformed {
        offset: usize,
        reason: &'static str,
    },

    /// The header declares SMPTE time division (bit 15 set), which this
    /// decoder does not interpret.
    #[error("unsupported SMPTE time division {division:#06x}")]
    UnsupportedDivision { division: u16 },

    /// The file could not be read at all.
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn tag(bytes: &[u8; 4]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() {
                (b as char).to_string()
            } else {
                format!("\\x{b:02x}")
            }
        })
        .collect()
}
