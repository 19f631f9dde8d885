pub mod error;
pub mod event;
pub mod loader;
pub mod player;
mod reader;

pub use error::FormatError;
pub use event::{EventKind, TimedEvent, select_track};
pub use loader::{FileHeader, parse, parse_bytes, parse_header};
