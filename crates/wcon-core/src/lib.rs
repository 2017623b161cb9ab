//! wcon-core: Shared protocol library for the Web Console.
//!
//! Provides the JSON wire events exchanged with console viewers, the markup
//! sanitizer that gates process output before it reaches a render surface,
//! and the shared error type.

pub mod error;
pub mod messages;
pub mod sanitize;

// Re-export commonly used items at crate root.
pub use error::{WconError, WconResult};
pub use messages::{decode_event, encode_event, WireEvent};
pub use sanitize::{mark_fragment, sanitize, MARK_CLASS_PREFIX};
