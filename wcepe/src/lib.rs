//! Metadata extraction for Windows CE executables.
//!
//! The entry point is [`analyze`], which reads the headers of a PE32 image from a [`ByteSource`]
//! and then decodes the version information resource and the import table, each of which is
//! allowed to fail on its own.

pub mod analysis;
pub mod ce;
pub mod error;
pub mod import;
pub mod pe;
pub mod resource;
pub mod rva;
pub mod source;
pub mod text;
pub mod version;
#[cfg(test)] mod testutil;


pub use crate::analysis::{analyze, analyze_with, Analysis};
pub use crate::error::{Error, HeaderCheck, TreeViolation};
pub use crate::source::{ByteSource, FileSource};
pub use crate::text::{LossyDecoder, TextDecoder};


/// Rounds the offset up to the next multiple of 4 relative to `base`.
pub(crate) fn align4(base: u64, offset: u64) -> u64 {
    let relative = offset.saturating_sub(base);
    base + relative.div_ceil(4) * 4
}
