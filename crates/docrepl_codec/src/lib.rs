//! # DocRepl Codec
//!
//! Fixed-buffer binary encoding primitives for DocRepl.
//!
//! This crate provides:
//! - [`ScratchBuffer`] / [`ScratchWriter`]: a bounds-checked cursor over a
//!   fixed-capacity buffer that drains into any [`std::io::Write`] sink
//! - [`ByteSource`]: fixed-width readers over slices and streams
//!
//! ## Encoding Rules
//!
//! - All integers are little-endian and fixed-width
//! - The scratch buffer never grows; it is flushed when full
//! - Fields that must stay together are reserved before they are written
//!
//! ## Usage
//!
//! ```
//! use docrepl_codec::{ByteSource, ScratchBuffer, SliceReader};
//!
//! let mut scratch = ScratchBuffer::new(64);
//! let mut out = Vec::new();
//! let mut writer = scratch.writer(&mut out);
//! writer.reserve(12).unwrap();
//! writer.put_i32(8).unwrap();
//! writer.put_u64(42).unwrap();
//! writer.finish().unwrap();
//!
//! let mut reader = SliceReader::new(&out);
//! assert_eq!(reader.read_i32().unwrap(), 8);
//! assert_eq!(reader.read_u64().unwrap(), 42);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;

pub use decoder::{ByteSource, IoReader, SliceReader, MAX_FIELD_LENGTH};
pub use encoder::{ScratchBuffer, ScratchWriter, MIN_SCRATCH_CAPACITY};
pub use error::{CodecError, CodecResult};
