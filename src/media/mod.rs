//! ISOBMFF container and fragment engine
//!
//! This module provides:
//! - Box reading and writing
//! - Track and codec configuration parsing
//! - Fragment indices, read from `moof` boxes or cut from sample tables
//! - Fragment header/payload assembly and initialization segments
//! - Byte-range reads of backing files

pub mod atoms;
pub mod container;
pub mod error;
pub mod fragment;
pub mod init;
pub mod moof;
pub mod range;
pub mod reader;
pub mod sample_table;
pub mod track;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_util;

pub use atoms::BoxType;
pub use container::Container;
pub use error::ParseError;
pub use fragment::{Chunk, Fragment, FragmentSample};
pub use range::{ByteRange, FileSlice};
pub use track::{CodecConfig, Track, TrackKind};
