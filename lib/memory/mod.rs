//! Reading target memory.
//!
//! Debuggers expose target memory through a single read call which may fail
//! outright, or succeed while marking some sub-ranges as unreadable. The
//! `TargetMemory` trait captures that capability. A `MemorySnapshot` is the
//! validated result of reading one whole segment.
//!
//! `image::Image` implements `TargetMemory` over byte buffers held in the
//! host, for captured memory dumps and for tests.

pub mod image;

pub use self::image::Image;

use crate::device::MemorySegment;
use crate::Error;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A range of addresses a memory read could not satisfy.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct MemoryErrorRange {
    start: u64,
    end: u64,
}

impl MemoryErrorRange {
    /// Create a new error range covering `start..end`.
    pub fn new(start: u64, end: u64) -> MemoryErrorRange {
        MemoryErrorRange { start, end }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    /// One past the last unreadable address.
    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for MemoryErrorRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:x}..0x{:x}", self.start, self.end)
    }
}

/// The result of a memory read: the bytes, and any ranges that could not be
/// read. Bytes inside an error range are garbage.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MemoryRead {
    bytes: Vec<u8>,
    error_ranges: Vec<MemoryErrorRange>,
}

impl MemoryRead {
    pub fn new(bytes: Vec<u8>, error_ranges: Vec<MemoryErrorRange>) -> MemoryRead {
        MemoryRead {
            bytes,
            error_ranges,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn error_ranges(&self) -> &[MemoryErrorRange] {
        &self.error_ranges
    }

    /// Returns true if every requested byte was read.
    pub fn is_complete(&self) -> bool {
        self.error_ranges.iter().all(|range| range.is_empty())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// The capability to read memory from a debug target.
pub trait TargetMemory: Send + Sync {
    /// Read `length` elements of `element_size` bytes from `address_space`,
    /// starting at `start`.
    ///
    /// Returns an error if nothing could be read. A read which partially
    /// failed returns `Ok`, with the failed ranges in
    /// `MemoryRead::error_ranges`.
    fn read(
        &self,
        address_space: &str,
        start: u64,
        element_size: usize,
        length: usize,
        page: u32,
    ) -> Result<MemoryRead, Error>;
}

/// The bytes of one memory segment, captured at one instant.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MemorySnapshot {
    bytes: Vec<u8>,
}

impl MemorySnapshot {
    pub fn new(bytes: Vec<u8>) -> MemorySnapshot {
        MemorySnapshot { bytes }
    }

    /// Read the whole of `segment` from `address_space`.
    ///
    /// Fails with `Error::ReadFailure` if the read fails, if any byte of the
    /// segment was unreadable, or if the target returned the wrong number of
    /// bytes.
    pub fn capture(
        memory: &dyn TargetMemory,
        address_space: &str,
        segment: &MemorySegment,
    ) -> Result<MemorySnapshot, Error> {
        let length = usize::try_from(segment.size()).map_err(|_| {
            Error::ReadFailure(format!("segment {} is too large to read", segment.name()))
        })?;

        let read = memory
            .read(address_space, segment.start(), 1, length, 0)
            .map_err(|e| match e {
                Error::ReadFailure(message) => Error::ReadFailure(message),
                e => Error::ReadFailure(e.to_string()),
            })?;

        if !read.is_complete() {
            let ranges = read
                .error_ranges()
                .iter()
                .map(|range| range.to_string())
                .collect::<Vec<String>>()
                .join(", ");
            warn!("Partial read of {}:{}: {}", address_space, segment.name(), ranges);
            return Err(Error::ReadFailure(format!(
                "unreadable ranges in {}: {}",
                segment.name(),
                ranges
            )));
        }

        if read.bytes().len() != length {
            warn!(
                "Read of {}:{} returned {} bytes, expected {}",
                address_space,
                segment.name(),
                read.bytes().len(),
                length
            );
            return Err(Error::ReadFailure(format!(
                "expected {} bytes from {}, got {}",
                length,
                segment.name(),
                read.bytes().len()
            )));
        }

        Ok(MemorySnapshot::new(read.into_bytes()))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl AsRef<[u8]> for MemorySnapshot {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}
