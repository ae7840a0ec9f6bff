//! A flat memory image held in the host.
//!
//! An `Image` maps address space names to sections of bytes. It answers
//! `TargetMemory` reads the way a debugger would: bytes no section covers are
//! reported in the read's error ranges.

use crate::memory::{MemoryErrorRange, MemoryRead, TargetMemory};
use crate::Error;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::ops::Bound::Included;

/// The sections of one address space, keyed by start address.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Sections {
    sections: BTreeMap<u64, Vec<u8>>,
}

impl Sections {
    /// Get the sections, keyed by start address.
    pub fn sections(&self) -> &BTreeMap<u64, Vec<u8>> {
        &self.sections
    }

    /// Get the byte at the given address.
    pub fn get8(&self, address: u64) -> Option<u8> {
        let (section_address, data) = self
            .sections
            .range((Included(0), Included(address)))
            .next_back()?;
        data.get((address - section_address) as usize).copied()
    }

    /// Place `data` at `address`, on top of any sections it overlaps.
    ///
    /// Fails if `data` would run past the end of the address space.
    pub fn set_memory(&mut self, address: u64, data: Vec<u8>) -> Result<(), Error> {
        let data_end = address.checked_add(data.len() as u64).ok_or_else(|| {
            format!(
                "0x{:x} bytes at 0x{:x} run past the end of the address space",
                data.len(),
                address
            )
        })?;

        if data.is_empty() {
            return Ok(());
        }

        let overlapping = self
            .sections
            .iter()
            .map(|(a, section)| (*a, section.len() as u64))
            .filter(|(a, l)| *a < data_end && a + l > address)
            .collect::<Vec<(u64, u64)>>();

        for (a, l) in overlapping {
            let mut section = match self.sections.remove(&a) {
                Some(section) => section,
                None => continue,
            };

            // Keep whatever runs past the end of the new data
            if a + l > data_end {
                let tail = section.split_off((data_end - a) as usize);
                self.sections.insert(data_end, tail);
            }

            // Keep whatever starts before the new data
            if a < address {
                section.truncate((address - a) as usize);
                self.sections.insert(a, section);
            }
        }

        self.sections.insert(address, data);

        Ok(())
    }
}

/// A memory image spanning several named address spaces.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Image {
    spaces: FxHashMap<String, Sections>,
}

impl Image {
    /// Create a new, empty `Image`.
    pub fn new() -> Image {
        Image {
            spaces: FxHashMap::default(),
        }
    }

    /// Get the sections of an address space.
    pub fn address_space(&self, name: &str) -> Option<&Sections> {
        self.spaces.get(name)
    }

    /// Place `data` at `address` in the named address space.
    pub fn set_memory<S: Into<String>>(
        &mut self,
        address_space: S,
        address: u64,
        data: Vec<u8>,
    ) -> Result<(), Error> {
        self.spaces
            .entry(address_space.into())
            .or_default()
            .set_memory(address, data)
    }

    /// Get the byte at `address` in the named address space.
    pub fn get8(&self, address_space: &str, address: u64) -> Option<u8> {
        self.spaces.get(address_space)?.get8(address)
    }
}

impl TargetMemory for Image {
    fn read(
        &self,
        address_space: &str,
        start: u64,
        element_size: usize,
        length: usize,
        page: u32,
    ) -> Result<MemoryRead, Error> {
        if page != 0 {
            return Err(Error::ReadFailure(format!(
                "page {} of {} is not mapped",
                page, address_space
            )));
        }

        let sections = self.spaces.get(address_space).ok_or_else(|| {
            Error::ReadFailure(format!("no address space named {}", address_space))
        })?;

        let size = element_size
            .checked_mul(length)
            .ok_or("memory read size overflows")? as u64;

        let end = start.checked_add(size).ok_or_else(|| {
            Error::ReadFailure(format!(
                "0x{:x} bytes at 0x{:x} run past the end of {}",
                size, start, address_space
            ))
        })?;

        let mut bytes = Vec::with_capacity(size as usize);
        let mut error_ranges: Vec<MemoryErrorRange> = Vec::new();

        for address in start..end {
            match sections.get8(address) {
                Some(byte) => bytes.push(byte),
                None => {
                    bytes.push(0);
                    match error_ranges.last_mut() {
                        Some(range) if range.end == address => range.end = address + 1,
                        _ => error_ranges.push(MemoryErrorRange::new(address, address + 1)),
                    }
                }
            }
        }

        Ok(MemoryRead::new(bytes, error_ranges))
    }
}
