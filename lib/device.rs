//! Descriptions of debug target devices.
//!
//! A `Device` is the read-only catalogue a debugger hands us for the attached
//! target: its architecture, its name, and the address spaces and memory
//! segments it exposes. Nothing in this crate mutates a `Device`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The architecture family whose stack layout this crate understands.
///
/// A device is in the family when its architecture string starts with
/// `prefix()`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum ArchitectureFamily {
    Avr8,
}

impl ArchitectureFamily {
    /// The architecture string prefix identifying this family.
    pub fn prefix(&self) -> &'static str {
        match *self {
            ArchitectureFamily::Avr8 => "AVR8",
        }
    }

    /// Find the family of the given architecture string, if it is supported.
    pub fn from_architecture(architecture: &str) -> Option<ArchitectureFamily> {
        [ArchitectureFamily::Avr8]
            .into_iter()
            .find(|family| architecture.starts_with(family.prefix()))
    }
}

impl fmt::Display for ArchitectureFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

/// A named, typed range of an address space.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct MemorySegment {
    name: String,
    #[serde(rename = "type")]
    type_: String,
    start: u64,
    size: u64,
}

impl MemorySegment {
    /// Create a new `MemorySegment`.
    ///
    /// * `type_` - The free-text classification the debugger gives the
    ///   segment, such as `"RAM"` or `"FLASH"`.
    /// * `start` - Byte offset of the segment within its address space.
    /// * `size` - Size of the segment in bytes.
    pub fn new<S: Into<String>, T: Into<String>>(
        name: S,
        type_: T,
        start: u64,
        size: u64,
    ) -> MemorySegment {
        MemorySegment {
            name: name.into(),
            type_: type_.into(),
            start,
            size,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_(&self) -> &str {
        &self.type_
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// The first address past the end of this segment.
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.size)
    }

    /// Returns true if this segment is classified as some kind of RAM.
    pub fn is_ram(&self) -> bool {
        self.type_.to_ascii_uppercase().contains("RAM")
    }
}

impl fmt::Display for MemorySegment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} ({}) 0x{:x}+0x{:x}",
            self.name, self.type_, self.start, self.size
        )
    }
}

/// An address space of a device, owning an ordered list of segments.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct AddressSpace {
    name: String,
    segments: Vec<MemorySegment>,
}

impl AddressSpace {
    pub fn new<S: Into<String>>(name: S, segments: Vec<MemorySegment>) -> AddressSpace {
        AddressSpace {
            name: name.into(),
            segments,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The segments of this address space, in declaration order.
    pub fn segments(&self) -> &[MemorySegment] {
        &self.segments
    }

    /// Get a segment by name.
    pub fn segment(&self, name: &str) -> Option<&MemorySegment> {
        self.segments.iter().find(|segment| segment.name() == name)
    }
}

/// The catalogue of a debug target device.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Device {
    architecture: String,
    name: String,
    address_spaces: Vec<AddressSpace>,
}

impl Device {
    pub fn new<A: Into<String>, N: Into<String>>(
        architecture: A,
        name: N,
        address_spaces: Vec<AddressSpace>,
    ) -> Device {
        Device {
            architecture: architecture.into(),
            name: name.into(),
            address_spaces,
        }
    }

    /// The architecture identifier, e.g. `"AVR8"` or `"AVR8X"`.
    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The address spaces of this device, in declaration order.
    pub fn address_spaces(&self) -> &[AddressSpace] {
        &self.address_spaces
    }

    /// Get an address space by name.
    pub fn address_space(&self, name: &str) -> Option<&AddressSpace> {
        self.address_spaces.iter().find(|space| space.name() == name)
    }

    /// The supported architecture family of this device, if any.
    pub fn family(&self) -> Option<ArchitectureFamily> {
        ArchitectureFamily::from_architecture(&self.architecture)
    }

    /// Every `(AddressSpace, MemorySegment)` pair of this device, in the
    /// device's declared order.
    pub fn segments(&self) -> impl Iterator<Item = (&AddressSpace, &MemorySegment)> {
        self.address_spaces
            .iter()
            .flat_map(|space| space.segments().iter().map(move |segment| (space, segment)))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.architecture)
    }
}
