//! Locate the internal SRAM of a device.
//!
//! The stack of an AVR8 target lives in the internal SRAM. Device catalogues
//! name that segment differently across device families, so the segment is
//! recognised by a configurable list of name aliases, `SramAliases`.

use crate::device::{AddressSpace, Device, MemorySegment};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Segment name aliases which identify internal SRAM.
///
/// A segment matches when its name contains any alias, ignoring case.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SramAliases {
    aliases: Vec<String>,
}

impl SramAliases {
    /// Create an alias list from the given aliases.
    pub fn new<I, S>(aliases: I) -> SramAliases
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SramAliases {
            aliases: aliases
                .into_iter()
                .map(|alias| alias.into())
                .collect(),
        }
    }

    /// Extend this list with another alias.
    pub fn with_alias<S: Into<String>>(mut self, alias: S) -> SramAliases {
        self.aliases.push(alias.into());
        self
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Returns true if the given segment name contains one of the aliases.
    pub fn matches(&self, segment_name: &str) -> bool {
        let segment_name = segment_name.to_ascii_uppercase();
        self.aliases
            .iter()
            .any(|alias| segment_name.contains(&alias.to_ascii_uppercase()))
    }
}

impl Default for SramAliases {
    fn default() -> SramAliases {
        SramAliases::new(["IRAM", "INTERNAL_SRAM", "INTRAM0", "HRAMC0"])
    }
}

/// The address space and segment holding a device's internal SRAM.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SelectedRegion<'d> {
    address_space: &'d AddressSpace,
    segment: &'d MemorySegment,
}

impl<'d> SelectedRegion<'d> {
    pub fn address_space(&self) -> &'d AddressSpace {
        self.address_space
    }

    pub fn segment(&self) -> &'d MemorySegment {
        self.segment
    }
}

impl<'d> fmt::Display for SelectedRegion<'d> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.address_space.name(), self.segment)
    }
}

/// Find the internal SRAM of `device` with the default alias list.
pub fn select_internal_sram(device: &Device) -> Option<SelectedRegion> {
    select_internal_sram_with(device, &SramAliases::default())
}

/// Find the internal SRAM of `device`.
///
/// Returns `None` for devices outside the supported architecture family, and
/// for devices with no segment that is both classified as RAM and named by
/// one of `aliases`. When several segments qualify, the first in the device's
/// declared order wins.
pub fn select_internal_sram_with<'d>(
    device: &'d Device,
    aliases: &SramAliases,
) -> Option<SelectedRegion<'d>> {
    if device.family().is_none() {
        debug!(
            "{} has unsupported architecture {}",
            device.name(),
            device.architecture()
        );
        return None;
    }

    let selected = device
        .segments()
        .find(|(_, segment)| segment.is_ram() && aliases.matches(segment.name()))
        .map(|(address_space, segment)| SelectedRegion {
            address_space,
            segment,
        });

    match selected {
        Some(region) => debug!("{}: internal SRAM is {}", device.name(), region),
        None => debug!("{}: no internal SRAM segment", device.name()),
    }

    selected
}
