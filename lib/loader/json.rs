//! JSON captures.
//!
//! A capture holds a device catalogue and base64-encoded memory regions:
//!
//! ```json
//! {
//!   "device": {
//!     "architecture": "AVR8",
//!     "name": "ATmega328P",
//!     "address_spaces": [
//!       { "name": "data",
//!         "segments": [ { "name": "IRAM", "type": "RAM", "start": 256, "size": 2048 } ] }
//!     ]
//!   },
//!   "regions": [ { "address_space": "data", "address": 256, "bytes": "3q2+7w..." } ]
//! }
//! ```
//!
//! A loaded capture is itself an `orchestrator::Target`, so it can be
//! measured exactly like a live target.

use crate::device::Device;
use crate::loader::Loader;
use crate::memory::{Image, MemorySnapshot, TargetMemory};
use crate::orchestrator::Target;
use crate::region::{self, SramAliases};
use crate::Error;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, Deserialize, Serialize)]
struct Region {
    address_space: String,
    address: u64,
    bytes: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct Capture {
    device: Device,
    #[serde(default)]
    regions: Vec<Region>,
}

/// A device catalogue and memory image loaded from JSON.
#[derive(Clone, Debug)]
pub struct Json {
    device: Device,
    memory: Image,
    regions: Vec<Region>,
}

impl Json {
    /// Load a capture from a JSON file.
    pub fn from_file(filename: &Path) -> Result<Json, Error> {
        Json::from_json(&fs::read_to_string(filename)?)
    }

    /// Load a capture from a JSON string.
    pub fn from_json(json: &str) -> Result<Json, Error> {
        let capture: Capture = serde_json::from_str(json)?;

        let mut memory = Image::new();
        for region in &capture.regions {
            if capture.device.address_space(&region.address_space).is_none() {
                return Err(format!(
                    "region at 0x{:x} names unknown address space {}",
                    region.address, region.address_space
                )
                .into());
            }
            memory.set_memory(
                region.address_space.clone(),
                region.address,
                STANDARD.decode(&region.bytes)?,
            )?;
        }

        Ok(Json {
            device: capture.device,
            memory,
            regions: capture.regions,
        })
    }

    /// Capture the internal SRAM of a live target.
    pub fn capture(target: &dyn Target, aliases: &SramAliases) -> Result<Json, Error> {
        let device = target.device();
        let selected = region::select_internal_sram_with(&device, aliases)
            .ok_or_else(|| Error::UnsupportedDevice(device.name().to_string()))?;

        let address_space = selected.address_space().name().to_string();
        let segment = selected.segment().clone();
        let snapshot = MemorySnapshot::capture(target.memory(), &address_space, &segment)?;

        let mut memory = Image::new();
        memory.set_memory(
            address_space.clone(),
            segment.start(),
            snapshot.bytes().to_vec(),
        )?;

        let regions = vec![Region {
            address_space,
            address: segment.start(),
            bytes: STANDARD.encode(snapshot.bytes()),
        }];

        Ok(Json {
            device,
            memory,
            regions,
        })
    }

    /// Serialize this capture to JSON.
    pub fn to_json(&self) -> Result<String, Error> {
        let capture = Capture {
            device: self.device.clone(),
            regions: self.regions.clone(),
        };
        Ok(serde_json::to_string_pretty(&capture)?)
    }

    /// Write this capture to a JSON file.
    pub fn to_file(&self, filename: &Path) -> Result<(), Error> {
        fs::write(filename, self.to_json()?)?;
        Ok(())
    }

    pub fn image(&self) -> &Image {
        &self.memory
    }
}

impl Loader for Json {
    fn device(&self) -> Result<Device, Error> {
        Ok(self.device.clone())
    }

    fn memory(&self) -> Result<Image, Error> {
        Ok(self.memory.clone())
    }
}

impl Target for Json {
    fn device(&self) -> Device {
        self.device.clone()
    }

    fn memory(&self) -> &dyn TargetMemory {
        &self.memory
    }
}
