//! Loading device catalogues and memory captures from files.
//!
//! A live debugger supplies the device catalogue and memory of its target
//! directly. Loaders provide the same two things from files, so that
//! captures taken from one session can be measured later, or elsewhere.

pub mod json;

use crate::device::Device;
use crate::memory::Image;
use crate::Error;

/// Generic trait for all loaders
pub trait Loader {
    /// Get the device catalogue of the captured target
    fn device(&self) -> Result<Device, Error>;

    /// Get a model of the captured target memory
    fn memory(&self) -> Result<Image, Error>;
}
