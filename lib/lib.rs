//! Stackcheck: canary-based stack usage inspection for 8-bit AVR targets.
//!
//! Stackcheck measures how much of a target's internal SRAM the call stack
//! has consumed, without any hardware stack protection. It works in three
//! steps:
//!
//! 1. Firmware instrumentation, produced by the [`instrument`] module, paints
//!    the unused internal SRAM with a known [`instrument::CanaryPattern`]
//!    before `main` runs.
//! 2. When the target is halted, the [`region`] module picks the internal
//!    SRAM segment out of the target's [`device::Device`] catalogue, and the
//!    bytes of that segment are read through the [`memory::TargetMemory`]
//!    capability.
//! 3. The [`scanner`] module finds the boundary between painted and
//!    overwritten memory and turns it into a [`scanner::UsageResult`].
//!
//! The [`orchestrator`] module sequences these steps for a host debugger,
//! running each scan on a worker thread and reporting a displayable
//! [`orchestrator::Status`].
//!
//! The reported value is only a high-water mark for the observed run. It is
//! never a guaranteed upper bound on stack usage.

pub mod device;
pub mod instrument;
pub mod loader;
pub mod memory;
pub mod orchestrator;
pub mod region;
pub mod scanner;
#[cfg(test)]
mod tests;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("{0}")]
    Custom(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Project is missing the stack instrumentation")]
    MissingInstrumentation,
    #[error("Failed to read target memory: {0}")]
    ReadFailure(String),
    #[error("No canary pattern found in the scanned region")]
    ScanInconclusive,
    #[error("Target must be halted to read its memory")]
    TargetBusy,
    #[error("Unsupported device: {0}")]
    UnsupportedDevice(String),
}

impl From<&str> for Error {
    fn from(s: &str) -> Error {
        Error::Custom(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error::Custom(s)
    }
}
