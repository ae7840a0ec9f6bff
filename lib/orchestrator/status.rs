//! What the presentation layer shows after each transition.

use crate::scanner::UsageResult;
use crate::Error;
use std::fmt;

/// Usage instructions for the host to display on request.
pub const HELP_TEXT: &str = "\
This stack checker shows the maximum stack usage of your application, based \
on the currently running debug session. It is not guaranteed to be an upper \
bound; the value shown is the high water mark for the current debug session \
only.

To use, add the stack instrumentation to your project, recompile and run it. \
Pause execution and refresh to determine the current stack high water mark.

Currently only 8-bit AVR devices (TINY/MEGA/XMEGA) are supported.";

/// The displayable state of a stack checker.
///
/// Every variant renders as a short status string, and those which carry a
/// `UsageResult` also yield a usage ratio.
#[derive(Clone, Debug, PartialEq)]
pub enum Status {
    /// No debug session is active.
    NotInDebugSession,
    /// The target is running, so its memory cannot be read.
    TargetRunning,
    /// The target is halted and a refresh will measure it.
    RefreshRequired,
    /// The project does not contain the instrumentation.
    MissingInstrumentation,
    /// A refresh was requested while the target was not halted.
    TargetBusy,
    /// The device has no internal SRAM this crate recognises.
    UnsupportedDevice { device: String },
    /// A scan is in flight.
    Calculating { device: String },
    /// A scan completed.
    Usage { device: String, usage: UsageResult },
    /// A scan completed but found no canary at all. `usage` is the fallback.
    Inconclusive { device: String, usage: UsageResult },
    /// Target memory could not be read. `usage` is the fallback.
    ReadFailure { device: String, usage: UsageResult },
}

impl Status {
    /// Map an orchestration error to the status it is reported as.
    ///
    /// `segment_size` supplies the fallback usage for read failures.
    pub fn from_error(error: &Error, device: &str, segment_size: u64) -> Status {
        match *error {
            Error::MissingInstrumentation => Status::MissingInstrumentation,
            Error::TargetBusy => Status::TargetBusy,
            Error::UnsupportedDevice(_) => Status::UnsupportedDevice {
                device: device.to_string(),
            },
            Error::ScanInconclusive => Status::Inconclusive {
                device: device.to_string(),
                usage: UsageResult::fallback(segment_size),
            },
            _ => Status::ReadFailure {
                device: device.to_string(),
                usage: UsageResult::fallback(segment_size),
            },
        }
    }

    /// The name of the device this status refers to, if known.
    pub fn device(&self) -> Option<&str> {
        match *self {
            Status::UnsupportedDevice { ref device }
            | Status::Calculating { ref device }
            | Status::Usage { ref device, .. }
            | Status::Inconclusive { ref device, .. }
            | Status::ReadFailure { ref device, .. } => Some(device.as_str()),
            _ => None,
        }
    }

    /// The usage this status reports, if any.
    pub fn usage(&self) -> Option<UsageResult> {
        match *self {
            Status::Usage { usage, .. }
            | Status::Inconclusive { usage, .. }
            | Status::ReadFailure { usage, .. } => Some(usage),
            _ => None,
        }
    }

    /// The usage ratio to display, zero when there is no usage.
    pub fn ratio(&self) -> f64 {
        self.usage().map(|usage| usage.ratio()).unwrap_or(0.0)
    }

    /// Returns true if this status is the result of a finished scan.
    pub fn is_scan_result(&self) -> bool {
        self.usage().is_some()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Status::NotInDebugSession => write!(f, "(Not in Debug Session)"),
            Status::TargetRunning => write!(f, "(Target Running)"),
            Status::RefreshRequired => write!(f, "(Refresh Required)"),
            Status::MissingInstrumentation => write!(f, "(Missing Instrumentation)"),
            Status::TargetBusy => write!(f, "(Halt Target To Refresh)"),
            Status::UnsupportedDevice { .. } => write!(f, "(Unsupported Device)"),
            Status::Calculating { .. } => write!(f, "(Calculating...)"),
            Status::Usage { usage, .. } => write!(f, "{}", usage),
            Status::Inconclusive { .. } => write!(f, "(Inconclusive)"),
            Status::ReadFailure { .. } => write!(f, "(Read Failure)"),
        }
    }
}
