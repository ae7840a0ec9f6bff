//! Recover stack usage from a painted memory snapshot.
//!
//! The stack grows down from the top of internal SRAM. Before `main`, the
//! instrumentation paints everything below the initial stack pointer and
//! above static data with the `CanaryPattern`. By the time the target is
//! halted, the stack has overwritten the paint down to its deepest point,
//! and the paint below that point is still intact.
//!
//! The snapshot is walked from the top down in groups of `PATTERN_WIDTH`
//! bytes, aligned to the top of the region:
//!
//! ```text
//!  0                      end          start                  size
//!  | static data ........ | canary ..... | stack ............... |
//! ```
//!
//! * `start` is the top of the highest run of canary groups. Everything above
//!   it has been written by the stack, so `current = size - start`.
//! * `end` is the bottom of that run, the first group below it which does not
//!   hold the pattern. `max = size - end`.
//!
//! A region which is not a whole number of groups leaves its lowest
//! `size % PATTERN_WIDTH` bytes unexamined.

use crate::instrument::{CanaryPattern, PATTERN_WIDTH};
use crate::memory::MemorySnapshot;
use crate::Error;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stack usage, in bytes, recovered from one snapshot.
///
/// `current <= max <= segment_size` always holds.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct UsageResult {
    current: u64,
    max: u64,
}

impl UsageResult {
    pub(crate) fn new(current: u64, max: u64) -> UsageResult {
        UsageResult { current, max }
    }

    /// The result reported when usage cannot be determined: nothing used out
    /// of the whole segment.
    pub fn fallback(segment_size: u64) -> UsageResult {
        UsageResult {
            current: 0,
            max: segment_size,
        }
    }

    /// Bytes of stack in use at the moment the snapshot was taken, measured
    /// down from the top of the region to the highest intact canary.
    pub fn current(&self) -> u64 {
        self.current
    }

    /// Bytes from the top of the region down to the bottom of the intact
    /// canary run. Canary bytes are only ever consumed, so this bound holds
    /// for the whole run of the target.
    pub fn max(&self) -> u64 {
        self.max
    }

    /// `current / max`, in `[0, 1]`. Zero when `max` is zero.
    pub fn ratio(&self) -> f64 {
        if self.max == 0 {
            0.0
        } else {
            (self.current as f64 / self.max as f64).min(1.0)
        }
    }

    /// `ratio()` as a whole percentage, rounded up and capped at 100.
    pub fn percent(&self) -> u64 {
        if self.max == 0 {
            0
        } else {
            let percent = (self.current.saturating_mul(100) + self.max - 1) / self.max;
            percent.min(100)
        }
    }
}

impl fmt::Display for UsageResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{} ({}%)", self.current, self.max, self.percent())
    }
}

/// The boundaries found by a scan, along with the usage they imply.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Scan {
    usage: UsageResult,
    start: Option<u64>,
    end: Option<u64>,
}

impl Scan {
    pub fn usage(&self) -> UsageResult {
        self.usage
    }

    /// Offset just above the highest canary group, if any group matched.
    pub fn start(&self) -> Option<u64> {
        self.start
    }

    /// Offset just above the first non-canary group below `start`, if the
    /// canary run did not reach the bottom of the region.
    pub fn end(&self) -> Option<u64> {
        self.end
    }

    /// Returns true if at least one canary group was found.
    ///
    /// With no canary at all, the target either never ran the
    /// instrumentation or exhausted the whole region, and the reported usage
    /// of the whole segment should be treated as a measurement error.
    pub fn is_conclusive(&self) -> bool {
        self.start.is_some()
    }

    /// The usage of a conclusive scan, or `Error::ScanInconclusive`.
    pub fn conclusive(self) -> Result<UsageResult, Error> {
        if self.is_conclusive() {
            Ok(self.usage)
        } else {
            Err(Error::ScanInconclusive)
        }
    }
}

/// Scan `snapshot` and return the stack usage it shows.
///
/// Never fails. A snapshot whose length does not match `segment_size` yields
/// `UsageResult::fallback(segment_size)`.
pub fn scan(snapshot: &[u8], segment_size: u64, pattern: &CanaryPattern) -> UsageResult {
    match scan_boundaries(snapshot, segment_size, pattern) {
        Ok(scan) => scan.usage(),
        Err(e) => {
            debug!("Falling back to default stack usage: {}", e);
            UsageResult::fallback(segment_size)
        }
    }
}

/// Scan a captured `MemorySnapshot`. See `scan`.
pub fn scan_snapshot(
    snapshot: &MemorySnapshot,
    segment_size: u64,
    pattern: &CanaryPattern,
) -> UsageResult {
    scan(snapshot.bytes(), segment_size, pattern)
}

/// Scan `snapshot`, returning the boundaries found.
///
/// Fails with `Error::ReadFailure` if the snapshot length does not match
/// `segment_size`.
pub fn scan_boundaries(
    snapshot: &[u8],
    segment_size: u64,
    pattern: &CanaryPattern,
) -> Result<Scan, Error> {
    if snapshot.len() as u64 != segment_size {
        return Err(Error::ReadFailure(format!(
            "snapshot holds {} bytes, segment holds {}",
            snapshot.len(),
            segment_size
        )));
    }

    let mut start: Option<u64> = None;
    let mut end: Option<u64> = None;

    // rchunks_exact walks groups aligned to the top of the snapshot, from the
    // top down, and leaves the unaligned remainder at the bottom.
    let mut top = snapshot.len();
    for group in snapshot.rchunks_exact(PATTERN_WIDTH) {
        if pattern.matches(group) {
            if start.is_none() {
                trace!("canary run starts at offset 0x{:x}", top);
                start = Some(top as u64);
            }
        } else if start.is_some() {
            trace!("canary run ends at offset 0x{:x}", top);
            end = Some(top as u64);
            break;
        }
        top -= PATTERN_WIDTH;
    }

    let usage = UsageResult::new(
        segment_size - start.unwrap_or(0),
        segment_size - end.unwrap_or(0),
    );

    Ok(Scan { usage, start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANARY: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];

    fn painted(size: usize) -> Vec<u8> {
        CANARY.iter().copied().cycle().take(size).collect()
    }

    #[test]
    fn all_canary() {
        let snapshot = painted(2048);
        let usage = scan(&snapshot, 2048, &CanaryPattern::default());
        assert_eq!(usage.current(), 0);
        assert_eq!(usage.max(), 2048);
    }

    #[test]
    fn no_canary() {
        let snapshot = vec![0x00; 2048];
        let result = scan_boundaries(&snapshot, 2048, &CanaryPattern::default()).unwrap();
        assert!(!result.is_conclusive());
        assert_eq!(result.usage().current(), 2048);
        assert_eq!(result.usage().max(), 2048);
        assert!(matches!(result.conclusive(), Err(Error::ScanInconclusive)));
    }

    #[test]
    fn stack_above_canary() {
        let mut snapshot = painted(2048);
        for byte in &mut snapshot[1536..] {
            *byte = 0x5a;
        }
        let usage = scan(&snapshot, 2048, &CanaryPattern::default());
        assert_eq!(usage.current(), 512);
        assert_eq!(usage.max(), 2048);
    }

    #[test]
    fn canary_between_static_data_and_stack() {
        let mut snapshot = painted(1024);
        for byte in &mut snapshot[..256] {
            *byte = 0x00;
        }
        for byte in &mut snapshot[960..] {
            *byte = 0x42;
        }
        let result = scan_boundaries(&snapshot, 1024, &CanaryPattern::default()).unwrap();
        assert_eq!(result.start(), Some(960));
        assert_eq!(result.end(), Some(256));
        assert_eq!(result.usage().current(), 64);
        assert_eq!(result.usage().max(), 768);
    }

    #[test]
    fn byte_order_matters() {
        let snapshot = [0xEF, 0xBE, 0xAD, 0xDE].repeat(16);
        let result = scan_boundaries(&snapshot, 64, &CanaryPattern::default()).unwrap();
        assert!(!result.is_conclusive());
    }

    #[test]
    fn partially_overwritten_group_is_used() {
        let mut snapshot = painted(64);
        snapshot[61] = 0x00;
        let usage = scan(&snapshot, 64, &CanaryPattern::default());
        assert_eq!(usage.current(), 4);
    }

    #[test]
    fn lowest_group_is_examined() {
        let mut snapshot = vec![0x00; 64];
        snapshot[..4].copy_from_slice(&CANARY);
        let result = scan_boundaries(&snapshot, 64, &CanaryPattern::default()).unwrap();
        assert_eq!(result.start(), Some(4));
        assert_eq!(result.end(), None);
        assert_eq!(result.usage().current(), 60);
        assert_eq!(result.usage().max(), 64);
    }

    #[test]
    fn unaligned_region() {
        // Two leftover bytes at the bottom, then 15 groups aligned to the top
        let mut snapshot = vec![0x00; 2];
        snapshot.extend(painted(60));
        let result = scan_boundaries(&snapshot, 62, &CanaryPattern::default()).unwrap();
        assert_eq!(result.start(), Some(62));
        assert_eq!(result.end(), None);
        assert_eq!(result.usage().current(), 0);
        assert_eq!(result.usage().max(), 62);
    }

    #[test]
    fn length_mismatch_falls_back() {
        let snapshot = painted(100);
        assert_eq!(
            scan(&snapshot, 128, &CanaryPattern::default()),
            UsageResult::fallback(128)
        );
        assert_eq!(
            scan(&[], 2048, &CanaryPattern::default()),
            UsageResult::fallback(2048)
        );
        assert!(matches!(
            scan_boundaries(&snapshot, 128, &CanaryPattern::default()),
            Err(Error::ReadFailure(_))
        ));
    }

    #[test]
    fn empty_region() {
        let usage = scan(&[], 0, &CanaryPattern::default());
        assert_eq!(usage.current(), 0);
        assert_eq!(usage.max(), 0);
        assert_eq!(usage.ratio(), 0.0);
        assert_eq!(usage.to_string(), "0/0 (0%)");
    }

    #[test]
    fn usage_bounds_hold_for_every_boundary() {
        let pattern = CanaryPattern::default();
        for stack in (0..=256).step_by(4) {
            for data in (0..=(256 - stack)).step_by(4) {
                let mut snapshot = painted(256);
                for byte in &mut snapshot[256 - stack..] {
                    *byte = 0x11;
                }
                for byte in &mut snapshot[..data] {
                    *byte = 0x22;
                }
                let usage = scan(&snapshot, 256, &pattern);
                assert!(usage.current() <= usage.max());
                assert!(usage.max() <= 256);
                if stack + data < 256 {
                    assert_eq!(usage.current(), stack as u64);
                    assert_eq!(usage.max(), 256 - data as u64);
                }
            }
        }
    }

    #[test]
    fn usage_text() {
        assert_eq!(UsageResult::new(512, 2048).to_string(), "512/2048 (25%)");
        assert_eq!(UsageResult::new(1, 3).to_string(), "1/3 (34%)");
        assert_eq!(UsageResult::new(3, 3).percent(), 100);
        assert_eq!(UsageResult::new(512, 2048).ratio(), 0.25);
        assert_eq!(UsageResult::fallback(2048).to_string(), "0/2048 (0%)");
    }
}
