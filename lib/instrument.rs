//! Firmware-side stack instrumentation.
//!
//! The instrumentation is a C source file for avr-gcc which paints every byte
//! between the end of static data and the top of the initial stack with the
//! `CanaryPattern` before `main` runs. Stack frames overwrite the paint as
//! they grow, and since nothing repaints it, the lowest overwritten byte
//! remains visible until the next reset.
//!
//! Bytes are painted by address phase relative to the top of internal SRAM
//! (`RAMEND + 1`), so that every 4-byte group counted down from the top of the
//! region holds the pattern in ascending address order. This is the layout
//! `scanner::scan` expects.
//!
//! Adding the generated file to a project and rebuilding it is up to the host.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// The file name the instrumentation is written under.
pub const INSTRUMENT_FILENAME: &str = "_StackInstrument.c";

/// The width of a canary pattern in bytes.
pub const PATTERN_WIDTH: usize = 4;

/// The byte sequence used to mark untouched stack memory.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct CanaryPattern([u8; PATTERN_WIDTH]);

impl CanaryPattern {
    pub fn new(bytes: [u8; PATTERN_WIDTH]) -> CanaryPattern {
        CanaryPattern(bytes)
    }

    /// The pattern bytes in ascending address order.
    pub fn bytes(&self) -> &[u8; PATTERN_WIDTH] {
        &self.0
    }

    /// Returns true if `group` holds exactly this pattern.
    pub fn matches(&self, group: &[u8]) -> bool {
        group == &self.0[..]
    }
}

impl Default for CanaryPattern {
    fn default() -> CanaryPattern {
        CanaryPattern([0xDE, 0xAD, 0xBE, 0xEF])
    }
}

impl fmt::Display for CanaryPattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{:02X} {:02X} {:02X} {:02X}", a, b, c, d)
    }
}

/// Where the firmware's static data ends and its stack begins, and when the
/// painting code runs.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MemoryModel {
    data_end_symbol: String,
    stack_top_symbol: String,
    init_section: String,
}

impl MemoryModel {
    /// Create a new memory model.
    ///
    /// * `data_end_symbol` - Linker symbol placed just past static data.
    /// * `stack_top_symbol` - Linker symbol at the initial stack pointer.
    /// * `init_section` - Startup section the painting code is placed in. It
    ///   must run after the stack pointer and zero register are set up, and
    ///   before `main`.
    pub fn new<D, S, I>(data_end_symbol: D, stack_top_symbol: S, init_section: I) -> MemoryModel
    where
        D: Into<String>,
        S: Into<String>,
        I: Into<String>,
    {
        MemoryModel {
            data_end_symbol: data_end_symbol.into(),
            stack_top_symbol: stack_top_symbol.into(),
            init_section: init_section.into(),
        }
    }

    pub fn data_end_symbol(&self) -> &str {
        &self.data_end_symbol
    }

    pub fn stack_top_symbol(&self) -> &str {
        &self.stack_top_symbol
    }

    pub fn init_section(&self) -> &str {
        &self.init_section
    }
}

impl Default for MemoryModel {
    /// The avr-libc startup layout.
    fn default() -> MemoryModel {
        MemoryModel::new("_end", "__stack", ".init3")
    }
}

/// Generate the instrumentation source with the default pattern and memory
/// model.
pub fn generate_instrumentation_source() -> String {
    generate_instrumentation_source_with(&CanaryPattern::default(), &MemoryModel::default())
}

/// Generate the instrumentation source for the given pattern and memory
/// model.
pub fn generate_instrumentation_source_with(
    pattern: &CanaryPattern,
    memory_model: &MemoryModel,
) -> String {
    let [p0, p1, p2, p3] = *pattern.bytes();
    let data_end = memory_model.data_end_symbol();
    let stack_top = memory_model.stack_top_symbol();

    format!(
        r#"/**
 *  \brief Stack usage instrumentation.
 *
 *  This file was generated by stackcheck and added to your project so that
 *  the stack high-water mark can be read back from a halted debug session.
 *  If you are no longer measuring stack usage, remove it from your project.
 *
 *  Canary pattern: {pattern}
 */

#include <stdint.h>
#include <avr/io.h>

#ifndef __GNUC__
#  error The stack instrumentation code is designed for GCC toolchains only.
#endif

#ifndef __AVR__
#  error The stack instrumentation code is intended for AVR 8-bit targets only.
#endif

/** Linker provided symbols for the end of the static data and the top of the
 *  initial stack.
 */
extern uint8_t {data_end};
extern uint8_t {stack_top};

/** \internal
 *  \brief Paints unused internal SRAM with the canary pattern.
 *
 *  Runs once from the {section} startup section, before any stack frame is
 *  pushed. Each byte gets the pattern byte selected by its distance from the
 *  top of internal SRAM, so every 4-byte group counted down from RAMEND holds
 *  the whole pattern.
 */
void _StackPaint(void) __attribute__((naked, used, section("{section}")));
void _StackPaint(void)
{{
	volatile uint8_t *p = &{data_end};

	while (p <= (volatile uint8_t *)&{stack_top})
	{{
		uint8_t phase = ((uintptr_t)p - ((uintptr_t)RAMEND + 1)) & 3;

		if (phase == 0)
		  *p = 0x{p0:02X};
		else if (phase == 1)
		  *p = 0x{p1:02X};
		else if (phase == 2)
		  *p = 0x{p2:02X};
		else
		  *p = 0x{p3:02X};

		p++;
	}}
}}
"#,
        pattern = pattern,
        data_end = data_end,
        stack_top = stack_top,
        section = memory_model.init_section(),
        p0 = p0,
        p1 = p1,
        p2 = p2,
        p3 = p3,
    )
}

/// Write the default instrumentation into `directory` as
/// `INSTRUMENT_FILENAME`, replacing any previous copy.
pub fn write_instrumentation(directory: &Path) -> Result<PathBuf, Error> {
    write_instrumentation_with(
        directory,
        &CanaryPattern::default(),
        &MemoryModel::default(),
    )
}

/// Write the instrumentation for the given pattern and memory model into
/// `directory` as `INSTRUMENT_FILENAME`, replacing any previous copy.
pub fn write_instrumentation_with(
    directory: &Path,
    pattern: &CanaryPattern,
    memory_model: &MemoryModel,
) -> Result<PathBuf, Error> {
    let path = directory.join(INSTRUMENT_FILENAME);
    fs::write(
        &path,
        generate_instrumentation_source_with(pattern, memory_model),
    )?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pattern() {
        let pattern = CanaryPattern::default();
        assert_eq!(pattern.bytes(), &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(pattern.matches(&[0xDE, 0xAD, 0xBE, 0xEF]));
        assert!(!pattern.matches(&[0xEF, 0xBE, 0xAD, 0xDE]));
        assert!(!pattern.matches(&[0xDE, 0xAD, 0xBE]));
        assert_eq!(pattern.to_string(), "DE AD BE EF");
    }

    #[test]
    fn source_contains_pattern_in_phase_order() {
        let source = generate_instrumentation_source();
        let p0 = source.find("*p = 0xDE;").unwrap();
        let p1 = source.find("*p = 0xAD;").unwrap();
        let p2 = source.find("*p = 0xBE;").unwrap();
        let p3 = source.find("*p = 0xEF;").unwrap();
        assert!(p0 < p1 && p1 < p2 && p2 < p3);
    }

    #[test]
    fn source_is_kept_and_runs_at_startup() {
        let source = generate_instrumentation_source();
        assert!(source.contains("section(\".init3\")"));
        assert!(source.contains("naked"));
        assert!(source.contains("naked, used"));
        assert!(source.contains("volatile"));
        assert!(source.contains("volatile uint8_t *p = &_end;"));
        assert!(source.contains("&__stack"));
        assert!(source.contains("#ifndef __AVR__"));
        assert!(source.contains("#ifndef __GNUC__"));
    }

    #[test]
    fn source_follows_memory_model() {
        let pattern = CanaryPattern::new([0xDC, 0xDC, 0xDC, 0xDC]);
        let model = MemoryModel::new("__heap_start", "__stack_top", ".init1");
        let source = generate_instrumentation_source_with(&pattern, &model);
        assert!(source.contains("extern uint8_t __heap_start;"));
        assert!(source.contains("extern uint8_t __stack_top;"));
        assert!(source.contains("section(\".init1\")"));
        assert_eq!(source.matches("= 0xDC;").count(), 4);
        assert!(!source.contains("_end;"));
    }

    #[test]
    fn generation_is_pure() {
        assert_eq!(
            generate_instrumentation_source(),
            generate_instrumentation_source()
        );
    }

    #[test]
    fn write_replaces_existing_file() {
        let directory = std::env::temp_dir().join(format!(
            "stackcheck-instrument-{}",
            std::process::id()
        ));
        fs::create_dir_all(&directory).unwrap();
        fs::write(directory.join(INSTRUMENT_FILENAME), "stale").unwrap();

        let path = write_instrumentation(&directory).unwrap();

        assert_eq!(path, directory.join(INSTRUMENT_FILENAME));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            generate_instrumentation_source()
        );

        fs::remove_dir_all(&directory).unwrap();
    }
}
