use crate::device::{AddressSpace, Device, MemorySegment};
use crate::instrument::CanaryPattern;
use crate::memory::{Image, MemorySnapshot, TargetMemory};
use crate::orchestrator::Target;
use crate::region;
use crate::scanner;


pub(crate) const SRAM_START: u64 = 0x100;
pub(crate) const SRAM_SIZE: u64 = 2048;

pub(crate) fn atmega328p() -> Device {
    Device::new(
        "AVR8",
        "ATmega328P",
        vec![
            AddressSpace::new(
                "prog",
                vec![MemorySegment::new("PROGMEM", "FLASH", 0, 0x8000)],
            ),
            AddressSpace::new(
                "data",
                vec![
                    MemorySegment::new("REGISTERS", "REGS", 0, 0x20),
                    MemorySegment::new("MAPPED_IO", "IO", 0x20, 0xe0),
                    MemorySegment::new("IRAM", "RAM", SRAM_START, SRAM_SIZE),
                ],
            ),
        ],
    )
}

/// Paint `data_end..=stack_top` the way the generated firmware does, with the
/// pattern phase taken from the distance to the top of SRAM.
pub(crate) fn paint(image: &mut Image, data_end: u64, stack_top: u64, pattern: &CanaryPattern) {
    let ram_top = SRAM_START + SRAM_SIZE;
    let bytes = (data_end..=stack_top)
        .map(|address| pattern.bytes()[(address.wrapping_sub(ram_top) & 3) as usize])
        .collect::<Vec<u8>>();
    image.set_memory("data", data_end, bytes).unwrap();
}

/// Internal SRAM with `static_data` bytes of static data, painted up to the
/// top, then `stack` bytes of stack pushed from the top.
pub(crate) fn running_image(static_data: u64, stack: u64) -> Image {
    let mut image = Image::new();
    image
        .set_memory("data", SRAM_START, vec![0x00; SRAM_SIZE as usize])
        .unwrap();
    paint(
        &mut image,
        SRAM_START + static_data,
        SRAM_START + SRAM_SIZE - 1,
        &CanaryPattern::default(),
    );
    if stack > 0 {
        image.set_memory(
            "data",
            SRAM_START + SRAM_SIZE - stack,
            vec![0x5a; stack as usize],
        )
        .unwrap();
    }
    image
}

pub(crate) struct SimulatedTarget {
    pub(crate) device: Device,
    pub(crate) memory: Image,
}

impl Target for SimulatedTarget {
    fn device(&self) -> Device {
        self.device.clone()
    }

    fn memory(&self) -> &dyn TargetMemory {
        &self.memory
    }
}

fn measure(image: &Image) -> scanner::UsageResult {
    let device = atmega328p();
    let region = region::select_internal_sram(&device).unwrap();
    let snapshot =
        MemorySnapshot::capture(image, region.address_space().name(), region.segment()).unwrap();
    scanner::scan_snapshot(&snapshot, region.segment().size(), &CanaryPattern::default())
}

#[test]
fn painted_firmware_is_fully_recovered() {
    let usage = measure(&running_image(0x80, 0));
    assert_eq!(usage.current(), 0);
    assert_eq!(usage.max(), SRAM_SIZE - 0x80);
}

#[test]
fn stack_depth_is_recovered() {
    for stack in [4, 12, 100, 512, 1000] {
        let usage = measure(&running_image(0x80, stack));
        // A partially overwritten group counts as used
        let expected = (stack + 3) / 4 * 4;
        assert_eq!(usage.current(), expected);
        assert_eq!(usage.max(), SRAM_SIZE - 0x80);
    }
}

#[test]
fn unaligned_static_data_end() {
    // The paint starts mid-group, the partial group reads as static data
    let usage = measure(&running_image(0x81, 64));
    assert_eq!(usage.current(), 64);
    assert_eq!(usage.max(), SRAM_SIZE - 0x84);
}

#[test]
fn concrete_scenario() {
    let mut bytes = CanaryPattern::default()
        .bytes()
        .repeat(SRAM_SIZE as usize / 4);
    for byte in &mut bytes[1536..] {
        *byte = 0x00;
    }
    let usage = scanner::scan(&bytes, SRAM_SIZE, &CanaryPattern::default());
    assert_eq!(usage.current(), 512);
}

#[test]
fn no_address_spaces_is_unsupported() {
    let device = Device::new("AVR8", "ATmega0", Vec::new());
    assert!(region::select_internal_sram(&device).is_none());
}
