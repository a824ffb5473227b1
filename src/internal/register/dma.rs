//! CoreAXI4DMAController Register Definitions
//!
//! The controller exposes a version register, a start register, up to four
//! interrupt blocks, an array of internal descriptors and one descriptor
//! pointer per stream channel.

use super::{reg_ro, reg_rw};
use crate::driver::config::ControllerVariant;
use crate::driver::error::{ConfigError, ConfigResult};
use crate::hal::mmio::{RegisterWindow, dma_barrier};
use crate::internal::dma::descriptor::bits::mem_config;

// =============================================================================
// Register Offsets
// =============================================================================

/// Version Register offset (read-only)
pub const VERSION_OFFSET: usize = 0x000;
/// Start Operation Register offset
pub const START_OPERATION_OFFSET: usize = 0x004;

/// First interrupt block offset
pub const INTR_BASE: usize = 0x010;
/// Distance between interrupt blocks
pub const INTR_STRIDE: usize = 0x010;
/// Interrupt Status Register offset within a block (read-only)
pub const INTR_STAT_OFFSET: usize = 0x00;
/// Interrupt Mask Register offset within a block (1 = enabled)
pub const INTR_MASK_OFFSET: usize = 0x04;
/// Interrupt Clear Register offset within a block (write-1-to-clear)
pub const INTR_CLEAR_OFFSET: usize = 0x08;
/// External Descriptor Address Register offset within a block (read-only)
pub const INTR_EXT_ADDR_OFFSET: usize = 0x0C;

/// First internal descriptor offset
pub const DESC_BASE: usize = 0x060;
/// Distance between internal descriptors
pub const DESC_STRIDE: usize = 0x020;

/// First stream descriptor address register offset
pub const STREAM_ADDR_BASE: usize = 0x460;
/// Distance between stream descriptor address registers
pub const STREAM_ADDR_STRIDE: usize = 0x004;

// =============================================================================
// Start Operation Register Bits
// =============================================================================

/// Bit shift of stream channel start bits
pub const START_STREAM_SHIFT: u32 = 16;

/// Start bit for the memory ring whose first descriptor is `slot`
#[inline(always)]
pub const fn start_mem_bit(slot: usize) -> u32 {
    1 << slot
}

/// Start bit for stream channel `channel`
#[inline(always)]
pub const fn start_stream_bit(channel: usize) -> u32 {
    1 << (START_STREAM_SHIFT as usize + channel)
}

// =============================================================================
// Interrupt Status Register Bits
// =============================================================================

/// Descriptor with interrupt-on-process completed
pub const INTR_OP_COMPLETE: u32 = 1 << 0;
/// AXI write error
pub const INTR_WRITE_ERROR: u32 = 1 << 1;
/// AXI read error
pub const INTR_READ_ERROR: u32 = 1 << 2;
/// Invalid descriptor fetched
pub const INTR_INVALID_DESC: u32 = 1 << 3;
/// Every event bit (status, mask and clear share this layout)
pub const INTR_ALL: u32 = INTR_OP_COMPLETE | INTR_WRITE_ERROR | INTR_READ_ERROR | INTR_INVALID_DESC;

// =============================================================================
// Descriptor Fields
// =============================================================================

/// One 32-bit field of an internal descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DescriptorField {
    /// CONFIG word
    Config,
    /// BYTE_COUNT
    ByteCount,
    /// SRC_ADDR
    SourceAddr,
    /// DEST_ADDR
    DestAddr,
    /// NEXT_DESC (slot index of the following descriptor)
    NextDesc,
}

impl DescriptorField {
    /// Offset within a descriptor
    pub const fn offset(self) -> usize {
        match self {
            DescriptorField::Config => 0x00,
            DescriptorField::ByteCount => 0x04,
            DescriptorField::SourceAddr => 0x08,
            DescriptorField::DestAddr => 0x0C,
            DescriptorField::NextDesc => 0x10,
        }
    }

    /// Every field, CONFIG first
    pub const ALL: [DescriptorField; 5] = [
        DescriptorField::Config,
        DescriptorField::ByteCount,
        DescriptorField::SourceAddr,
        DescriptorField::DestAddr,
        DescriptorField::NextDesc,
    ];
}

// =============================================================================
// Register Block
// =============================================================================

/// DMA controller register block.
///
/// Index arguments are checked against the controller variant before any
/// address is formed; an out-of-range index is a programming error and
/// returns a [`ConfigError`] without touching the window.
#[derive(Debug)]
pub struct DmaRegs {
    window: RegisterWindow,
    variant: ControllerVariant,
}

impl DmaRegs {
    /// Wrap a register window for the given controller variant
    pub fn new(window: RegisterWindow, variant: ControllerVariant) -> ConfigResult<Self> {
        variant.validate()?;
        if window.len() < variant.window_size() {
            return Err(ConfigError::RegionTooSmall);
        }
        Ok(Self { window, variant })
    }

    /// Controller variant this block was created for
    #[inline(always)]
    pub const fn variant(&self) -> &ControllerVariant {
        &self.variant
    }

    reg_ro!(version, VERSION_OFFSET, "VERSION register");
    reg_rw!(
        start_operation,
        set_start_operation,
        START_OPERATION_OFFSET,
        "START_OPERATION register"
    );

    // -------------------------------------------------------------------------
    // Index validation
    // -------------------------------------------------------------------------

    fn slot_offset(&self, slot: usize, field: DescriptorField) -> ConfigResult<usize> {
        if slot >= self.variant.descriptor_count {
            return Err(ConfigError::SlotOutOfRange);
        }
        Ok(DESC_BASE + slot * DESC_STRIDE + field.offset())
    }

    fn block_offset(&self, block: u8, reg: usize) -> ConfigResult<usize> {
        if usize::from(block) >= self.variant.interrupt_blocks {
            return Err(ConfigError::InterruptBlockOutOfRange);
        }
        Ok(INTR_BASE + usize::from(block) * INTR_STRIDE + reg)
    }

    fn stream_offset(&self, channel: u8) -> ConfigResult<usize> {
        if usize::from(channel) >= self.variant.stream_channels {
            return Err(ConfigError::ChannelOutOfRange);
        }
        Ok(STREAM_ADDR_BASE + usize::from(channel) * STREAM_ADDR_STRIDE)
    }

    /// True when `slot` exists on this controller
    #[inline(always)]
    pub fn has_slot(&self, slot: usize) -> bool {
        slot < self.variant.descriptor_count
    }

    // -------------------------------------------------------------------------
    // Start
    // -------------------------------------------------------------------------

    /// Start the rings selected by `mask`.
    ///
    /// Hardware begins fetching as soon as this write lands, so every
    /// descriptor write is fenced first.
    pub fn start(&self, mask: u32) {
        dma_barrier();
        self.set_start_operation(mask);
    }

    // -------------------------------------------------------------------------
    // Descriptor fields
    // -------------------------------------------------------------------------

    /// Write one descriptor field (barrier first)
    pub fn write_descriptor_field(
        &self,
        slot: usize,
        field: DescriptorField,
        value: u32,
    ) -> ConfigResult<()> {
        let offset = self.slot_offset(slot, field)?;
        dma_barrier();
        self.window.write(offset, value);
        Ok(())
    }

    /// Read one descriptor field (barrier after)
    pub fn read_descriptor_field(&self, slot: usize, field: DescriptorField) -> ConfigResult<u32> {
        let offset = self.slot_offset(slot, field)?;
        let value = self.window.read(offset);
        dma_barrier();
        Ok(value)
    }

    /// Set bits in a descriptor's CONFIG word
    pub fn set_descriptor_bits(&self, slot: usize, bits: u32) -> ConfigResult<()> {
        let offset = self.slot_offset(slot, DescriptorField::Config)?;
        dma_barrier();
        self.window.modify(offset, |v| v | bits);
        Ok(())
    }

    /// Clear bits in a descriptor's CONFIG word
    pub fn clear_descriptor_bits(&self, slot: usize, bits: u32) -> ConfigResult<()> {
        let offset = self.slot_offset(slot, DescriptorField::Config)?;
        dma_barrier();
        self.window.modify(offset, |v| v & !bits);
        Ok(())
    }

    /// Raise `valid` on a configured descriptor (phase two of a write)
    pub fn set_descriptor_valid(&self, slot: usize) -> ConfigResult<()> {
        self.set_descriptor_bits(slot, mem_config::VALID)
    }

    /// Drop `valid` (and the ready bits, which are meaningless without it)
    pub fn clear_descriptor_valid(&self, slot: usize) -> ConfigResult<()> {
        self.clear_descriptor_bits(slot, mem_config::VALID | mem_config::READY_BITS)
    }

    // -------------------------------------------------------------------------
    // Interrupt blocks
    // -------------------------------------------------------------------------

    /// Read INTR_n_STAT (barrier after)
    pub fn read_interrupt_status(&self, block: u8) -> ConfigResult<u32> {
        let value = self
            .window
            .read(self.block_offset(block, INTR_STAT_OFFSET)?);
        dma_barrier();
        Ok(value)
    }

    /// Write INTR_n_MASK; set bits enable the matching events
    pub fn mask_interrupts(&self, block: u8, enabled: u32) -> ConfigResult<()> {
        let offset = self.block_offset(block, INTR_MASK_OFFSET)?;
        dma_barrier();
        self.window.write(offset, enabled & INTR_ALL);
        Ok(())
    }

    /// Read INTR_n_MASK
    pub fn interrupt_mask(&self, block: u8) -> ConfigResult<u32> {
        Ok(self
            .window
            .read(self.block_offset(block, INTR_MASK_OFFSET)?))
    }

    /// Write-1-to-clear INTR_n_CLEAR
    pub fn clear_interrupts(&self, block: u8, bits: u32) -> ConfigResult<()> {
        let offset = self.block_offset(block, INTR_CLEAR_OFFSET)?;
        dma_barrier();
        self.window.write(offset, bits & INTR_ALL);
        Ok(())
    }

    /// Read INTR_n_EXT_ADDR (address of the last external descriptor)
    pub fn interrupt_ext_addr(&self, block: u8) -> ConfigResult<u32> {
        Ok(self
            .window
            .read(self.block_offset(block, INTR_EXT_ADDR_OFFSET)?))
    }

    // -------------------------------------------------------------------------
    // Stream channels
    // -------------------------------------------------------------------------

    /// Point stream channel `channel` at its first external descriptor
    pub fn set_stream_descriptor_pointer(&self, channel: u8, phys: u32) -> ConfigResult<()> {
        let offset = self.stream_offset(channel)?;
        dma_barrier();
        self.window.write(offset, phys);
        Ok(())
    }

    /// Read back a stream descriptor pointer
    pub fn stream_descriptor_pointer(&self, channel: u8) -> ConfigResult<u32> {
        let value = self.window.read(self.stream_offset(channel)?);
        dma_barrier();
        Ok(value)
    }

    // -------------------------------------------------------------------------
    // Whole-controller operations
    // -------------------------------------------------------------------------

    /// Zero every descriptor CONFIG word and every stream pointer.
    pub fn force_stop_all(&self) {
        for slot in 0..self.variant.descriptor_count {
            self.window.write(DESC_BASE + slot * DESC_STRIDE, 0);
        }
        for channel in 0..self.variant.stream_channels {
            self.window
                .write(STREAM_ADDR_BASE + channel * STREAM_ADDR_STRIDE, 0);
        }
        dma_barrier();
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockRegisterFile;

    #[test]
    fn register_offsets_match_controller_map() {
        assert_eq!(INTR_BASE + 3 * INTR_STRIDE + INTR_EXT_ADDR_OFFSET, 0x04C);
        assert_eq!(DESC_BASE + 31 * DESC_STRIDE + 0x10, 0x450);
        assert_eq!(STREAM_ADDR_BASE, DESC_BASE + 32 * DESC_STRIDE);
        assert_eq!(start_stream_bit(2), 1 << 18);
        assert_eq!(start_mem_bit(3), 0x8);
    }

    #[test]
    fn new_rejects_short_window() {
        let file = MockRegisterFile::with_len(0x100);
        assert_eq!(
            DmaRegs::new(file.window(), ControllerVariant::CORE_4).unwrap_err(),
            ConfigError::RegionTooSmall
        );
    }

    #[test]
    fn descriptor_fields_land_at_slot_offsets() {
        let file = MockRegisterFile::new();
        let regs = file.regs(ControllerVariant::CORE_4);

        regs.write_descriptor_field(2, DescriptorField::DestAddr, 0x1234_5678)
            .unwrap();
        assert_eq!(file.read(0x060 + 2 * 0x20 + 0x0C), 0x1234_5678);
        assert_eq!(
            regs.read_descriptor_field(2, DescriptorField::DestAddr)
                .unwrap(),
            0x1234_5678
        );
    }

    #[test]
    fn out_of_range_slot_fails_before_touching_window() {
        let file = MockRegisterFile::new();
        let regs = file.regs(ControllerVariant::CORE_4);
        let before = file.snapshot();

        assert_eq!(
            regs.write_descriptor_field(4, DescriptorField::Config, 0xFFFF),
            Err(ConfigError::SlotOutOfRange)
        );
        assert_eq!(regs.set_descriptor_valid(7), Err(ConfigError::SlotOutOfRange));
        assert_eq!(
            regs.set_stream_descriptor_pointer(4, 0x1000),
            Err(ConfigError::ChannelOutOfRange)
        );
        assert_eq!(file.snapshot(), before);
    }

    #[test]
    fn large_variant_accepts_slot_31_and_one_block() {
        let file = MockRegisterFile::new();
        let regs = file.regs(ControllerVariant::CORE_32);
        assert!(regs.set_descriptor_valid(31).is_ok());
        assert_eq!(file.read(0x060 + 31 * 0x20), mem_config::VALID);
        assert_eq!(
            regs.read_interrupt_status(1),
            Err(ConfigError::InterruptBlockOutOfRange)
        );
    }

    #[test]
    fn valid_toggles_preserve_other_bits() {
        let file = MockRegisterFile::new();
        let regs = file.regs(ControllerVariant::CORE_4);
        regs.write_descriptor_field(0, DescriptorField::Config, mem_config::CHAIN | 0b0101)
            .unwrap();

        regs.set_descriptor_valid(0).unwrap();
        assert_eq!(file.read(0x060), mem_config::CHAIN | 0b0101 | mem_config::VALID);

        regs.set_descriptor_bits(0, mem_config::DEST_DATA_READY)
            .unwrap();
        regs.clear_descriptor_valid(0).unwrap();
        assert_eq!(file.read(0x060), mem_config::CHAIN | 0b0101);
    }

    #[test]
    fn interrupt_block_registers() {
        let file = MockRegisterFile::new();
        let regs = file.regs(ControllerVariant::CORE_4);

        regs.mask_interrupts(1, 0xFF).unwrap();
        assert_eq!(file.read(0x024), INTR_ALL);
        assert_eq!(regs.interrupt_mask(1).unwrap(), INTR_ALL);

        regs.clear_interrupts(3, INTR_OP_COMPLETE).unwrap();
        assert_eq!(file.read(0x048), INTR_OP_COMPLETE);

        file.write(0x030, 0x31);
        assert_eq!(regs.read_interrupt_status(2).unwrap(), 0x31);
    }

    #[test]
    fn start_and_stream_pointer() {
        let file = MockRegisterFile::new();
        let regs = file.regs(ControllerVariant::CORE_4);

        regs.start(start_stream_bit(1));
        assert_eq!(file.read(START_OPERATION_OFFSET), 1 << 17);

        regs.set_stream_descriptor_pointer(3, 0x8000_0040).unwrap();
        assert_eq!(file.read(0x46C), 0x8000_0040);
        assert_eq!(regs.stream_descriptor_pointer(3).unwrap(), 0x8000_0040);
    }

    #[test]
    fn force_stop_all_zeroes_configs_and_pointers() {
        let file = MockRegisterFile::new();
        let regs = file.regs(ControllerVariant::CORE_32);
        for slot in 0..32 {
            regs.write_descriptor_field(slot, DescriptorField::Config, 0xF405)
                .unwrap();
            regs.write_descriptor_field(slot, DescriptorField::ByteCount, 64)
                .unwrap();
        }
        regs.set_stream_descriptor_pointer(0, 0x1000).unwrap();

        regs.force_stop_all();

        for slot in 0..32 {
            assert_eq!(
                regs.read_descriptor_field(slot, DescriptorField::Config)
                    .unwrap(),
                0
            );
            // Only CONFIG is cleared
            assert_eq!(
                regs.read_descriptor_field(slot, DescriptorField::ByteCount)
                    .unwrap(),
                64
            );
        }
        assert_eq!(regs.stream_descriptor_pointer(0).unwrap(), 0);
    }
}
