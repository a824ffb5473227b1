//! Descriptor ring programming.
//!
//! A ring is an ordered list of descriptor slots linked by `chain`/`next`.
//! Internal rings use the controller's register-file descriptors; external
//! rings use [`StreamDescriptor`](super::descriptor::stream::StreamDescriptor)
//! records in buffer memory. Every descriptor is written with `valid` clear,
//! fenced, and only then validated.

#[cfg(feature = "log")]
use log::{debug, warn};

use super::descriptor::{ConfigLayout, DescriptorFlags, StreamDescriptorTable, decode, encode};
use crate::driver::config::RingMode;
use crate::driver::error::{ConfigError, ConfigResult, DmaError, Result};
use crate::hal::mmio::dma_barrier;
use crate::internal::constants::MAX_SLOTS;
use crate::internal::register::dma::{DescriptorField, DmaRegs};

/// One descriptor to program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RingEntry {
    /// Slot index (register-file slot, or record index for external rings)
    pub slot: u8,
    /// Source physical address (ignored on external rings)
    pub source: u32,
    /// Destination physical address
    pub destination: u32,
    /// Bytes to transfer
    pub byte_count: u32,
}

/// Where a ring's descriptors live.
#[derive(Debug, Clone, Copy)]
pub enum RingStorage {
    /// Register-file descriptors (memory-to-memory)
    Internal,
    /// Records in buffer memory, fetched by a stream channel
    External {
        /// Stream channel that fetches the ring
        channel: u8,
        /// Record table
        table: StreamDescriptorTable,
    },
}

/// Programmed descriptor ring.
pub struct DescriptorRing<'a> {
    regs: &'a DmaRegs,
    storage: RingStorage,
    mode: RingMode,
    slots: [u8; MAX_SLOTS],
    /// CONFIG word written per position (valid set, ready clear)
    programmed: [u32; MAX_SLOTS],
    len: usize,
    max_byte_count: u32,
}

impl<'a> DescriptorRing<'a> {
    /// Ring over register-file descriptors
    pub fn internal(regs: &'a DmaRegs, max_byte_count: u32) -> Self {
        Self {
            regs,
            storage: RingStorage::Internal,
            mode: RingMode::Linear,
            slots: [0; MAX_SLOTS],
            programmed: [0; MAX_SLOTS],
            len: 0,
            max_byte_count,
        }
    }

    /// Ring over an external record table fetched by stream `channel`
    pub fn external(
        regs: &'a DmaRegs,
        channel: u8,
        table: StreamDescriptorTable,
        max_byte_count: u32,
    ) -> ConfigResult<Self> {
        if usize::from(channel) >= regs.variant().stream_channels {
            return Err(ConfigError::ChannelOutOfRange);
        }
        Ok(Self {
            storage: RingStorage::External { channel, table },
            ..Self::internal(regs, max_byte_count)
        })
    }

    // -------------------------------------------------------------------------
    // Geometry
    // -------------------------------------------------------------------------

    /// CONFIG word layout of the ring's descriptors
    pub const fn layout(&self) -> ConfigLayout {
        match self.storage {
            RingStorage::Internal => ConfigLayout::Memory,
            RingStorage::External { .. } => ConfigLayout::Stream,
        }
    }

    /// Number of programmed positions (0 before configuration)
    #[inline(always)]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True before configuration and after teardown
    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Chain topology of the last configuration
    #[inline(always)]
    pub const fn mode(&self) -> RingMode {
        self.mode
    }

    /// Slot at ring position `pos`
    #[inline(always)]
    pub fn slot(&self, pos: usize) -> u8 {
        self.slots[pos % self.len.max(1)]
    }

    /// Ring position of `slot`
    pub fn position_of(&self, slot: usize) -> Option<usize> {
        self.slots[..self.len]
            .iter()
            .position(|s| usize::from(*s) == slot)
    }

    /// Position following `pos` in chain order
    #[inline(always)]
    pub fn next_position(&self, pos: usize) -> usize {
        (pos + 1) % self.len.max(1)
    }

    /// Number of descriptors the storage holds
    pub fn capacity(&self) -> usize {
        match self.storage {
            RingStorage::Internal => self.regs.variant().descriptor_count,
            RingStorage::External { table, .. } => table.capacity(),
        }
    }

    /// Stream channel and record table for external rings
    pub fn external_table(&self) -> Option<(u8, StreamDescriptorTable)> {
        match self.storage {
            RingStorage::Internal => None,
            RingStorage::External { channel, table } => Some((channel, table)),
        }
    }

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------

    /// Check entries without touching hardware
    pub fn validate(&self, entries: &[RingEntry]) -> ConfigResult<()> {
        if entries.is_empty() {
            return Err(ConfigError::EmptyRing);
        }
        if entries.len() > MAX_SLOTS || entries.len() > self.capacity() {
            return Err(ConfigError::RingTooLarge);
        }
        for (i, entry) in entries.iter().enumerate() {
            if usize::from(entry.slot) >= self.capacity() {
                return Err(ConfigError::SlotOutOfRange);
            }
            if entries[..i].iter().any(|e| e.slot == entry.slot) {
                return Err(ConfigError::DuplicateSlot);
            }
            if entry.byte_count == 0 || entry.byte_count > self.max_byte_count {
                return Err(ConfigError::ByteCountTooLarge);
            }
        }
        Ok(())
    }

    /// Program a one-shot chain.
    ///
    /// Entry *i* chains to entry *i+1*; the last entry has `chain` clear and
    /// interrupts on process. The ring is read back before returning.
    pub fn configure_linear(&mut self, entries: &[RingEntry]) -> Result<()> {
        self.program(entries, RingMode::Linear)
    }

    /// Program a closed loop; the last entry chains back to the first and
    /// every entry interrupts on process.
    pub fn configure_cyclic(&mut self, entries: &[RingEntry], iterations: Option<u32>) -> Result<()> {
        self.program(entries, RingMode::Cyclic { iterations })
    }

    fn program(&mut self, entries: &[RingEntry], mode: RingMode) -> Result<()> {
        self.validate(entries)?;
        if !self.is_empty() {
            self.teardown();
        }

        let n = entries.len();
        let layout = self.layout();
        for (pos, entry) in entries.iter().enumerate() {
            self.slots[pos] = entry.slot;
        }
        self.len = n;
        self.mode = mode;

        for (pos, entry) in entries.iter().enumerate() {
            let last = pos + 1 == n;
            let chain = !last || mode.is_cyclic();
            let flags = DescriptorFlags::new()
                .with_increment(layout == ConfigLayout::Memory, true)
                .with_chain(chain)
                .with_irq(last || mode.is_cyclic())
                .with_valid();
            let config = encode(flags, layout)?;
            let next = if chain {
                self.link_value(usize::from(entries[(pos + 1) % n].slot))?
            } else {
                0
            };

            // Phase one: everything except `valid`
            let slot = usize::from(entry.slot);
            self.write_field(slot, DescriptorField::Config, encode(flags.without_valid(), layout)?)?;
            self.write_field(slot, DescriptorField::ByteCount, entry.byte_count)?;
            self.write_field(slot, DescriptorField::SourceAddr, entry.source)?;
            self.write_field(slot, DescriptorField::DestAddr, entry.destination)?;
            self.write_field(slot, DescriptorField::NextDesc, next)?;
            dma_barrier();

            // Phase two
            self.write_field(slot, DescriptorField::Config, config)?;
            self.programmed[pos] = config;
        }

        if let RingStorage::External { channel, table } = self.storage {
            let head = table.phys_addr(usize::from(entries[0].slot))?;
            self.regs.set_stream_descriptor_pointer(channel, head)?;
        }

        if let Err(e) = self.verify(entries) {
            self.teardown();
            self.len = 0;
            return Err(e.into());
        }

        #[cfg(feature = "log")]
        debug!("ring programmed: {n} descriptors, {mode:?}");

        Ok(())
    }

    /// Compare every programmed field against the intended values.
    fn verify(&self, entries: &[RingEntry]) -> ConfigResult<()> {
        let n = entries.len();
        for (pos, entry) in entries.iter().enumerate() {
            let slot = usize::from(entry.slot);
            let chain = pos + 1 < n || self.mode.is_cyclic();
            let next = if chain {
                self.link_value(usize::from(entries[(pos + 1) % n].slot))?
            } else {
                0
            };
            let expected = [
                (DescriptorField::Config, self.programmed[pos]),
                (DescriptorField::ByteCount, entry.byte_count),
                (DescriptorField::DestAddr, entry.destination),
                (DescriptorField::NextDesc, next),
                (DescriptorField::SourceAddr, entry.source),
            ];
            let checked = match self.storage {
                RingStorage::Internal => expected.len(),
                // External records carry no source address
                RingStorage::External { .. } => expected.len() - 1,
            };
            for (field, want) in &expected[..checked] {
                let got = self.read_field(slot, *field)?;
                if got != *want {
                    #[cfg(feature = "log")]
                    warn!(
                        "descriptor {slot} {field:?} readback {got:#010x}, expected {:#010x}",
                        *want
                    );
                    return Err(ConfigError::ConfigurationMismatch);
                }
            }
        }

        if let RingStorage::External { channel, table } = self.storage {
            let head = table.phys_addr(usize::from(entries[0].slot))?;
            if self.regs.stream_descriptor_pointer(channel)? != head {
                return Err(ConfigError::ConfigurationMismatch);
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Handshake
    // -------------------------------------------------------------------------

    /// True while the hardware still sees ready bits on position `pos`
    pub fn hardware_owned(&self, pos: usize) -> ConfigResult<bool> {
        let config = self.read_field(usize::from(self.slot(pos)), DescriptorField::Config)?;
        Ok(config & self.layout().ready_mask() != 0)
    }

    /// Re-validate `pos` and set its ready bits in one write.
    ///
    /// Fails with [`DmaError::DescriptorBusy`] when the hardware has not yet
    /// released the slot.
    pub fn rearm(&self, pos: usize) -> Result<()> {
        if self.hardware_owned(pos)? {
            return Err(DmaError::DescriptorBusy.into());
        }
        let layout = self.layout();
        let flags = decode(self.programmed[pos % self.len.max(1)], layout);
        let flags = match layout {
            ConfigLayout::Memory => flags.with_ready(true, true),
            ConfigLayout::Stream => flags.with_ready(false, true),
        };
        let word = encode(flags.with_valid(), layout)?;
        self.write_field(usize::from(self.slot(pos)), DescriptorField::Config, word)?;
        Ok(())
    }

    /// Point `pos` at a different destination buffer.
    ///
    /// The slot is invalidated, retargeted and validated again; it is left
    /// without ready bits.
    pub fn rebind(&self, pos: usize, destination: u32) -> Result<()> {
        if self.hardware_owned(pos)? {
            return Err(DmaError::DescriptorBusy.into());
        }
        let slot = usize::from(self.slot(pos));
        let config = self.programmed[pos % self.len.max(1)];
        let valid = self.layout().valid_mask();

        self.write_field(slot, DescriptorField::Config, config & !valid)?;
        self.write_field(slot, DescriptorField::DestAddr, destination)?;
        dma_barrier();
        self.write_field(slot, DescriptorField::Config, config)?;

        if self.read_field(slot, DescriptorField::DestAddr)? != destination {
            return Err(ConfigError::ConfigurationMismatch.into());
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Teardown
    // -------------------------------------------------------------------------

    /// Clear `valid` on every slot and the stream pointer. Idempotent.
    pub fn teardown(&mut self) {
        let mask = self.layout().valid_mask() | self.layout().ready_mask();
        for pos in 0..self.len {
            let slot = usize::from(self.slots[pos]);
            // Slots were range-checked when the ring was programmed.
            if let Ok(config) = self.read_field(slot, DescriptorField::Config) {
                let _ = self.write_field(slot, DescriptorField::Config, config & !mask);
            }
        }
        if let RingStorage::External { channel, .. } = self.storage {
            let _ = self.regs.set_stream_descriptor_pointer(channel, 0);
        }
        dma_barrier();
    }

    // -------------------------------------------------------------------------
    // Storage access
    // -------------------------------------------------------------------------

    fn link_value(&self, next_slot: usize) -> ConfigResult<u32> {
        match self.storage {
            RingStorage::Internal => Ok(next_slot as u32),
            RingStorage::External { table, .. } => table.phys_addr(next_slot),
        }
    }

    fn write_field(&self, slot: usize, field: DescriptorField, value: u32) -> ConfigResult<()> {
        match self.storage {
            RingStorage::Internal => self.regs.write_descriptor_field(slot, field, value),
            RingStorage::External { table, .. } => {
                let desc = table.get(slot)?;
                dma_barrier();
                match field {
                    DescriptorField::Config => desc.set_config(value),
                    DescriptorField::ByteCount => desc.set_byte_count(value),
                    DescriptorField::DestAddr => desc.set_dest_addr(value),
                    DescriptorField::NextDesc => desc.set_next_desc(value),
                    DescriptorField::SourceAddr => {}
                }
                Ok(())
            }
        }
    }

    fn read_field(&self, slot: usize, field: DescriptorField) -> ConfigResult<u32> {
        match self.storage {
            RingStorage::Internal => self.regs.read_descriptor_field(slot, field),
            RingStorage::External { table, .. } => {
                let desc = table.get(slot)?;
                let value = match field {
                    DescriptorField::Config => desc.config(),
                    DescriptorField::ByteCount => desc.byte_count(),
                    DescriptorField::DestAddr => desc.dest_addr(),
                    DescriptorField::NextDesc => desc.next_desc(),
                    DescriptorField::SourceAddr => 0,
                };
                dma_barrier();
                Ok(value)
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
