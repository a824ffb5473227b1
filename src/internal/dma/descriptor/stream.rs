//! External descriptors fetched by stream channels.
//!
//! Stream descriptors live in buffer memory rather than the register file.
//! The hardware reads a 16-byte record: CONFIG, BYTE_COUNT, DEST_ADDR and a
//! fourth word holding the physical address of the next record when `chain`
//! is set.

use super::VolatileCell;
use crate::driver::error::{ConfigError, ConfigResult};
use crate::hal::mmio::{DmaRegion, dma_barrier};
use crate::internal::constants::{MAX_SLOTS, STREAM_DESCRIPTOR_SIZE};

/// One external descriptor record.
#[repr(C, align(16))]
pub struct StreamDescriptor {
    /// Configuration word (stream layout)
    config: VolatileCell<u32>,
    /// Bytes to write into the destination
    byte_count: VolatileCell<u32>,
    /// Destination physical address
    dest_addr: VolatileCell<u32>,
    /// Next record physical address
    next_desc: VolatileCell<u32>,
}

const _: () = assert!(core::mem::size_of::<StreamDescriptor>() == STREAM_DESCRIPTOR_SIZE);

#[allow(dead_code)]
impl StreamDescriptor {
    /// Size of the descriptor in bytes
    pub const SIZE: usize = STREAM_DESCRIPTOR_SIZE;

    /// Create a zeroed descriptor.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            config: VolatileCell::new(0),
            byte_count: VolatileCell::new(0),
            dest_addr: VolatileCell::new(0),
            next_desc: VolatileCell::new(0),
        }
    }

    /// Raw CONFIG word
    #[inline(always)]
    pub fn config(&self) -> u32 {
        self.config.get()
    }

    /// Write the CONFIG word
    #[inline(always)]
    pub fn set_config(&self, value: u32) {
        self.config.set(value);
    }

    /// Byte count
    #[inline(always)]
    pub fn byte_count(&self) -> u32 {
        self.byte_count.get()
    }

    /// Write the byte count
    #[inline(always)]
    pub fn set_byte_count(&self, value: u32) {
        self.byte_count.set(value);
    }

    /// Destination address
    #[inline(always)]
    pub fn dest_addr(&self) -> u32 {
        self.dest_addr.get()
    }

    /// Write the destination address
    #[inline(always)]
    pub fn set_dest_addr(&self, value: u32) {
        self.dest_addr.set(value);
    }

    /// Next descriptor address
    #[inline(always)]
    pub fn next_desc(&self) -> u32 {
        self.next_desc.get()
    }

    /// Write the next descriptor address
    #[inline(always)]
    pub fn set_next_desc(&self, value: u32) {
        self.next_desc.set(value);
    }

    /// Zero every word, config first.
    pub fn clear(&self) {
        self.config.set(0);
        dma_barrier();
        self.byte_count.set(0);
        self.dest_addr.set(0);
        self.next_desc.set(0);
    }
}

impl Default for StreamDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

/// Array of stream descriptors carved from a DMA region.
#[derive(Debug, Clone, Copy)]
pub struct StreamDescriptorTable {
    region: DmaRegion,
    capacity: usize,
}

impl StreamDescriptorTable {
    /// Bytes needed for `count` records
    pub const fn bytes_for(count: usize) -> usize {
        count * STREAM_DESCRIPTOR_SIZE
    }

    /// Wrap a region as a descriptor table.
    ///
    /// The region must be 16-byte aligned and addressable with 32 bits.
    pub fn new(region: DmaRegion) -> ConfigResult<Self> {
        if !region.is_aligned() {
            return Err(ConfigError::Misaligned);
        }
        region.phys_u32()?;
        let capacity = (region.len() / STREAM_DESCRIPTOR_SIZE).min(MAX_SLOTS);
        if capacity == 0 {
            return Err(ConfigError::RegionTooSmall);
        }
        Ok(Self { region, capacity })
    }

    /// Number of records the table holds
    #[inline(always)]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Physical address of record `index`
    pub fn phys_addr(&self, index: usize) -> ConfigResult<u32> {
        if index >= self.capacity {
            return Err(ConfigError::SlotOutOfRange);
        }
        Ok(self.region.phys() as u32 + (index * STREAM_DESCRIPTOR_SIZE) as u32)
    }

    /// Record index for a physical address inside the table
    pub fn index_of(&self, phys: u32) -> Option<usize> {
        let base = self.region.phys() as u32;
        let offset = phys.checked_sub(base)? as usize;
        if offset % STREAM_DESCRIPTOR_SIZE != 0 {
            return None;
        }
        let index = offset / STREAM_DESCRIPTOR_SIZE;
        (index < self.capacity).then_some(index)
    }

    /// Borrow record `index`
    pub fn get(&self, index: usize) -> ConfigResult<&StreamDescriptor> {
        if index >= self.capacity {
            return Err(ConfigError::SlotOutOfRange);
        }
        // SAFETY: index is within the region, the region is 16-byte aligned
        // and every field is accessed through VolatileCell.
        Ok(unsafe {
            &*self
                .region
                .as_ptr()
                .add(index * STREAM_DESCRIPTOR_SIZE)
                .cast::<StreamDescriptor>()
        })
    }
}
