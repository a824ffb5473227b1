//! Buffer ownership bookkeeping.
//!
//! The pool carves a DMA region into equal buffers and mirrors, per buffer,
//! who may touch it. The descriptor ready bits remain the authority on
//! whether hardware owns a buffer; the pool only prevents software from
//! binding one buffer to two slots or reading a buffer still in flight.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::driver::error::{ConfigError, ConfigResult, DmaError, DmaResult};
use crate::hal::mmio::DmaRegion;
use crate::internal::constants::{DMA_ALIGNMENT, MAX_BUFFERS};

/// Tags handed to pools; a handle is only accepted by the pool that issued it.
static NEXT_POOL_TAG: AtomicU32 = AtomicU32::new(1);

/// Index of a buffer within its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BufferId(u8);

impl BufferId {
    /// Position of the buffer in the pool
    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Ownership state of one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BufferState {
    /// Owned by software, not referenced by any descriptor
    #[default]
    Free,
    /// Bound to a valid descriptor whose ready bits are still clear
    Armed {
        /// Descriptor slot holding the buffer
        slot: u8,
    },
    /// Ready bits set; hardware may access the buffer at any time
    InFlight {
        /// Descriptor slot holding the buffer
        slot: u8,
    },
    /// Hardware finished; software may read the contents
    Completed {
        /// Slot the buffer completed on
        slot: u8,
    },
}

impl BufferState {
    /// Slot referencing the buffer, if any
    pub const fn slot(&self) -> Option<u8> {
        match self {
            BufferState::Free => None,
            BufferState::Armed { slot }
            | BufferState::InFlight { slot }
            | BufferState::Completed { slot } => Some(*slot),
        }
    }

    /// True while a descriptor references the buffer
    pub const fn is_bound(&self) -> bool {
        matches!(self, BufferState::Armed { .. } | BufferState::InFlight { .. })
    }
}

/// Proof that a buffer reached `Completed`.
///
/// Only [`BufferPool::mark_completed`] creates one, and releasing or
/// re-arming consumes it, so a buffer cannot be released twice.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CompletedHandle {
    pool: u32,
    id: BufferId,
    slot: u8,
}

impl CompletedHandle {
    /// Buffer the handle refers to
    #[inline(always)]
    pub const fn id(&self) -> BufferId {
        self.id
    }

    /// Slot the buffer completed on
    #[inline(always)]
    pub const fn slot(&self) -> u8 {
        self.slot
    }
}

/// Fixed-capacity pool of equally sized DMA buffers.
#[derive(Debug)]
pub struct BufferPool {
    region: DmaRegion,
    buffer_len: usize,
    count: usize,
    states: [BufferState; MAX_BUFFERS],
    /// Next index `acquire_free` starts scanning from
    cursor: usize,
    tag: u32,
}

impl BufferPool {
    /// Split `region` into `count` buffers of equal, aligned length.
    pub fn new(region: DmaRegion, count: usize) -> ConfigResult<Self> {
        if count == 0 || count > MAX_BUFFERS {
            return Err(ConfigError::InvalidConfig);
        }
        let buffer_len = (region.len() / count) & !(DMA_ALIGNMENT - 1);
        Self::with_buffer_len(region, count, buffer_len)
    }

    /// Carve `count` buffers of exactly `buffer_len` bytes from the front of `region`.
    pub fn with_buffer_len(
        region: DmaRegion,
        count: usize,
        buffer_len: usize,
    ) -> ConfigResult<Self> {
        if count == 0 || count > MAX_BUFFERS {
            return Err(ConfigError::InvalidConfig);
        }
        if buffer_len == 0 || buffer_len % DMA_ALIGNMENT != 0 {
            return Err(ConfigError::Misaligned);
        }
        if !region.is_aligned() {
            return Err(ConfigError::Misaligned);
        }
        let total = buffer_len
            .checked_mul(count)
            .ok_or(ConfigError::RegionTooSmall)?;
        let region = region.sub_region(0, total)?;
        region.phys_u32()?;

        Ok(Self {
            region,
            buffer_len,
            count,
            states: [BufferState::Free; MAX_BUFFERS],
            cursor: 0,
            tag: NEXT_POOL_TAG.fetch_add(1, Ordering::Relaxed),
        })
    }

    /// Number of buffers
    #[inline(always)]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Length of every buffer in bytes
    #[inline(always)]
    pub const fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// Buffer id for an index, if it exists
    pub fn id(&self, index: usize) -> Option<BufferId> {
        (index < self.count).then_some(BufferId(index as u8))
    }

    /// Current state of a buffer
    pub fn state(&self, id: BufferId) -> BufferState {
        self.states[id.index()]
    }

    /// Region covering buffer `id`
    pub fn region(&self, id: BufferId) -> DmaRegion {
        // Offsets were validated against the region in the constructor.
        self.region
            .sub_region(id.index() * self.buffer_len, self.buffer_len)
            .unwrap_or(self.region)
    }

    /// Physical address of buffer `id`
    pub fn phys(&self, id: BufferId) -> u32 {
        self.region.phys() as u32 + (id.index() * self.buffer_len) as u32
    }

    /// Number of buffers in `Free`
    pub fn free_count(&self) -> usize {
        self.states[..self.count]
            .iter()
            .filter(|s| **s == BufferState::Free)
            .count()
    }

    /// Buffer currently bound (Armed or InFlight) to `slot`
    pub fn bound_to(&self, slot: u8) -> Option<BufferId> {
        self.states[..self.count]
            .iter()
            .position(|s| s.is_bound() && s.slot() == Some(slot))
            .map(|i| BufferId(i as u8))
    }

    /// Find a free buffer, scanning round-robin.
    ///
    /// Never returns a buffer in `Armed`, `InFlight` or `Completed`. The
    /// buffer stays `Free` until [`mark_armed`](Self::mark_armed).
    pub fn acquire_free(&mut self) -> Option<BufferId> {
        for step in 0..self.count {
            let index = (self.cursor + step) % self.count;
            if self.states[index] == BufferState::Free {
                self.cursor = (index + 1) % self.count;
                return Some(BufferId(index as u8));
            }
        }
        None
    }

    /// Check that a specific buffer may be bound.
    pub fn claim(&self, id: BufferId) -> DmaResult<BufferId> {
        match self.states.get(id.index()) {
            Some(BufferState::Free) if id.index() < self.count => Ok(id),
            _ => Err(DmaError::BufferBusy),
        }
    }

    /// Free -> Armed, bound to `slot`
    pub fn mark_armed(&mut self, id: BufferId, slot: u8) -> DmaResult<()> {
        self.claim(id)?;
        if self.bound_to(slot).is_some() {
            return Err(DmaError::BufferBusy);
        }
        self.states[id.index()] = BufferState::Armed { slot };
        Ok(())
    }

    /// Armed -> InFlight
    pub fn mark_in_flight(&mut self, id: BufferId) -> DmaResult<()> {
        match self.states[id.index()] {
            BufferState::Armed { slot } => {
                self.states[id.index()] = BufferState::InFlight { slot };
                Ok(())
            }
            _ => Err(DmaError::BufferBusy),
        }
    }

    /// InFlight -> Completed
    pub fn mark_completed(&mut self, id: BufferId) -> DmaResult<CompletedHandle> {
        match self.states[id.index()] {
            BufferState::InFlight { slot } => {
                self.states[id.index()] = BufferState::Completed { slot };
                Ok(CompletedHandle {
                    pool: self.tag,
                    id,
                    slot,
                })
            }
            _ => Err(DmaError::BufferBusy),
        }
    }

    /// Completed -> Free
    pub fn release(&mut self, handle: CompletedHandle) -> DmaResult<BufferId> {
        self.check_completed(&handle)?;
        self.states[handle.id.index()] = BufferState::Free;
        Ok(handle.id)
    }

    /// Completed -> Armed on `slot` (direct cyclic reuse)
    pub fn rearm_completed(&mut self, handle: CompletedHandle, slot: u8) -> DmaResult<BufferId> {
        self.check_completed(&handle)?;
        if self.bound_to(slot).is_some() {
            return Err(DmaError::BufferBusy);
        }
        self.states[handle.id.index()] = BufferState::Armed { slot };
        Ok(handle.id)
    }

    /// Return every bound buffer to `Free` after the hardware was stopped.
    ///
    /// Completed buffers stay completed; their handles are still live.
    pub fn unbind_all(&mut self) {
        for state in &mut self.states[..self.count] {
            if state.is_bound() {
                *state = BufferState::Free;
            }
        }
    }

    fn check_completed(&self, handle: &CompletedHandle) -> DmaResult<()> {
        if handle.pool != self.tag {
            return Err(DmaError::BufferBusy);
        }
        match self.states.get(handle.id.index()) {
            Some(BufferState::Completed { slot }) if *slot == handle.slot => Ok(()),
            _ => Err(DmaError::BufferBusy),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
