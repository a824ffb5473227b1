//! Memory-mapped windows and DMA-visible regions.
//!
//! Raw addresses enter the crate here and nowhere else. A
//! [`RegisterWindow`] wraps the controller's mapped register block and a
//! [`DmaRegion`] wraps a hardware-visible buffer area whose physical address
//! is known. Both perform volatile access only.

use crate::driver::error::{ConfigError, ConfigResult};
use crate::internal::constants::DMA_ALIGNMENT;

// =============================================================================
// Barriers
// =============================================================================

/// Full memory barrier ordering CPU accesses against the DMA master.
///
/// Issued before any register write that participates in a hardware
/// handshake and after any register read whose value gates a later write.
#[inline(always)]
pub fn dma_barrier() {
    core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);

    #[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
    {
        // SAFETY: `fence` has no operands and no side effects besides ordering.
        unsafe { core::arch::asm!("fence iorw, iorw", options(nostack, preserves_flags)) };
    }

    #[cfg(target_arch = "aarch64")]
    {
        // SAFETY: `dsb sy` has no operands and no side effects besides ordering.
        unsafe { core::arch::asm!("dsb sy", options(nostack, preserves_flags)) };
    }

    #[cfg(not(any(
        target_arch = "riscv32",
        target_arch = "riscv64",
        target_arch = "aarch64"
    )))]
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
}

// =============================================================================
// Register Window
// =============================================================================

/// Mapped controller register block.
///
/// Offsets are byte offsets from the window base. Callers inside the crate
/// validate indices before computing offsets; the window re-checks bounds in
/// debug builds.
#[derive(Debug)]
pub struct RegisterWindow {
    base: *mut u32,
    len: usize,
}

// SAFETY: the window is plain MMIO; every access is a volatile 32-bit
// load or store and channels touch disjoint offsets.
unsafe impl Send for RegisterWindow {}
// SAFETY: see above.
unsafe impl Sync for RegisterWindow {}

impl RegisterWindow {
    /// Wrap a mapped register block.
    ///
    /// # Safety
    ///
    /// `base` must point to `len` bytes of mapped, writable device memory that
    /// stays mapped for the lifetime of the returned window, and nothing else
    /// may access it through non-volatile references.
    pub unsafe fn from_raw_parts(base: *mut u8, len: usize) -> ConfigResult<Self> {
        if base.is_null() {
            return Err(ConfigError::InvalidConfig);
        }
        if (base as usize) % 4 != 0 {
            return Err(ConfigError::Misaligned);
        }
        Ok(Self {
            base: base.cast::<u32>(),
            len,
        })
    }

    /// Window length in bytes
    #[inline(always)]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True when the window maps no registers
    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Volatile 32-bit read at a byte offset
    #[inline(always)]
    pub(crate) fn read(&self, offset: usize) -> u32 {
        debug_assert!(offset % 4 == 0 && offset + 4 <= self.len);
        // SAFETY: offset is in bounds (checked by callers and above), the
        // mapping is valid per the constructor contract.
        unsafe { core::ptr::read_volatile(self.base.add(offset / 4)) }
    }

    /// Volatile 32-bit write at a byte offset
    #[inline(always)]
    pub(crate) fn write(&self, offset: usize, value: u32) {
        debug_assert!(offset % 4 == 0 && offset + 4 <= self.len);
        // SAFETY: see `read`.
        unsafe { core::ptr::write_volatile(self.base.add(offset / 4), value) }
    }

    /// Read-modify-write of a register
    #[inline(always)]
    pub(crate) fn modify<F>(&self, offset: usize, f: F)
    where
        F: FnOnce(u32) -> u32,
    {
        let value = self.read(offset);
        self.write(offset, f(value));
    }
}

// =============================================================================
// DMA Region
// =============================================================================

/// Hardware-visible memory with known virtual and physical bases.
///
/// Regions are plain address ranges; ownership of the bytes is tracked by
/// the buffer pool and the descriptor ready bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmaRegion {
    virt: usize,
    phys: u64,
    len: usize,
}

impl DmaRegion {
    /// Describe a DMA-visible memory area.
    ///
    /// # Safety
    ///
    /// `virt` must map `len` bytes of memory that the DMA master reaches at
    /// `phys`, and the mapping must outlive every value derived from the
    /// region (sub-regions, completed buffers).
    pub unsafe fn from_raw_parts(virt: *mut u8, phys: u64, len: usize) -> ConfigResult<Self> {
        if virt.is_null() || len == 0 {
            return Err(ConfigError::InvalidConfig);
        }
        Ok(Self {
            virt: virt as usize,
            phys,
            len,
        })
    }

    /// Physical base address as seen by the DMA master
    #[inline(always)]
    pub const fn phys(&self) -> u64 {
        self.phys
    }

    /// Length in bytes
    #[inline(always)]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True for a zero-length region (never produced by the constructors)
    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Virtual base pointer
    #[inline(always)]
    pub fn as_ptr(&self) -> *mut u8 {
        self.virt as *mut u8
    }

    /// Physical base as a 32-bit descriptor address
    pub fn phys_u32(&self) -> ConfigResult<u32> {
        let end = self
            .phys
            .checked_add(self.len as u64 - 1)
            .ok_or(ConfigError::AddressOutOfRange)?;
        if end > u64::from(u32::MAX) {
            return Err(ConfigError::AddressOutOfRange);
        }
        Ok(self.phys as u32)
    }

    /// True when the physical base meets the DMA alignment
    pub fn is_aligned(&self) -> bool {
        self.phys as usize % DMA_ALIGNMENT == 0 && self.virt % DMA_ALIGNMENT == 0
    }

    /// Carve `len` bytes starting at `offset`
    pub fn sub_region(&self, offset: usize, len: usize) -> ConfigResult<Self> {
        let end = offset.checked_add(len).ok_or(ConfigError::RegionTooSmall)?;
        if len == 0 || end > self.len {
            return Err(ConfigError::RegionTooSmall);
        }
        Ok(Self {
            virt: self.virt + offset,
            phys: self.phys + offset as u64,
            len,
        })
    }

    /// Split into a head of `at` bytes and the remainder
    pub fn split_at(&self, at: usize) -> ConfigResult<(Self, Self)> {
        if at == 0 || at >= self.len {
            return Err(ConfigError::RegionTooSmall);
        }
        Ok((self.sub_region(0, at)?, self.sub_region(at, self.len - at)?))
    }

    /// Copy bytes into the region, then fence them toward the DMA master.
    ///
    /// Only call this on memory the hardware does not currently own.
    pub fn write_bytes(&self, offset: usize, data: &[u8]) -> ConfigResult<()> {
        let end = offset
            .checked_add(data.len())
            .ok_or(ConfigError::RegionTooSmall)?;
        if end > self.len {
            return Err(ConfigError::RegionTooSmall);
        }
        // SAFETY: range checked above; mapping valid per constructor contract.
        unsafe {
            core::ptr::copy_nonoverlapping(data.as_ptr(), self.as_ptr().add(offset), data.len());
        }
        dma_barrier();
        Ok(())
    }

    /// Fence, then copy bytes out of the region.
    pub fn read_bytes(&self, offset: usize, out: &mut [u8]) -> ConfigResult<()> {
        let end = offset
            .checked_add(out.len())
            .ok_or(ConfigError::RegionTooSmall)?;
        if end > self.len {
            return Err(ConfigError::RegionTooSmall);
        }
        dma_barrier();
        // SAFETY: range checked above; mapping valid per constructor contract.
        unsafe {
            core::ptr::copy_nonoverlapping(self.as_ptr().add(offset), out.as_mut_ptr(), out.len());
        }
        Ok(())
    }

    /// Borrow the region's bytes.
    ///
    /// # Safety
    ///
    /// The hardware must not write the region while the slice is alive.
    pub(crate) unsafe fn as_slice<'a>(&self) -> &'a [u8] {
        dma_barrier();
        // SAFETY: caller guarantees no concurrent hardware writes.
        unsafe { core::slice::from_raw_parts(self.as_ptr(), self.len) }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::vec;

    use super::*;

    #[test]
    fn window_rejects_null_and_misaligned_bases() {
        // SAFETY: constructor rejects before dereferencing.
        let null = unsafe { RegisterWindow::from_raw_parts(core::ptr::null_mut(), 16) };
        assert_eq!(null.unwrap_err(), ConfigError::InvalidConfig);

        let mut words = [0u32; 4];
        let odd = unsafe { (words.as_mut_ptr() as *mut u8).add(1) };
        // SAFETY: constructor rejects before dereferencing.
        let misaligned = unsafe { RegisterWindow::from_raw_parts(odd, 8) };
        assert_eq!(misaligned.unwrap_err(), ConfigError::Misaligned);
    }

    #[test]
    fn window_volatile_access_and_modify() {
        let mut words = [0u32; 4];
        // SAFETY: `words` outlives the window.
        let window =
            unsafe { RegisterWindow::from_raw_parts(words.as_mut_ptr().cast(), 16) }.unwrap();
        window.write(4, 0x10);
        window.modify(4, |v| v | 0x1);
        assert_eq!(window.read(4), 0x11);
        assert_eq!(window.read(0), 0);
        assert_eq!(window.len(), 16);
    }

    #[test]
    fn region_sub_region_tracks_phys() {
        let mut backing = vec![0u8; 256];
        // SAFETY: backing outlives the region.
        let region =
            unsafe { DmaRegion::from_raw_parts(backing.as_mut_ptr(), 0x4000_0000, 256) }.unwrap();
        let sub = region.sub_region(64, 32).unwrap();
        assert_eq!(sub.phys(), 0x4000_0040);
        assert_eq!(sub.len(), 32);
        assert_eq!(region.sub_region(240, 32), Err(ConfigError::RegionTooSmall));
        assert_eq!(region.sub_region(0, 0), Err(ConfigError::RegionTooSmall));
    }

    #[test]
    fn region_phys_u32_rejects_high_memory() {
        let mut backing = vec![0u8; 16];
        // SAFETY: backing outlives the region.
        let region =
            unsafe { DmaRegion::from_raw_parts(backing.as_mut_ptr(), 0x1_0000_0000, 16) }.unwrap();
        assert_eq!(region.phys_u32(), Err(ConfigError::AddressOutOfRange));

        // SAFETY: backing outlives the region.
        let straddle =
            unsafe { DmaRegion::from_raw_parts(backing.as_mut_ptr(), 0xFFFF_FFF8, 16) }.unwrap();
        assert_eq!(straddle.phys_u32(), Err(ConfigError::AddressOutOfRange));
    }

    #[test]
    fn region_byte_copies_are_bounded() {
        let mut backing = vec![0u8; 8];
        // SAFETY: backing outlives the region.
        let region =
            unsafe { DmaRegion::from_raw_parts(backing.as_mut_ptr(), 0x1000, 8) }.unwrap();
        region.write_bytes(2, &[1, 2, 3]).unwrap();
        let mut out = [0u8; 4];
        region.read_bytes(1, &mut out).unwrap();
        assert_eq!(out, [0, 1, 2, 3]);
        assert_eq!(region.write_bytes(6, &[0; 3]), Err(ConfigError::RegionTooSmall));
    }

    #[test]
    fn region_split_at() {
        let mut backing = vec![0u8; 64];
        // SAFETY: backing outlives the region.
        let region =
            unsafe { DmaRegion::from_raw_parts(backing.as_mut_ptr(), 0x2000, 64) }.unwrap();
        let (head, tail) = region.split_at(16).unwrap();
        assert_eq!(head.len(), 16);
        assert_eq!(tail.phys(), 0x2010);
        assert_eq!(tail.len(), 48);
        assert!(region.split_at(64).is_err());
    }
}
