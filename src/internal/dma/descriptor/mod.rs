//! Hardware descriptor representations.
//!
//! Internal descriptors are register-file slots accessed through
//! [`crate::internal::register::dma::DmaRegs`]; external descriptors are
//! [`StreamDescriptor`](stream::StreamDescriptor) records in buffer memory.
//! Both share the CONFIG word codec in [`codec`].

pub mod bits;
pub mod codec;
pub mod stream;

pub use codec::{ConfigLayout, DescriptorFlags, decode, encode};
pub use stream::StreamDescriptorTable;

/// Volatile cell wrapper for descriptor fields
///
/// Ensures all accesses are volatile to prevent compiler optimization
/// from reordering or caching descriptor field accesses.
#[repr(transparent)]
pub(crate) struct VolatileCell<T: Copy> {
    value: core::cell::UnsafeCell<T>,
}

// SAFETY: every access is a single volatile load or store of a u32-sized
// value, which the DMA master observes whole.
unsafe impl<T: Copy> Sync for VolatileCell<T> {}

impl<T: Copy> VolatileCell<T> {
    /// Create a new volatile cell with the given initial value
    #[inline(always)]
    pub const fn new(value: T) -> Self {
        Self {
            value: core::cell::UnsafeCell::new(value),
        }
    }

    /// Read the value (volatile read)
    #[inline(always)]
    pub fn get(&self) -> T {
        // SAFETY: the cell owns its storage; volatile read of a Copy value.
        unsafe { core::ptr::read_volatile(self.value.get()) }
    }

    /// Write a value (volatile write)
    #[inline(always)]
    pub fn set(&self, value: T) {
        // SAFETY: the cell owns its storage; volatile write of a Copy value.
        unsafe { core::ptr::write_volatile(self.value.get(), value) }
    }

    /// Update the value using a function (read-modify-write)
    #[inline(always)]
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(T) -> T,
    {
        let old = self.get();
        self.set(f(old));
    }
}

impl<T: Copy + Default> Default for VolatileCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
