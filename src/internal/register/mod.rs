//! Memory-mapped register definitions for the CoreAXI4DMAController
//!
//! Registers are reached through a [`RegisterWindow`](crate::hal::mmio::RegisterWindow)
//! owned by the register block, never through fixed addresses. All access is
//! volatile.

pub mod dma;

// =============================================================================
// Register Access Macros
// =============================================================================

/// Generate read/write accessor methods for a register in `self.window`.
///
/// # Example
/// ```ignore
/// impl DmaRegs {
///     reg_rw!(start_operation, set_start_operation, START_OPERATION_OFFSET,
///             "START_OPERATION register");
/// }
/// ```
macro_rules! reg_rw {
    ($read_fn:ident, $write_fn:ident, $offset:expr, $doc:expr) => {
        #[doc = concat!("Read ", $doc)]
        #[inline(always)]
        pub fn $read_fn(&self) -> u32 {
            self.window.read($offset)
        }

        #[doc = concat!("Write ", $doc)]
        #[inline(always)]
        pub fn $write_fn(&self, value: u32) {
            self.window.write($offset, value)
        }
    };
}

/// Generate a read-only accessor method for a register in `self.window`.
macro_rules! reg_ro {
    ($read_fn:ident, $offset:expr, $doc:expr) => {
        #[doc = concat!("Read ", $doc)]
        #[inline(always)]
        pub fn $read_fn(&self) -> u32 {
            self.window.read($offset)
        }
    };
}

// Export macros for use in submodules
pub(crate) use reg_ro;
pub(crate) use reg_rw;
