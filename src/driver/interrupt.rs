//! Interrupt status decoding for the CoreAXI4DMAController.
//!
//! This module provides the [`InterruptStatus`] structure for parsing
//! an INTR_n_STAT word into event flags and the completed descriptor index.

use crate::driver::config::BitField;
use crate::internal::register::dma::{
    INTR_INVALID_DESC, INTR_OP_COMPLETE, INTR_READ_ERROR, INTR_WRITE_ERROR,
};

// =============================================================================
// Interrupt Status
// =============================================================================

/// Interrupt status flags parsed from an INTR_n_STAT register.
///
/// # Example
///
/// ```ignore
/// let status = InterruptStatus::from_raw(raw, variant.completion_index);
/// if status.op_complete {
///     // status.descriptor_index names the slot that finished
/// }
/// regs.clear_interrupts(block, status.to_raw())?;
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterruptStatus {
    /// A descriptor with `interrupt-on-process` finished
    pub op_complete: bool,
    /// AXI write response error
    pub write_error: bool,
    /// AXI read response error
    pub read_error: bool,
    /// Hardware fetched a descriptor without `valid`
    pub invalid_descriptor: bool,
    /// Index of the descriptor the event refers to
    pub descriptor_index: u32,
}

impl InterruptStatus {
    /// Decode a raw status word; `index` locates the descriptor number
    #[inline]
    pub fn from_raw(status: u32, index: BitField) -> Self {
        Self {
            op_complete: (status & INTR_OP_COMPLETE) != 0,
            write_error: (status & INTR_WRITE_ERROR) != 0,
            read_error: (status & INTR_READ_ERROR) != 0,
            invalid_descriptor: (status & INTR_INVALID_DESC) != 0,
            descriptor_index: index.extract(status),
        }
    }

    /// Event bits to write to INTR_n_CLEAR (write-1-to-clear)
    #[inline]
    pub fn to_raw(&self) -> u32 {
        let mut val = 0u32;
        if self.op_complete {
            val |= INTR_OP_COMPLETE;
        }
        if self.write_error {
            val |= INTR_WRITE_ERROR;
        }
        if self.read_error {
            val |= INTR_READ_ERROR;
        }
        if self.invalid_descriptor {
            val |= INTR_INVALID_DESC;
        }
        val
    }

    /// Check if any event is flagged
    #[inline]
    pub fn any(&self) -> bool {
        self.op_complete || self.has_error()
    }

    /// Check if any error occurred
    #[inline]
    pub fn has_error(&self) -> bool {
        self.bus_error() || self.invalid_descriptor
    }

    /// AXI read or write error
    #[inline]
    pub fn bus_error(&self) -> bool {
        self.write_error || self.read_error
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
