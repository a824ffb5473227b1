//! Descriptor configuration word bit field constants.
//!
//! Internal descriptors live in the controller's register file and carry
//! both a source and a destination side. External descriptors live in
//! buffer memory and are fetched by a stream channel; they only describe a
//! destination.

// =============================================================================
// Internal (memory-to-memory) descriptor CONFIG word
// =============================================================================

/// Internal descriptor CONFIG register bit field constants
pub mod mem_config {
    /// Source operation field shift (2 bits)
    pub const SRC_OP_SHIFT: u32 = 0;
    /// Source operation field mask
    pub const SRC_OP_MASK: u32 = 0b11 << SRC_OP_SHIFT;
    /// Destination operation field shift (2 bits)
    pub const DEST_OP_SHIFT: u32 = 2;
    /// Destination operation field mask
    pub const DEST_OP_MASK: u32 = 0b11 << DEST_OP_SHIFT;
    /// Operation encoding: fixed address
    pub const OP_FIXED: u32 = 0b00;
    /// Operation encoding: incrementing address
    pub const OP_INCREMENT: u32 = 0b01;
    /// Chain - NEXT_DESC names the following descriptor
    pub const CHAIN: u32 = 1 << 10;
    /// Raise an interrupt once this descriptor is processed
    pub const IRQ_ON_PROCESS: u32 = 1 << 12;
    /// Source data valid (source ready)
    pub const SRC_DATA_READY: u32 = 1 << 13;
    /// Destination data ready
    pub const DEST_DATA_READY: u32 = 1 << 14;
    /// Descriptor valid
    pub const VALID: u32 = 1 << 15;

    /// Both handshake bits
    pub const READY_BITS: u32 = SRC_DATA_READY | DEST_DATA_READY;

    /// Every bit the codec can produce
    pub const KNOWN_BITS: u32 =
        SRC_OP_MASK | DEST_OP_MASK | CHAIN | IRQ_ON_PROCESS | READY_BITS | VALID;
}

// =============================================================================
// External (stream-to-memory) descriptor CONFIG word
// =============================================================================

/// External descriptor CONFIG word bit field constants
pub mod stream_config {
    /// Destination address increments
    pub const DEST_INCREMENT: u32 = 1 << 0;
    /// Chain - NEXT_DESC_ADDR holds the following descriptor
    pub const CHAIN: u32 = 1 << 1;
    /// Destination data ready
    pub const DEST_DATA_READY: u32 = 1 << 2;
    /// Descriptor valid
    pub const VALID: u32 = 1 << 3;
    /// Raise an interrupt once this descriptor is processed
    pub const IRQ_ON_PROCESS: u32 = 1 << 4;

    /// Handshake bits
    pub const READY_BITS: u32 = DEST_DATA_READY;

    /// Every bit the codec can produce
    pub const KNOWN_BITS: u32 = DEST_INCREMENT | CHAIN | DEST_DATA_READY | VALID | IRQ_ON_PROCESS;
}

// =============================================================================
// Byte count field
// =============================================================================

/// BYTE_COUNT field constants (shared by both layouts)
pub mod byte_count {
    /// Mask of the usable byte count bits
    pub const MASK: u32 = crate::internal::constants::MAX_BYTE_COUNT;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_config_bits_do_not_overlap() {
        let bits = [
            mem_config::SRC_OP_MASK,
            mem_config::DEST_OP_MASK,
            mem_config::CHAIN,
            mem_config::IRQ_ON_PROCESS,
            mem_config::SRC_DATA_READY,
            mem_config::DEST_DATA_READY,
            mem_config::VALID,
        ];
        for (i, a) in bits.iter().enumerate() {
            for b in &bits[i + 1..] {
                assert_eq!(a & b, 0, "{a:#x} overlaps {b:#x}");
            }
        }
    }

    #[test]
    fn mem_config_matches_register_layout() {
        assert_eq!(mem_config::CHAIN, 0x400);
        assert_eq!(mem_config::IRQ_ON_PROCESS, 0x1000);
        assert_eq!(mem_config::SRC_DATA_READY, 0x2000);
        assert_eq!(mem_config::DEST_DATA_READY, 0x4000);
        assert_eq!(mem_config::VALID, 0x8000);
    }

    #[test]
    fn stream_config_is_packed_low() {
        assert_eq!(stream_config::KNOWN_BITS, 0x1F);
    }
}
