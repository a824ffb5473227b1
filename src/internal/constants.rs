//! Driver constants for the CoreAXI4DMAController.
//!
//! Register offsets live next to the register accessors in
//! [`crate::internal::register::dma`]; this module holds sizing limits and
//! engine defaults.

// =============================================================================
// Controller Geometry
// =============================================================================

/// Internal descriptor count of the small controller variant
pub const DESCRIPTORS_SMALL: usize = 4;

/// Internal descriptor count of the large controller variant
pub const DESCRIPTORS_LARGE: usize = 32;

/// Upper bound on descriptor slots the engine tracks per ring
pub const MAX_SLOTS: usize = 32;

/// Maximum stream channels on any variant
pub const MAX_STREAM_CHANNELS: usize = 4;

/// Maximum interrupt blocks on any variant
pub const MAX_INTERRUPT_BLOCKS: usize = 4;

/// Maximum buffers a single pool can track
pub const MAX_BUFFERS: usize = 64;

// =============================================================================
// Transfer Limits
// =============================================================================

/// Largest byte count the descriptor field accepts (23 bits, ~8 MiB)
pub const MAX_BYTE_COUNT: u32 = 0x007F_FFFF;

/// Alignment required for buffer bases and external descriptor tables
pub const DMA_ALIGNMENT: usize = 16;

/// Size of one external (stream) descriptor record in bytes
pub const STREAM_DESCRIPTOR_SIZE: usize = 16;

// =============================================================================
// Completion Status Decode
// =============================================================================

/// Default bit offset of the completed-descriptor index in INTR_n_STAT
pub const COMPLETION_INDEX_OFFSET: u8 = 4;

/// Default width of the completed-descriptor index field
pub const COMPLETION_INDEX_WIDTH: u8 = 6;

// =============================================================================
// Timing
// =============================================================================

/// Default polling interval for polling gates (microseconds)
pub const DEFAULT_POLL_INTERVAL_US: u32 = 10;

/// Default number of cyclic slots kept ready ahead of the hardware
pub const DEFAULT_PREFETCH_DEPTH: usize = 1;

/// Value returned by a controller that is not decoding its window
pub const VERSION_NOT_PRESENT: u32 = 0xFFFF_FFFF;

// =============================================================================
// Compile-time Validation
// =============================================================================

const _: () = {
    assert!(DESCRIPTORS_LARGE <= MAX_SLOTS);
    assert!(MAX_SLOTS <= 32, "slot claims are tracked in a u32 mask");
    assert!(MAX_BYTE_COUNT < (1 << 23));
    assert!(DMA_ALIGNMENT.is_power_of_two());
};
