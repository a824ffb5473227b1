//! Controller variant and engine configuration.
//!
//! The CoreAXI4DMAController ships in several generations that differ in
//! descriptor count, number of stream channels and number of interrupt
//! blocks. [`ControllerVariant`] captures those differences as data so a
//! single engine drives all of them.

use crate::driver::error::{ConfigError, ConfigResult};
use crate::internal::constants::{
    COMPLETION_INDEX_OFFSET, COMPLETION_INDEX_WIDTH, DEFAULT_POLL_INTERVAL_US,
    DEFAULT_PREFETCH_DEPTH, DESCRIPTORS_LARGE, DESCRIPTORS_SMALL, MAX_BYTE_COUNT,
    MAX_INTERRUPT_BLOCKS, MAX_SLOTS, MAX_STREAM_CHANNELS,
};
use crate::internal::dma::descriptor::ConfigLayout;
use crate::internal::register::dma::STREAM_ADDR_BASE;

// =============================================================================
// Bit Field
// =============================================================================

/// Position of a multi-bit field inside a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitField {
    /// Lowest bit of the field
    pub offset: u8,
    /// Field width in bits
    pub width: u8,
}

impl BitField {
    /// Create a field descriptor
    #[must_use]
    pub const fn new(offset: u8, width: u8) -> Self {
        Self { offset, width }
    }

    /// Unshifted mask of the field
    pub const fn mask(&self) -> u32 {
        if self.width >= 32 {
            u32::MAX
        } else {
            (1u32 << self.width) - 1
        }
    }

    /// Extract the field from a raw register value
    #[inline(always)]
    pub const fn extract(&self, raw: u32) -> u32 {
        (raw >> self.offset) & self.mask()
    }

    /// True when the field fits a 32-bit register
    pub const fn is_valid(&self) -> bool {
        self.width > 0 && (self.offset as u32 + self.width as u32) <= 32
    }
}

// =============================================================================
// Controller Variant
// =============================================================================

/// Register-layout parameters of a controller generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControllerVariant {
    /// Internal descriptor slots (4 or 32)
    pub descriptor_count: usize,
    /// Stream channels with a STREAM_n_ADDR register
    pub stream_channels: usize,
    /// Interrupt register blocks (STAT/MASK/CLEAR/EXT_ADDR)
    pub interrupt_blocks: usize,
    /// Completed-descriptor index inside INTR_n_STAT
    pub completion_index: BitField,
}

impl ControllerVariant {
    /// Generation with four internal descriptors and four interrupt blocks
    pub const CORE_4: Self = Self {
        descriptor_count: DESCRIPTORS_SMALL,
        stream_channels: MAX_STREAM_CHANNELS,
        interrupt_blocks: MAX_INTERRUPT_BLOCKS,
        completion_index: BitField::new(COMPLETION_INDEX_OFFSET, COMPLETION_INDEX_WIDTH),
    };

    /// Generation with thirty-two internal descriptors and one interrupt block
    pub const CORE_32: Self = Self {
        descriptor_count: DESCRIPTORS_LARGE,
        stream_channels: MAX_STREAM_CHANNELS,
        interrupt_blocks: 1,
        completion_index: BitField::new(COMPLETION_INDEX_OFFSET, COMPLETION_INDEX_WIDTH),
    };

    /// Override the completion index field
    #[must_use]
    pub const fn with_completion_index(mut self, field: BitField) -> Self {
        self.completion_index = field;
        self
    }

    /// Bytes of register window this variant decodes
    pub const fn window_size(&self) -> usize {
        STREAM_ADDR_BASE + 4 * MAX_STREAM_CHANNELS
    }

    /// Check the variant against the engine limits
    pub fn validate(&self) -> ConfigResult<()> {
        if self.descriptor_count == 0 || self.descriptor_count > MAX_SLOTS {
            return Err(ConfigError::InvalidConfig);
        }
        if self.stream_channels > MAX_STREAM_CHANNELS {
            return Err(ConfigError::InvalidConfig);
        }
        if self.interrupt_blocks == 0 || self.interrupt_blocks > MAX_INTERRUPT_BLOCKS {
            return Err(ConfigError::InvalidConfig);
        }
        if !self.completion_index.is_valid() {
            return Err(ConfigError::InvalidConfig);
        }
        Ok(())
    }
}

impl Default for ControllerVariant {
    fn default() -> Self {
        Self::CORE_4
    }
}

// =============================================================================
// Channel and Ring Selection
// =============================================================================

/// Logical DMA path a ring runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelKind {
    /// Internal descriptors; software supplies source and destination
    MemToMem {
        /// Interrupt block reporting this ring's completions
        irq_block: u8,
    },
    /// External descriptors in buffer memory; the source is a stream master
    StreamToMem {
        /// Stream channel index
        channel: u8,
        /// Interrupt block reporting this ring's completions
        irq_block: u8,
    },
}

impl ChannelKind {
    /// Interrupt block the channel reports on
    pub const fn irq_block(&self) -> u8 {
        match self {
            ChannelKind::MemToMem { irq_block } | ChannelKind::StreamToMem { irq_block, .. } => {
                *irq_block
            }
        }
    }

    /// CONFIG word layout of the channel's descriptors
    pub const fn layout(&self) -> ConfigLayout {
        match self {
            ChannelKind::MemToMem { .. } => ConfigLayout::Memory,
            ChannelKind::StreamToMem { .. } => ConfigLayout::Stream,
        }
    }

    /// True for stream channels
    pub const fn is_stream(&self) -> bool {
        matches!(self, ChannelKind::StreamToMem { .. })
    }
}

/// Ring chain topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RingMode {
    /// One-shot chain; the last descriptor stops and interrupts
    Linear,
    /// Closed loop re-armed as buffers are consumed
    Cyclic {
        /// Completions before the engine stops; `None` runs until stopped
        iterations: Option<u32>,
    },
}

impl RingMode {
    /// True for cyclic rings
    pub const fn is_cyclic(&self) -> bool {
        matches!(self, RingMode::Cyclic { .. })
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Engine configuration built with `with_*` methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmaConfig {
    /// Controller register layout
    pub variant: ControllerVariant,
    /// Largest byte count accepted per descriptor
    pub max_byte_count: u32,
    /// Cyclic slots kept ready ahead of the hardware
    pub prefetch_depth: usize,
    /// Poll interval used by polling gates
    pub poll_interval_us: u32,
}

impl DmaConfig {
    /// Create a new configuration with defaults
    #[must_use]
    pub const fn new() -> Self {
        Self {
            variant: ControllerVariant::CORE_4,
            max_byte_count: MAX_BYTE_COUNT,
            prefetch_depth: DEFAULT_PREFETCH_DEPTH,
            poll_interval_us: DEFAULT_POLL_INTERVAL_US,
        }
    }

    /// Set the controller variant
    #[must_use]
    pub const fn with_variant(mut self, variant: ControllerVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Set the per-descriptor byte count limit
    ///
    /// Values above the hardware field are rejected by [`validate`](Self::validate).
    #[must_use]
    pub const fn with_max_byte_count(mut self, bytes: u32) -> Self {
        self.max_byte_count = bytes;
        self
    }

    /// Set how many cyclic slots are made ready ahead of the hardware
    #[must_use]
    pub const fn with_prefetch_depth(mut self, depth: usize) -> Self {
        self.prefetch_depth = depth;
        self
    }

    /// Set the polling interval for polling gates
    #[must_use]
    pub const fn with_poll_interval_us(mut self, us: u32) -> Self {
        self.poll_interval_us = us;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        self.variant.validate()?;
        if self.max_byte_count == 0 || self.max_byte_count > MAX_BYTE_COUNT {
            return Err(ConfigError::ByteCountTooLarge);
        }
        if self.prefetch_depth == 0 || self.poll_interval_us == 0 {
            return Err(ConfigError::InvalidConfig);
        }
        Ok(())
    }

    /// Prefetch depth usable on a ring of `len` slots
    ///
    /// At least one slot must stay behind the hardware so a completed
    /// buffer can be handed out before its neighbor is re-armed.
    pub fn effective_prefetch(&self, len: usize) -> usize {
        self.prefetch_depth.clamp(1, len.saturating_sub(1).max(1))
    }
}

impl Default for DmaConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// State
// =============================================================================

/// Transfer engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Channel claimed, no ring programmed
    #[default]
    Idle,
    /// Ring programmed and verified
    Configured,
    /// Ready bits granted, interrupts unmasked
    Armed,
    /// Start issued; hardware may own in-flight buffers
    Running,
    /// Interrupt observed, completions being processed
    Completing,
    /// All descriptors invalidated
    Stopped,
}

// =============================================================================
// Unit Tests
// =============================================================================
