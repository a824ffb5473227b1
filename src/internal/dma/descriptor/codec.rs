//! Descriptor configuration word codec.
//!
//! Pure conversion between [`DescriptorFlags`] and the 32-bit CONFIG word of
//! either descriptor layout. `valid` is kept separable so the ring can write
//! a descriptor with `valid` clear and raise it afterwards.

use super::bits::{mem_config, stream_config};
use crate::driver::error::{ConfigError, DmaError, Result};

/// Which CONFIG word layout a descriptor uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigLayout {
    /// Internal descriptor in the controller register file
    Memory,
    /// External descriptor in buffer memory, fetched by a stream channel
    Stream,
}

impl ConfigLayout {
    /// Mask of the `valid` bit
    #[inline(always)]
    pub const fn valid_mask(self) -> u32 {
        match self {
            ConfigLayout::Memory => mem_config::VALID,
            ConfigLayout::Stream => stream_config::VALID,
        }
    }

    /// Mask of the handshake (ready) bits
    #[inline(always)]
    pub const fn ready_mask(self) -> u32 {
        match self {
            ConfigLayout::Memory => mem_config::READY_BITS,
            ConfigLayout::Stream => stream_config::READY_BITS,
        }
    }

    /// Mask of every bit the layout defines
    #[inline(always)]
    pub const fn known_mask(self) -> u32 {
        match self {
            ConfigLayout::Memory => mem_config::KNOWN_BITS,
            ConfigLayout::Stream => stream_config::KNOWN_BITS,
        }
    }
}

/// Decoded descriptor CONFIG word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DescriptorFlags {
    /// Source address increments (memory layout only)
    pub src_increment: bool,
    /// Destination address increments
    pub dest_increment: bool,
    /// NEXT field names the following descriptor
    pub chain: bool,
    /// Interrupt when this descriptor is processed
    pub irq_on_process: bool,
    /// Source data valid (memory layout only)
    pub src_ready: bool,
    /// Destination may be written
    pub dest_ready: bool,
    /// Descriptor valid
    pub valid: bool,
}

impl DescriptorFlags {
    /// All flags clear
    pub const fn new() -> Self {
        Self {
            src_increment: false,
            dest_increment: false,
            chain: false,
            irq_on_process: false,
            src_ready: false,
            dest_ready: false,
            valid: false,
        }
    }

    /// Set address increment on both sides
    pub const fn with_increment(mut self, src: bool, dest: bool) -> Self {
        self.src_increment = src;
        self.dest_increment = dest;
        self
    }

    /// Set or clear `chain`
    pub const fn with_chain(mut self, chain: bool) -> Self {
        self.chain = chain;
        self
    }

    /// Set or clear `interrupt-on-process`
    pub const fn with_irq(mut self, irq: bool) -> Self {
        self.irq_on_process = irq;
        self
    }

    /// Set or clear both ready bits
    pub const fn with_ready(mut self, src: bool, dest: bool) -> Self {
        self.src_ready = src;
        self.dest_ready = dest;
        self
    }

    /// Same flags with `valid` set
    pub const fn with_valid(mut self) -> Self {
        self.valid = true;
        self
    }

    /// Same flags with `valid` and both ready bits cleared
    ///
    /// Ready bits cannot outlive `valid`, so phase one of a two-phase
    /// write uses this form.
    pub const fn without_valid(mut self) -> Self {
        self.valid = false;
        self.src_ready = false;
        self.dest_ready = false;
        self
    }

    /// True when either ready bit is set
    pub const fn is_ready(&self) -> bool {
        self.src_ready || self.dest_ready
    }
}

/// Encode flags into a CONFIG word.
///
/// Fails with [`DmaError::ReadyWithoutValid`] when a ready bit is requested
/// without `valid`, and with [`ConfigError::InvalidConfig`] when the stream
/// layout is asked for source-side flags it does not have.
pub fn encode(flags: DescriptorFlags, layout: ConfigLayout) -> Result<u32> {
    if flags.is_ready() && !flags.valid {
        return Err(DmaError::ReadyWithoutValid.into());
    }

    let word = match layout {
        ConfigLayout::Memory => {
            let op = |inc: bool| {
                if inc {
                    mem_config::OP_INCREMENT
                } else {
                    mem_config::OP_FIXED
                }
            };
            let mut word = (op(flags.src_increment) << mem_config::SRC_OP_SHIFT)
                | (op(flags.dest_increment) << mem_config::DEST_OP_SHIFT);
            if flags.chain {
                word |= mem_config::CHAIN;
            }
            if flags.irq_on_process {
                word |= mem_config::IRQ_ON_PROCESS;
            }
            if flags.src_ready {
                word |= mem_config::SRC_DATA_READY;
            }
            if flags.dest_ready {
                word |= mem_config::DEST_DATA_READY;
            }
            if flags.valid {
                word |= mem_config::VALID;
            }
            word
        }
        ConfigLayout::Stream => {
            if flags.src_increment || flags.src_ready {
                return Err(ConfigError::InvalidConfig.into());
            }
            let mut word = 0;
            if flags.dest_increment {
                word |= stream_config::DEST_INCREMENT;
            }
            if flags.chain {
                word |= stream_config::CHAIN;
            }
            if flags.irq_on_process {
                word |= stream_config::IRQ_ON_PROCESS;
            }
            if flags.dest_ready {
                word |= stream_config::DEST_DATA_READY;
            }
            if flags.valid {
                word |= stream_config::VALID;
            }
            word
        }
    };
    Ok(word)
}

/// Decode a CONFIG word. Bits outside the layout are ignored.
pub fn decode(word: u32, layout: ConfigLayout) -> DescriptorFlags {
    match layout {
        ConfigLayout::Memory => {
            let src_op = (word & mem_config::SRC_OP_MASK) >> mem_config::SRC_OP_SHIFT;
            let dest_op = (word & mem_config::DEST_OP_MASK) >> mem_config::DEST_OP_SHIFT;
            DescriptorFlags {
                src_increment: src_op == mem_config::OP_INCREMENT,
                dest_increment: dest_op == mem_config::OP_INCREMENT,
                chain: word & mem_config::CHAIN != 0,
                irq_on_process: word & mem_config::IRQ_ON_PROCESS != 0,
                src_ready: word & mem_config::SRC_DATA_READY != 0,
                dest_ready: word & mem_config::DEST_DATA_READY != 0,
                valid: word & mem_config::VALID != 0,
            }
        }
        ConfigLayout::Stream => DescriptorFlags {
            src_increment: false,
            dest_increment: word & stream_config::DEST_INCREMENT != 0,
            chain: word & stream_config::CHAIN != 0,
            irq_on_process: word & stream_config::IRQ_ON_PROCESS != 0,
            src_ready: false,
            dest_ready: word & stream_config::DEST_DATA_READY != 0,
            valid: word & stream_config::VALID != 0,
        },
    }
}
