//! CoreAXI4DMAController Transfer Engine
//!
//! A `no_std`, `no_alloc` driver for the CoreAXI4DMAController, a
//! register-programmable, descriptor-based AXI4 DMA engine that copies
//! memory-to-memory or captures an AXI4-Stream source into memory.
//!
//! The crate implements the descriptor-ring transfer engine: descriptor
//! encoding, linear and cyclic rings, the buffer-ownership handshake with
//! the hardware and the interrupt-driven completion and re-arm loop.
//!
//! # Architecture
//!
//! 1. **Driver Layer** ([`driver`]): [`AxiDma`] hands out [`TransferEngine`]s
//! 2. **Ring Layer** (internal): descriptor codec, rings and buffer pool
//! 3. **HAL Layer** ([`hal`]): register windows, DMA regions and interrupt gates
//!
//! Completed buffers come back as [`CompletedBuffer`] values. Holding one
//! is the only way to read DMA memory, so a buffer the hardware still owns
//! cannot be read.
//!
//! # Controller Variants
//!
//! - [`ControllerVariant::CORE_4`]: 4 internal descriptors, 4 interrupt blocks
//! - [`ControllerVariant::CORE_32`]: 32 internal descriptors, 1 interrupt block
//!
//! # Features
//!
//! - `defmt`: Enable defmt formatting for public types
//! - `log`: Emit `log` records at configuration, completion and error points
//! - `critical-section`: Enable the ISR-fed [`sync::SignalGate`]
//! - `async`: Enable async completion waits with wakers
//! - `std`: Enable the Linux UIO interrupt gate
//!
//! # Example
//!
//! ```ignore
//! use core::time::Duration;
//! use ph_axi4_dma::{AxiDma, ChannelKind, DmaConfig, RingTopology, SlotSpec};
//! use ph_axi4_dma::hal::{DmaRegion, PollingGate, RegisterWindow};
//!
//! // Mapped by the platform
//! let window = unsafe { RegisterWindow::from_raw_parts(regs_base, 0x1000)? };
//! let buffers = unsafe { DmaRegion::from_raw_parts(buf_virt, buf_phys, 4 << 20)? };
//!
//! let dma = AxiDma::new(window, DmaConfig::new())?;
//! dma.probe()?;
//!
//! let slots = [
//!     SlotSpec::memory(0, src_phys),
//!     SlotSpec::memory(1, src_phys + (1 << 20)),
//!     SlotSpec::memory(2, src_phys + (2 << 20)),
//!     SlotSpec::memory(3, src_phys + (3 << 20)),
//! ];
//! let gate = PollingGate::new(dma.regs(), 0, delay, 10);
//! let mut ring = dma.configure(
//!     RingTopology::cyclic(&slots, None),
//!     ChannelKind::MemToMem { irq_block: 0 },
//!     buffers,
//!     4,
//!     gate,
//! )?;
//!
//! ring.start()?;
//! loop {
//!     let done = ring.poll_completion(Duration::from_millis(100))?;
//!     consume(done.as_slice());
//!     ring.release(done)?;
//! }
//! ```

#![no_std]
#![deny(missing_docs)]
#![allow(unsafe_code)]
#![deny(unsafe_op_in_unsafe_fn)]
// Clippy lint levels mirror the Cargo.toml tables.
#![deny(clippy::correctness)]
#![warn(
    clippy::suspicious,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::cloned_instead_of_copied,
    clippy::explicit_iter_loop,
    clippy::implicit_clone,
    clippy::inconsistent_struct_constructor,
    clippy::manual_assert,
    clippy::manual_let_else,
    clippy::match_same_arms,
    clippy::needless_pass_by_value,
    clippy::semicolon_if_nothing_returned,
    clippy::uninlined_format_args,
    clippy::unnested_or_patterns,
    clippy::std_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::alloc_instead_of_core
)]
#![allow(
    clippy::mod_module_files,
    clippy::self_named_module_files,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::struct_excessive_bools,
    clippy::fn_params_excessive_bools,
    clippy::type_complexity,
    clippy::must_use_candidate,
    clippy::assertions_on_constants,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    clippy::panic_in_result_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::items_after_statements,
    clippy::let_underscore_future
)]

// =============================================================================
// Modules
// =============================================================================

#[cfg(feature = "std")]
extern crate std;

pub mod driver;
pub mod hal;

// Internal implementation details (pub(crate) only)
mod internal;

#[cfg(feature = "critical-section")]
#[cfg_attr(docsrs, doc(cfg(feature = "critical-section")))]
pub mod sync;

// Test utilities (only available during testing)
#[cfg(test)]
pub mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use driver::config::{BitField, ChannelKind, ControllerVariant, DmaConfig, RingMode, State};
pub use driver::controller::AxiDma;
pub use driver::engine::{CompletedBuffer, RingHandle, RingTopology, SlotSpec, TransferEngine};
pub use driver::error::{
    ConfigError, ConfigResult, DmaError, DmaResult, Error, IoError, IoResult, Result,
};
pub use driver::interrupt::InterruptStatus;
pub use hal::gate::{CancelToken, CompletionEvent, InterruptGate, PollingGate, WaitError};
pub use hal::mmio::{DmaRegion, RegisterWindow};

/// Buffer ownership and descriptor encoding types.
///
/// Exposed for inspecting an engine's pool and for building descriptor
/// words by hand; the engine never needs them from callers.
pub mod descriptor {
    pub use crate::internal::dma::descriptor::bits::{mem_config, stream_config};
    pub use crate::internal::dma::descriptor::{ConfigLayout, DescriptorFlags, decode, encode};
    pub use crate::internal::dma::pool::{BufferId, BufferPool, BufferState, CompletedHandle};
}

/// Low-level register accessors for advanced use.
///
/// These are intentionally separated from the primary facade. Most users should
/// prefer the engine APIs instead of touching registers directly.
///
/// # Safety
///
/// Direct register access bypasses the ring's ownership handshake. Writing
/// `valid` or a ready bit behind an engine's back hands a buffer to the
/// hardware that software may still be reading.
pub mod unsafe_registers {
    pub use crate::internal::register::dma::{DescriptorField, DmaRegs};
}

// Re-export sync types when critical-section is enabled
#[cfg(feature = "critical-section")]
pub use sync::{IrqSignal, SignalGate};

// Re-export async types when async feature is enabled
#[cfg(feature = "async")]
#[cfg_attr(docsrs, doc(cfg(feature = "async")))]
pub use sync::asynch::AsyncTransferExt;

#[cfg(feature = "std")]
pub use hal::uio::{UioCanceller, UioGate};

/// Shared driver constants.
///
/// Grouped into a dedicated module to keep the top-level facade focused on
/// driver types.
pub mod constants {
    pub use crate::internal::constants::{
        // Completion index field defaults
        COMPLETION_INDEX_OFFSET,
        COMPLETION_INDEX_WIDTH,
        // Buffers
        DMA_ALIGNMENT,
        // Engine defaults
        DEFAULT_POLL_INTERVAL_US,
        DEFAULT_PREFETCH_DEPTH,
        // Descriptor counts
        DESCRIPTORS_LARGE,
        DESCRIPTORS_SMALL,
        MAX_BUFFERS,
        MAX_BYTE_COUNT,
        MAX_INTERRUPT_BLOCKS,
        MAX_SLOTS,
        MAX_STREAM_CHANNELS,
        STREAM_DESCRIPTOR_SIZE,
    };
}
