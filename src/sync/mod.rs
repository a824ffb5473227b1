//! Synchronization and Concurrency Support
//!
//! Interrupt handoff between an application-owned ISR and the transfer
//! engine:
//!
//! - **Primitives** (`primitives`): [`CriticalSectionCell`] and, with
//!   `async`, [`AtomicWaker`]
//! - **Signal** (`signal`): [`IrqSignal`] filled by the ISR and
//!   [`SignalGate`], the [`InterruptGate`](crate::hal::gate::InterruptGate)
//!   that drains it
//! - **Async Support** (`asynch`): [`AsyncTransferExt`] for awaiting
//!   completions
//!
//! # Feature Flags
//!
//! - `critical-section`: Enables this module
//! - `async`: Enables `asynch` (implies `critical-section`)
//!
//! # Example
//!
//! ```ignore
//! use ph_axi4_dma::sync::{IrqSignal, SignalGate};
//!
//! static DMA_IRQ: IrqSignal = IrqSignal::new();
//!
//! #[interrupt]
//! fn DMA() {
//!     plic_mask(DMA_IRQ_LINE);
//!     DMA_IRQ.notify();
//! }
//!
//! let gate = SignalGate::new(&DMA_IRQ, delay, 10).with_unmask(|| plic_unmask(DMA_IRQ_LINE));
//! let mut ring = dma.configure(topology, channel, buffers, 4, gate)?;
//! ```

mod primitives;
mod signal;

#[cfg(feature = "async")]
pub use primitives::AtomicWaker;
pub use primitives::CriticalSectionCell;
pub use signal::{IrqSignal, SignalGate};

#[cfg(feature = "async")]
pub mod asynch;

#[cfg(feature = "async")]
pub use asynch::{AsyncTransferExt, ReadyFuture};
