//! Hardware Abstraction Layer
//!
//! Everything between the engine and the platform:
//!
//! - [`mmio`]: Register windows, DMA regions and barriers
//! - [`gate`]: The [`InterruptGate`] seam, plus a status-polling gate
//! - [`uio`]: Linux UIO interrupt gate (`std` feature)
//!
//! # Delay Integration
//!
//! Polling gates take any `embedded_hal::delay::DelayNs`. Pass the delay
//! from your HAL, or a thread sleep wrapper on hosted targets.

pub mod gate;
pub mod mmio;
#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub mod uio;

// Re-export commonly used types
pub use gate::{CancelToken, CompletionEvent, InterruptGate, PollingGate, WaitError};
pub use mmio::{DmaRegion, RegisterWindow, dma_barrier};
#[cfg(feature = "std")]
pub use uio::{UioCanceller, UioGate};
