//! Core driver components for the CoreAXI4DMAController.
//!
//! - [`config`] - Controller variants, channels and engine configuration
//! - [`error`] - Error types and result aliases
//! - [`interrupt`] - Interrupt status decoding
//! - [`controller`] - [`AxiDma`], the controller handle and resource claims
//! - [`engine`] - [`TransferEngine`], one ring from configuration to stop
//!
//! # Example
//!
//! ```ignore
//! use ph_axi4_dma::driver::{ControllerVariant, DmaConfig};
//!
//! let config = DmaConfig::new()
//!     .with_variant(ControllerVariant::CORE_32)
//!     .with_prefetch_depth(2);
//! ```

// Submodules
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod interrupt;

// Re-exports for convenience
pub use config::{BitField, ChannelKind, ControllerVariant, DmaConfig, RingMode, State};
pub use controller::AxiDma;
pub use engine::{CompletedBuffer, RingHandle, RingTopology, SlotSpec, TransferEngine};
pub use error::{ConfigError, ConfigResult, DmaError, DmaResult, Error, IoError, IoResult, Result};
pub use interrupt::InterruptStatus;
