//! Error types for the AXI4 DMA transfer engine
//!
//! Errors are organized by domain for better diagnostics:
//! - [`ConfigError`]: Ring configuration and resource claim failures
//! - [`DmaError`]: Descriptor, buffer ownership and hardware status faults
//! - [`IoError`]: Runtime completion waits
//!
//! The unified [`Error`] enum wraps all domain errors and is returned
//! by most engine methods.

use crate::hal::gate::WaitError;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Configuration errors
///
/// These are fatal to the current configuration attempt, never to the
/// controller. Index checks fail before any register is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Readback after programming did not match the intended descriptors
    ConfigurationMismatch,
    /// Descriptor slot index outside the controller's descriptor array
    SlotOutOfRange,
    /// Stream channel index outside the controller variant
    ChannelOutOfRange,
    /// Interrupt block index outside the controller variant
    InterruptBlockOutOfRange,
    /// Ring has no entries
    EmptyRing,
    /// Ring longer than the descriptor storage or the buffer pool
    RingTooLarge,
    /// Same slot listed twice in one ring
    DuplicateSlot,
    /// Byte count is zero or exceeds the hardware field
    ByteCountTooLarge,
    /// Physical address does not fit the 32-bit descriptor fields
    AddressOutOfRange,
    /// Region base or length is not suitably aligned
    Misaligned,
    /// Register window or buffer region is too small
    RegionTooSmall,
    /// Slot, stream channel or interrupt block already claimed
    ResourceInUse,
    /// Invalid configuration parameter
    InvalidConfig,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConfigError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConfigError::ConfigurationMismatch => "descriptor readback mismatch",
            ConfigError::SlotOutOfRange => "descriptor slot out of range",
            ConfigError::ChannelOutOfRange => "stream channel out of range",
            ConfigError::InterruptBlockOutOfRange => "interrupt block out of range",
            ConfigError::EmptyRing => "ring has no entries",
            ConfigError::RingTooLarge => "ring exceeds available descriptors or buffers",
            ConfigError::DuplicateSlot => "slot used twice in ring",
            ConfigError::ByteCountTooLarge => "invalid byte count",
            ConfigError::AddressOutOfRange => "physical address out of range",
            ConfigError::Misaligned => "misaligned region",
            ConfigError::RegionTooSmall => "region too small",
            ConfigError::ResourceInUse => "resource already claimed",
            ConfigError::InvalidConfig => "invalid configuration",
        }
    }
}

// =============================================================================
// DMA Errors
// =============================================================================

/// Descriptor and buffer ownership errors
///
/// `InvalidCompletionIndex`, `BusError` and `InvalidDescriptor` are raised
/// after the engine has force-stopped the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaError {
    /// Status register reported a descriptor index outside the ring
    InvalidCompletionIndex,
    /// Buffer is not in the state the transition requires
    BufferBusy,
    /// Ready bit requested on a descriptor without `valid`
    ReadyWithoutValid,
    /// Descriptor still carries ready bits (owned by hardware)
    DescriptorBusy,
    /// Pool has no free buffer
    NoFreeBuffers,
    /// Hardware reported an AXI read or write error
    BusError,
    /// Hardware fetched a descriptor without `valid`
    InvalidDescriptor,
}

impl core::fmt::Display for DmaError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DmaError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            DmaError::InvalidCompletionIndex => "completed descriptor index out of range",
            DmaError::BufferBusy => "buffer busy",
            DmaError::ReadyWithoutValid => "ready bit without valid bit",
            DmaError::DescriptorBusy => "descriptor owned by hardware",
            DmaError::NoFreeBuffers => "no free buffers",
            DmaError::BusError => "DMA bus error",
            DmaError::InvalidDescriptor => "invalid descriptor fetched",
        }
    }
}

// =============================================================================
// I/O Errors
// =============================================================================

/// Runtime completion errors
///
/// All of these are recoverable; the caller decides between retrying and
/// calling `force_stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoError {
    /// No interrupt within the deadline
    Timeout,
    /// Wait was cancelled by the caller
    Cancelled,
    /// Invalid state for operation (e.g., not running)
    InvalidState,
    /// Interrupt delivered without completion or error status
    NoCompletion,
    /// Operating-system failure on the interrupt handle
    Interrupt,
}

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl IoError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            IoError::Timeout => "operation timed out",
            IoError::Cancelled => "wait cancelled",
            IoError::InvalidState => "invalid state for operation",
            IoError::NoCompletion => "interrupt without completion status",
            IoError::Interrupt => "interrupt handle failure",
        }
    }
}

impl From<WaitError> for IoError {
    fn from(e: WaitError) -> Self {
        match e {
            WaitError::Timeout => IoError::Timeout,
            WaitError::Cancelled => IoError::Cancelled,
            WaitError::Os => IoError::Interrupt,
        }
    }
}

// =============================================================================
// Unified Error Type
// =============================================================================

/// This enum wraps all domain-specific errors for unified error handling.
///
/// Match on the inner domain error for specific handling:
/// ```ignore
/// match engine.poll_completion(timeout) {
///     Err(Error::Io(IoError::Timeout)) => { /* retry or force_stop */ }
///     Err(Error::Dma(DmaError::InvalidCompletionIndex)) => { /* already stopped */ }
///     _ => {}
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Configuration error
    Config(ConfigError),
    /// DMA error
    Dma(DmaError),
    /// I/O error
    Io(IoError),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Config(e) => write!(f, "config: {}", e.as_str()),
            Error::Dma(e) => write!(f, "dma: {}", e.as_str()),
            Error::Io(e) => write!(f, "io: {}", e.as_str()),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<DmaError> for Error {
    fn from(e: DmaError) -> Self {
        Error::Dma(e)
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Error::Io(e)
    }
}

impl From<WaitError> for Error {
    fn from(e: WaitError) -> Self {
        Error::Io(e.into())
    }
}

/// Result type alias for engine operations
pub type Result<T> = core::result::Result<T, Error>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = core::result::Result<T, ConfigError>;

/// Result type alias for DMA operations
pub type DmaResult<T> = core::result::Result<T, DmaError>;

/// Result type alias for I/O operations
pub type IoResult<T> = core::result::Result<T, IoError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    extern crate std;
    use std::format;

    use super::*;

    #[test]
    fn config_error_as_str_non_empty() {
        let variants = [
            ConfigError::ConfigurationMismatch,
            ConfigError::SlotOutOfRange,
            ConfigError::ChannelOutOfRange,
            ConfigError::InterruptBlockOutOfRange,
            ConfigError::EmptyRing,
            ConfigError::RingTooLarge,
            ConfigError::DuplicateSlot,
            ConfigError::ByteCountTooLarge,
            ConfigError::AddressOutOfRange,
            ConfigError::Misaligned,
            ConfigError::RegionTooSmall,
            ConfigError::ResourceInUse,
            ConfigError::InvalidConfig,
        ];

        for variant in variants {
            assert!(!variant.as_str().is_empty(), "{variant:?} has empty string");
        }
    }

    #[test]
    fn dma_error_display() {
        let display = format!("{}", DmaError::InvalidCompletionIndex);
        assert_eq!(display, "completed descriptor index out of range");
    }

    #[test]
    fn unified_error_display_prefixes_domain() {
        let err: Error = ConfigError::ConfigurationMismatch.into();
        assert_eq!(format!("{err}"), "config: descriptor readback mismatch");

        let err: Error = IoError::Cancelled.into();
        assert_eq!(format!("{err}"), "io: wait cancelled");
    }

    #[test]
    fn wait_error_maps_to_distinct_io_errors() {
        assert_eq!(IoError::from(WaitError::Timeout), IoError::Timeout);
        assert_eq!(IoError::from(WaitError::Cancelled), IoError::Cancelled);
        assert_ne!(IoError::from(WaitError::Cancelled), IoError::Timeout);
        assert_eq!(Error::from(WaitError::Os), Error::Io(IoError::Interrupt));
    }

    #[test]
    fn question_mark_converts_domain_errors() {
        fn fails() -> Result<()> {
            Err(DmaError::BufferBusy)?
        }
        assert_eq!(fails(), Err(Error::Dma(DmaError::BufferBusy)));
    }
}
