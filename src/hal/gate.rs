//! Interrupt delivery gate
//!
//! The engine never waits on the controller directly. It asks an
//! [`InterruptGate`] for the next interrupt event, clears the status bits in
//! the controller, and then calls [`InterruptGate::reenable`] exactly once.
//! Platforms that deliver interrupts through a count-based unmask (Linux
//! UIO, a masked NVIC/PLIC line) stay silent until that re-enable happens.

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

use embedded_hal::delay::DelayNs;

use crate::internal::register::dma::{DmaRegs, INTR_ALL};

// =============================================================================
// Events and Errors
// =============================================================================

/// One delivered interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CompletionEvent {
    /// Running interrupt count reported by the gate
    pub count: u32,
}

/// Why a wait returned without an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitError {
    /// Deadline passed with no interrupt
    Timeout,
    /// Another context cancelled the wait
    Cancelled,
    /// The interrupt handle failed
    Os,
}

impl WaitError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            WaitError::Timeout => "wait timed out",
            WaitError::Cancelled => "wait cancelled",
            WaitError::Os => "interrupt handle failure",
        }
    }
}

impl core::fmt::Display for WaitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Gate Trait
// =============================================================================

/// Source of interrupt events for one interrupt block.
pub trait InterruptGate {
    /// Block until an interrupt is delivered or `timeout` passes.
    ///
    /// A zero timeout checks once and never blocks. `Cancelled` is reported
    /// only for an explicit cancellation, never for an elapsed deadline.
    fn wait(&mut self, timeout: Duration) -> Result<CompletionEvent, WaitError>;

    /// Re-allow delivery after an event was consumed and its status cleared.
    fn reenable(&mut self) -> Result<(), WaitError>;

    /// Discard pending events without waiting. Returns how many were dropped.
    fn drain(&mut self) -> usize;
}

impl<G: InterruptGate + ?Sized> InterruptGate for &mut G {
    fn wait(&mut self, timeout: Duration) -> Result<CompletionEvent, WaitError> {
        (**self).wait(timeout)
    }

    fn reenable(&mut self) -> Result<(), WaitError> {
        (**self).reenable()
    }

    fn drain(&mut self) -> usize {
        (**self).drain()
    }
}

// =============================================================================
// Cancellation
// =============================================================================

/// Flag that aborts a pending [`PollingGate`] wait.
///
/// Shared by reference between the waiting context and the canceller.
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: AtomicBool,
}

impl CancelToken {
    /// Create an un-cancelled token (const, suitable for statics)
    pub const fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
        }
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Consume a pending cancellation
    pub fn take(&self) -> bool {
        self.cancelled.swap(false, Ordering::AcqRel)
    }

    /// Check without consuming
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

// =============================================================================
// Polling Gate
// =============================================================================

/// Gate that polls an interrupt block's status register.
///
/// Suitable for bring-up and for systems without an interrupt line wired
/// to the controller. Events are the enabled status bits; `reenable` is a
/// no-op because clearing the status is all the hardware needs.
pub struct PollingGate<'a, D: DelayNs> {
    regs: &'a DmaRegs,
    block: u8,
    delay: D,
    poll_interval_us: u32,
    cancel: Option<&'a CancelToken>,
    delivered: u32,
    /// Event delivered and not yet re-enabled
    outstanding: bool,
}

impl<'a, D: DelayNs> PollingGate<'a, D> {
    /// Poll `block` every `poll_interval_us` microseconds
    pub fn new(regs: &'a DmaRegs, block: u8, delay: D, poll_interval_us: u32) -> Self {
        Self {
            regs,
            block,
            delay,
            poll_interval_us: poll_interval_us.max(1),
            cancel: None,
            delivered: 0,
            outstanding: false,
        }
    }

    /// Attach a cancellation token
    #[must_use]
    pub fn with_cancel(mut self, token: &'a CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Interrupt block this gate polls
    pub const fn block(&self) -> u8 {
        self.block
    }

    fn pending(&self) -> Result<bool, WaitError> {
        let status = self
            .regs
            .read_interrupt_status(self.block)
            .map_err(|_| WaitError::Os)?;
        let enabled = self
            .regs
            .interrupt_mask(self.block)
            .map_err(|_| WaitError::Os)?;
        Ok(status & enabled & INTR_ALL != 0)
    }
}

impl<D: DelayNs> InterruptGate for PollingGate<'_, D> {
    fn wait(&mut self, timeout: Duration) -> Result<CompletionEvent, WaitError> {
        let timeout_us = u32::try_from(timeout.as_micros()).unwrap_or(u32::MAX);
        let max_iterations = timeout_us / self.poll_interval_us;

        let mut iteration = 0;
        loop {
            if self.cancel.is_some_and(CancelToken::take) {
                return Err(WaitError::Cancelled);
            }
            if !self.outstanding && self.pending()? {
                self.outstanding = true;
                self.delivered = self.delivered.wrapping_add(1);
                return Ok(CompletionEvent {
                    count: self.delivered,
                });
            }
            if iteration >= max_iterations {
                return Err(WaitError::Timeout);
            }
            self.delay.delay_us(self.poll_interval_us);
            iteration += 1;
        }
    }

    fn reenable(&mut self) -> Result<(), WaitError> {
        self.outstanding = false;
        Ok(())
    }

    fn drain(&mut self) -> usize {
        match self.pending() {
            Ok(true) if !self.outstanding => {
                self.outstanding = true;
                1
            }
            _ => 0,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
