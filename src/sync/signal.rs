//! Interrupt signal shared with an ISR
//!
//! On bare metal the DMA interrupt line lands in a handler the application
//! owns. The handler masks the line, calls [`IrqSignal::notify`], and
//! returns; the engine's [`SignalGate`] picks the event up and unmasks the
//! line again through the `unmask` hook once the status has been cleared.

use core::time::Duration;

use embedded_hal::delay::DelayNs;

use super::primitives::CriticalSectionCell;
#[cfg(feature = "async")]
use super::primitives::AtomicWaker;
use crate::hal::gate::{CompletionEvent, InterruptGate, WaitError};

#[derive(Debug, Clone, Copy)]
struct SignalState {
    /// Events delivered and not yet consumed
    pending: u32,
    /// Events ever delivered
    count: u32,
    cancelled: bool,
    /// Cleared by `notify`, set by `reenable`
    enabled: bool,
}

/// ISR-to-thread interrupt handoff (const, suitable for statics).
///
/// # Example
///
/// ```ignore
/// static DMA_IRQ: IrqSignal = IrqSignal::new();
///
/// #[interrupt]
/// fn DMA() {
///     mask_dma_line();
///     DMA_IRQ.notify();
/// }
///
/// let gate = SignalGate::new(&DMA_IRQ, delay, 10).with_unmask(unmask_dma_line);
/// ```
pub struct IrqSignal {
    state: CriticalSectionCell<SignalState>,
    #[cfg(feature = "async")]
    waker: AtomicWaker,
}

impl IrqSignal {
    /// Create an idle signal
    pub const fn new() -> Self {
        Self {
            state: CriticalSectionCell::new(SignalState {
                pending: 0,
                count: 0,
                cancelled: false,
                enabled: true,
            }),
            #[cfg(feature = "async")]
            waker: AtomicWaker::new(),
        }
    }

    /// Record one interrupt. Call from the ISR.
    ///
    /// Events arriving before the previous one was re-enabled are folded
    /// into it; the controller status keeps the details.
    pub fn notify(&self) {
        self.state.with(|s| {
            if s.enabled {
                s.enabled = false;
                s.pending += 1;
                s.count = s.count.wrapping_add(1);
            }
        });
        #[cfg(feature = "async")]
        self.waker.wake();
    }

    /// Abort the current or next wait with [`WaitError::Cancelled`]
    pub fn cancel(&self) {
        self.state.with(|s| s.cancelled = true);
        #[cfg(feature = "async")]
        self.waker.wake();
    }

    /// True while an event waits to be consumed
    pub fn is_pending(&self) -> bool {
        self.state.with(|s| s.pending > 0)
    }

    /// Consume a cancellation or an event, cancellation first.
    pub(crate) fn take(&self) -> Option<Result<CompletionEvent, WaitError>> {
        self.state.with(|s| {
            if s.cancelled {
                s.cancelled = false;
                Some(Err(WaitError::Cancelled))
            } else if s.pending > 0 {
                s.pending -= 1;
                Some(Ok(CompletionEvent { count: s.count }))
            } else {
                None
            }
        })
    }

    /// Consume a pending cancellation only
    #[cfg(feature = "async")]
    pub(crate) fn take_cancel(&self) -> bool {
        self.state.with(|s| core::mem::take(&mut s.cancelled))
    }

    fn reenable(&self) {
        self.state.with(|s| s.enabled = true);
    }

    fn drain(&self) -> usize {
        self.state.with(|s| core::mem::take(&mut s.pending) as usize)
    }

    #[cfg(feature = "async")]
    pub(crate) fn register(&self, waker: &core::task::Waker) {
        self.waker.register(waker);
    }
}

impl Default for IrqSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Interrupt gate over an [`IrqSignal`].
pub struct SignalGate<'a, D: DelayNs> {
    signal: &'a IrqSignal,
    delay: D,
    poll_interval_us: u32,
    unmask: Option<fn()>,
}

impl<'a, D: DelayNs> SignalGate<'a, D> {
    /// Wait on `signal`, checking every `poll_interval_us` microseconds
    pub fn new(signal: &'a IrqSignal, delay: D, poll_interval_us: u32) -> Self {
        Self {
            signal,
            delay,
            poll_interval_us: poll_interval_us.max(1),
            unmask: None,
        }
    }

    /// Call `unmask` on every re-enable to open the interrupt line again
    #[must_use]
    pub fn with_unmask(mut self, unmask: fn()) -> Self {
        self.unmask = Some(unmask);
        self
    }

    /// The signal this gate waits on
    pub fn signal(&self) -> &'a IrqSignal {
        self.signal
    }
}

impl<D: DelayNs> InterruptGate for SignalGate<'_, D> {
    fn wait(&mut self, timeout: Duration) -> Result<CompletionEvent, WaitError> {
        let timeout_us = u32::try_from(timeout.as_micros()).unwrap_or(u32::MAX);
        let max_iterations = timeout_us / self.poll_interval_us;

        for _ in 0..max_iterations {
            if let Some(result) = self.signal.take() {
                return result;
            }
            self.delay.delay_us(self.poll_interval_us);
        }
        self.signal.take().unwrap_or(Err(WaitError::Timeout))
    }

    fn reenable(&mut self) -> Result<(), WaitError> {
        self.signal.reenable();
        if let Some(unmask) = self.unmask {
            unmask();
        }
        Ok(())
    }

    fn drain(&mut self) -> usize {
        self.signal.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingDelay;
    use core::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn notify_then_wait() {
        let signal = IrqSignal::new();
        let mut gate = SignalGate::new(&signal, CountingDelay::new(), 10);

        assert_eq!(gate.wait(Duration::ZERO), Err(WaitError::Timeout));
        signal.notify();
        assert!(signal.is_pending());
        assert_eq!(gate.wait(Duration::ZERO), Ok(CompletionEvent { count: 1 }));
        assert!(!signal.is_pending());
    }

    #[test]
    fn line_stays_quiet_until_reenabled() {
        let signal = IrqSignal::new();
        let mut gate = SignalGate::new(&signal, CountingDelay::new(), 10);

        signal.notify();
        signal.notify();
        assert!(gate.wait(Duration::ZERO).is_ok());
        assert_eq!(gate.wait(Duration::ZERO), Err(WaitError::Timeout));

        gate.reenable().unwrap();
        signal.notify();
        assert_eq!(gate.wait(Duration::ZERO), Ok(CompletionEvent { count: 2 }));
    }

    #[test]
    fn cancel_wins_over_pending_event() {
        let signal = IrqSignal::new();
        let mut gate = SignalGate::new(&signal, CountingDelay::new(), 10);

        signal.notify();
        signal.cancel();
        assert_eq!(
            gate.wait(Duration::from_millis(1)),
            Err(WaitError::Cancelled)
        );
        assert!(gate.wait(Duration::ZERO).is_ok());
    }

    #[test]
    fn reenable_runs_unmask_hook() {
        static UNMASKED: AtomicU32 = AtomicU32::new(0);
        fn unmask() {
            UNMASKED.fetch_add(1, Ordering::SeqCst);
        }

        let signal = IrqSignal::new();
        let mut gate = SignalGate::new(&signal, CountingDelay::new(), 10).with_unmask(unmask);
        gate.reenable().unwrap();
        assert_eq!(UNMASKED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn timeout_spends_the_deadline() {
        let signal = IrqSignal::new();
        let mut delay = CountingDelay::new();
        let mut gate = SignalGate::new(&signal, &mut delay, 25);
        assert_eq!(
            gate.wait(Duration::from_micros(100)),
            Err(WaitError::Timeout)
        );
        drop(gate);
        assert_eq!(delay.total_us(), 100);
    }

    #[test]
    fn drain_discards_pending() {
        let signal = IrqSignal::new();
        let mut gate = SignalGate::new(&signal, CountingDelay::new(), 10);
        signal.notify();
        assert_eq!(gate.drain(), 1);
        assert_eq!(gate.wait(Duration::ZERO), Err(WaitError::Timeout));
    }
}
