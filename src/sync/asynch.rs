//! Async/await support for transfer engines.
//!
//! The ISR wakes the task through [`IrqSignal::notify`]; the task then runs
//! the same completion path as the blocking API with a zero timeout.

use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use embedded_hal::delay::DelayNs;

use super::signal::{IrqSignal, SignalGate};
use crate::driver::engine::{CompletedBuffer, TransferEngine};
use crate::driver::error::{Error, IoError, Result};
use crate::hal::gate::WaitError;

/// Resolves once the signal has an event pending, or was cancelled.
///
/// The event itself is left in place for the engine to consume.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct ReadyFuture<'a> {
    signal: &'a IrqSignal,
}

impl IrqSignal {
    /// Wait for the next interrupt without consuming it
    pub fn ready(&self) -> ReadyFuture<'_> {
        ReadyFuture { signal: self }
    }
}

impl Future for ReadyFuture<'_> {
    type Output = core::result::Result<(), WaitError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let signal = self.signal;
        let check = || {
            if signal.take_cancel() {
                Some(Err(WaitError::Cancelled))
            } else if signal.is_pending() {
                Some(Ok(()))
            } else {
                None
            }
        };

        if let Some(result) = check() {
            return Poll::Ready(result);
        }
        signal.register(cx.waker());
        match check() {
            Some(result) => Poll::Ready(result),
            None => Poll::Pending,
        }
    }
}

/// Extension trait providing async completion for signal-driven engines.
pub trait AsyncTransferExt {
    /// Wait for the next completed buffer.
    fn next_completion(&mut self) -> impl Future<Output = Result<CompletedBuffer>>;
}

impl<D: DelayNs> AsyncTransferExt for TransferEngine<'_, SignalGate<'_, D>> {
    async fn next_completion(&mut self) -> Result<CompletedBuffer> {
        loop {
            match self.poll_completion(Duration::ZERO) {
                Err(Error::Io(IoError::Timeout)) => {}
                other => return other,
            }
            let signal = self.gate_mut().signal();
            signal.ready().await?;
        }
    }
}
