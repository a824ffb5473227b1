//! Linux UIO interrupt gate
//!
//! A UIO device delivers interrupts as a 32-bit event count read from its
//! file descriptor. After each read the kernel keeps the line masked until
//! the driver writes a 32-bit `1` back. Cancellation uses an `eventfd` polled
//! next to the device, so a cancelled wait is never mistaken for a timeout.

#![allow(clippy::std_instead_of_core, clippy::std_instead_of_alloc)]

use core::time::Duration;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "log")]
use log::warn;

use super::gate::{CompletionEvent, InterruptGate, WaitError};

/// Interrupt gate over a `/dev/uioN` device.
#[derive(Debug)]
pub struct UioGate {
    device: File,
    cancel: Arc<OwnedFd>,
    last_count: u32,
}

/// Handle that cancels a pending [`UioGate::wait`] from another thread.
#[derive(Debug, Clone)]
pub struct UioCanceller {
    cancel: Arc<OwnedFd>,
}

impl UioGate {
    /// Open a UIO device node
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let device = OpenOptions::new().read(true).write(true).open(path)?;
        Self::from_file(device)
    }

    /// Wrap an already opened UIO device
    pub fn from_file(device: File) -> io::Result<Self> {
        // SAFETY: eventfd has no pointer arguments.
        let fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `fd` was just returned by eventfd and is owned by nobody else.
        let cancel = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self {
            device,
            cancel: Arc::new(cancel),
            last_count: 0,
        })
    }

    /// Handle for cancelling waits on this gate
    pub fn canceller(&self) -> UioCanceller {
        UioCanceller {
            cancel: Arc::clone(&self.cancel),
        }
    }

    /// Interrupt count reported by the last delivered event
    pub fn last_count(&self) -> u32 {
        self.last_count
    }

    /// poll(2) the device and the cancel fd; returns (device ready, cancelled)
    ///
    /// A signal interrupting the call restarts it with what is left of
    /// `timeout`.
    fn poll(&self, timeout: Duration) -> Result<(bool, bool), WaitError> {
        let mut fds = [
            libc::pollfd {
                fd: self.device.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: self.cancel.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
        ];
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let remaining =
                deadline.map_or(timeout, |d| d.saturating_duration_since(Instant::now()));
            // SAFETY: `fds` is a valid array of two pollfd for the call's duration.
            let rc = unsafe {
                libc::poll(
                    fds.as_mut_ptr(),
                    fds.len() as libc::nfds_t,
                    poll_timeout_ms(remaining),
                )
            };
            if rc >= 0 {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                #[cfg(feature = "log")]
                warn!("uio poll failed: {err}");
                return Err(WaitError::Os);
            }
        }
        let failed = libc::POLLERR | libc::POLLHUP | libc::POLLNVAL;
        if fds[0].revents & failed != 0 {
            return Err(WaitError::Os);
        }
        Ok((
            fds[0].revents & libc::POLLIN != 0,
            fds[1].revents & libc::POLLIN != 0,
        ))
    }

    fn read_count(&mut self) -> Result<u32, WaitError> {
        let mut raw = [0u8; 4];
        self.device.read_exact(&mut raw).map_err(|_| WaitError::Os)?;
        Ok(u32::from_ne_bytes(raw))
    }

    fn consume_cancel(&self) {
        let mut value = 0u64;
        // SAFETY: reads 8 bytes into a live u64 from a non-blocking eventfd.
        let _ = unsafe {
            libc::read(
                self.cancel.as_raw_fd(),
                (&raw mut value).cast::<libc::c_void>(),
                core::mem::size_of::<u64>(),
            )
        };
    }
}

/// poll(2) timeout in milliseconds, rounded up so a short wait still blocks.
fn poll_timeout_ms(timeout: Duration) -> libc::c_int {
    libc::c_int::try_from(timeout.as_micros().div_ceil(1000)).unwrap_or(libc::c_int::MAX)
}

impl InterruptGate for UioGate {
    fn wait(&mut self, timeout: Duration) -> Result<CompletionEvent, WaitError> {
        let (ready, cancelled) = self.poll(timeout)?;
        if cancelled {
            self.consume_cancel();
            return Err(WaitError::Cancelled);
        }
        if !ready {
            return Err(WaitError::Timeout);
        }
        let count = self.read_count()?;
        self.last_count = count;
        Ok(CompletionEvent { count })
    }

    fn reenable(&mut self) -> Result<(), WaitError> {
        self.device
            .write_all(&1u32.to_ne_bytes())
            .map_err(|_| WaitError::Os)
    }

    fn drain(&mut self) -> usize {
        let mut drained = 0;
        while let Ok((true, _)) = self.poll(Duration::ZERO) {
            if self.read_count().is_err() {
                break;
            }
            drained += 1;
        }
        drained
    }
}

impl UioCanceller {
    /// Wake the pending wait with [`WaitError::Cancelled`]
    pub fn cancel(&self) -> io::Result<()> {
        let value = 1u64;
        let fd: RawFd = self.cancel.as_raw_fd();
        // SAFETY: writes 8 bytes from a live u64 to an eventfd.
        let rc = unsafe {
            libc::write(
                fd,
                (&raw const value).cast::<libc::c_void>(),
                core::mem::size_of::<u64>(),
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::os::unix::net::UnixStream;
    use std::thread;

    // A socket pair stands in for the UIO node: readable bytes are events,
    // written bytes are re-enables.
    fn pair() -> (UioGate, UnixStream) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let file = File::from(OwnedFd::from(ours));
        (UioGate::from_file(file).unwrap(), theirs)
    }

    #[test]
    fn zero_timeout_never_blocks() {
        let (mut gate, _peer) = pair();
        assert_eq!(gate.wait(Duration::ZERO), Err(WaitError::Timeout));
    }

    #[test]
    fn event_count_is_read() {
        let (mut gate, mut peer) = pair();
        peer.write_all(&7u32.to_ne_bytes()).unwrap();
        assert_eq!(
            gate.wait(Duration::from_millis(100)),
            Ok(CompletionEvent { count: 7 })
        );
        assert_eq!(gate.last_count(), 7);
    }

    #[test]
    fn reenable_writes_one() {
        let (mut gate, mut peer) = pair();
        gate.reenable().unwrap();
        let mut raw = [0u8; 4];
        peer.read_exact(&mut raw).unwrap();
        assert_eq!(u32::from_ne_bytes(raw), 1);
    }

    #[test]
    fn cancel_from_another_thread() {
        let (mut gate, _peer) = pair();
        let canceller = gate.canceller();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel().unwrap();
        });
        assert_eq!(gate.wait(Duration::from_secs(5)), Err(WaitError::Cancelled));
        handle.join().unwrap();
        // The cancellation is consumed
        assert_eq!(gate.wait(Duration::ZERO), Err(WaitError::Timeout));
    }

    #[test]
    fn drain_discards_queued_events() {
        let (mut gate, mut peer) = pair();
        peer.write_all(&1u32.to_ne_bytes()).unwrap();
        peer.write_all(&2u32.to_ne_bytes()).unwrap();
        assert_eq!(gate.drain(), 2);
        assert_eq!(gate.wait(Duration::ZERO), Err(WaitError::Timeout));
    }

    #[test]
    fn poll_timeout_rounds_up() {
        assert_eq!(poll_timeout_ms(Duration::ZERO), 0);
        assert_eq!(poll_timeout_ms(Duration::from_micros(1)), 1);
        assert_eq!(poll_timeout_ms(Duration::from_micros(500)), 1);
        assert_eq!(poll_timeout_ms(Duration::from_micros(1500)), 2);
        assert_eq!(poll_timeout_ms(Duration::MAX), libc::c_int::MAX);
    }

    #[test]
    fn sub_millisecond_timeout_still_blocks() {
        let (mut gate, _peer) = pair();
        let started = Instant::now();
        assert_eq!(
            gate.wait(Duration::from_micros(500)),
            Err(WaitError::Timeout)
        );
        assert!(started.elapsed() >= Duration::from_micros(500));
    }

    #[test]
    fn sub_millisecond_timeout_sees_late_event() {
        let (mut gate, mut peer) = pair();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_micros(200));
            peer.write_all(&3u32.to_ne_bytes()).unwrap();
            peer
        });
        // Rounded up to a millisecond; retry a few windows on a loaded host
        let mut result = gate.wait(Duration::from_micros(900));
        for _ in 0..50 {
            if result.is_ok() {
                break;
            }
            result = gate.wait(Duration::from_micros(900));
        }
        assert_eq!(result, Ok(CompletionEvent { count: 3 }));
        drop(writer.join().unwrap());
    }
}
