//! Transfer engine
//!
//! One engine drives one ring on one channel. It owns the ring's buffer
//! pool and interrupt gate, and walks the state machine
//!
//! ```text
//! Idle -> Configured -> Armed -> Running -> (Completing <-> Running)* -> Stopped
//! ```
//!
//! Buffers handed to the caller come out as [`CompletedBuffer`] values; the
//! only way to read DMA memory is through one, so a buffer still owned by
//! the hardware cannot be read.

use core::time::Duration;

#[cfg(feature = "log")]
use log::{debug, warn};

use crate::driver::config::{ChannelKind, DmaConfig, RingMode, State};
use crate::driver::controller::{ClaimSet, Claims};
use crate::driver::error::{ConfigError, DmaError, IoError, Result};
use crate::driver::interrupt::InterruptStatus;
use crate::hal::gate::InterruptGate;
use crate::hal::mmio::DmaRegion;
use crate::internal::constants::MAX_SLOTS;
use crate::internal::dma::descriptor::StreamDescriptorTable;
use crate::internal::dma::pool::{BufferId, BufferPool, BufferState, CompletedHandle};
use crate::internal::dma::ring::{DescriptorRing, RingEntry};
use crate::internal::register::dma::{DmaRegs, INTR_ALL, start_mem_bit, start_stream_bit};

// =============================================================================
// Topology
// =============================================================================

/// One ring position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotSpec {
    /// Descriptor slot (memory) or record index (stream)
    pub slot: u8,
    /// Source physical address; unused on stream channels
    pub source: u32,
}

impl SlotSpec {
    /// Memory-to-memory position copying from `source`
    pub const fn memory(slot: u8, source: u32) -> Self {
        Self { slot, source }
    }

    /// Stream-to-memory position
    pub const fn stream(slot: u8) -> Self {
        Self { slot, source: 0 }
    }
}

/// Shape of a ring: chain mode, positions and per-descriptor length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingTopology<'s> {
    /// Linear or cyclic
    pub mode: RingMode,
    /// Positions in chain order
    pub slots: &'s [SlotSpec],
    /// Bytes per descriptor; defaults to the buffer length
    pub byte_count: Option<u32>,
}

impl<'s> RingTopology<'s> {
    /// One-shot chain over `slots`
    pub const fn linear(slots: &'s [SlotSpec]) -> Self {
        Self {
            mode: RingMode::Linear,
            slots,
            byte_count: None,
        }
    }

    /// Closed loop over `slots`; `iterations` bounds the completions
    pub const fn cyclic(slots: &'s [SlotSpec], iterations: Option<u32>) -> Self {
        Self {
            mode: RingMode::Cyclic { iterations },
            slots,
            byte_count: None,
        }
    }

    /// Transfer `bytes` per descriptor instead of a whole buffer
    #[must_use]
    pub const fn with_byte_count(mut self, bytes: u32) -> Self {
        self.byte_count = Some(bytes);
        self
    }
}

// =============================================================================
// Completed Buffer
// =============================================================================

/// A buffer the hardware finished writing.
///
/// Holding one is the only way to read DMA memory. Return it with
/// [`TransferEngine::release`] so cyclic rings can reuse it.
#[derive(Debug)]
pub struct CompletedBuffer {
    handle: CompletedHandle,
    region: DmaRegion,
    len: usize,
}

impl CompletedBuffer {
    /// Pool index of the buffer
    pub const fn id(&self) -> BufferId {
        self.handle.id()
    }

    /// Slot the buffer completed on
    pub const fn slot(&self) -> u8 {
        self.handle.slot()
    }

    /// Bytes transferred
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True when the descriptor moved no bytes
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Physical address of the buffer
    pub const fn phys(&self) -> u64 {
        self.region.phys()
    }

    /// Transferred bytes
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: a CompletedHandle exists only for buffers whose descriptor
        // the hardware released; no descriptor references it until release.
        let all = unsafe { self.region.as_slice() };
        &all[..self.len.min(all.len())]
    }
}

// =============================================================================
// Completion Queue
// =============================================================================

/// Completions decoded from one interrupt, handed out one per poll.
struct CompletionQueue {
    items: [Option<CompletedBuffer>; MAX_SLOTS],
    head: usize,
    len: usize,
}

impl CompletionQueue {
    const fn new() -> Self {
        Self {
            items: [const { None }; MAX_SLOTS],
            head: 0,
            len: 0,
        }
    }

    fn push(&mut self, item: CompletedBuffer) {
        debug_assert!(self.len < MAX_SLOTS);
        self.items[(self.head + self.len) % MAX_SLOTS] = Some(item);
        self.len += 1;
    }

    fn pop(&mut self) -> Option<CompletedBuffer> {
        if self.len == 0 {
            return None;
        }
        let item = self.items[self.head].take();
        self.head = (self.head + 1) % MAX_SLOTS;
        self.len -= 1;
        item
    }
}

// =============================================================================
// Transfer Engine
// =============================================================================

/// Where a completion status points.
enum Located {
    /// Every position from the cursor through this one was released
    At(usize),
    /// No position was released yet
    Nothing,
    /// Outside the ring, or still owned by the hardware
    Outside,
}

/// Engine driving one descriptor ring.
///
/// Created by [`AxiDma::configure`](crate::driver::controller::AxiDma::configure).
/// Dropping the engine force-stops it and returns its slots, channel and
/// interrupt block to the controller.
pub struct TransferEngine<'a, G: InterruptGate> {
    regs: &'a DmaRegs,
    claims: &'a ClaimSet,
    claimed: Claims,
    channel: ChannelKind,
    config: DmaConfig,
    ring: DescriptorRing<'a>,
    pool: BufferPool,
    gate: G,
    state: State,
    /// Bytes per descriptor
    byte_count: u32,
    start_mask: u32,
    /// Oldest position the hardware has not reported complete
    cursor: usize,
    /// Positions whose ready bits software set and hardware has not reported
    ready: [bool; MAX_SLOTS],
    completions: u32,
    queue: CompletionQueue,
}

/// Handle for a configured ring; the engine itself.
pub type RingHandle<'a, G> = TransferEngine<'a, G>;

impl<'a, G: InterruptGate> TransferEngine<'a, G> {
    /// Validate, claim and program a ring.
    ///
    /// Every check runs before the first register write; on a readback
    /// mismatch the ring is torn down and the claims are returned.
    pub(crate) fn configure(
        regs: &'a DmaRegs,
        claims: &'a ClaimSet,
        config: DmaConfig,
        topology: RingTopology<'_>,
        channel: ChannelKind,
        buffers: DmaRegion,
        buffer_count: usize,
        gate: G,
    ) -> Result<Self> {
        config.validate()?;
        let variant = regs.variant();
        let block = channel.irq_block();
        if usize::from(block) >= variant.interrupt_blocks {
            return Err(ConfigError::InterruptBlockOutOfRange.into());
        }

        let n = topology.slots.len();
        if n == 0 {
            return Err(ConfigError::EmptyRing.into());
        }
        if topology.mode == (RingMode::Cyclic { iterations: Some(0) }) {
            return Err(ConfigError::InvalidConfig.into());
        }
        if n > MAX_SLOTS || n > buffer_count {
            return Err(ConfigError::RingTooLarge.into());
        }

        // Stream rings keep their descriptor records at the front of the region
        let (ring, pool, start_mask, claimed) = match channel {
            ChannelKind::MemToMem { .. } => {
                let pool = BufferPool::new(buffers, buffer_count)?;
                let mut slots = 0u32;
                for spec in topology.slots {
                    if usize::from(spec.slot) >= variant.descriptor_count {
                        return Err(ConfigError::SlotOutOfRange.into());
                    }
                    slots |= 1 << spec.slot;
                }
                let ring = DescriptorRing::internal(regs, config.max_byte_count);
                let start = start_mem_bit(usize::from(topology.slots[0].slot));
                (ring, pool, start, Claims::new(slots, 0, 1 << block))
            }
            ChannelKind::StreamToMem { channel: stream, .. } => {
                if usize::from(stream) >= variant.stream_channels {
                    return Err(ConfigError::ChannelOutOfRange.into());
                }
                let records = topology
                    .slots
                    .iter()
                    .map(|s| usize::from(s.slot) + 1)
                    .max()
                    .unwrap_or(n);
                if records > MAX_SLOTS {
                    return Err(ConfigError::SlotOutOfRange.into());
                }
                let (table_region, rest) =
                    buffers.split_at(StreamDescriptorTable::bytes_for(records))?;
                let table = StreamDescriptorTable::new(table_region)?;
                let pool = BufferPool::new(rest, buffer_count)?;
                let ring = DescriptorRing::external(regs, stream, table, config.max_byte_count)?;
                let start = start_stream_bit(usize::from(stream));
                (ring, pool, start, Claims::new(0, 1 << stream, 1 << block))
            }
        };

        let buffer_len = pool.buffer_len() as u32;
        let byte_count = topology.byte_count.unwrap_or(buffer_len);
        if byte_count > buffer_len {
            return Err(ConfigError::ByteCountTooLarge.into());
        }

        let mut entries = [RingEntry {
            slot: 0,
            source: 0,
            destination: 0,
            byte_count: 0,
        }; MAX_SLOTS];
        for (pos, spec) in topology.slots.iter().enumerate() {
            let id = pool.id(pos).ok_or(ConfigError::RingTooLarge)?;
            entries[pos] = RingEntry {
                slot: spec.slot,
                source: if channel.is_stream() { 0 } else { spec.source },
                destination: pool.phys(id),
                byte_count,
            };
        }
        let entries = &entries[..n];
        ring.validate(entries)?;

        claims.claim(claimed)?;
        let mut engine = Self {
            regs,
            claims,
            claimed,
            channel,
            config,
            ring,
            pool,
            gate,
            state: State::Idle,
            byte_count,
            start_mask,
            cursor: 0,
            ready: [false; MAX_SLOTS],
            completions: 0,
            queue: CompletionQueue::new(),
        };

        for (pos, entry) in entries.iter().enumerate() {
            let id = engine.pool.id(pos).ok_or(ConfigError::RingTooLarge)?;
            engine.pool.mark_armed(id, entry.slot)?;
        }
        match topology.mode {
            RingMode::Linear => engine.ring.configure_linear(entries)?,
            RingMode::Cyclic { iterations } => engine.ring.configure_cyclic(entries, iterations)?,
        }
        engine.state = State::Configured;

        #[cfg(feature = "log")]
        debug!(
            "{:?}: {} descriptors of {} bytes configured",
            engine.channel, n, byte_count
        );

        Ok(engine)
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Current engine state
    #[inline(always)]
    pub fn state(&self) -> State {
        self.state
    }

    /// Channel the ring runs on
    pub fn channel(&self) -> ChannelKind {
        self.channel
    }

    /// Number of ring positions
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// True once the ring was torn down
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Bytes moved by each descriptor
    pub fn byte_count(&self) -> u32 {
        self.byte_count
    }

    /// Descriptors reported complete so far
    pub fn completions(&self) -> u32 {
        self.completions
    }

    /// Buffer ownership view
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// The engine's interrupt gate
    pub fn gate_mut(&mut self) -> &mut G {
        &mut self.gate
    }

    /// Number of positions currently owned by the hardware
    pub fn in_flight(&self) -> usize {
        self.ready[..self.ring.len()].iter().filter(|r| **r).count()
    }

    // -------------------------------------------------------------------------
    // Arm / Start
    // -------------------------------------------------------------------------

    /// Grant the hardware its first buffers and unmask the interrupt block.
    ///
    /// Linear rings make every position ready; cyclic rings make the first
    /// `prefetch_depth` positions ready.
    pub fn arm(&mut self) -> Result<()> {
        if self.state != State::Configured {
            return Err(IoError::InvalidState.into());
        }
        let block = self.channel.irq_block();
        self.regs.clear_interrupts(block, INTR_ALL)?;
        self.regs.mask_interrupts(block, INTR_ALL)?;

        match self.ring.mode() {
            RingMode::Linear => {
                for pos in 0..self.ring.len() {
                    self.make_ready(pos)?;
                }
            }
            RingMode::Cyclic { .. } => self.top_up()?,
        }
        self.state = State::Armed;
        Ok(())
    }

    /// Start the ring, arming it first if needed.
    pub fn start(&mut self) -> Result<()> {
        if self.state == State::Configured {
            self.arm()?;
        }
        if self.state != State::Armed {
            return Err(IoError::InvalidState.into());
        }
        self.regs.start(self.start_mask);
        self.state = State::Running;

        #[cfg(feature = "log")]
        debug!("{:?}: started ({:#010x})", self.channel, self.start_mask);

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Completion
    // -------------------------------------------------------------------------

    /// Wait for the next completed buffer.
    ///
    /// Completions already decoded from an earlier interrupt are returned
    /// without waiting. A timeout or cancellation leaves the engine running.
    /// An out-of-ring index or an error status force-stops the engine before
    /// the error is returned.
    pub fn poll_completion(&mut self, timeout: Duration) -> Result<CompletedBuffer> {
        if let Some(done) = self.queue.pop() {
            return Ok(done);
        }
        if self.state != State::Running {
            return Err(IoError::InvalidState.into());
        }

        self.gate.wait(timeout)?;
        self.state = State::Completing;

        let block = self.channel.irq_block();
        let raw = self.regs.read_interrupt_status(block)?;
        let status = InterruptStatus::from_raw(raw, self.regs.variant().completion_index);
        self.regs.clear_interrupts(block, status.to_raw())?;
        self.gate.reenable()?;

        if status.has_error() {
            #[cfg(feature = "log")]
            warn!("{:?}: error status {:#010x}", self.channel, raw);
            self.force_stop();
            let err = if status.bus_error() {
                DmaError::BusError
            } else {
                DmaError::InvalidDescriptor
            };
            return Err(err.into());
        }
        if !status.op_complete {
            self.state = State::Running;
            return Err(IoError::NoCompletion.into());
        }

        let target = match self.locate(&status)? {
            Located::At(pos) => pos,
            Located::Nothing => {
                self.state = State::Running;
                return Err(IoError::NoCompletion.into());
            }
            Located::Outside => {
                #[cfg(feature = "log")]
                warn!(
                    "{:?}: completion index {} outside the released ring",
                    self.channel, status.descriptor_index
                );
                self.force_stop();
                return Err(DmaError::InvalidCompletionIndex.into());
            }
        };

        // Coalesced interrupts cover every position up to the reported one
        let mut pos = self.cursor;
        loop {
            self.complete(pos)?;
            if pos == target {
                break;
            }
            pos = self.ring.next_position(pos);
        }

        match self.ring.mode() {
            RingMode::Linear => {
                if self.in_flight() == 0 {
                    self.finish();
                } else {
                    self.state = State::Running;
                }
            }
            RingMode::Cyclic { iterations } => {
                if iterations.is_some_and(|limit| self.completions >= limit) {
                    self.finish();
                } else {
                    self.refill()?;
                    self.state = State::Running;
                }
            }
        }

        self.queue
            .pop()
            .ok_or_else(|| DmaError::InvalidCompletionIndex.into())
    }

    /// Return a completed buffer to the pool.
    ///
    /// On a running cyclic ring the buffer is bound to the oldest starved
    /// position and made ready when it falls inside the prefetch window.
    pub fn release(&mut self, buffer: CompletedBuffer) -> Result<()> {
        let id = self.pool.release(buffer.handle)?;
        if self.ring.mode().is_cyclic()
            && matches!(self.state, State::Armed | State::Running)
        {
            if let Some(pos) = self.first_starved() {
                self.bind(pos, id)?;
            }
            self.top_up()?;
        }
        Ok(())
    }

    /// Map the status to the ring position the hardware finished.
    ///
    /// The status is only a hint: a position counts as finished once its
    /// ready bits read back clear, along with every position before it.
    fn locate(&self, status: &InterruptStatus) -> Result<Located> {
        let target = match self.ring.external_table() {
            None => self
                .ring
                .position_of(status.descriptor_index as usize),
            Some((_, table)) => {
                let ext = self.regs.interrupt_ext_addr(self.channel.irq_block())?;
                if ext == 0 {
                    return Ok(match self.scan_released()? {
                        Some(pos) => Located::At(pos),
                        None => Located::Nothing,
                    });
                }
                table
                    .index_of(ext)
                    .and_then(|record| self.ring.position_of(record))
            }
        };
        match target {
            Some(pos) if self.released_through(pos)? => Ok(Located::At(pos)),
            _ => Ok(Located::Outside),
        }
    }

    /// True when every position from the cursor up to `target` was made
    /// ready by software and has since been released by the hardware.
    fn released_through(&self, target: usize) -> Result<bool> {
        let mut pos = self.cursor;
        for _ in 0..self.ring.len() {
            if !self.ready[pos] || self.ring.hardware_owned(pos)? {
                return Ok(false);
            }
            if pos == target {
                return Ok(true);
            }
            pos = self.ring.next_position(pos);
        }
        Ok(false)
    }

    /// Last in-flight position, in chain order from the cursor, whose ready
    /// bits the hardware already cleared.
    fn scan_released(&self) -> Result<Option<usize>> {
        let mut last = None;
        let mut pos = self.cursor;
        for _ in 0..self.ring.len() {
            if !self.ready[pos] || self.ring.hardware_owned(pos)? {
                break;
            }
            last = Some(pos);
            pos = self.ring.next_position(pos);
        }
        Ok(last)
    }

    fn complete(&mut self, pos: usize) -> Result<()> {
        let slot = self.ring.slot(pos);
        let id = self.pool.bound_to(slot).ok_or(DmaError::BufferBusy)?;
        let handle = self.pool.mark_completed(id)?;
        let region = self.pool.region(id);
        self.queue.push(CompletedBuffer {
            handle,
            region,
            len: self.byte_count as usize,
        });
        self.ready[pos] = false;
        self.cursor = self.ring.next_position(pos);
        self.completions = self.completions.wrapping_add(1);
        Ok(())
    }

    /// Bind free buffers to starved positions, then top up the window.
    fn refill(&mut self) -> Result<()> {
        while let Some(pos) = self.first_starved() {
            let Some(id) = self.pool.acquire_free() else {
                break;
            };
            self.bind(pos, id)?;
        }
        self.top_up()
    }

    fn bind(&mut self, pos: usize, id: BufferId) -> Result<()> {
        self.ring.rebind(pos, self.pool.phys(id))?;
        self.pool.mark_armed(id, self.ring.slot(pos))?;
        Ok(())
    }

    /// Oldest position, from the cursor, with no buffer bound
    fn first_starved(&self) -> Option<usize> {
        let n = self.ring.len();
        (0..n)
            .map(|k| (self.cursor + k) % n)
            .find(|pos| self.pool.bound_to(self.ring.slot(*pos)).is_none())
    }

    /// Keep `prefetch_depth` positions ready ahead of the hardware.
    fn top_up(&mut self) -> Result<()> {
        let n = self.ring.len();
        let depth = self.config.effective_prefetch(n);
        let budget = match self.ring.mode() {
            RingMode::Cyclic {
                iterations: Some(limit),
            } => limit.saturating_sub(self.completions) as usize,
            _ => n,
        };

        for k in 0..depth {
            if self.in_flight() >= budget {
                break;
            }
            let pos = (self.cursor + k) % n;
            if self.ready[pos] {
                continue;
            }
            let slot = self.ring.slot(pos);
            match self.pool.bound_to(slot) {
                Some(id) if self.pool.state(id) == (BufferState::Armed { slot }) => {
                    self.make_ready(pos)?;
                }
                _ => {
                    // Hardware stalls here until a buffer is released
                    #[cfg(feature = "log")]
                    debug!("{:?}: slot {} starved", self.channel, slot);
                    break;
                }
            }
        }
        Ok(())
    }

    fn make_ready(&mut self, pos: usize) -> Result<()> {
        let slot = self.ring.slot(pos);
        let id = self.pool.bound_to(slot).ok_or(DmaError::NoFreeBuffers)?;
        self.ring.rearm(pos)?;
        self.pool.mark_in_flight(id)?;
        self.ready[pos] = true;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Stop
    // -------------------------------------------------------------------------

    /// Graceful end of a ring: tear down and stop.
    fn finish(&mut self) {
        self.shutdown();

        #[cfg(feature = "log")]
        debug!(
            "{:?}: finished after {} completions",
            self.channel, self.completions
        );
    }

    /// Invalidate every descriptor of the ring and stop.
    ///
    /// Runs from any state and is idempotent. Buffers the hardware owned
    /// return to the pool; completed buffers held by the caller stay valid.
    pub fn force_stop(&mut self) {
        if self.state != State::Stopped {
            #[cfg(feature = "log")]
            warn!("{:?}: force stop in {:?}", self.channel, self.state);
        }
        self.shutdown();
    }

    /// Stop the ring.
    pub fn stop(&mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.ring.teardown();
        let block = self.channel.irq_block();
        // The block index was validated at configuration.
        let _ = self.regs.mask_interrupts(block, 0);
        let _ = self.regs.clear_interrupts(block, INTR_ALL);
        self.pool.unbind_all();
        self.ready = [false; MAX_SLOTS];
        self.state = State::Stopped;
    }
}

impl<G: InterruptGate> Drop for TransferEngine<'_, G> {
    fn drop(&mut self) {
        self.shutdown();
        self.claims.release(self.claimed);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
