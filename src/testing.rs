//! Testing utilities and mock implementations
//!
//! Host-side stand-ins for the controller: a register file backed by heap
//! memory, DMA-visible buffers with fake physical addresses, a delay that
//! only counts, and a behavioral model of the descriptor engine that moves
//! bytes between attached buffers.
//!
//! Only available when running `cargo test`.

// Note: The #[cfg(test)] attribute is applied in lib.rs where this module is declared
#![allow(missing_docs)]
#![allow(clippy::std_instead_of_core, clippy::std_instead_of_alloc)]

extern crate std;

use core::cell::{Cell, RefCell};
use core::time::Duration;
use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::vec::Vec;

use crate::driver::config::ControllerVariant;
use crate::hal::gate::{CancelToken, CompletionEvent, InterruptGate, WaitError};
use crate::hal::mmio::{DmaRegion, RegisterWindow};
use crate::internal::constants::MAX_BYTE_COUNT;
use crate::internal::dma::descriptor::bits::{mem_config, stream_config};
use crate::internal::register::dma::{
    DESC_BASE, DESC_STRIDE, DmaRegs, INTR_ALL, INTR_BASE, INTR_CLEAR_OFFSET,
    INTR_EXT_ADDR_OFFSET, INTR_INVALID_DESC, INTR_MASK_OFFSET, INTR_OP_COMPLETE,
    INTR_READ_ERROR, INTR_STAT_OFFSET, INTR_STRIDE, INTR_WRITE_ERROR, START_OPERATION_OFFSET,
    STREAM_ADDR_BASE, STREAM_ADDR_STRIDE,
};

// =============================================================================
// Mock Register File
// =============================================================================

/// Zeroed heap memory standing in for the controller's register window.
///
/// # Example
///
/// ```ignore
/// let file = MockRegisterFile::new();
/// let regs = file.regs(ControllerVariant::CORE_4);
/// regs.mask_interrupts(0, INTR_ALL).unwrap();
/// assert_eq!(file.read(0x014), INTR_ALL);
/// ```
#[derive(Debug)]
pub struct MockRegisterFile {
    ptr: *mut u8,
    layout: Layout,
}

impl MockRegisterFile {
    /// 4 KiB window, large enough for every variant
    pub fn new() -> Self {
        Self::with_len(0x1000)
    }

    pub fn with_len(len: usize) -> Self {
        let layout = Layout::from_size_align(len, 16).unwrap();
        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        assert!(!ptr.is_null());
        Self { ptr, layout }
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn window(&self) -> RegisterWindow {
        // SAFETY: the allocation outlives every window in a test.
        unsafe { RegisterWindow::from_raw_parts(self.ptr, self.len()).unwrap() }
    }

    pub fn regs(&self, variant: ControllerVariant) -> DmaRegs {
        DmaRegs::new(self.window(), variant).unwrap()
    }

    pub fn read(&self, offset: usize) -> u32 {
        assert!(offset + 4 <= self.len());
        // SAFETY: in bounds and 4-byte aligned.
        unsafe { core::ptr::read_volatile(self.ptr.add(offset).cast::<u32>()) }
    }

    pub fn write(&self, offset: usize, value: u32) {
        assert!(offset + 4 <= self.len());
        // SAFETY: in bounds and 4-byte aligned.
        unsafe { core::ptr::write_volatile(self.ptr.add(offset).cast::<u32>(), value) }
    }

    /// Every register word, for before/after comparisons
    pub fn snapshot(&self) -> Vec<u32> {
        (0..self.len() / 4).map(|i| self.read(i * 4)).collect()
    }
}

impl Default for MockRegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MockRegisterFile {
    fn drop(&mut self) {
        // SAFETY: allocated in `with_len` with the same layout.
        unsafe { dealloc(self.ptr, self.layout) }
    }
}

// =============================================================================
// Mock DMA Memory
// =============================================================================

/// Fake physical addresses, unique per allocation in the test process
static NEXT_PHYS: AtomicU64 = AtomicU64::new(0x1000_0000);

/// Heap buffer with a made-up physical address below 4 GiB.
#[derive(Debug)]
pub struct MockDmaMemory {
    ptr: *mut u8,
    layout: Layout,
    phys: u64,
}

impl MockDmaMemory {
    pub fn new(len: usize) -> Self {
        let layout = Layout::from_size_align(len, 64).unwrap();
        // SAFETY: callers never pass zero.
        let ptr = unsafe { alloc_zeroed(layout) };
        assert!(!ptr.is_null());
        let span = (len as u64 + 0x1FFF) & !0xFFF;
        let phys = NEXT_PHYS.fetch_add(span, Ordering::Relaxed);
        assert!(phys + span <= u64::from(u32::MAX));
        Self { ptr, layout, phys }
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn phys_base(&self) -> u64 {
        self.phys
    }

    pub fn region(&self) -> DmaRegion {
        // SAFETY: the allocation outlives every region derived in a test.
        unsafe { DmaRegion::from_raw_parts(self.ptr, self.phys, self.len()).unwrap() }
    }

    /// Copy `data` to the start of the buffer
    pub fn fill(&self, data: &[u8]) {
        assert!(data.len() <= self.len());
        // SAFETY: bounds checked above; no references into the buffer exist.
        unsafe { core::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr, data.len()) }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = std::vec![0u8; self.len()];
        // SAFETY: whole allocation, copied out.
        unsafe { core::ptr::copy_nonoverlapping(self.ptr, out.as_mut_ptr(), out.len()) }
        out
    }

    /// Virtual pointer for `len` bytes at `phys`, if inside this buffer
    fn translate(&self, phys: u64, len: usize) -> Option<*mut u8> {
        let offset = phys.checked_sub(self.phys)? as usize;
        (offset + len <= self.len()).then(|| {
            // SAFETY: offset + len is within the allocation.
            unsafe { self.ptr.add(offset) }
        })
    }
}

impl Drop for MockDmaMemory {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with the same layout.
        unsafe { dealloc(self.ptr, self.layout) }
    }
}

// =============================================================================
// Counting Delay
// =============================================================================

/// Delay that returns immediately and records the requested time.
#[derive(Debug, Default)]
pub struct CountingDelay {
    total_ns: u64,
}

impl CountingDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_us(&self) -> u64 {
        self.total_ns / 1_000
    }
}

impl embedded_hal::delay::DelayNs for CountingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }

    fn delay_us(&mut self, us: u32) {
        self.total_ns += u64::from(us) * 1_000;
    }

    fn delay_ms(&mut self, ms: u32) {
        self.total_ns += u64::from(ms) * 1_000_000;
    }
}

// =============================================================================
// Simulated Controller
// =============================================================================

/// Error the next processed descriptor reports instead of moving data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    WriteError,
    ReadError,
}

/// Position of one running chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Memory { slot: usize, fresh: bool },
    Stream { channel: usize, desc: u32, fresh: bool },
}

const BLOCKS: usize = 4;
const STREAMS: usize = 4;
const INDEX_SHIFT: u32 = 4;
const INDEX_MASK: u32 = 0x3F << INDEX_SHIFT;
/// Descriptors processed per chain per step before giving up
const STEP_LIMIT: usize = 256;

/// Behavioral model of the descriptor engine on top of a [`MockRegisterFile`].
///
/// Nothing happens between calls: every [`step`](Self::step) (and every
/// [`SimGate`] wait) applies INTR_CLEAR writes, latches START bits and runs
/// each active chain until it stalls on a descriptor without ready bits.
/// Status raised by [`raise`](Self::raise) also sees earlier clears.
/// Memory rings interrupt on block 0; stream channels on the block given to
/// [`route_stream`](Self::route_stream).
pub struct SimulatedController<'f> {
    file: &'f MockRegisterFile,
    memory: RefCell<Vec<&'f MockDmaMemory>>,
    cursors: RefCell<Vec<Cursor>>,
    held: Cell<bool>,
    fault: Cell<Option<Fault>>,
    stream_blocks: Cell<[u8; STREAMS]>,
    stream_produced: Cell<[usize; STREAMS]>,
    line_enabled: Cell<[bool; BLOCKS]>,
    latched: Cell<[u32; BLOCKS]>,
    reenables: Cell<[u32; BLOCKS]>,
}

impl<'f> SimulatedController<'f> {
    pub fn new(file: &'f MockRegisterFile) -> Self {
        Self {
            file,
            memory: RefCell::new(Vec::new()),
            cursors: RefCell::new(Vec::new()),
            held: Cell::new(false),
            fault: Cell::new(None),
            stream_blocks: Cell::new([0; STREAMS]),
            stream_produced: Cell::new([0; STREAMS]),
            line_enabled: Cell::new([true; BLOCKS]),
            latched: Cell::new([0; BLOCKS]),
            reenables: Cell::new([0; BLOCKS]),
        }
    }

    /// Make a buffer reachable by physical address
    pub fn attach(&self, memory: &'f MockDmaMemory) {
        self.memory.borrow_mut().push(memory);
    }

    /// Freeze descriptor processing (status and interrupt lines still work)
    pub fn hold(&self, held: bool) {
        self.held.set(held);
    }

    pub fn inject(&self, fault: Fault) {
        self.fault.set(Some(fault));
    }

    pub fn route_stream(&self, channel: usize, block: u8) {
        let mut blocks = self.stream_blocks.get();
        blocks[channel] = block;
        self.stream_blocks.set(blocks);
    }

    /// Re-enables seen on `block`
    pub fn reenables(&self, block: u8) -> u32 {
        self.reenables.get()[usize::from(block)]
    }

    /// Set status bits on `block` as the hardware would.
    ///
    /// Pending INTR_CLEAR writes land first, as they would on the bus.
    /// Event bits accumulate; the descriptor index field is replaced.
    pub fn raise(&self, block: u8, bits: u32) {
        self.apply_clears();
        let stat = self.intr(block, INTR_STAT_OFFSET);
        let value = (self.file.read(stat) & INTR_ALL) | (bits & (INTR_ALL | INDEX_MASK));
        self.file.write(stat, value);
        self.update_line(block);
    }

    /// Deliver an event with no status bits behind it
    pub fn pulse(&self, block: u8) {
        self.latch(block);
    }

    /// Advance the model once.
    pub fn step(&self) {
        self.apply_clears();

        let start = self.file.read(START_OPERATION_OFFSET);
        if start != 0 {
            let mut cursors = self.cursors.borrow_mut();
            for slot in 0..16 {
                if start & (1 << slot) != 0 {
                    cursors.push(Cursor::Memory { slot, fresh: true });
                }
            }
            for channel in 0..STREAMS {
                if start & (1 << (16 + channel)) != 0 {
                    let desc = self
                        .file
                        .read(STREAM_ADDR_BASE + channel * STREAM_ADDR_STRIDE);
                    if desc != 0 {
                        cursors.push(Cursor::Stream {
                            channel,
                            desc,
                            fresh: true,
                        });
                    }
                }
            }
            self.file.write(START_OPERATION_OFFSET, 0);
        }

        if !self.held.get() {
            let active = core::mem::take(&mut *self.cursors.borrow_mut());
            let mut still = Vec::new();
            for mut cursor in active {
                let mut alive = true;
                for _ in 0..STEP_LIMIT {
                    match self.advance(cursor) {
                        Advance::Moved(next) => cursor = next,
                        Advance::Stalled(at) => {
                            cursor = at;
                            break;
                        }
                        Advance::Done => {
                            alive = false;
                            break;
                        }
                    }
                }
                if alive {
                    still.push(cursor);
                }
            }
            self.cursors.borrow_mut().extend(still);
        }

        for block in 0..BLOCKS as u8 {
            self.update_line(block);
        }
    }

    // -------------------------------------------------------------------------
    // Descriptor processing
    // -------------------------------------------------------------------------

    fn advance(&self, cursor: Cursor) -> Advance {
        match cursor {
            Cursor::Memory { slot, fresh } => self.advance_memory(slot, fresh),
            Cursor::Stream {
                channel,
                desc,
                fresh,
            } => self.advance_stream(channel, desc, fresh),
        }
    }

    fn advance_memory(&self, slot: usize, fresh: bool) -> Advance {
        let base = DESC_BASE + slot * DESC_STRIDE;
        let config = self.file.read(base);
        if config & mem_config::VALID == 0 {
            if fresh {
                self.raise(0, INTR_INVALID_DESC | ((slot as u32) << INDEX_SHIFT));
            }
            return Advance::Done;
        }
        if config & mem_config::READY_BITS != mem_config::READY_BITS {
            return Advance::Stalled(Cursor::Memory { slot, fresh: false });
        }

        let len = (self.file.read(base + 0x4) & MAX_BYTE_COUNT) as usize;
        let src = self.file.read(base + 0x8);
        let dst = self.file.read(base + 0xC);
        if let Some(bits) = self.take_fault() {
            self.raise(0, bits | ((slot as u32) << INDEX_SHIFT));
            return Advance::Done;
        }
        let (Some(from), Some(to)) = (self.translate(src, len), self.translate(dst, len)) else {
            self.raise(0, INTR_READ_ERROR | ((slot as u32) << INDEX_SHIFT));
            return Advance::Done;
        };
        // SAFETY: both ranges are inside attached allocations.
        unsafe { core::ptr::copy(from, to, len) };

        self.file.write(base, config & !mem_config::READY_BITS);
        if config & mem_config::IRQ_ON_PROCESS != 0 {
            self.raise(0, INTR_OP_COMPLETE | ((slot as u32) << INDEX_SHIFT));
        }
        if config & mem_config::CHAIN != 0 {
            let next = self.file.read(base + 0x10) as usize;
            Advance::Moved(Cursor::Memory {
                slot: next,
                fresh: false,
            })
        } else {
            Advance::Done
        }
    }

    fn advance_stream(&self, channel: usize, desc: u32, fresh: bool) -> Advance {
        let block = self.stream_blocks.get()[channel];
        let Some(record) = self.translate(desc, 16) else {
            self.raise(block, INTR_READ_ERROR);
            return Advance::Done;
        };
        let record = record.cast::<u32>();
        // SAFETY: 16 bytes at `record` are inside an attached allocation
        // with at least 4-byte alignment.
        let word = |i: usize| unsafe { core::ptr::read_volatile(record.add(i)) };
        let config = word(0);
        if config & stream_config::VALID == 0 {
            if fresh {
                self.raise(block, INTR_INVALID_DESC);
            }
            return Advance::Done;
        }
        if config & stream_config::DEST_DATA_READY == 0 {
            return Advance::Stalled(Cursor::Stream {
                channel,
                desc,
                fresh: false,
            });
        }

        let len = (word(1) & MAX_BYTE_COUNT) as usize;
        let dst = word(2);
        let next = word(3);
        if let Some(bits) = self.take_fault() {
            self.raise(block, bits);
            return Advance::Done;
        }
        let Some(to) = self.translate(dst, len) else {
            self.raise(block, INTR_WRITE_ERROR);
            return Advance::Done;
        };
        let mut produced = self.stream_produced.get();
        for i in 0..len {
            // SAFETY: `to` covers `len` bytes.
            unsafe { to.add(i).write(((produced[channel] + i) % 256) as u8) };
        }
        produced[channel] += len;
        self.stream_produced.set(produced);

        // SAFETY: see `word`.
        unsafe { core::ptr::write_volatile(record, config & !stream_config::DEST_DATA_READY) };
        if config & stream_config::IRQ_ON_PROCESS != 0 {
            self.file
                .write(self.intr(block, INTR_EXT_ADDR_OFFSET), desc);
            self.raise(block, INTR_OP_COMPLETE);
        }
        if config & stream_config::CHAIN != 0 && next != 0 {
            Advance::Moved(Cursor::Stream {
                channel,
                desc: next,
                fresh: false,
            })
        } else {
            Advance::Done
        }
    }

    fn take_fault(&self) -> Option<u32> {
        self.fault.take().map(|fault| match fault {
            Fault::WriteError => INTR_WRITE_ERROR,
            Fault::ReadError => INTR_READ_ERROR,
        })
    }

    fn translate(&self, phys: u32, len: usize) -> Option<*mut u8> {
        self.memory
            .borrow()
            .iter()
            .find_map(|m| m.translate(u64::from(phys), len))
    }

    // -------------------------------------------------------------------------
    // Interrupt lines
    // -------------------------------------------------------------------------

    fn intr(&self, block: u8, reg: usize) -> usize {
        INTR_BASE + usize::from(block) * INTR_STRIDE + reg
    }

    fn apply_clears(&self) {
        for block in 0..BLOCKS as u8 {
            let clear = self.file.read(self.intr(block, INTR_CLEAR_OFFSET));
            if clear != 0 {
                let stat = self.intr(block, INTR_STAT_OFFSET);
                let mut value = self.file.read(stat) & !clear;
                if value & INTR_ALL == 0 {
                    value = 0;
                }
                self.file.write(stat, value);
                self.file.write(self.intr(block, INTR_CLEAR_OFFSET), 0);
            }
        }
    }

    fn update_line(&self, block: u8) {
        let b = usize::from(block);
        let stat = self.file.read(self.intr(block, INTR_STAT_OFFSET));
        let mask = self.file.read(self.intr(block, INTR_MASK_OFFSET));
        if self.line_enabled.get()[b] && stat & mask & INTR_ALL != 0 {
            self.latch(block);
        }
    }

    fn latch(&self, block: u8) {
        let b = usize::from(block);
        let mut latched = self.latched.get();
        latched[b] += 1;
        self.latched.set(latched);
        let mut enabled = self.line_enabled.get();
        enabled[b] = false;
        self.line_enabled.set(enabled);
    }

    fn take_event(&self, block: u8) -> bool {
        let b = usize::from(block);
        let mut latched = self.latched.get();
        if latched[b] == 0 {
            return false;
        }
        latched[b] -= 1;
        self.latched.set(latched);
        true
    }

    fn drain_events(&self, block: u8) -> usize {
        let b = usize::from(block);
        let mut latched = self.latched.get();
        let count = latched[b] as usize;
        latched[b] = 0;
        self.latched.set(latched);
        count
    }

    fn reenable(&self, block: u8) {
        let b = usize::from(block);
        self.apply_clears();
        let mut counts = self.reenables.get();
        counts[b] += 1;
        self.reenables.set(counts);
        let mut enabled = self.line_enabled.get();
        enabled[b] = true;
        self.line_enabled.set(enabled);
        self.update_line(block);
    }
}

enum Advance {
    Moved(Cursor),
    Stalled(Cursor),
    Done,
}

// =============================================================================
// Simulated Gate
// =============================================================================

/// Interrupt gate fed by a [`SimulatedController`].
///
/// Behaves like a UIO node: one event per assertion of the line, and no
/// further events until [`reenable`](InterruptGate::reenable).
pub struct SimGate<'s, 'f> {
    sim: &'s SimulatedController<'f>,
    block: u8,
    cancel: Arc<CancelToken>,
    delivered: u32,
}

impl<'s, 'f> SimGate<'s, 'f> {
    pub fn new(sim: &'s SimulatedController<'f>, block: u8) -> Self {
        Self {
            sim,
            block,
            cancel: Arc::new(CancelToken::new()),
            delivered: 0,
        }
    }

    pub fn canceller(&self) -> Arc<CancelToken> {
        Arc::clone(&self.cancel)
    }
}

impl InterruptGate for SimGate<'_, '_> {
    fn wait(&mut self, _timeout: Duration) -> Result<CompletionEvent, WaitError> {
        if self.cancel.take() {
            return Err(WaitError::Cancelled);
        }
        self.sim.step();
        if self.sim.take_event(self.block) {
            self.delivered += 1;
            return Ok(CompletionEvent {
                count: self.delivered,
            });
        }
        Err(WaitError::Timeout)
    }

    fn reenable(&mut self) -> Result<(), WaitError> {
        self.sim.reenable(self.block);
        Ok(())
    }

    fn drain(&mut self) -> usize {
        self.sim.drain_events(self.block)
    }
}
