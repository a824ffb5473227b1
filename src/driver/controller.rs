//! Controller handle
//!
//! [`AxiDma`] owns the register block and hands out transfer engines. Slots,
//! stream channels and interrupt blocks are claimed per engine; a second
//! engine asking for a claimed resource gets
//! [`ConfigError::ResourceInUse`] before anything is written.

use core::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "log")]
use log::{debug, info};

use crate::driver::config::{ChannelKind, DmaConfig};
use crate::driver::engine::{RingHandle, RingTopology, TransferEngine};
use crate::driver::error::{ConfigError, ConfigResult, Result};
use crate::hal::gate::InterruptGate;
use crate::hal::mmio::{DmaRegion, RegisterWindow};
use crate::internal::constants::VERSION_NOT_PRESENT;
use crate::internal::register::dma::{DmaRegs, INTR_ALL};

// =============================================================================
// Claims
// =============================================================================

/// Resources held by one engine, one bit per index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Claims {
    slots: u32,
    streams: u32,
    blocks: u32,
}

impl Claims {
    pub(crate) const fn new(slots: u32, streams: u32, blocks: u32) -> Self {
        Self {
            slots,
            streams,
            blocks,
        }
    }
}

/// Controller-wide claim masks.
#[derive(Debug, Default)]
pub(crate) struct ClaimSet {
    slots: AtomicU32,
    streams: AtomicU32,
    blocks: AtomicU32,
}

fn take_bits(word: &AtomicU32, bits: u32) -> bool {
    word.fetch_update(Ordering::AcqRel, Ordering::Acquire, |held| {
        (held & bits == 0).then_some(held | bits)
    })
    .is_ok()
}

impl ClaimSet {
    const fn new() -> Self {
        Self {
            slots: AtomicU32::new(0),
            streams: AtomicU32::new(0),
            blocks: AtomicU32::new(0),
        }
    }

    /// Take every resource in `claims` or none of them
    pub(crate) fn claim(&self, claims: Claims) -> ConfigResult<()> {
        if !take_bits(&self.slots, claims.slots) {
            return Err(ConfigError::ResourceInUse);
        }
        if !take_bits(&self.streams, claims.streams) {
            self.slots.fetch_and(!claims.slots, Ordering::AcqRel);
            return Err(ConfigError::ResourceInUse);
        }
        if !take_bits(&self.blocks, claims.blocks) {
            self.slots.fetch_and(!claims.slots, Ordering::AcqRel);
            self.streams.fetch_and(!claims.streams, Ordering::AcqRel);
            return Err(ConfigError::ResourceInUse);
        }
        Ok(())
    }

    pub(crate) fn release(&self, claims: Claims) {
        self.slots.fetch_and(!claims.slots, Ordering::AcqRel);
        self.streams.fetch_and(!claims.streams, Ordering::AcqRel);
        self.blocks.fetch_and(!claims.blocks, Ordering::AcqRel);
    }

    fn held(&self) -> Claims {
        Claims {
            slots: self.slots.load(Ordering::Acquire),
            streams: self.streams.load(Ordering::Acquire),
            blocks: self.blocks.load(Ordering::Acquire),
        }
    }
}

// =============================================================================
// Controller
// =============================================================================

/// CoreAXI4DMAController instance.
///
/// # Example
///
/// ```ignore
/// let window = unsafe { RegisterWindow::from_raw_parts(base, 0x1000)? };
/// let dma = AxiDma::new(window, DmaConfig::new())?;
/// dma.probe()?;
///
/// let slots = [SlotSpec::memory(0, src_phys)];
/// let gate = PollingGate::new(dma.regs(), 0, delay, 10);
/// let mut ring = dma.configure(
///     RingTopology::linear(&slots),
///     ChannelKind::MemToMem { irq_block: 0 },
///     buffers,
///     1,
///     gate,
/// )?;
/// ring.start()?;
/// let done = ring.poll_completion(Duration::from_millis(100))?;
/// ```
#[derive(Debug)]
pub struct AxiDma {
    regs: DmaRegs,
    config: DmaConfig,
    claims: ClaimSet,
}

impl AxiDma {
    /// Wrap a mapped register window.
    ///
    /// Nothing is written; call [`reset_interrupts`](Self::reset_interrupts)
    /// when taking over a controller a previous owner may have left running.
    pub fn new(window: RegisterWindow, config: DmaConfig) -> ConfigResult<Self> {
        config.validate()?;
        let regs = DmaRegs::new(window, config.variant)?;
        Ok(Self {
            regs,
            config,
            claims: ClaimSet::new(),
        })
    }

    /// Engine configuration
    #[inline(always)]
    pub fn config(&self) -> &DmaConfig {
        &self.config
    }

    /// Raw register block, for building gates
    #[inline(always)]
    pub fn regs(&self) -> &DmaRegs {
        &self.regs
    }

    /// Contents of the VERSION register
    pub fn version(&self) -> u32 {
        self.regs.version()
    }

    /// Check that a controller answers at the mapped window.
    ///
    /// An all-zeros or all-ones VERSION means nothing is decoding the bus.
    pub fn probe(&self) -> ConfigResult<u32> {
        let version = self.version();
        if version == 0 || version == VERSION_NOT_PRESENT {
            return Err(ConfigError::InvalidConfig);
        }

        #[cfg(feature = "defmt")]
        defmt::info!("CoreAXI4DMAController version {=u32:#x}", version);
        #[cfg(feature = "log")]
        info!(
            "CoreAXI4DMAController version {:#x}, {} descriptors",
            version, self.config.variant.descriptor_count
        );

        Ok(version)
    }

    /// Program a ring and return the engine that drives it.
    ///
    /// `buffers` is split into `buffer_count` equal buffers; stream rings
    /// first take their descriptor records from the front of it. All
    /// validation happens before the first register write.
    pub fn configure<G: InterruptGate>(
        &self,
        topology: RingTopology<'_>,
        channel: ChannelKind,
        buffers: DmaRegion,
        buffer_count: usize,
        gate: G,
    ) -> Result<RingHandle<'_, G>> {
        TransferEngine::configure(
            &self.regs,
            &self.claims,
            self.config,
            topology,
            channel,
            buffers,
            buffer_count,
            gate,
        )
    }

    /// True when no engine holds slot `slot`
    pub fn slot_available(&self, slot: u8) -> bool {
        slot < 32 && self.claims.held().slots & (1 << slot) == 0
    }

    /// True when no engine holds interrupt block `block`
    pub fn block_available(&self, block: u8) -> bool {
        block < 32 && self.claims.held().blocks & (1 << block) == 0
    }

    /// Invalidate every descriptor and stream pointer on the controller.
    ///
    /// Engines still alive see their rings torn down underneath them; their
    /// next wait times out and `force_stop` returns them to `Stopped`.
    pub fn force_stop_all(&self) {
        self.regs.force_stop_all();

        #[cfg(feature = "log")]
        debug!("all descriptors invalidated");
    }

    /// Bring the interrupt path to a known state.
    ///
    /// Stops the controller, masks every block, discards queued events,
    /// clears all status bits and re-enables delivery once. Returns the
    /// number of discarded events.
    pub fn reset_interrupts<G: InterruptGate>(&self, gate: &mut G) -> Result<usize> {
        self.force_stop_all();
        let blocks = self.config.variant.interrupt_blocks as u8;
        for block in 0..blocks {
            self.regs.mask_interrupts(block, 0)?;
        }
        let drained = gate.drain();
        for block in 0..blocks {
            self.regs.clear_interrupts(block, INTR_ALL)?;
        }
        gate.reenable()?;

        #[cfg(feature = "log")]
        debug!("interrupts reset, {} stale events dropped", drained);

        Ok(drained)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
