//! DMA channel 0 handling.
//!
//! One control block per gateway process; the single-threaded server
//! loop is what serializes its use. While a transfer is in flight the
//! block belongs to the engine and nothing else may touch it until the
//! channel signals END.

use bitflags::bitflags;
use bramble_hw::regs::{dma, BUS_COHERENT_ALIAS, BUS_PERIPHERAL_ALIAS};
use bramble_hw::MmioWindow;
use bramble_proto::{MmioAbort, MmioAction, MmioStep};
use bramble_rpc::shm::SharedMemory;
use bramble_rpc::time::Clock;
use tracing::{debug, trace};

pub const PAGE_SIZE: u32 = 4096;

/// Poll budget while waiting on channel END.
const DMA_WAIT_BUDGET: u32 = 1 << 24;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Cs: u32 {
        const ACTIVE = 1 << 0;
        const END = 1 << 1;
        const INT = 1 << 2;
        const DREQ = 1 << 3;
        const PAUSED = 1 << 4;
        const ERROR = 1 << 8;
        const WAIT_FOR_OUTSTANDING_WRITES = 1 << 28;
        const DISDEBUG = 1 << 29;
        const ABORT = 1 << 30;
        const RESET = 1 << 31;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Ti: u32 {
        const INTEN = 1 << 0;
        const TDMODE = 1 << 1;
        const WAIT_RESP = 1 << 3;
        const DEST_INC = 1 << 4;
        const DEST_WIDTH = 1 << 5;
        const DEST_DREQ = 1 << 6;
        const DEST_IGNORE = 1 << 7;
        const SRC_INC = 1 << 8;
        const SRC_WIDTH = 1 << 9;
        const SRC_DREQ = 1 << 10;
        const SRC_IGNORE = 1 << 11;
    }
}

pub const PERMAP_EMMC: u32 = 11;
pub const PERMAP_SDHOST: u32 = 13;

pub fn ti_permap(peripheral: u32) -> u32 {
    (peripheral & 0x1F) << 16
}

/// The 32-byte descriptor the engine feeds the channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct ControlBlock {
    pub transfer_information: u32,
    pub source_address: u32,
    pub destination_address: u32,
    pub transfer_length: u32,
    pub stride: u32,
    pub next_control_block: u32,
    pub reserved: [u32; 2],
}

pub struct DmaEngine {
    block: ControlBlock,
    /// Bus address the channel reads the block from.
    block_bus_addr: u32,
    /// Physical base of the peripheral window, for bus aliasing.
    window_phys_base: u32,
    wait_budget: u32,
    in_flight: bool,
}

impl DmaEngine {
    pub fn new(block_bus_addr: u32, window_phys_base: u32) -> Self {
        Self {
            block: ControlBlock::default(),
            block_bus_addr,
            window_phys_base,
            wait_budget: DMA_WAIT_BUDGET,
            in_flight: false,
        }
    }

    /// Shrink the END-wait budget; tests exercising the timeout path
    /// use this to keep runs fast.
    pub fn set_wait_budget(&mut self, budget: u32) {
        self.wait_budget = budget;
    }

    /// Last programmed descriptor, for inspection after a transfer.
    pub fn block(&self) -> &ControlBlock {
        &self.block
    }

    /// Run the transfer a DMA step describes: page-sized chunks between
    /// the peripheral offset and the attached shared region named by
    /// `step.value`.
    pub fn transfer<W: MmioWindow>(
        &mut self,
        window: &mut W,
        clock: &dyn Clock,
        shm: &dyn SharedMemory,
        step: &MmioStep,
    ) -> Result<(), MmioAbort> {
        let shm_id = step.value;
        let region = match shm.attach(shm_id) {
            Ok(region) => region,
            Err(_) => {
                debug!(shm_id, "dma step without attachable region");
                return Err(MmioAbort::Invalid);
            }
        };
        if (region.len() as u32) < step.dma_copy_size {
            return Err(MmioAbort::Invalid);
        }

        let peripheral_bus =
            ((self.window_phys_base + step.offset) & 0x00FF_FFFF) | BUS_PERIPHERAL_ALIAS;
        let mut moved = 0u32;
        while moved < step.dma_copy_size {
            let chunk = (step.dma_copy_size - moved).min(PAGE_SIZE);
            // the region's pages are kernel-translated one at a time;
            // the coherent alias keeps the VC off the L2 cache
            let memory_bus = moved | BUS_COHERENT_ALIAS;
            let (ti, source, destination) = match step.action {
                MmioAction::DmaRead => (
                    Ti::WAIT_RESP | Ti::DEST_INC | Ti::DEST_WIDTH | Ti::SRC_DREQ | Ti::INTEN,
                    peripheral_bus,
                    memory_bus,
                ),
                _ => (
                    Ti::WAIT_RESP | Ti::SRC_INC | Ti::SRC_WIDTH | Ti::DEST_DREQ | Ti::INTEN,
                    memory_bus,
                    peripheral_bus,
                ),
            };
            self.block = ControlBlock {
                transfer_information: ti.bits() | ti_permap(PERMAP_EMMC),
                source_address: source,
                destination_address: destination,
                transfer_length: chunk,
                stride: 0,
                next_control_block: 0,
                reserved: [0; 2],
            };
            self.start(window);
            let waited = self.wait(window, clock);
            self.finish(window);
            waited?;
            moved += chunk;
        }
        let _ = shm.detach(shm_id);
        let _ = region;
        Ok(())
    }

    fn start<W: MmioWindow>(&mut self, window: &mut W) {
        trace!(block = ?self.block, "dma start");
        window.write32(dma::CH0_CONBLK_AD, self.block_bus_addr | BUS_COHERENT_ALIAS);
        window.write32(dma::CH0_CS, Cs::ACTIVE.bits());
        self.in_flight = true;
    }

    fn wait<W: MmioWindow>(&mut self, window: &mut W, clock: &dyn Clock) -> Result<(), MmioAbort> {
        let mut budget = self.wait_budget;
        loop {
            let cs = Cs::from_bits_truncate(window.read32(dma::CH0_CS));
            if cs.contains(Cs::ERROR) {
                debug!("dma channel flagged error");
                return Err(MmioAbort::Timeout);
            }
            if cs.contains(Cs::END) {
                return Ok(());
            }
            if budget == 0 {
                debug!("dma wait budget exhausted");
                return Err(MmioAbort::Timeout);
            }
            budget -= 1;
            clock.delay_cycles(1);
        }
    }

    fn finish<W: MmioWindow>(&mut self, window: &mut W) {
        // END is write-to-clear
        window.write32(dma::CH0_CS, Cs::END.bits());
        self.in_flight = false;
    }
}
