//! VideoCore mailbox property channel.
//!
//! The property buffer lives in a single device-mapped page owned by
//! the gateway process. A call writes the buffer's bus address to the
//! ARM→VC channel, then polls the VC→ARM channel for the reply, each
//! side guarded by a busy-iteration watchdog so a wedged VC surfaces as
//! an error instead of a hang.

use bramble_hw::regs::mailbox as regs;
use bramble_hw::MmioWindow;
use bramble_proto::{
    Errno, MAILBOX_CHANNEL_PROPERTY_IN, MAILBOX_CHANNEL_PROPERTY_OUT, MAILBOX_ERROR,
};
use bramble_rpc::time::Clock;
use tracing::debug;

/// Busy-poll budget on both the FULL and EMPTY waits.
const WATCHDOG_BUDGET: u32 = 1 << 25;

/// The VideoCore's side of the property exchange.
///
/// On hardware the VC rewrites the property page in memory between the
/// channel write and the channel read; in-process test builds plug a
/// model in here to do the same.
pub trait VcModel {
    fn property(&mut self, buffer: &mut [u32]);
}

pub struct PropertyMailbox {
    /// Bus address of the property page handed to the VC.
    buffer_bus_addr: u32,
    watchdog: u32,
}

impl PropertyMailbox {
    pub fn new(buffer_bus_addr: u32) -> Self {
        Self {
            buffer_bus_addr,
            watchdog: WATCHDOG_BUDGET,
        }
    }

    pub fn set_watchdog(&mut self, budget: u32) {
        self.watchdog = budget;
    }

    /// One full property transaction. The buffer is mutated in place
    /// with the VC's response.
    pub fn call<W: MmioWindow>(
        &mut self,
        window: &mut W,
        clock: &dyn Clock,
        vc: Option<&mut dyn VcModel>,
        buffer: &mut [u32],
    ) -> Result<(), Errno> {
        self.write(window, clock, MAILBOX_CHANNEL_PROPERTY_OUT)?;
        let value = self.read(window, clock, MAILBOX_CHANNEL_PROPERTY_IN)?;
        if value == MAILBOX_ERROR {
            return Err(Errno::EIO);
        }
        if let Some(vc) = vc {
            vc.property(buffer);
        }
        Ok(())
    }

    fn write<W: MmioWindow>(
        &self,
        window: &mut W,
        clock: &dyn Clock,
        channel: u32,
    ) -> Result<(), Errno> {
        let mut budget = self.watchdog;
        while window.read32(regs::STATUS) & regs::STATUS_FULL != 0 {
            if budget == 0 {
                debug!("mailbox write watchdog expired");
                return Err(Errno::EIO);
            }
            budget -= 1;
            clock.delay_cycles(1);
        }
        let data = (self.buffer_bus_addr & !0xF) | (channel & 0xF);
        window.write32(regs::WRITE, data);
        Ok(())
    }

    fn read<W: MmioWindow>(
        &self,
        window: &mut W,
        clock: &dyn Clock,
        channel: u32,
    ) -> Result<u32, Errno> {
        let mut value;
        loop {
            let mut budget = self.watchdog;
            while window.read32(regs::STATUS) & regs::STATUS_EMPTY != 0 {
                if budget == 0 {
                    debug!("mailbox read watchdog expired");
                    return Ok(MAILBOX_ERROR);
                }
                budget -= 1;
                clock.delay_cycles(1);
            }
            value = window.read32(regs::READ);
            if value & 0xF == channel {
                break;
            }
        }
        Ok(value >> 4)
    }
}

/// Test VideoCore answering the property tags the SD stack uses.
#[derive(Debug, Default)]
pub struct MockVideoCore {
    /// Clock rates by clock id.
    pub clock_rates: Vec<(u32, u32)>,
    /// Power domains currently on, by device id.
    pub powered: Vec<u32>,
}

impl MockVideoCore {
    pub fn with_core_clock(rate: u32) -> Self {
        Self {
            clock_rates: vec![(bramble_proto::CLOCK_CORE, rate)],
            powered: Vec::new(),
        }
    }
}

impl VcModel for MockVideoCore {
    fn property(&mut self, buffer: &mut [u32]) {
        use bramble_proto::{
            MAILBOX_RESPONSE_OK, POWER_STATE_ON, TAG_GET_CLOCK_RATE, TAG_SET_POWER_STATE,
        };
        if buffer.len() < 6 {
            return;
        }
        let tag = buffer[2];
        match tag {
            TAG_GET_CLOCK_RATE => {
                let id = buffer[5];
                let rate = self
                    .clock_rates
                    .iter()
                    .find(|(clock, _)| *clock == id)
                    .map(|(_, rate)| *rate)
                    .unwrap_or(0);
                if buffer.len() > 6 {
                    buffer[6] = rate;
                }
            }
            TAG_SET_POWER_STATE => {
                let device = buffer[5];
                if buffer.len() > 6 {
                    let on = buffer[6] & POWER_STATE_ON != 0;
                    if on && !self.powered.contains(&device) {
                        self.powered.push(device);
                    } else if !on {
                        self.powered.retain(|d| *d != device);
                    }
                    buffer[6] &= POWER_STATE_ON;
                }
            }
            _ => {}
        }
        buffer[1] = MAILBOX_RESPONSE_OK;
    }
}
