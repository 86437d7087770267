//! Host controller front-ends.
//!
//! The Pi families wire the SD slot to different silicon: the Arasan
//! EMMC block or the Broadcom SDHOST block. The driver picks one
//! capability set at startup and never branches on the platform again.
//! The Pi 4's EMMC2 needs a third variant here before that board can
//! boot from this driver.

pub mod emmc;
pub mod sdhost;

use crate::command::SdCmd;
use crate::port::IoMemPort;
use crate::state::CardState;
use crate::SdError;

/// Card status field positions shared by R1 and R6 responses.
pub const CARD_STATE_STBY: u8 = 3;
pub const CARD_STATE_TRAN: u8 = 4;
pub const CARD_STATE_DATA: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardStatus {
    pub current_state: u8,
    pub ready_for_data: bool,
    pub crc_error: bool,
    pub illegal_command: bool,
    pub error: bool,
}

/// The capability set a host controller variant provides. Everything
/// here turns into MMIO programs for the gateway; nothing touches
/// hardware directly.
pub trait HostController {
    /// Power-cycle the controller into a sane state, where the
    /// platform supports it.
    fn restart(&mut self, io: &mut dyn IoMemPort, state: &mut CardState) -> Result<(), SdError>;

    /// Reset the controller core, drop to the identification clock and
    /// unmask interrupts. Clears all card knowledge in `state`.
    fn reset(&mut self, io: &mut dyn IoMemPort, state: &mut CardState) -> Result<(), SdError>;

    /// True when the variant can issue this command at all.
    fn supports(&self, cmd: SdCmd) -> bool;

    /// Issue one resolved command (no ACMD expansion here) and collect
    /// response words, FIFO data and error state into `state`.
    fn issue_command(
        &mut self,
        io: &mut dyn IoMemPort,
        state: &mut CardState,
        cmd: SdCmd,
        argument: u32,
    ) -> Result<(), SdError>;

    fn change_clock(
        &mut self,
        io: &mut dyn IoMemPort,
        state: &mut CardState,
        frequency: u32,
    ) -> Result<(), SdError>;

    fn reset_command_line(
        &mut self,
        io: &mut dyn IoMemPort,
        state: &mut CardState,
    ) -> Result<(), SdError>;

    fn reset_data_line(
        &mut self,
        io: &mut dyn IoMemPort,
        state: &mut CardState,
    ) -> Result<(), SdError>;

    /// Sweep pending controller interrupts, acknowledging everything
    /// seen; polled before each command since no IRQ line is wired up.
    fn service_interrupts(
        &mut self,
        io: &mut dyn IoMemPort,
        state: &mut CardState,
    ) -> Result<(), SdError>;

    /// Mirror the negotiated block size into the register file, where
    /// the variant keeps one there.
    fn apply_block_size(
        &mut self,
        io: &mut dyn IoMemPort,
        state: &mut CardState,
    ) -> Result<(), SdError>;

    /// Switch the controller side to the four-line bus.
    fn enable_wide_bus(
        &mut self,
        io: &mut dyn IoMemPort,
        state: &mut CardState,
    ) -> Result<(), SdError>;

    /// Whether the error state a failed command left behind was a
    /// command timeout (the benign "nobody answered" case).
    fn was_command_timeout(&self, state: &CardState) -> bool;

    fn identification_frequency(&self) -> u32;

    fn operational_frequency(&self) -> u32;

    /// Interpret the status field of the last R1/R6 response.
    fn decode_status(&self, state: &CardState) -> CardStatus {
        let word = state.last_response[0];
        CardStatus {
            current_state: ((word >> 9) & 0xF) as u8,
            ready_for_data: (word >> 8) & 0x1 != 0,
            crc_error: (word >> 15) & 0x1 != 0,
            illegal_command: (word >> 14) & 0x1 != 0,
            error: (word >> 13) & 0x1 != 0,
        }
    }
}
