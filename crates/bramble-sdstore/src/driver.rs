//! Card lifecycle orchestration: bring-up, recovery and block
//! transfer, composed from whichever host controller capability set
//! the platform selected.

use crate::command::*;
use crate::controller::{
    HostController, CARD_STATE_DATA, CARD_STATE_STBY, CARD_STATE_TRAN,
};
use crate::port::IoMemPort;
use crate::state::{CardState, CardVersion};
use crate::{SdError, BLOCK_SIZE};
use bramble_proto::{pins, GpioDetect, GpioFunction, GpioPull};
use bramble_rpc::time::Clock;
use std::rc::Rc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
}

/// Bound on the ACMD41 power-up loop; half a second of virtual sleep
/// per round.
const OP_COND_ATTEMPTS: u32 = 100;
/// Bound on the CMD3 loop waiting for a non-zero RCA.
const RCA_ATTEMPTS: u32 = 100;

pub struct SdDriver<C: HostController, P: IoMemPort> {
    controller: C,
    io: P,
    state: CardState,
    clock: Rc<dyn Clock>,
}

impl<C: HostController, P: IoMemPort> SdDriver<C, P> {
    pub fn new(controller: C, io: P, clock: Rc<dyn Clock>) -> Self {
        Self {
            controller,
            io,
            state: CardState::new(),
            clock,
        }
    }

    pub fn state(&self) -> &CardState {
        &self.state
    }

    pub fn io(&mut self) -> &mut P {
        &mut self.io
    }

    pub fn block_size(&self) -> u32 {
        BLOCK_SIZE
    }

    pub fn card_present(&self) -> bool {
        !self.state.absent
    }

    /// One logical command: pending-interrupt sweep, then the CMD55
    /// pair for app commands, then the command itself. A failed CMD55
    /// suppresses the ACMD entirely.
    fn sd_command(&mut self, cmd: SdCmd, argument: u32) -> Result<(), SdError> {
        self.controller
            .service_interrupts(&mut self.io, &mut self.state)?;
        if !self.controller.supports(cmd) {
            return Err(SdError::InvalidCommand);
        }
        if cmd.app {
            let rca_argument = (self.state.rca as u32) << 16;
            self.controller
                .issue_command(&mut self.io, &mut self.state, CMD_APP_CMD, rca_argument)?;
        }
        self.controller
            .issue_command(&mut self.io, &mut self.state, cmd, argument)
    }

    /// Slot wiring: card-detect plus the six bus pins.
    fn init_gpio(&mut self) -> Result<(), SdError> {
        self.io.gpio_set_function(pins::CARD_DETECT, GpioFunction::Input)?;
        self.io.gpio_set_pull(pins::CARD_DETECT, GpioPull::Up)?;
        self.io
            .gpio_set_detect(pins::CARD_DETECT, GpioDetect::High, true)?;
        for pin in [
            pins::DAT3,
            pins::DAT2,
            pins::DAT1,
            pins::DAT0,
            pins::CMD,
            pins::CLK,
        ] {
            self.io.gpio_set_function(pin, GpioFunction::Alt3)?;
            self.io.gpio_set_pull(pin, GpioPull::Up)?;
        }
        Ok(())
    }

    /// Pull-up keeps the detect pin high with an empty slot; an edge
    /// event means the card left at some point.
    fn update_card_detect(&mut self) -> Result<(), SdError> {
        let level = self.io.gpio_status(pins::CARD_DETECT)?;
        let event = self.io.gpio_event(pins::CARD_DETECT)?;
        self.state.absent = level != 0;
        self.state.ejected = event != 0;
        Ok(())
    }

    /// CMD8 / CMD5 / ACMD41 voltage negotiation.
    fn init_card(&mut self) -> Result<(), SdError> {
        // probe for a v2 card; old cards time out on CMD8
        let v2_later = match self.sd_command(CMD_SEND_IF_COND, IF_COND_CHECK_PATTERN) {
            Ok(()) => {
                if self.state.last_response[0] & 0xFFF != IF_COND_CHECK_PATTERN {
                    warn!("CMD8 echo mismatch, unusable card");
                    return Err(SdError::CardError);
                }
                true
            }
            Err(SdError::Timeout) if self.state.last_error == 0 => false,
            Err(SdError::Timeout) if self.controller.was_command_timeout(&self.state) => {
                self.controller
                    .reset_command_line(&mut self.io, &mut self.state)?;
                false
            }
            Err(err) => return Err(err),
        };

        // CMD5 answers only on SDIO cards, which are unsupported
        match self.sd_command(CMD_IO_SEND_OP_COND, 0) {
            Err(SdError::Timeout) if self.state.last_error != 0 => {
                if self.controller.was_command_timeout(&self.state) {
                    self.controller
                        .reset_command_line(&mut self.io, &mut self.state)?;
                } else {
                    return Err(SdError::NotImplemented);
                }
            }
            Err(SdError::Timeout) => {}
            Err(err) => return Err(err),
            Ok(()) => {
                debug!("SDIO card detected");
                return Err(SdError::NotImplemented);
            }
        }

        // inquiry ACMD41 first, then the initialization loop
        self.sd_command(ACMD_SD_SEND_OP_COND, 0)?;
        let mut flags = OP_COND_VOLTAGE_WINDOW;
        if v2_later {
            flags |= OP_COND_HCS;
        }
        for _ in 0..OP_COND_ATTEMPTS {
            match self.sd_command(ACMD_SD_SEND_OP_COND, flags) {
                Ok(()) => {}
                Err(err) if self.state.last_error != 0 => return Err(err),
                Err(_) => {}
            }
            if self.state.last_response[0] >> 31 != 0 {
                self.state.ocr = (self.state.last_response[0] >> 8) & 0xFFFF;
                self.state.supports_sdhc = (self.state.last_response[0] >> 30) & 0x1 != 0;
                return Ok(());
            }
            self.clock.sleep_ms(500);
        }
        warn!("card stayed busy through every ACMD41 attempt");
        Err(SdError::Timeout)
    }

    fn decode_card_version(&mut self) {
        let scr0 = u32::from_be(self.state.scr[0]);
        let sd_spec = (scr0 >> (56 - 32)) & 0xF;
        let sd_spec3 = (scr0 >> (47 - 32)) & 0x1;
        let sd_spec4 = (scr0 >> (42 - 32)) & 0x1;
        let sd_spec_x = (scr0 >> (41 - 32)) & 0xF;
        self.state.bus_width = (scr0 >> (48 - 32)) & 0xF;
        self.state.version = match (sd_spec, sd_spec3, sd_spec4, sd_spec_x) {
            (0, _, _, _) => CardVersion::V1,
            (1, _, _, _) => CardVersion::V1_1,
            (2, 0, _, _) => CardVersion::V2,
            (2, 1, 0, 0) => CardVersion::V3,
            (2, 1, 1, 0) => CardVersion::V4,
            (2, 1, _, 1) => CardVersion::V5,
            (2, 1, _, 2) => CardVersion::V6,
            (2, 1, _, 3) => CardVersion::V7,
            (2, 1, _, 4) => CardVersion::V8,
            _ => CardVersion::Unknown,
        };
    }

    /// Full bring-up, also used for re-init after eject or recovery.
    pub fn init(&mut self) -> Result<(), SdError> {
        if !self.state.initialized {
            self.controller.restart(&mut self.io, &mut self.state)?;
            self.init_gpio()?;
        }

        self.update_card_detect()?;
        if self.state.absent {
            self.state.initialized = false;
            debug!("no card present");
            return Err(SdError::CardAbsent);
        }
        if self.state.ejected && self.state.initialized {
            self.state.initialized = false;
            // keep the identity for change detection at re-insert
            self.state.cid_backup = self.state.cid;
        } else if !self.state.initialized {
            self.state.cid_backup = [0; 4];
        }
        if self.state.initialized {
            return Ok(());
        }

        self.controller.reset(&mut self.io, &mut self.state)?;
        self.sd_command(CMD_GO_IDLE_STATE, 0)?;
        self.init_card()?;
        let operational = self.controller.operational_frequency();
        self.controller
            .change_clock(&mut self.io, &mut self.state, operational)?;

        self.sd_command(CMD_ALL_SEND_CID, 0)?;
        self.state.cid = self.state.last_response;

        let mut rca = 0u16;
        for _ in 0..RCA_ATTEMPTS {
            self.sd_command(CMD_SEND_RELATIVE_ADDR, 0)?;
            rca = ((self.state.last_response[0] >> 16) & 0xFFFF) as u16;
            if rca > 0 {
                break;
            }
            self.clock.sleep_ms(2);
        }
        if rca == 0 {
            return Err(SdError::Timeout);
        }
        self.state.rca = rca;

        let status = self.controller.decode_status(&self.state);
        if status.crc_error || status.illegal_command || status.error {
            warn!("card flagged an error while publishing its address");
            return Err(SdError::CommandError);
        }
        if !status.ready_for_data {
            return Err(SdError::CommandError);
        }

        self.sd_command(CMD_SELECT_CARD, (rca as u32) << 16)?;
        let status = self.controller.decode_status(&self.state);
        if status.current_state != CARD_STATE_STBY && status.current_state != CARD_STATE_TRAN {
            warn!(state = status.current_state, "unexpected state after select");
            return Err(SdError::Unknown);
        }

        if !self.state.supports_sdhc {
            self.sd_command(CMD_SET_BLOCKLEN, BLOCK_SIZE)?;
        }
        self.state.block_size = BLOCK_SIZE;
        self.controller
            .apply_block_size(&mut self.io, &mut self.state)?;

        // SCR arrives as one 8-byte data block
        self.state.block_size = 8;
        self.state.block_count = 1;
        self.sd_command(ACMD_SEND_SCR, 0)?;
        if self.state.buffer.len() >= 2 {
            self.state.scr = [self.state.buffer[0], self.state.buffer[1]];
        }
        self.state.block_size = BLOCK_SIZE;
        self.decode_card_version();

        if self.state.bus_width & 0x4 != 0 {
            // four data lines both on the card and in the controller
            if self.sd_command(ACMD_SET_BUS_WIDTH, 0x2).is_ok() {
                self.controller
                    .enable_wide_bus(&mut self.io, &mut self.state)?;
            }
        }

        info!(
            rca = self.state.rca,
            sdhc = self.state.supports_sdhc,
            version = ?self.state.version,
            "card initialized"
        );
        self.state.initialized = true;
        Ok(())
    }

    /// Bring the card back to TRAN, whatever state the last command
    /// left it in.
    fn ensure_transfer_state(&mut self) -> Result<(), SdError> {
        if !self.state.initialized || self.state.rca == 0 {
            self.init()?;
        }

        let rca_arg = (self.state.rca as u32) << 16;
        if self.sd_command(CMD_SEND_STATUS, rca_arg).is_err() {
            self.state.rca = 0;
            return Err(SdError::Timeout);
        }
        let mut status = self.controller.decode_status(&self.state).current_state;

        match status {
            CARD_STATE_STBY => {
                if self.sd_command(CMD_SELECT_CARD, rca_arg).is_err() {
                    self.state.rca = 0;
                    return Err(SdError::Timeout);
                }
            }
            CARD_STATE_DATA => {
                if self.sd_command(CMD_STOP_TRANSMISSION, 0).is_err() {
                    self.state.rca = 0;
                    return Err(SdError::Timeout);
                }
                self.controller
                    .reset_command_line(&mut self.io, &mut self.state)?;
            }
            CARD_STATE_TRAN => {}
            _ => {
                // lost the card state machine; start over
                if self.init().is_err() {
                    self.state.rca = 0;
                    return Err(SdError::Unknown);
                }
            }
        }

        if status != CARD_STATE_TRAN {
            if self.sd_command(CMD_SEND_STATUS, rca_arg).is_err() {
                self.state.rca = 0;
                return Err(SdError::Timeout);
            }
            status = self.controller.decode_status(&self.state).current_state;
            if status != CARD_STATE_TRAN {
                self.state.rca = 0;
                return Err(SdError::Unknown);
            }
        }
        Ok(())
    }

    /// Block transfer with the bounded retry the card is allowed.
    pub fn transfer_block(
        &mut self,
        block_number: u32,
        buffer: &mut Vec<u8>,
        length: usize,
        operation: Operation,
    ) -> Result<(), SdError> {
        self.update_card_detect()?;
        if self.state.absent {
            return Err(SdError::CardAbsent);
        }
        if self.state.ejected {
            return Err(SdError::CardEjected);
        }

        self.ensure_transfer_state()?;

        let block_size = self.state.block_size.max(BLOCK_SIZE) as usize;
        if length < block_size || length % block_size != 0 {
            return Err(SdError::Unknown);
        }
        if operation == Operation::Write && buffer.len() < length {
            return Err(SdError::Unknown);
        }

        // SDSC cards address bytes, not blocks
        let address = if self.state.supports_sdhc {
            block_number
        } else {
            block_number * BLOCK_SIZE
        };
        self.state.block_count = (length / block_size) as u32;

        let command = match (operation, self.state.block_count > 1) {
            (Operation::Write, true) => CMD_WRITE_MULTIPLE_BLOCK,
            (Operation::Write, false) => CMD_WRITE_SINGLE_BLOCK,
            (Operation::Read, true) => CMD_READ_MULTIPLE_BLOCK,
            (Operation::Read, false) => CMD_READ_SINGLE_BLOCK,
        };

        if operation == Operation::Write {
            self.state.buffer = buffer[..length]
                .chunks_exact(4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
        } else {
            self.state.buffer.clear();
        }

        let mut last = Ok(());
        for attempt in 1..=3 {
            last = self.sd_command(command, address);
            if last.is_ok() {
                break;
            }
            debug!(%command, attempt, "transfer attempt failed");
        }
        last?;

        if operation == Operation::Read {
            buffer.clear();
            buffer.reserve(length);
            for word in &self.state.buffer {
                buffer.extend_from_slice(&word.to_le_bytes());
            }
            buffer.truncate(length);
        }
        Ok(())
    }
}
