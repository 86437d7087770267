//! Broadcom SDHOST front-end (the slot routing on the Pi 3).
//!
//! Same capability set as the EMMC block with a very different
//! register dialect: command enable/fail flags live in the CMD
//! register itself, errors and the data FIFO handshake in HSTS, and
//! the clock divisor is derived from the VideoCore core clock.

use super::HostController;
use crate::bits::sdhost::*;
use crate::command::{SdCmd, CMD_SEND_STATUS};
use crate::port::IoMemPort;
use crate::state::CardState;
use crate::SdError;
use bramble_hw::regs::sdhost as regs;
use bramble_proto::{
    property_request, property_value, MmioAbort, MmioAction, MmioProgram, MmioSleep, MmioStep,
    CLOCK_CORE, TAG_GET_CLOCK_RATE,
};
use bramble_proto::{GpioFunction, GpioPull};
use tracing::{debug, trace};

const COMMAND_TIMEOUT: u32 = 50_000;

/// Raw divisor plus the effective card clock it yields, derived from
/// the VideoCore core clock. The divisor register holds the division
/// minus two.
pub fn clock_divisor(max_clock: u32, frequency: u32) -> (u32, u32) {
    let mut divisor = (max_clock / frequency).max(2);
    if max_clock / divisor > frequency {
        divisor += 1;
    }
    divisor -= 2;
    if divisor > CLOCK_DIVISOR_MAX {
        divisor = CLOCK_DIVISOR_MAX;
    }
    let effective = max_clock / (divisor + 2);
    (divisor, effective)
}

pub struct SdhostController;

impl SdhostController {
    pub fn new() -> Self {
        Self
    }

    /// CMD register word, or None for indices the block cannot issue.
    fn command_word(&self, cmd: SdCmd) -> Option<u32> {
        let flags = if cmd.app {
            match cmd.index {
                6 | 13 | 22 | 23 | 41 | 42 | 55 => Cmd::empty(),
                51 => Cmd::READ,
                _ => return None,
            }
        } else {
            match cmd.index {
                0 | 4 | 15 => Cmd::NO_RESPONSE,
                2 | 9 | 10 => Cmd::LONG_RESPONSE,
                3 | 5 | 8 | 11 | 13 | 16 | 22 | 23 | 32 | 33 | 40 | 42 | 55 | 56 => Cmd::empty(),
                6 | 17 | 18 | 19 | 30 => Cmd::READ,
                24 | 25 | 27 => Cmd::WRITE,
                7 | 12 | 20 | 28 | 29 | 38 => Cmd::BUSY,
                _ => return None,
            }
        };
        Some(cmd.index as u32 | flags.bits())
    }

    /// Core clock over the mailbox; the divisor is derived from it.
    fn fetch_max_clock(
        &self,
        io: &mut dyn IoMemPort,
        state: &mut CardState,
    ) -> Result<(), SdError> {
        let mut request = property_request(TAG_GET_CLOCK_RATE, 8, &[CLOCK_CORE]);
        io.mailbox(&mut request)?;
        match property_value(&request) {
            Some(&[id, rate]) if id == CLOCK_CORE && rate > 0 => {
                state.max_clock = rate;
                Ok(())
            }
            _ => Err(SdError::Mailbox),
        }
    }

    fn read_host_status(&self, io: &mut dyn IoMemPort) -> Result<u32, SdError> {
        let mut program = MmioProgram::new(vec![MmioStep::read(regs::HOST_STATUS)]);
        io.mmio_perform(&mut program)?;
        Ok(program.steps[0].value)
    }

    fn clear_host_status(&self, io: &mut dyn IoMemPort, mask: u32) -> Result<(), SdError> {
        let mut program = MmioProgram::new(vec![MmioStep::write(regs::HOST_STATUS, mask)]);
        io.mmio_perform(&mut program)
    }

    /// One block over the PIO FIFO: a data-flag poll in front of every
    /// word move.
    fn transfer_fifo_block(
        &self,
        io: &mut dyn IoMemPort,
        state: &mut CardState,
        block: usize,
        write: bool,
    ) -> Result<(), SdError> {
        let block_words = (state.block_size / 4) as usize;
        let mut steps = Vec::with_capacity(block_words * 2);
        for widx in 0..block_words {
            steps.push(
                MmioStep::new(MmioAction::LoopFalse, regs::HOST_STATUS)
                    .with_loop(HostStatus::DATA_FLAG.bits(), COMMAND_TIMEOUT / 10)
                    .with_sleep(MmioSleep::Milliseconds, 1)
                    .with_failure(HOST_STATUS_ERROR_MASK),
            );
            if write {
                steps.push(MmioStep::write(
                    regs::DATA_PORT,
                    state.buffer[block * block_words + widx],
                ));
            } else {
                steps.push(MmioStep::read(regs::DATA_PORT));
            }
        }
        let mut program = MmioProgram::new(steps);
        io.mmio_perform(&mut program)?;
        for pair in program.steps.chunks(2) {
            if pair[0].abort == MmioAbort::Timeout {
                state.last_interrupt = pair[0].value;
                state.last_error = pair[0].value & HOST_STATUS_ERROR_MASK;
                self.clear_host_status(io, HOST_STATUS_ERROR_MASK)?;
                return Err(SdError::Timeout);
            }
        }
        if !write {
            state
                .buffer
                .extend(program.steps.chunks(2).map(|pair| pair[1].value));
        }
        Ok(())
    }
}

impl Default for SdhostController {
    fn default() -> Self {
        Self::new()
    }
}

impl HostController for SdhostController {
    fn restart(&mut self, _io: &mut dyn IoMemPort, _state: &mut CardState) -> Result<(), SdError> {
        // no power domain of its own to cycle
        Ok(())
    }

    fn reset(&mut self, io: &mut dyn IoMemPort, state: &mut CardState) -> Result<(), SdError> {
        self.fetch_max_clock(io, state)?;

        // the slot pins belong to SDHOST only after ALT0 routing
        for pin in bramble_proto::pins::CLK..=bramble_proto::pins::DAT3 {
            io.gpio_set_function(pin, GpioFunction::Alt0)
                .map_err(|_| SdError::Io)?;
            io.gpio_set_pull(pin, GpioPull::Up).map_err(|_| SdError::Io)?;
        }

        let mut program = MmioProgram::new(vec![
            MmioStep::write(regs::POWER, 0),
            MmioStep::write(regs::CMD, 0),
            MmioStep::write(regs::ARG, 0),
            MmioStep::write(regs::TIMEOUT_COUNTER, 0x00F0_0000),
            MmioStep::write(regs::CLOCK_DIVISOR, 0),
            MmioStep::write(regs::HOST_STATUS, 0x7F8),
            MmioStep::write(regs::HOST_CONFIG, 0),
            MmioStep::write(regs::BLOCK_SIZE, 0),
            MmioStep::write(regs::BLOCK_COUNT, 0),
            MmioStep::new(MmioAction::Sleep, 0).with_sleep(MmioSleep::Milliseconds, 20),
            MmioStep::write(regs::POWER, POWER_ON),
            MmioStep::new(MmioAction::Sleep, 0).with_sleep(MmioSleep::Milliseconds, 20),
            MmioStep::write(
                regs::HOST_CONFIG,
                (HostConfig::SLOW_CARD | HostConfig::BUSY_IRPT_EN).bits(),
            ),
            MmioStep::write(regs::CLOCK_DIVISOR, CLOCK_DIVISOR_MAX),
        ]);
        io.mmio_perform(&mut program)?;

        self.change_clock(io, state, self.identification_frequency())?;
        state.invalidate_card();
        Ok(())
    }

    fn supports(&self, cmd: SdCmd) -> bool {
        self.command_word(cmd).is_some()
    }

    fn issue_command(
        &mut self,
        io: &mut dyn IoMemPort,
        state: &mut CardState,
        cmd: SdCmd,
        argument: u32,
    ) -> Result<(), SdError> {
        let word = self.command_word(cmd).ok_or(SdError::InvalidCommand)?;
        let is_data = word & (Cmd::READ | Cmd::WRITE).bits() != 0;
        let write_data = word & Cmd::WRITE.bits() != 0;
        let response_busy = word & Cmd::BUSY.bits() != 0;
        if state.block_count > 0xFFFF {
            return Err(SdError::InvalidCommand);
        }

        trace!(%cmd, argument, "issue");

        let mut steps = vec![
            // previous command must have left the enable flag
            MmioStep::new(MmioAction::LoopTrue, regs::CMD)
                .with_loop(Cmd::NEW.bits(), COMMAND_TIMEOUT)
                .with_sleep(MmioSleep::Milliseconds, 10)
                .with_failure(Cmd::FAIL.bits()),
            // reading HSTS and writing it back clears stale errors
            MmioStep::read(regs::HOST_STATUS),
            MmioStep::new(MmioAction::WritePreviousRead, regs::HOST_STATUS),
            MmioStep::write(regs::BLOCK_SIZE, state.block_size),
            MmioStep::write(regs::BLOCK_COUNT, state.block_count),
            MmioStep::write(regs::ARG, argument),
            MmioStep::write(regs::CMD, word | Cmd::NEW.bits()),
            MmioStep::new(MmioAction::LoopTrue, regs::CMD)
                .with_loop(Cmd::NEW.bits(), COMMAND_TIMEOUT)
                .with_sleep(MmioSleep::Milliseconds, 10)
                .with_failure(Cmd::FAIL.bits()),
        ];
        let resp_idx = steps.len();
        for offset in [
            regs::RESPONSE0,
            regs::RESPONSE1,
            regs::RESPONSE2,
            regs::RESPONSE3,
        ] {
            steps.push(MmioStep::read(offset));
        }
        let mut busy_idx = None;
        if response_busy {
            busy_idx = Some(steps.len());
            steps.push(
                MmioStep::new(MmioAction::LoopFalse, regs::HOST_STATUS)
                    .with_loop(
                        (HostStatus::BUSY_IRPT | HostStatus::SDIO_IRPT).bits(),
                        COMMAND_TIMEOUT,
                    )
                    .with_sleep(MmioSleep::Milliseconds, 10),
            );
            steps.push(MmioStep::write(
                regs::HOST_STATUS,
                HOST_STATUS_ERROR_MASK
                    | (HostStatus::BUSY_IRPT | HostStatus::SDIO_IRPT).bits(),
            ));
        }

        let mut program = MmioProgram::new(steps);
        io.mmio_perform(&mut program)?;

        state.last_command = Some(cmd);
        state.last_argument = argument;

        for timeout_idx in [Some(0), Some(7), busy_idx].into_iter().flatten() {
            if program.steps[timeout_idx].abort == MmioAbort::Timeout {
                debug!(%cmd, "command flagged fail or never finished");
                state.last_interrupt = self.read_host_status(io)?;
                state.last_error = state.last_interrupt;
                self.clear_host_status(io, HOST_STATUS_ERROR_MASK)?;
                return Err(SdError::Timeout);
            }
        }

        if word & Cmd::NO_RESPONSE.bits() == 0 {
            if word & Cmd::LONG_RESPONSE.bits() != 0 {
                state.last_response = [
                    program.steps[resp_idx].value,
                    program.steps[resp_idx + 1].value,
                    program.steps[resp_idx + 2].value,
                    program.steps[resp_idx + 3].value,
                ];
            } else {
                state.last_response = [program.steps[resp_idx].value, 0, 0, 0];
            }
        }

        if is_data {
            if !write_data {
                state.buffer.clear();
            }
            for block in 0..state.block_count as usize {
                self.transfer_fifo_block(io, state, block, write_data)?;
            }
            // settle and acknowledge whatever the transfer raised
            let status = self.read_host_status(io)?;
            if status & HOST_STATUS_ERROR_MASK != 0 {
                state.last_error = status & HOST_STATUS_ERROR_MASK;
                self.clear_host_status(io, HOST_STATUS_ERROR_MASK)?;
                return Err(SdError::Timeout);
            }
        }
        Ok(())
    }

    fn change_clock(
        &mut self,
        io: &mut dyn IoMemPort,
        state: &mut CardState,
        frequency: u32,
    ) -> Result<(), SdError> {
        // below the usable range just park at the maximum divisor
        if frequency < 100_000 {
            let mut program = MmioProgram::new(vec![MmioStep::write(
                regs::CLOCK_DIVISOR,
                CLOCK_DIVISOR_MAX,
            )]);
            return io.mmio_perform(&mut program);
        }
        let (divisor, effective) = clock_divisor(state.max_clock, frequency);
        trace!(frequency, divisor, effective, "clock change");
        let mut program = MmioProgram::new(vec![
            MmioStep::write(regs::CLOCK_DIVISOR, divisor),
            MmioStep::write(regs::TIMEOUT_COUNTER, effective / 2),
        ]);
        io.mmio_perform(&mut program)
    }

    fn reset_command_line(
        &mut self,
        io: &mut dyn IoMemPort,
        _state: &mut CardState,
    ) -> Result<(), SdError> {
        // no dedicated line reset: clear the fail flag and error state
        let mut program = MmioProgram::new(vec![MmioStep::write(regs::CMD, 0)]);
        io.mmio_perform(&mut program)?;
        self.clear_host_status(io, HOST_STATUS_ERROR_MASK)
    }

    fn reset_data_line(
        &mut self,
        io: &mut dyn IoMemPort,
        state: &mut CardState,
    ) -> Result<(), SdError> {
        self.reset_command_line(io, state)
    }

    fn service_interrupts(
        &mut self,
        io: &mut dyn IoMemPort,
        state: &mut CardState,
    ) -> Result<(), SdError> {
        let pending = self.read_host_status(io)?;
        if pending == 0 {
            return Ok(());
        }
        if pending & HostStatus::SDIO_IRPT.bits() != 0 && state.rca > 0 {
            let rca_arg = (state.rca as u32) << 16;
            let _ = self.issue_command(io, state, CMD_SEND_STATUS, rca_arg);
        }
        self.clear_host_status(io, pending)
    }

    fn apply_block_size(
        &mut self,
        _io: &mut dyn IoMemPort,
        _state: &mut CardState,
    ) -> Result<(), SdError> {
        // block size is programmed per command on this block
        Ok(())
    }

    fn enable_wide_bus(
        &mut self,
        io: &mut dyn IoMemPort,
        _state: &mut CardState,
    ) -> Result<(), SdError> {
        let mut program = MmioProgram::new(vec![
            MmioStep::read(regs::HOST_CONFIG),
            MmioStep::new(MmioAction::WriteOrPreviousRead, regs::HOST_CONFIG)
                .with_value(HostConfig::WIDE_EXT_BUS.bits()),
        ]);
        io.mmio_perform(&mut program)
    }

    fn was_command_timeout(&self, state: &CardState) -> bool {
        state.last_error & HostStatus::CMD_TIME_OUT.bits() != 0
    }

    fn identification_frequency(&self) -> u32 {
        CLOCK_FREQUENCY_LOW
    }

    fn operational_frequency(&self) -> u32 {
        CLOCK_FREQUENCY_NORMAL
    }
}

#[cfg(test)]
mod tests {
    use super::clock_divisor;

    #[test]
    fn divisor_is_biased_by_two() {
        // 250 MHz core, 25 MHz target: division 10, register 8
        assert_eq!(clock_divisor(250_000_000, 25_000_000), (8, 25_000_000));
    }

    #[test]
    fn divisor_rounds_up_rather_than_overclocking() {
        // 250 MHz / 400 kHz = 625 exactly, no correction needed
        let (div, eff) = clock_divisor(250_000_000, 400_000);
        assert_eq!(div, 623);
        assert_eq!(eff, 400_000);
        // a non-exact division bumps the divisor instead of exceeding
        // the requested frequency
        let (_, eff) = clock_divisor(250_000_000, 300_000);
        assert!(eff <= 300_000);
    }

    #[test]
    fn divisor_saturates_at_the_register_width() {
        let (div, _) = clock_divisor(400_000_000, 100_000);
        assert_eq!(div, super::CLOCK_DIVISOR_MAX);
    }
}
