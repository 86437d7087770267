//! Arasan EMMC front-end (Pi 1/2, and the slot the firmware routes on
//! later boards when SDHOST is not in play).

use super::HostController;
use crate::bits::emmc::*;
use crate::command::{SdCmd, CMD_SEND_STATUS};
use crate::port::IoMemPort;
use crate::state::CardState;
use crate::SdError;
use bramble_hw::regs::emmc as regs;
use bramble_proto::{MmioAbort, MmioAction, MmioProgram, MmioSleep, MmioStep};
use tracing::{debug, trace};

/// Poll bound for command/data completion loops.
const COMMAND_TIMEOUT: u32 = 50_000;

/// CONTROL1 divisor field for a target card frequency. Hosts up to
/// version 2 only take powers of two; later ones a direct 10-bit
/// divisor split across two subfields.
pub fn clock_divisor_field(host_version: u8, frequency: u32) -> u32 {
    let closest = BASE_CLOCK / frequency;
    let mut shift_count = 32u32;
    let mut value = closest - 1;
    if value == 0 {
        shift_count = 0;
    } else {
        if value & 0xFFFF_0000 == 0 {
            value <<= 16;
            shift_count -= 16;
        }
        if value & 0xFF00_0000 == 0 {
            value <<= 8;
            shift_count -= 8;
        }
        if value & 0xF000_0000 == 0 {
            value <<= 4;
            shift_count -= 4;
        }
        if value & 0xC000_0000 == 0 {
            value <<= 2;
            shift_count -= 2;
        }
        if value & 0x8000_0000 == 0 {
            shift_count -= 1;
        }
        if shift_count > 0 {
            shift_count -= 1;
        }
        shift_count = shift_count.min(7);
    }

    let mut divisor = if host_version > HOST_CONTROLLER_V2 {
        closest
    } else {
        1 << shift_count
    };
    divisor = divisor.max(2);
    let high_bits = if host_version > HOST_CONTROLLER_V2 {
        (divisor & 0x300) >> 2
    } else {
        0
    };
    ((divisor & 0x0FF) << 8) | high_bits
}

pub struct EmmcController;

impl EmmcController {
    pub fn new() -> Self {
        Self
    }

    /// CMDTM word for a command, or None for reserved indices.
    fn command_word(&self, cmd: SdCmd) -> Option<u32> {
        let word = if cmd.app {
            match cmd.index {
                6 => RESPONSE_R1,
                13 => RESPONSE_R1,
                22 => RESPONSE_R1,
                23 => RESPONSE_R1,
                41 => RESPONSE_R3,
                42 => RESPONSE_R1,
                51 => RESPONSE_R1 | DATA_READ,
                55 => RESPONSE_R1,
                _ => return None,
            }
        } else {
            match cmd.index {
                0 => RESPONSE_NONE,
                2 => RESPONSE_R2,
                3 => RESPONSE_R6,
                4 => RESPONSE_NONE,
                5 => CMDTM_RSPNS_136, // R4, no crc check
                6 => RESPONSE_R1 | DATA_READ,
                7 => RESPONSE_R1B,
                8 => RESPONSE_R7,
                9 => RESPONSE_R2,
                10 => RESPONSE_R2,
                11 => RESPONSE_R1,
                12 => RESPONSE_R1B | CMDTM_TYPE_ABORT,
                13 => RESPONSE_R1,
                15 => RESPONSE_NONE,
                16 => RESPONSE_R1,
                17 => RESPONSE_R1 | DATA_READ,
                18 => {
                    RESPONSE_R1
                        | DATA_READ
                        | CMDTM_MULTI_BLOCK
                        | CMDTM_BLKCNT_EN
                        | CMDTM_AUTO_CMD12
                }
                19 => RESPONSE_R1 | DATA_READ,
                20 => RESPONSE_R1B,
                22 => RESPONSE_R1,
                23 => RESPONSE_R1,
                24 => RESPONSE_R1 | DATA_WRITE,
                25 => {
                    RESPONSE_R1
                        | DATA_WRITE
                        | CMDTM_MULTI_BLOCK
                        | CMDTM_BLKCNT_EN
                        | CMDTM_AUTO_CMD12
                }
                27 => RESPONSE_R1 | DATA_WRITE,
                28 => RESPONSE_R1B,
                29 => RESPONSE_R1B,
                30 => RESPONSE_R1 | DATA_READ,
                32 => RESPONSE_R1,
                33 => RESPONSE_R1,
                38 => RESPONSE_R1B,
                40 => RESPONSE_R1,
                42 => RESPONSE_R1,
                55 => RESPONSE_R1,
                56 => RESPONSE_R1 | CMDTM_ISDATA,
                _ => return None,
            }
        };
        Some(word | cmdtm_index(cmd.index as u32))
    }

    fn mark_interrupts_handled(
        &self,
        io: &mut dyn IoMemPort,
        mask: u32,
    ) -> Result<(), SdError> {
        let mut program = MmioProgram::new(vec![MmioStep::write(regs::INTERRUPT, mask)]);
        io.mmio_perform(&mut program)
    }

    fn read_interrupt_status(&self, io: &mut dyn IoMemPort) -> Result<u32, SdError> {
        let mut program = MmioProgram::new(vec![MmioStep::read(regs::INTERRUPT)]);
        io.mmio_perform(&mut program)?;
        Ok(program.steps[0].value)
    }

    /// SRST_CMD / SRST_DATA with self-clear wait plus a verify read.
    fn reset_line(&self, io: &mut dyn IoMemPort, line: u32) -> Result<(), SdError> {
        let mut program = MmioProgram::new(vec![
            MmioStep::read(regs::CONTROL1),
            MmioStep::new(MmioAction::WriteOrPreviousRead, regs::CONTROL1).with_value(line),
            MmioStep::new(MmioAction::LoopNotEqual, regs::CONTROL1)
                .with_value(0)
                .with_loop(line, 100_000)
                .with_sleep(MmioSleep::Milliseconds, 10),
            MmioStep::read(regs::CONTROL1),
        ]);
        io.mmio_perform(&mut program)?;
        if program.steps[2].abort == MmioAbort::Timeout {
            return Err(SdError::Timeout);
        }
        if program.steps[3].value & line != 0 {
            return Err(SdError::Unknown);
        }
        Ok(())
    }
}

impl Default for EmmcController {
    fn default() -> Self {
        Self::new()
    }
}

impl HostController for EmmcController {
    #[cfg(not(feature = "controller-restart"))]
    fn restart(&mut self, _io: &mut dyn IoMemPort, _state: &mut CardState) -> Result<(), SdError> {
        // TODO: power cycling over the mailbox leaves the controller
        // wedged on some firmware revisions; reenable once the cause
        // is understood
        Ok(())
    }

    #[cfg(feature = "controller-restart")]
    fn restart(&mut self, io: &mut dyn IoMemPort, _state: &mut CardState) -> Result<(), SdError> {
        use bramble_proto::{
            property_request, property_value, POWER_DEVICE_SD_CARD, POWER_STATE_ON,
            POWER_STATE_WAIT, TAG_SET_POWER_STATE,
        };
        let mut off = property_request(
            TAG_SET_POWER_STATE,
            8,
            &[POWER_DEVICE_SD_CARD, POWER_STATE_WAIT],
        );
        io.mailbox(&mut off)?;
        if property_value(&off).map(|v| v[1]) != Some(0) {
            return Err(SdError::Mailbox);
        }
        let mut on = property_request(
            TAG_SET_POWER_STATE,
            8,
            &[POWER_DEVICE_SD_CARD, POWER_STATE_ON | POWER_STATE_WAIT],
        );
        io.mailbox(&mut on)?;
        match property_value(&on).map(|v| v[1]) {
            Some(value) if value & POWER_STATE_ON != 0 => Ok(()),
            _ => Err(SdError::Mailbox),
        }
    }

    fn reset(&mut self, io: &mut dyn IoMemPort, state: &mut CardState) -> Result<(), SdError> {
        // the divisor derivation below depends on the host version
        let mut probe = MmioProgram::new(vec![MmioStep::read(regs::SLOTISR_VER)]);
        io.mmio_perform(&mut probe)?;
        let version = probe.steps[0].value;
        state.vendor_version = slotisr_vendor(version);
        state.host_version = slotisr_sd_version(version);
        state.slot_status = slotisr_slot_status(version);

        // host core reset, then internal clock with max data timeout
        let mut program = MmioProgram::new(vec![
            MmioStep::write(regs::CONTROL0, 0),
            MmioStep::read(regs::CONTROL1),
            MmioStep::new(MmioAction::WriteOrPreviousRead, regs::CONTROL1)
                .with_value(Control1::SRST_HC.bits()),
            MmioStep::new(MmioAction::LoopTrue, regs::CONTROL1)
                .with_loop(Control1::SRST_HC.bits(), 10_000)
                .with_sleep(MmioSleep::Milliseconds, 10),
            MmioStep::read(regs::CONTROL1),
            MmioStep::new(MmioAction::WriteOrPreviousRead, regs::CONTROL1)
                .with_value(Control1::CLK_INTLEN.bits() | (0x7 << 16)),
            MmioStep::new(MmioAction::Sleep, 0).with_sleep(MmioSleep::Milliseconds, 10),
        ]);
        io.mmio_perform(&mut program)?;
        if program.steps[3].abort == MmioAbort::Timeout {
            debug!("host core reset never self-cleared");
            return Err(SdError::Timeout);
        }

        self.change_clock(io, state, self.identification_frequency())?;

        let mut program = MmioProgram::new(vec![
            MmioStep::write(regs::IRPT_ENABLE, 0xFFFF_FFFF),
            MmioStep::write(regs::IRPT_MASK, 0xFFFF_FFFF),
        ]);
        io.mmio_perform(&mut program)?;

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
        let response_busy = word & CMDTM_RSPNS_MASK == CMDTM_RSPNS_48_BUSY;
        let type_abort = word & CMDTM_TYPE_MASK == CMDTM_TYPE_ABORT;
        let is_data = word & CMDTM_ISDATA != 0;
        let data_blocks = if is_data { state.block_count } else { 0 };
        // BLKSIZECNT keeps the count in 16 bits
        if state.block_count > 0xFFFF {
            return Err(SdError::InvalidCommand);
        }
        let block_words = (state.block_size / 4) as usize;
        let write_data = word & CMDTM_ISDATA != 0 && word & CMDTM_DAT_CARD_TO_HOST == 0;
        if write_data && state.buffer.len() < data_blocks as usize * block_words {
            return Err(SdError::InvalidCommand);
        }

        trace!(%cmd, argument, data_blocks, "issue");

        let mut inhibit = Status::CMD_INHIBIT;
        if response_busy && !type_abort {
            inhibit |= Status::DAT_INHIBIT;
        }

        let mut steps = Vec::new();
        // wait for a free command line
        steps.push(
            MmioStep::new(MmioAction::LoopTrue, regs::STATUS)
                .with_loop(inhibit.bits(), COMMAND_TIMEOUT)
                .with_sleep(MmioSleep::Milliseconds, 1_000),
        );
        steps.push(MmioStep::write(
            regs::BLKSIZECNT,
            state.block_size | (state.block_count << 16),
        ));
        steps.push(MmioStep::write(regs::ARG1, argument));
        steps.push(MmioStep::write(regs::CMDTM, word));
        let cmd_done_idx = steps.len();
        steps.push(
            MmioStep::new(MmioAction::LoopFalse, regs::INTERRUPT)
                .with_loop(Interrupt::CMD_DONE.bits(), COMMAND_TIMEOUT)
                .with_sleep(MmioSleep::Milliseconds, 10)
                .with_failure(Interrupt::ERR.bits()),
        );
        steps.push(MmioStep::write(
            regs::INTERRUPT,
            INTERRUPT_ERROR_MASK | Interrupt::CMD_DONE.bits(),
        ));
        let resp_idx = steps.len();
        for offset in [regs::RESP0, regs::RESP1, regs::RESP2, regs::RESP3] {
            steps.push(MmioStep::read(offset));
        }

        let mut block_wait_indices = Vec::new();
        if data_blocks > 0 {
            let ready = if write_data {
                Interrupt::WRITE_RDY
            } else {
                Interrupt::READ_RDY
            };
            for block in 0..data_blocks as usize {
                block_wait_indices.push(steps.len());
                steps.push(
                    MmioStep::new(MmioAction::LoopFalse, regs::INTERRUPT)
                        .with_loop(INTERRUPT_ERROR_MASK | ready.bits(), COMMAND_TIMEOUT / 10)
                        .with_sleep(MmioSleep::Milliseconds, 10)
                        .with_failure(Interrupt::ERR.bits()),
                );
                steps.push(MmioStep::write(
                    regs::INTERRUPT,
                    INTERRUPT_ERROR_MASK | ready.bits(),
                ));
                for widx in 0..block_words {
                    if write_data {
                        steps.push(MmioStep::write(
                            regs::DATA,
                            state.buffer[block * block_words + widx],
                        ));
                    } else {
                        steps.push(MmioStep::read(regs::DATA));
                    }
                }
            }
        }

        let mut final_wait_idx = None;
        if response_busy || is_data {
            final_wait_idx = Some(steps.len());
            steps.push(
                MmioStep::new(MmioAction::LoopFalse, regs::INTERRUPT)
                    .with_loop(Interrupt::DATA_DONE.bits(), COMMAND_TIMEOUT)
                    .with_sleep(MmioSleep::Milliseconds, 10),
            );
            steps.push(MmioStep::write(
                regs::INTERRUPT,
                INTERRUPT_ERROR_MASK | Interrupt::DATA_DONE.bits(),
            ));
        }

        let mut program = MmioProgram::new(steps);
        io.mmio_perform(&mut program)?;
        let steps = &program.steps;

        state.last_command = Some(cmd);
        state.last_argument = argument;

        if steps[0].abort == MmioAbort::Timeout
            || steps[cmd_done_idx].abort == MmioAbort::Timeout
        {
            let seen = steps[cmd_done_idx].value;
            state.last_interrupt = seen;
            state.last_error = seen & INTERRUPT_ERROR_MASK;
            debug!(%cmd, interrupt = seen, "command never completed");
            self.mark_interrupts_handled(
                io,
                INTERRUPT_ERROR_MASK | Interrupt::CMD_DONE.bits(),
            )?;
            return Err(SdError::Timeout);
        }

        match word & CMDTM_RSPNS_MASK {
            CMDTM_RSPNS_48 | CMDTM_RSPNS_48_BUSY => {
                state.last_response = [steps[resp_idx].value, 0, 0, 0];
            }
            CMDTM_RSPNS_136 => {
                state.last_response = [
                    steps[resp_idx].value,
                    steps[resp_idx + 1].value,
                    steps[resp_idx + 2].value,
                    steps[resp_idx + 3].value,
                ];
            }
            _ => {}
        }

        if data_blocks > 0 {
            for &wait_idx in &block_wait_indices {
                if steps[wait_idx].abort == MmioAbort::Timeout {
                    let seen = steps[wait_idx].value;
                    state.last_interrupt = seen;
                    state.last_error = seen & INTERRUPT_ERROR_MASK;
                    self.mark_interrupts_handled(
                        io,
                        INTERRUPT_ERROR_MASK | Interrupt::DATA_DONE.bits(),
                    )?;
                    return Err(SdError::Timeout);
                }
            }
            if !write_data {
                state.buffer.clear();
                for &wait_idx in &block_wait_indices {
                    let fifo = &steps[wait_idx + 2..wait_idx + 2 + block_words];
                    state.buffer.extend(fifo.iter().map(|s| s.value));
                }
            }
        }

        if let Some(idx) = final_wait_idx {
            if steps[idx].abort == MmioAbort::Timeout {
                let seen = steps[idx].value;
                let done_mask = INTERRUPT_ERROR_MASK | Interrupt::DATA_DONE.bits();
                let timeout_done = Interrupt::DTO_ERR.bits() | Interrupt::DATA_DONE.bits();
                // transfer completion overrides a late data timeout
                if seen & done_mask != Interrupt::DATA_DONE.bits()
                    && seen & done_mask != timeout_done
                {
                    state.last_interrupt = seen;
                    state.last_error = seen & INTERRUPT_ERROR_MASK;
                    self.mark_interrupts_handled(io, done_mask)?;
                    return Err(SdError::Timeout);
                }
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
        let divisor_field = clock_divisor_field(state.host_version, frequency);
        trace!(frequency, divisor_field, "clock change");

        let mut program = MmioProgram::new(vec![
            // drain in-flight command and data first
            MmioStep::new(MmioAction::LoopTrue, regs::STATUS)
                .with_loop(
                    (Status::CMD_INHIBIT | Status::DAT_INHIBIT).bits(),
                    10_000,
                )
                .with_sleep(MmioSleep::Milliseconds, 10),
            MmioStep::read(regs::CONTROL1),
            MmioStep::new(MmioAction::WriteAndPreviousRead, regs::CONTROL1)
                .with_value(!Control1::CLK_EN.bits()),
            MmioStep::new(MmioAction::Sleep, 0).with_sleep(MmioSleep::Milliseconds, 10),
            MmioStep::new(MmioAction::ReadAnd, regs::CONTROL1).with_value(0xFFFF_003F),
            MmioStep::new(MmioAction::WriteOrPreviousRead, regs::CONTROL1)
                .with_value(divisor_field),
            MmioStep::new(MmioAction::Sleep, 0).with_sleep(MmioSleep::Milliseconds, 10),
            MmioStep::read(regs::CONTROL1),
            MmioStep::new(MmioAction::WriteOrPreviousRead, regs::CONTROL1)
                .with_value(Control1::CLK_EN.bits()),
            MmioStep::new(MmioAction::LoopFalse, regs::CONTROL1)
                .with_loop(Control1::CLK_STABLE.bits(), 10_000)
                .with_sleep(MmioSleep::Milliseconds, 10),
        ]);
        io.mmio_perform(&mut program)?;
        if program.steps[0].abort == MmioAbort::Timeout {
            debug!("inhibit wait before clock change timed out");
            return Err(SdError::Timeout);
        }
        if program.steps[9].abort == MmioAbort::Timeout {
            debug!("clock never stabilised");
            return Err(SdError::Timeout);
        }
        Ok(())
    }

    fn reset_command_line(
        &mut self,
        io: &mut dyn IoMemPort,
        _state: &mut CardState,
    ) -> Result<(), SdError> {
        self.reset_line(io, Control1::SRST_CMD.bits())
    }

    fn reset_data_line(
        &mut self,
        io: &mut dyn IoMemPort,
        _state: &mut CardState,
    ) -> Result<(), SdError> {
        self.reset_line(io, Control1::SRST_DATA.bits())
    }

    fn service_interrupts(
        &mut self,
        io: &mut dyn IoMemPort,
        state: &mut CardState,
    ) -> Result<(), SdError> {
        let pending = self.read_interrupt_status(io)?;
        if pending == 0 {
            return Ok(());
        }
        let known = Interrupt::CMD_DONE
            | Interrupt::DATA_DONE
            | Interrupt::BLOCK_GAP
            | Interrupt::WRITE_RDY
            | Interrupt::READ_RDY
            | Interrupt::CARD;
        let mut ack = pending & known.bits();
        if pending & Interrupt::CARD.bits() != 0 && state.rca > 0 {
            // a card interrupt is answered with a status query
            let rca_arg = (state.rca as u32) << 16;
            let _ = self.issue_command(io, state, CMD_SEND_STATUS, rca_arg);
        }
        // error summary bits are acknowledged wholesale
        ack |= pending & INTERRUPT_ERROR_MASK;
        if ack != 0 {
            self.mark_interrupts_handled(io, ack)?;
        }
        Ok(())
    }

    fn apply_block_size(
        &mut self,
        io: &mut dyn IoMemPort,
        state: &mut CardState,
    ) -> Result<(), SdError> {
        let mut program = MmioProgram::new(vec![
            MmioStep::new(MmioAction::ReadAnd, regs::BLKSIZECNT).with_value(!0xFFF),
            MmioStep::new(MmioAction::WriteOrPreviousRead, regs::BLKSIZECNT)
                .with_value(state.block_size),
        ]);
        io.mmio_perform(&mut program)
    }

    fn enable_wide_bus(
        &mut self,
        io: &mut dyn IoMemPort,
        _state: &mut CardState,
    ) -> Result<(), SdError> {
        let mut program = MmioProgram::new(vec![
            MmioStep::read(regs::CONTROL0),
            MmioStep::new(MmioAction::WriteOrPreviousRead, regs::CONTROL0).with_value(0x2),
        ]);
        io.mmio_perform(&mut program)
    }

    fn was_command_timeout(&self, state: &CardState) -> bool {
        state.last_error & Interrupt::CTO_ERR.bits() != 0
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
    use super::clock_divisor_field;

    #[test]
    fn modern_hosts_take_the_direct_divisor() {
        // 41.6 MHz / 400 kHz -> 104, low byte into bits 8..16
        assert_eq!(clock_divisor_field(2, 400_000), 104 << 8);
        // 25 MHz target -> divisor 1, clamped to the minimum of 2
        assert_eq!(clock_divisor_field(2, 25_000_000), 2 << 8);
    }

    #[test]
    fn legacy_hosts_round_to_a_power_of_two() {
        // closest 104 -> shift count 6 -> divisor 64
        assert_eq!(clock_divisor_field(1, 400_000), 64 << 8);
        assert_eq!(clock_divisor_field(0, 25_000_000), 2 << 8);
    }

    #[test]
    fn ten_bit_divisors_spill_into_the_high_field() {
        // force a divisor above 255: 41.6 MHz / 100 kHz -> 416
        let field = clock_divisor_field(2, 100_000);
        assert_eq!(field & 0xFF00, (416 & 0xFF) << 8);
        assert_eq!(field & 0xC0, (416 & 0x300) >> 2);
    }
}
