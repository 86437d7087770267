//! Register-level simulation of the EMMC block with an SD card in the
//! slot. Test suites drive the real driver stack against it; nothing
//! in here is reachable from production paths.

use crate::bits::emmc::{Control1, Interrupt};
use bramble_hw::regs::{emmc, gpio, mailbox as mb};
use bramble_hw::MmioWindow;
use std::collections::{HashMap, VecDeque};

/// One command as the simulated card saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimCommand {
    pub index: u8,
    pub app: bool,
    pub argument: u32,
}

const BLOCK_BYTES: usize = 512;
/// RCA the simulated card publishes on CMD3.
pub const SIM_RCA: u16 = 0x1234;
/// ACMD41 rounds reported busy before power-up completes.
const BUSY_ROUNDS: u32 = 1;

/// SCR first word, logical (big-endian) layout: spec 2.0 with spec3,
/// bus widths 1 and 4.
const SCR0: u32 = 0x0205_8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CardPhase {
    Idle,
    Identified,
    Standby,
    Transfer,
}

pub struct SimEmmc {
    regs: HashMap<u32, u32>,
    interrupt: u32,
    phase: CardPhase,
    app_armed: bool,
    acmd41_rounds: u32,
    /// Everything the card was asked, in order.
    pub commands: Vec<SimCommand>,
    /// Block store backing reads and writes.
    blocks: HashMap<u32, Vec<u8>>,

    fifo_out: VecDeque<u32>,
    fifo_in: Vec<u32>,
    words_per_block: usize,
    transfer_block: u32,
    reads_left: u32,
    writes_left: u32,

    /// Slot state surfaced through the card-detect pin.
    pub present: bool,
    pub eject_event: bool,
    /// Fault injection: CMD55 times out, so no ACMD can be issued.
    pub fail_cmd55: bool,
    /// Fault injection: every data command times out.
    pub fail_data: bool,
}

impl SimEmmc {
    pub fn new() -> Self {
        let mut regs = HashMap::new();
        // host controller version 3 in the slot/version register
        regs.insert(emmc::SLOTISR_VER, 0x0002_0000);
        Self {
            regs,
            interrupt: 0,
            phase: CardPhase::Idle,
            app_armed: false,
            acmd41_rounds: 0,
            commands: Vec::new(),
            blocks: HashMap::new(),
            fifo_out: VecDeque::new(),
            fifo_in: Vec::new(),
            words_per_block: BLOCK_BYTES / 4,
            transfer_block: 0,
            reads_left: 0,
            writes_left: 0,
            present: true,
            eject_event: false,
            fail_cmd55: false,
            fail_data: false,
        }
    }

    /// Preload a block with data.
    pub fn load_block(&mut self, number: u32, data: &[u8]) {
        let mut block = vec![0u8; BLOCK_BYTES];
        block[..data.len().min(BLOCK_BYTES)].copy_from_slice(&data[..data.len().min(BLOCK_BYTES)]);
        self.blocks.insert(number, block);
    }

    pub fn block(&self, number: u32) -> Vec<u8> {
        self.blocks
            .get(&number)
            .cloned()
            .unwrap_or_else(|| vec![0u8; BLOCK_BYTES])
    }

    pub fn command_indices(&self) -> Vec<(u8, bool)> {
        self.commands.iter().map(|c| (c.index, c.app)).collect()
    }

    fn reg(&self, offset: u32) -> u32 {
        self.regs.get(&offset).copied().unwrap_or(0)
    }

    fn respond48(&mut self, value: u32) {
        self.regs.insert(emmc::RESP0, value);
    }

    fn respond136(&mut self, words: [u32; 4]) {
        self.regs.insert(emmc::RESP0, words[0]);
        self.regs.insert(emmc::RESP1, words[1]);
        self.regs.insert(emmc::RESP2, words[2]);
        self.regs.insert(emmc::RESP3, words[3]);
    }

    fn r1(&self) -> u32 {
        let state = match self.phase {
            CardPhase::Idle => 0,
            CardPhase::Identified => 2,
            CardPhase::Standby => 3,
            CardPhase::Transfer => 4,
        };
        (state << 9) | (1 << 8)
    }

    fn load_read_fifo(&mut self) {
        let data = self.block(self.transfer_block);
        self.fifo_out = data
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
    }

    fn begin_command(&mut self, cmdtm: u32) {
        let index = ((cmdtm >> 24) & 0x3F) as u8;
        let argument = self.reg(emmc::ARG1);
        let app = self.app_armed && index != 55;
        self.app_armed = false;
        self.commands.push(SimCommand {
            index,
            app,
            argument,
        });

        let blksizecnt = self.reg(emmc::BLKSIZECNT);
        let block_size = (blksizecnt & 0xFFF).max(4) as usize;
        let block_count = (blksizecnt >> 16).max(1);
        self.words_per_block = block_size / 4;

        let mut done = Interrupt::CMD_DONE.bits();
        if app {
            match index {
                6 => self.respond48(self.r1()),
                41 => {
                    self.acmd41_rounds += 1;
                    if argument == 0 || self.acmd41_rounds <= BUSY_ROUNDS {
                        // still powering up
                        self.respond48(0x00FF_8000);
                    } else {
                        // ready, SDHC capable, full voltage window
                        self.respond48((1 << 31) | (1 << 30) | 0x00FF_8000);
                    }
                }
                51 => {
                    self.respond48(self.r1());
                    self.fifo_out = VecDeque::from([SCR0.to_be(), 0]);
                    self.reads_left = 0;
                    done |= Interrupt::READ_RDY.bits();
                }
                _ => self.respond48(self.r1()),
            }
        } else {
            match index {
                0 => {
                    self.phase = CardPhase::Idle;
                    self.acmd41_rounds = 0;
                }
                2 => {
                    self.phase = CardPhase::Identified;
                    self.respond136([0xDEAD_0001, 0xDEAD_0002, 0xDEAD_0003, 0xDEAD_0004]);
                }
                3 => {
                    self.phase = CardPhase::Standby;
                    self.respond48(((SIM_RCA as u32) << 16) | (1 << 8));
                }
                5 => {
                    // not an SDIO card: command timeout
                    self.interrupt |= Interrupt::CTO_ERR.bits();
                    return;
                }
                7 => {
                    // response carries the state at arrival
                    self.respond48(self.r1());
                    self.phase = CardPhase::Transfer;
                    done |= Interrupt::DATA_DONE.bits();
                }
                // R7: voltage accepted plus the echoed check pattern
                8 => self.respond48(argument & 0xFFF),
                12 => {
                    self.phase = CardPhase::Transfer;
                    self.respond48(self.r1());
                    done |= Interrupt::DATA_DONE.bits();
                }
                13 => self.respond48(self.r1()),
                16 => self.respond48(self.r1()),
                17 | 18 => {
                    if self.fail_data {
                        self.interrupt |= Interrupt::CTO_ERR.bits();
                        return;
                    }
                    self.respond48(self.r1());
                    self.transfer_block = argument;
                    self.reads_left = if index == 18 { block_count - 1 } else { 0 };
                    self.load_read_fifo();
                    done |= Interrupt::READ_RDY.bits();
                }
                24 | 25 => {
                    if self.fail_data {
                        self.interrupt |= Interrupt::CTO_ERR.bits();
                        return;
                    }
                    self.respond48(self.r1());
                    self.transfer_block = argument;
                    self.writes_left = if index == 25 { block_count } else { 1 };
                    self.fifo_in.clear();
                    done |= Interrupt::WRITE_RDY.bits();
                }
                55 => {
                    if self.fail_cmd55 {
                        self.interrupt |= Interrupt::CTO_ERR.bits();
                        return;
                    }
                    self.app_armed = true;
                    self.respond48(self.r1() | (1 << 5));
                }
                _ => self.respond48(self.r1()),
            }
        }
        self.interrupt |= done;
    }

    fn pop_data(&mut self) -> u32 {
        let word = self.fifo_out.pop_front().unwrap_or(0);
        if self.fifo_out.is_empty() {
            if self.reads_left > 0 {
                self.reads_left -= 1;
                self.transfer_block += 1;
                self.load_read_fifo();
                self.interrupt |= Interrupt::READ_RDY.bits();
            } else {
                self.interrupt |= Interrupt::DATA_DONE.bits();
            }
        }
        word
    }

    fn push_data(&mut self, word: u32) {
        self.fifo_in.push(word);
        if self.fifo_in.len() >= self.words_per_block {
            let bytes: Vec<u8> = self
                .fifo_in
                .drain(..)
                .flat_map(|w| w.to_le_bytes())
                .collect();
            self.blocks.insert(self.transfer_block, bytes);
            self.transfer_block += 1;
            self.writes_left = self.writes_left.saturating_sub(1);
            if self.writes_left > 0 {
                self.interrupt |= Interrupt::WRITE_RDY.bits();
            } else {
                self.interrupt |= Interrupt::DATA_DONE.bits();
            }
        }
    }
}

impl Default for SimEmmc {
    fn default() -> Self {
        Self::new()
    }
}

impl MmioWindow for SimEmmc {
    fn read32(&mut self, offset: u32) -> u32 {
        match offset {
            emmc::INTERRUPT => {
                // the summary bit mirrors the error half
                let mut value = self.interrupt;
                if value & 0xFFFF_0000 != 0 {
                    value |= Interrupt::ERR.bits();
                }
                value
            }
            emmc::STATUS => 0,
            emmc::DATA => self.pop_data(),
            gpio::GPLEV1 => {
                // pull-up: high with an empty slot
                if self.present {
                    0
                } else {
                    1 << 15
                }
            }
            gpio::GPEDS1 => {
                if self.eject_event {
                    1 << 15
                } else {
                    0
                }
            }
            mb::STATUS => 0,
            mb::READ => 0x9, // property reply channel
            other => self.reg(other),
        }
    }

    fn write32(&mut self, offset: u32, value: u32) {
        match offset {
            emmc::INTERRUPT => {
                // write-to-clear
                self.interrupt &= !value;
            }
            emmc::CMDTM => {
                self.regs.insert(emmc::CMDTM, value);
                self.begin_command(value);
            }
            emmc::CONTROL1 => {
                // reset lines self-clear, the clock is instantly stable
                let mut stored = value
                    & !(Control1::SRST_HC | Control1::SRST_CMD | Control1::SRST_DATA).bits();
                if stored & Control1::CLK_EN.bits() != 0 {
                    stored |= Control1::CLK_STABLE.bits();
                }
                self.regs.insert(emmc::CONTROL1, stored);
            }
            gpio::GPEDS1 => {
                if value & (1 << 15) != 0 {
                    self.eject_event = false;
                }
            }
            emmc::DATA => self.push_data(value),
            other => {
                self.regs.insert(other, value);
            }
        }
    }
}
