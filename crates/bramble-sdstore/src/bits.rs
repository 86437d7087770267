//! Host controller register fields for both front-ends.

use bitflags::bitflags;

pub mod emmc {
    use super::bitflags;

    bitflags! {
        /// STATUS register.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Status: u32 {
            const CMD_INHIBIT = 1 << 0;
            const DAT_INHIBIT = 1 << 1;
            const DAT_ACTIVE = 1 << 2;
            const WRITE_TRANSFER = 1 << 8;
            const READ_TRANSFER = 1 << 9;
        }
    }

    bitflags! {
        /// CONTROL1 register.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Control1: u32 {
            const CLK_INTLEN = 1 << 0;
            const CLK_STABLE = 1 << 1;
            const CLK_EN = 1 << 2;
            const SRST_HC = 1 << 24;
            const SRST_CMD = 1 << 25;
            const SRST_DATA = 1 << 26;
        }
    }

    bitflags! {
        /// INTERRUPT register (also IRPT_MASK / IRPT_ENABLE layout).
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Interrupt: u32 {
            const CMD_DONE = 1 << 0;
            const DATA_DONE = 1 << 1;
            const BLOCK_GAP = 1 << 2;
            const WRITE_RDY = 1 << 4;
            const READ_RDY = 1 << 5;
            const CARD = 1 << 8;
            const RETUNE = 1 << 12;
            const BOOTACK = 1 << 13;
            const ENDBOOT = 1 << 14;
            const ERR = 1 << 15;
            const CTO_ERR = 1 << 16;
            const CCRC_ERR = 1 << 17;
            const CEND_ERR = 1 << 18;
            const CBAD_ERR = 1 << 19;
            const DTO_ERR = 1 << 20;
            const DCRC_ERR = 1 << 21;
            const DEND_ERR = 1 << 22;
            const ACMD_ERR = 1 << 24;
        }
    }

    /// Upper half of the interrupt register: every error bit.
    pub const INTERRUPT_ERROR_MASK: u32 = 0xFFFF_0000;

    // CMDTM fields.
    pub const CMDTM_TYPE_NORMAL: u32 = 0 << 22;
    pub const CMDTM_TYPE_ABORT: u32 = 3 << 22;
    pub const CMDTM_TYPE_MASK: u32 = 3 << 22;
    pub const CMDTM_ISDATA: u32 = 1 << 21;
    pub const CMDTM_CRCCHK_EN: u32 = 1 << 19;
    pub const CMDTM_RSPNS_NONE: u32 = 0 << 16;
    pub const CMDTM_RSPNS_136: u32 = 1 << 16;
    pub const CMDTM_RSPNS_48: u32 = 2 << 16;
    pub const CMDTM_RSPNS_48_BUSY: u32 = 3 << 16;
    pub const CMDTM_RSPNS_MASK: u32 = 3 << 16;
    pub const CMDTM_MULTI_BLOCK: u32 = 1 << 5;
    pub const CMDTM_DAT_CARD_TO_HOST: u32 = 1 << 4;
    pub const CMDTM_AUTO_CMD12: u32 = 1 << 2;
    pub const CMDTM_BLKCNT_EN: u32 = 1 << 1;

    pub const fn cmdtm_index(index: u32) -> u32 {
        index << 24
    }

    // Response encodings as the command table carries them.
    pub const RESPONSE_NONE: u32 = CMDTM_RSPNS_NONE;
    pub const RESPONSE_R1: u32 = CMDTM_RSPNS_48 | CMDTM_CRCCHK_EN;
    pub const RESPONSE_R1B: u32 = CMDTM_RSPNS_48_BUSY | CMDTM_CRCCHK_EN;
    pub const RESPONSE_R2: u32 = CMDTM_RSPNS_136 | CMDTM_CRCCHK_EN;
    pub const RESPONSE_R3: u32 = CMDTM_RSPNS_48;
    pub const RESPONSE_R6: u32 = CMDTM_RSPNS_48 | CMDTM_CRCCHK_EN;
    pub const RESPONSE_R7: u32 = CMDTM_RSPNS_48 | CMDTM_CRCCHK_EN;

    pub const DATA_READ: u32 = CMDTM_ISDATA | CMDTM_DAT_CARD_TO_HOST;
    pub const DATA_WRITE: u32 = CMDTM_ISDATA;

    // SLOTISR_VER decomposition.
    pub const fn slotisr_vendor(value: u32) -> u8 {
        ((value >> 24) & 0xFF) as u8
    }

    pub const fn slotisr_sd_version(value: u32) -> u8 {
        ((value >> 16) & 0xFF) as u8
    }

    pub const fn slotisr_slot_status(value: u32) -> u8 {
        (value & 0xFF) as u8
    }

    pub const HOST_CONTROLLER_V2: u8 = 1;

    /// Base the divisor derivation starts from on the legacy EMMC.
    pub const BASE_CLOCK: u32 = 41_666_666;

    pub const CLOCK_FREQUENCY_LOW: u32 = 400_000;
    pub const CLOCK_FREQUENCY_NORMAL: u32 = 25_000_000;
}

pub mod sdhost {
    use super::bitflags;

    bitflags! {
        /// CMD register.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Cmd: u32 {
            const NEW = 1 << 15;
            const FAIL = 1 << 14;
            const BUSY = 1 << 11;
            const NO_RESPONSE = 1 << 10;
            const LONG_RESPONSE = 1 << 9;
            const WRITE = 1 << 7;
            const READ = 1 << 6;
        }
    }

    pub const CMD_INDEX_MASK: u32 = 0x3F;

    bitflags! {
        /// HSTS register.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct HostStatus: u32 {
            const DATA_FLAG = 1 << 0;
            const FIFO_ERROR = 1 << 3;
            const CRC7_ERROR = 1 << 4;
            const CRC16_ERROR = 1 << 5;
            const CMD_TIME_OUT = 1 << 6;
            const REW_TIME_OUT = 1 << 7;
            const SDIO_IRPT = 1 << 8;
            const BLOCK_IRPT = 1 << 9;
            const BUSY_IRPT = 1 << 10;
        }
    }

    pub const HOST_STATUS_ERROR_MASK: u32 = HostStatus::FIFO_ERROR.bits()
        | HostStatus::CRC7_ERROR.bits()
        | HostStatus::CRC16_ERROR.bits()
        | HostStatus::CMD_TIME_OUT.bits()
        | HostStatus::REW_TIME_OUT.bits();

    bitflags! {
        /// HCFG register.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct HostConfig: u32 {
            const REL_CMD_LINE = 1 << 0;
            const WIDE_INT_BUS = 1 << 1;
            const WIDE_EXT_BUS = 1 << 2;
            const SLOW_CARD = 1 << 3;
            const DATA_IRPT_EN = 1 << 4;
            const SDIO_IRPT_EN = 1 << 5;
            const BLOCK_IRPT_EN = 1 << 8;
            const BUSY_IRPT_EN = 1 << 10;
        }
    }

    pub const POWER_ON: u32 = 1;
    pub const CLOCK_DIVISOR_MAX: u32 = 0x7FF;

    pub const CLOCK_FREQUENCY_LOW: u32 = 400_000;
    pub const CLOCK_FREQUENCY_NORMAL: u32 = 25_000_000;
}
