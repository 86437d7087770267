//! BCM283x peripheral register offsets, relative to the peripheral
//! base. Only the blocks the I/O plane drives are mapped.

/// Physical peripheral base on BCM2835.
pub const PERIPHERAL_BASE_BCM2835: u32 = 0x2000_0000;
/// Physical peripheral base on BCM2836/BCM2837.
pub const PERIPHERAL_BASE_BCM2836: u32 = 0x3F00_0000;
/// Size of the device window each base maps.
pub const PERIPHERAL_WINDOW_SIZE: u32 = 0x0100_0000;

/// VideoCore bus alias for peripheral addresses.
pub const BUS_PERIPHERAL_ALIAS: u32 = 0x7E00_0000;
/// Coherent (L2-bypassing) bus alias for SDRAM addresses.
pub const BUS_COHERENT_ALIAS: u32 = 0xC000_0000;

pub mod mailbox {
    pub const BASE: u32 = 0xB880;
    pub const READ: u32 = BASE;
    pub const STATUS: u32 = BASE + 0x18;
    pub const WRITE: u32 = BASE + 0x20;

    pub const STATUS_FULL: u32 = 1 << 31;
    pub const STATUS_EMPTY: u32 = 1 << 30;
}

pub mod dma {
    pub const BASE: u32 = 0x7000;
    // channel 0 register file
    pub const CH0_CS: u32 = BASE;
    pub const CH0_CONBLK_AD: u32 = BASE + 0x04;
    pub const CH0_TI: u32 = BASE + 0x08;
    pub const CH0_SOURCE_AD: u32 = BASE + 0x0C;
    pub const CH0_DEST_AD: u32 = BASE + 0x10;
    pub const CH0_TXFR_LEN: u32 = BASE + 0x14;
    pub const CH0_STRIDE: u32 = BASE + 0x18;
    pub const CH0_NEXTCONBK: u32 = BASE + 0x1C;
    pub const CH0_DEBUG: u32 = BASE + 0x20;

    pub const INT_STATUS: u32 = BASE + 0xFE0;
    pub const ENABLE: u32 = BASE + 0xFF0;
}

pub mod gpio {
    pub const BASE: u32 = 0x20_0000;
    pub const GPFSEL0: u32 = BASE;
    pub const GPFSEL1: u32 = BASE + 0x04;
    pub const GPFSEL2: u32 = BASE + 0x08;
    pub const GPFSEL3: u32 = BASE + 0x0C;
    pub const GPFSEL4: u32 = BASE + 0x10;
    pub const GPFSEL5: u32 = BASE + 0x14;
    pub const GPSET0: u32 = BASE + 0x1C;
    pub const GPSET1: u32 = BASE + 0x20;
    pub const GPCLR0: u32 = BASE + 0x28;
    pub const GPCLR1: u32 = BASE + 0x2C;
    pub const GPLEV0: u32 = BASE + 0x34;
    pub const GPLEV1: u32 = BASE + 0x38;
    pub const GPEDS0: u32 = BASE + 0x40;
    pub const GPEDS1: u32 = BASE + 0x44;
    pub const GPREN0: u32 = BASE + 0x4C;
    pub const GPREN1: u32 = BASE + 0x50;
    pub const GPFEN0: u32 = BASE + 0x58;
    pub const GPFEN1: u32 = BASE + 0x5C;
    pub const GPHEN0: u32 = BASE + 0x64;
    pub const GPHEN1: u32 = BASE + 0x68;
    pub const GPLEN0: u32 = BASE + 0x70;
    pub const GPLEN1: u32 = BASE + 0x74;
    pub const GPPUD: u32 = BASE + 0x94;
    pub const GPPUDCLK0: u32 = BASE + 0x98;
    pub const GPPUDCLK1: u32 = BASE + 0x9C;
}

pub mod sdhost {
    pub const BASE: u32 = 0x20_2000;
    pub const CMD: u32 = BASE;
    pub const ARG: u32 = BASE + 0x04;
    pub const TIMEOUT_COUNTER: u32 = BASE + 0x08;
    pub const CLOCK_DIVISOR: u32 = BASE + 0x0C;
    pub const RESPONSE0: u32 = BASE + 0x10;
    pub const RESPONSE1: u32 = BASE + 0x14;
    pub const RESPONSE2: u32 = BASE + 0x18;
    pub const RESPONSE3: u32 = BASE + 0x1C;
    pub const HOST_STATUS: u32 = BASE + 0x20;
    pub const POWER: u32 = BASE + 0x30;
    pub const DEBUG: u32 = BASE + 0x34;
    pub const HOST_CONFIG: u32 = BASE + 0x38;
    pub const BLOCK_SIZE: u32 = BASE + 0x3C;
    pub const DATA_PORT: u32 = BASE + 0x40;
    pub const BLOCK_COUNT: u32 = BASE + 0x50;
}

pub mod emmc {
    pub const BASE: u32 = 0x30_0000;
    pub const ARG2: u32 = BASE;
    pub const BLKSIZECNT: u32 = BASE + 0x04;
    pub const ARG1: u32 = BASE + 0x08;
    pub const CMDTM: u32 = BASE + 0x0C;
    pub const RESP0: u32 = BASE + 0x10;
    pub const RESP1: u32 = BASE + 0x14;
    pub const RESP2: u32 = BASE + 0x18;
    pub const RESP3: u32 = BASE + 0x1C;
    pub const DATA: u32 = BASE + 0x20;
    pub const STATUS: u32 = BASE + 0x24;
    pub const CONTROL0: u32 = BASE + 0x28;
    pub const CONTROL1: u32 = BASE + 0x2C;
    pub const INTERRUPT: u32 = BASE + 0x30;
    pub const IRPT_MASK: u32 = BASE + 0x34;
    pub const IRPT_ENABLE: u32 = BASE + 0x38;
    pub const CONTROL2: u32 = BASE + 0x3C;
    pub const FORCE_IRPT: u32 = BASE + 0x50;
    pub const BOOT_TIMEOUT: u32 = BASE + 0x70;
    pub const DBG_SEL: u32 = BASE + 0x74;
    pub const EXRDFIFO_CFG: u32 = BASE + 0x80;
    pub const EXRDFIFO_EN: u32 = BASE + 0x84;
    pub const TUNE_STEP: u32 = BASE + 0x88;
    pub const SPI_INT_SPT: u32 = BASE + 0xF0;
    pub const SLOTISR_VER: u32 = BASE + 0xFC;
}
