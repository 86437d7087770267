/// A logical SD command: index 0..64, app-command flag for the ACMD
/// set. App commands expand into the CMD55 pair at issue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdCmd {
    pub index: u8,
    pub app: bool,
}

impl SdCmd {
    pub const fn cmd(index: u8) -> Self {
        Self { index, app: false }
    }

    pub const fn acmd(index: u8) -> Self {
        Self { index, app: true }
    }
}

impl std::fmt::Display for SdCmd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.app {
            write!(f, "ACMD{}", self.index)
        } else {
            write!(f, "CMD{}", self.index)
        }
    }
}

pub const CMD_GO_IDLE_STATE: SdCmd = SdCmd::cmd(0);
pub const CMD_ALL_SEND_CID: SdCmd = SdCmd::cmd(2);
pub const CMD_SEND_RELATIVE_ADDR: SdCmd = SdCmd::cmd(3);
pub const CMD_IO_SEND_OP_COND: SdCmd = SdCmd::cmd(5);
pub const CMD_SELECT_CARD: SdCmd = SdCmd::cmd(7);
pub const CMD_SEND_IF_COND: SdCmd = SdCmd::cmd(8);
pub const CMD_STOP_TRANSMISSION: SdCmd = SdCmd::cmd(12);
pub const CMD_SEND_STATUS: SdCmd = SdCmd::cmd(13);
pub const CMD_SET_BLOCKLEN: SdCmd = SdCmd::cmd(16);
pub const CMD_READ_SINGLE_BLOCK: SdCmd = SdCmd::cmd(17);
pub const CMD_READ_MULTIPLE_BLOCK: SdCmd = SdCmd::cmd(18);
pub const CMD_WRITE_SINGLE_BLOCK: SdCmd = SdCmd::cmd(24);
pub const CMD_WRITE_MULTIPLE_BLOCK: SdCmd = SdCmd::cmd(25);
pub const CMD_APP_CMD: SdCmd = SdCmd::cmd(55);

pub const ACMD_SET_BUS_WIDTH: SdCmd = SdCmd::acmd(6);
pub const ACMD_SD_SEND_OP_COND: SdCmd = SdCmd::acmd(41);
pub const ACMD_SEND_SCR: SdCmd = SdCmd::acmd(51);

/// Check pattern argument of CMD8: 2.7-3.6V window plus 0xAA echo.
pub const IF_COND_CHECK_PATTERN: u32 = 0x1AA;

/// ACMD41 voltage window; HCS is OR'd in for v2 cards.
pub const OP_COND_VOLTAGE_WINDOW: u32 = 0x00FF_8000;
pub const OP_COND_HCS: u32 = 1 << 30;
