use crate::command::SdCmd;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CardVersion {
    #[default]
    Unknown,
    V1,
    V1_1,
    V2,
    V3,
    V4,
    V5,
    V6,
    V7,
    V8,
}

/// Everything the driver remembers about the slot, the controller and
/// the card. Zeroed at process start, populated by init, partially
/// invalidated on eject or error recovery.
#[derive(Debug, Clone, Default)]
pub struct CardState {
    pub ocr: u32,
    pub cid: [u32; 4],
    /// Snapshot taken on eject, for change detection at re-insert.
    pub cid_backup: [u32; 4],
    pub csd: [u32; 4],
    pub rca: u16,
    pub scr: [u32; 2],

    pub supports_sdhc: bool,
    pub version: CardVersion,
    pub bus_width: u32,

    pub block_size: u32,
    pub block_count: u32,
    /// Word buffer the FIFO steps fill or drain.
    pub buffer: Vec<u32>,

    pub last_command: Option<SdCmd>,
    pub last_argument: u32,
    pub last_response: [u32; 4],
    pub last_interrupt: u32,
    pub last_error: u32,

    // EMMC version information
    pub vendor_version: u8,
    pub host_version: u8,
    pub slot_status: u8,

    /// SDHOST core clock, fetched over the mailbox.
    pub max_clock: u32,

    pub absent: bool,
    pub ejected: bool,
    pub initialized: bool,
}

impl CardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything learned from the card; controller knowledge
    /// (host version, max clock) survives.
    pub fn invalidate_card(&mut self) {
        self.ocr = 0;
        self.cid = [0; 4];
        self.csd = [0; 4];
        self.rca = 0;
        self.scr = [0; 2];
        self.supports_sdhc = false;
        self.version = CardVersion::Unknown;
        self.bus_width = 0;
        self.block_size = 0;
        self.block_count = 0;
        self.last_command = None;
        self.last_argument = 0;
        self.last_response = [0; 4];
        self.last_interrupt = 0;
        self.last_error = 0;
    }
}
