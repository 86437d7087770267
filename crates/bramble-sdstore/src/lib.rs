//! SD/EMMC/SDHOST block driver.
//!
//! Composes MMIO programs for the peripheral gateway to talk to the SD
//! card through whichever host controller the platform carries, and
//! exposes a block-addressed read/write interface over RPC.

pub mod bits;
mod command;
pub mod controller;
mod driver;
mod error;
mod port;
mod server;
pub mod sim;
mod state;

pub use command::{SdCmd, ACMD_SD_SEND_OP_COND, ACMD_SEND_SCR, ACMD_SET_BUS_WIDTH};
pub use controller::{emmc::EmmcController, sdhost::SdhostController, CardStatus, HostController};
pub use driver::{Operation, SdDriver};
pub use error::SdError;
pub use port::{InProcessPort, IoMemPort};
pub use server::{SdStoreServer, IOCTL_BLOCK_SIZE, IOCTL_CARD_PRESENT};
pub use state::{CardState, CardVersion};

/// Transfer unit towards the card.
pub const BLOCK_SIZE: u32 = 512;
