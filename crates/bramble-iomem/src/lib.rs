//! Peripheral gateway: the single writer of the SoC peripheral window.
//!
//! Clients hand over MMIO programs which execute atomically from their
//! point of view; on top of that sit the mailbox property channel, the
//! GPIO capability calls and DMA descriptor handling.

pub mod dma;
mod executor;
pub mod gpio;
pub mod mailbox;
mod server;

pub use executor::{execute, validate, ExecutorEnv};
pub use mailbox::{MockVideoCore, VcModel};
pub use server::IoMemServer;
