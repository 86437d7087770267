//! Umbrella crate for the bramble I/O plane: the `/dev` namespace
//! server, the peripheral MMIO gateway and the SD block driver, plus
//! the shared plumbing underneath them. The member crates do the work;
//! this crate re-exports them and hosts the cross-server tests.

pub use bramble_collections as collections;
pub use bramble_devmgr as devmgr;
pub use bramble_hw as hw;
pub use bramble_iomem as iomem;
pub use bramble_proto as proto;
pub use bramble_rpc as rpc;
pub use bramble_sdstore as sdstore;
