//! Message types spoken between the I/O plane servers.
//!
//! Every request/response pair crossing the kernel RPC transport lives
//! here, together with the errno taxonomy and the byte codec. The
//! transport itself is external; messages only need to round-trip by
//! value.

mod codes;
mod errno;
mod iomem;
mod mailbox;
mod stat;
mod vfs;
pub mod wire;

pub use codes::*;
pub use errno::Errno;
pub use iomem::*;
pub use mailbox::*;
pub use stat::Stat;
pub use vfs::*;

/// Process identifier as the kernel hands it out.
pub type Pid = i32;

/// Shared-memory region identifier; zero means "payload is inline".
pub type ShmId = u32;
