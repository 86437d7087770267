//! Kernel RPC contract as the servers consume it.
//!
//! The real transport and syscalls live in the kernel; this crate pins
//! down the slice the I/O plane depends on — asynchronous raise with
//! completion re-entry, continuation bookkeeping, timer access, shared
//! memory attachment — and ships an in-memory [`Router`] implementing
//! the same protocol for tests.

mod envelope;
mod pending;
mod router;
pub mod shm;
pub mod spawn;
pub mod time;

pub use envelope::{Completion, Correlator, Envelope};
pub use pending::PendingMap;
pub use router::{Ctx, Router, Service};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RpcError {
    #[error("target process does not exist")]
    NoSuchProcess,
    #[error("origin failed validation")]
    OriginInvalid,
    #[error("no shared memory region with that id")]
    NoSuchRegion,
    #[error("reply already produced for this invocation")]
    DoubleReply,
}
