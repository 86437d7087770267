pub use crate::wire::DecodeError;

/// First code of the custom (non-VFS) RPC range.
pub const RPC_CUSTOM_START: u32 = 0x400;

/// Request codes understood by the namespace server and the drivers it
/// forwards to. Codes above [`RPC_CUSTOM_START`] are server-private.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RpcCode {
    VfsAdd = 1,
    VfsOpen,
    VfsStat,
    VfsRead,
    VfsWrite,
    VfsSeek,
    VfsClose,
    VfsExit,
    VfsFork,
    VfsMount,
    VfsUmount,
    VfsRemove,
    VfsIoctl,
    VfsWatchRegister,
    VfsWatchRelease,
    VfsWatchNotify,

    DevStart = RPC_CUSTOM_START,
    DevKill,

    IomemMailbox,
    IomemMmioPerform,
    IomemMmioLock,
    IomemMmioUnlock,
    IomemGpioSetFunction,
    IomemGpioSetPull,
    IomemGpioSetDetect,
    IomemGpioStatus,
    IomemGpioEvent,
    IomemGpioLock,
    IomemGpioUnlock,
}

impl RpcCode {
    pub fn from_u32(raw: u32) -> Result<Self, DecodeError> {
        use RpcCode::*;
        Ok(match raw {
            x if x == VfsAdd as u32 => VfsAdd,
            x if x == VfsOpen as u32 => VfsOpen,
            x if x == VfsStat as u32 => VfsStat,
            x if x == VfsRead as u32 => VfsRead,
            x if x == VfsWrite as u32 => VfsWrite,
            x if x == VfsSeek as u32 => VfsSeek,
            x if x == VfsClose as u32 => VfsClose,
            x if x == VfsExit as u32 => VfsExit,
            x if x == VfsFork as u32 => VfsFork,
            x if x == VfsMount as u32 => VfsMount,
            x if x == VfsUmount as u32 => VfsUmount,
            x if x == VfsRemove as u32 => VfsRemove,
            x if x == VfsIoctl as u32 => VfsIoctl,
            x if x == VfsWatchRegister as u32 => VfsWatchRegister,
            x if x == VfsWatchRelease as u32 => VfsWatchRelease,
            x if x == VfsWatchNotify as u32 => VfsWatchNotify,
            x if x == DevStart as u32 => DevStart,
            x if x == DevKill as u32 => DevKill,
            x if x == IomemMailbox as u32 => IomemMailbox,
            x if x == IomemMmioPerform as u32 => IomemMmioPerform,
            x if x == IomemMmioLock as u32 => IomemMmioLock,
            x if x == IomemMmioUnlock as u32 => IomemMmioUnlock,
            x if x == IomemGpioSetFunction as u32 => IomemGpioSetFunction,
            x if x == IomemGpioSetPull as u32 => IomemGpioSetPull,
            x if x == IomemGpioSetDetect as u32 => IomemGpioSetDetect,
            x if x == IomemGpioStatus as u32 => IomemGpioStatus,
            x if x == IomemGpioEvent as u32 => IomemGpioEvent,
            x if x == IomemGpioLock as u32 => IomemGpioLock,
            x if x == IomemGpioUnlock as u32 => IomemGpioUnlock,
            other => return Err(DecodeError::UnknownTag(other)),
        })
    }
}

/// Path under which the peripheral gateway registers itself.
pub const IOMEM_DEVICE_PATH: &str = "/dev/iomem";
