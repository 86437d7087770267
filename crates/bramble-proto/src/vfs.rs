//! VFS request/response pairs (§ the namespace server surface).

use crate::wire::{DecodeError, Message, Reader, Writer};
use crate::{Pid, ShmId, Stat};

/// Outcome of an ADD; ALREADY_EXIST is idempotent, carrying the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AddStatus {
    Success = 0,
    AlreadyExist = 1,
    Error = 2,
}

impl AddStatus {
    fn from_u32(raw: u32) -> Result<Self, DecodeError> {
        Ok(match raw {
            0 => AddStatus::Success,
            1 => AddStatus::AlreadyExist,
            2 => AddStatus::Error,
            other => return Err(DecodeError::UnknownTag(other)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRequest {
    pub path: String,
    pub info: Stat,
    pub handler: Pid,
    /// Ioctl command codes the handler services for this device.
    pub device_info: Vec<u32>,
}

impl Message for AddRequest {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_str(&self.path);
        self.info.put(&mut w);
        w.put_i32(self.handler);
        w.put_u32_slice(&self.device_info);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self {
            path: r.get_path()?,
            info: Stat::get(&mut r)?,
            handler: r.get_i32()?,
            device_info: r.get_u32_vec()?,
        };
        r.expect_end()?;
        Ok(msg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddResponse {
    pub status: AddStatus,
    pub handler: Pid,
}

impl Message for AddResponse {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_u32(self.status as u32);
        w.put_i32(self.handler);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self {
            status: AddStatus::from_u32(r.get_u32()?)?,
            handler: r.get_i32()?,
        };
        r.expect_end()?;
        Ok(msg)
    }
}

/// Lookup request shared by OPEN and STAT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    pub path: String,
}

impl Message for LookupRequest {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_str(&self.path);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self {
            path: r.get_path()?,
        };
        r.expect_end()?;
        Ok(msg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatResponse {
    pub success: bool,
    pub handler: Pid,
    pub info: Stat,
}

impl StatResponse {
    pub fn failure() -> Self {
        Self {
            success: false,
            handler: 0,
            info: Stat::default(),
        }
    }
}

impl Message for StatResponse {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_bool(self.success);
        w.put_i32(self.handler);
        self.info.put(&mut w);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self {
            success: r.get_bool()?,
            handler: r.get_i32()?,
            info: Stat::get(&mut r)?,
        };
        r.expect_end()?;
        Ok(msg)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub path: String,
    pub offset: u64,
    pub len: u32,
    pub shm_id: ShmId,
}

impl Message for ReadRequest {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_str(&self.path);
        w.put_u64(self.offset);
        w.put_u32(self.len);
        w.put_u32(self.shm_id);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self {
            path: r.get_path()?,
            offset: r.get_u64()?,
            len: r.get_u32()?,
            shm_id: r.get_u32()?,
        };
        r.expect_end()?;
        Ok(msg)
    }
}

/// `len` is byte count on success, negated errno on failure; `data` is
/// only populated for inline (non shared-memory) transfers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResponse {
    pub len: i64,
    pub data: Vec<u8>,
}

impl ReadResponse {
    pub fn error(errno: crate::Errno) -> Self {
        Self {
            len: errno.length(),
            data: Vec::new(),
        }
    }
}

impl Message for ReadResponse {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_i64(self.len);
        w.put_bytes(&self.data);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self {
            len: r.get_i64()?,
            data: r.get_bytes()?,
        };
        r.expect_end()?;
        Ok(msg)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub path: String,
    pub offset: u64,
    pub shm_id: ShmId,
    /// Inline payload; empty when `shm_id` names the data region.
    pub data: Vec<u8>,
    /// Transfer length; equals `data.len()` for inline writes.
    pub len: u32,
}

impl Message for WriteRequest {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_str(&self.path);
        w.put_u64(self.offset);
        w.put_u32(self.shm_id);
        w.put_bytes(&self.data);
        w.put_u32(self.len);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self {
            path: r.get_path()?,
            offset: r.get_u64()?,
            shm_id: r.get_u32()?,
            data: r.get_bytes()?,
            len: r.get_u32()?,
        };
        r.expect_end()?;
        Ok(msg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResponse {
    pub len: i64,
}

impl Message for WriteResponse {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_i64(self.len);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self { len: r.get_i64()? };
        r.expect_end()?;
        Ok(msg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Whence {
    Set = 0,
    Current = 1,
    End = 2,
}

impl Whence {
    fn from_u32(raw: u32) -> Result<Self, DecodeError> {
        Ok(match raw {
            0 => Whence::Set,
            1 => Whence::Current,
            2 => Whence::End,
            other => return Err(DecodeError::UnknownTag(other)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeekRequest {
    pub path: String,
    pub whence: Whence,
    pub offset: i64,
}

impl Message for SeekRequest {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_str(&self.path);
        w.put_u32(self.whence as u32);
        w.put_i64(self.offset);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self {
            path: r.get_path()?,
            whence: Whence::from_u32(r.get_u32()?)?,
            offset: r.get_i64()?,
        };
        r.expect_end()?;
        Ok(msg)
    }
}

/// Resulting offset, or negated errno.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekResponse {
    pub position: i64,
}

impl Message for SeekResponse {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_i64(self.position);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self {
            position: r.get_i64()?,
        };
        r.expect_end()?;
        Ok(msg)
    }
}

/// CLOSE / EXIT / FORK housekeeping all carry just a pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessRequest {
    pub pid: Pid,
}

impl Message for ProcessRequest {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_i32(self.pid);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self { pid: r.get_i32()? };
        r.expect_end()?;
        Ok(msg)
    }
}

/// Zero-or-negative-errno result shared by several calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: i32,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self { status: 0 }
    }

    pub fn error(errno: crate::Errno) -> Self {
        Self {
            status: errno.status(),
        }
    }
}

impl Message for StatusResponse {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_i32(self.status);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self {
            status: r.get_i32()?,
        };
        r.expect_end()?;
        Ok(msg)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRequest {
    pub source: String,
    pub target: String,
    pub fs_type: String,
    pub flags: u32,
    pub options: String,
}

impl Message for MountRequest {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_str(&self.source);
        w.put_str(&self.target);
        w.put_str(&self.fs_type);
        w.put_u32(self.flags);
        w.put_str(&self.options);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self {
            source: r.get_path()?,
            target: r.get_path()?,
            fs_type: r.get_str()?,
            flags: r.get_u32()?,
            options: r.get_str()?,
        };
        r.expect_end()?;
        Ok(msg)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UmountRequest {
    pub target: String,
}

impl Message for UmountRequest {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_str(&self.target);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self {
            target: r.get_path()?,
        };
        r.expect_end()?;
        Ok(msg)
    }
}

/// Driver-defined ioctl: the container payload is opaque to the
/// namespace server, which only routes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoctlRequest {
    pub path: String,
    pub command: u32,
    pub container: Vec<u8>,
}

impl Message for IoctlRequest {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_str(&self.path);
        w.put_u32(self.command);
        w.put_bytes(&self.container);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self {
            path: r.get_path()?,
            command: r.get_u32()?,
            container: r.get_bytes()?,
        };
        r.expect_end()?;
        Ok(msg)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoctlResponse {
    pub status: i32,
    pub container: Vec<u8>,
}

impl IoctlResponse {
    pub fn error(errno: crate::Errno) -> Self {
        Self {
            status: errno.status(),
            container: Vec::new(),
        }
    }
}

impl Message for IoctlResponse {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_i32(self.status);
        w.put_bytes(&self.container);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self {
            status: r.get_i32()?,
            container: r.get_bytes()?,
        };
        r.expect_end()?;
        Ok(msg)
    }
}

/// WATCH_REGISTER and WATCH_RELEASE share this shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRequest {
    pub target: String,
    pub handler: Pid,
}

impl Message for WatchRequest {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_str(&self.target);
        w.put_i32(self.handler);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self {
            target: r.get_path()?,
            handler: r.get_i32()?,
        };
        r.expect_end()?;
        Ok(msg)
    }
}

/// Fire-and-forget namespace change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchNotify {
    pub path: String,
}

impl Message for WatchNotify {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_str(&self.path);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self {
            path: r.get_path()?,
        };
        r.expect_end()?;
        Ok(msg)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevStartRequest {
    /// Daemon binary to fork and exec.
    pub path: String,
}

impl Message for DevStartRequest {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_str(&self.path);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self {
            path: r.get_path()?,
        };
        r.expect_end()?;
        Ok(msg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevStartResponse {
    pub status: i32,
    pub pid: Pid,
}

impl Message for DevStartResponse {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_i32(self.status);
        w.put_i32(self.pid);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self {
            status: r.get_i32()?,
            pid: r.get_i32()?,
        };
        r.expect_end()?;
        Ok(msg)
    }
}
