use crate::wire::{Reader, Writer};
use crate::DecodeError;

pub const S_IFCHR: u32 = 0o020000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFBLK: u32 = 0o060000;
pub const S_IFREG: u32 = 0o100000;
const S_IFMT: u32 = 0o170000;

/// The slice of a POSIX stat record the namespace server actually keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    pub mode: u32,
    pub size: u64,
    pub block_size: u32,
}

impl Stat {
    pub fn char_device() -> Self {
        Self {
            mode: S_IFCHR | 0o666,
            ..Default::default()
        }
    }

    pub fn directory() -> Self {
        Self {
            mode: S_IFDIR | 0o755,
            ..Default::default()
        }
    }

    pub fn is_char_device(&self) -> bool {
        self.mode & S_IFMT == S_IFCHR
    }

    pub fn is_directory(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub(crate) fn put(&self, w: &mut Writer) {
        w.put_u32(self.mode);
        w.put_u64(self.size);
        w.put_u32(self.block_size);
    }

    pub(crate) fn get(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            mode: r.get_u32()?,
            size: r.get_u64()?,
            block_size: r.get_u32()?,
        })
    }
}
