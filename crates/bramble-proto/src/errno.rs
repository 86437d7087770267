use std::fmt;

/// POSIX-style error number, always carried positive; RPC status fields
/// encode it negated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Errno(pub i32);

impl Errno {
    pub const EPERM: Errno = Errno(1);
    pub const ENOENT: Errno = Errno(2);
    pub const EIO: Errno = Errno(5);
    pub const EAGAIN: Errno = Errno(11);
    pub const ENOMEM: Errno = Errno(12);
    pub const EEXIST: Errno = Errno(17);
    pub const EINVAL: Errno = Errno(22);
    pub const ENOSYS: Errno = Errno(38);
    pub const ENODATA: Errno = Errno(61);

    /// Negative status value for RPC response fields.
    pub fn status(self) -> i32 {
        -self.0
    }

    /// Negative length value for length-or-errno fields.
    pub fn length(self) -> i64 {
        -(self.0 as i64)
    }

    /// Recover an errno from a negative status field.
    pub fn from_status(status: i32) -> Option<Errno> {
        (status < 0).then(|| Errno(-status))
    }

    pub fn name(self) -> &'static str {
        match self {
            Errno::EPERM => "EPERM",
            Errno::ENOENT => "ENOENT",
            Errno::EIO => "EIO",
            Errno::EAGAIN => "EAGAIN",
            Errno::ENOMEM => "ENOMEM",
            Errno::EEXIST => "EEXIST",
            Errno::EINVAL => "EINVAL",
            Errno::ENOSYS => "ENOSYS",
            Errno::ENODATA => "ENODATA",
            _ => "E?",
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        assert_eq!(Errno::from_status(Errno::EIO.status()), Some(Errno::EIO));
        assert_eq!(Errno::from_status(0), None);
        assert_eq!(Errno::from_status(42), None);
    }
}
