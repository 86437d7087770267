//! The `/dev` namespace server.
//!
//! Owns the device-path registry, forwards filesystem RPCs to the
//! owning driver processes, and runs the subscription engine that
//! tells watchers about namespace changes.

mod ioctl;
mod registry;
mod server;
mod watch;

pub use ioctl::IoctlTable;
pub use registry::{DeviceEntry, Registry};
pub use server::DevMgrServer;
pub use watch::WatchTree;

/// Parent directory of a device path, or none for the root itself.
pub(crate) fn parent_dir(path: &str) -> Option<&str> {
    match path.rsplit_once('/') {
        Some(("", _)) if path.len() > 1 => Some("/"),
        Some((parent, _)) if !parent.is_empty() => Some(parent),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::parent_dir;

    #[test]
    fn parent_of_nested_paths() {
        assert_eq!(parent_dir("/dev/storage/sd0"), Some("/dev/storage"));
        assert_eq!(parent_dir("/dev/storage"), Some("/dev"));
        assert_eq!(parent_dir("/dev"), Some("/"));
        assert_eq!(parent_dir("/"), None);
        assert_eq!(parent_dir("dev"), None);
    }
}
