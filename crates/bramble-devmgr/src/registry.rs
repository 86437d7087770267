use bramble_collections::OrderedMap;
use bramble_proto::{Pid, Stat};

/// One entry under `/dev`: the path, its stat record, the process that
/// services it and the ioctl command codes it declared.
#[derive(Debug, Clone)]
pub struct DeviceEntry {
    pub path: String,
    pub info: Stat,
    pub owner: Pid,
    pub commands: Vec<u32>,
}

/// Path-keyed device registry. Enumeration order is the lexicographic
/// path order, whatever order registrations arrived in.
///
/// Entries are NOT reaped when their owner exits — only an explicit
/// REMOVE (or a replacing ADD after one) drops them. A dead owner
/// therefore keeps its paths claimed, and requests forwarded there
/// fail with EIO until somebody re-registers. Known hazard, kept for
/// compatibility with the deployed behaviour.
#[derive(Debug, Default)]
pub struct Registry {
    entries: OrderedMap<String, DeviceEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: OrderedMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a new entry; the existing one wins on conflict and is
    /// returned so the caller can report the current owner.
    pub fn insert(&mut self, entry: DeviceEntry) -> Result<(), Pid> {
        let key = entry.path.clone();
        match self.entries.insert(key, entry) {
            Ok(()) => Ok(()),
            Err((key, _)) => {
                let existing = self
                    .entries
                    .get(&key)
                    .map(|e| e.owner)
                    .unwrap_or_default();
                Err(existing)
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<&DeviceEntry> {
        self.entries.get(path)
    }

    pub fn owner_of(&self, path: &str) -> Option<Pid> {
        self.get(path).map(|e| e.owner)
    }

    pub fn remove(&mut self, path: &str) -> Option<DeviceEntry> {
        self.entries.remove(path)
    }

    /// First entry owned by the process, in path order.
    pub fn find_by_owner(&self, owner: Pid) -> Option<&DeviceEntry> {
        self.entries.find(|_, e| e.owner == owner).map(|(_, e)| e)
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, owner: Pid) -> DeviceEntry {
        DeviceEntry {
            path: path.into(),
            info: Stat::char_device(),
            owner,
            commands: Vec::new(),
        }
    }

    #[test]
    fn duplicate_insert_reports_current_owner() {
        let mut registry = Registry::new();
        registry.insert(entry("/dev/storage/sd0", 42)).unwrap();
        assert_eq!(registry.insert(entry("/dev/storage/sd0", 99)), Err(42));
        assert_eq!(registry.owner_of("/dev/storage/sd0"), Some(42));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn enumeration_is_path_ordered() {
        let mut registry = Registry::new();
        for path in ["/dev/storage/sd0", "/dev/iomem", "/dev/manager/device"] {
            registry.insert(entry(path, 1)).unwrap();
        }
        let paths: Vec<_> = registry.paths().map(String::as_str).collect();
        assert_eq!(
            paths,
            ["/dev/iomem", "/dev/manager/device", "/dev/storage/sd0"]
        );
    }
}
