use bramble_collections::SplayTree;
use bramble_proto::{Errno, Pid};

/// Directory-scoped subscription tree: path to the set of processes
/// watching it. Each (path, pid) pair appears at most once; a node
/// whose last subscriber leaves is pruned, so live nodes always carry
/// at least one pid.
#[derive(Debug, Default)]
pub struct WatchTree {
    nodes: SplayTree<String, SplayTree<Pid, ()>>,
}

impl WatchTree {
    pub fn new() -> Self {
        Self {
            nodes: SplayTree::new(),
        }
    }

    /// Subscribe a process to a directory. Registering an existing
    /// pair reports already-registered and changes nothing.
    pub fn register(&mut self, path: &str, subscriber: Pid) -> Result<(), Errno> {
        if let Some(subscribers) = self.nodes.get_mut(path) {
            return match subscribers.insert(subscriber, ()) {
                Ok(()) => Ok(()),
                Err(_) => Err(Errno::EEXIST),
            };
        }
        let mut subscribers = SplayTree::new();
        let _ = subscribers.insert(subscriber, ());
        let _ = self.nodes.insert(path.to_string(), subscribers);
        Ok(())
    }

    /// Releasing a pair that is not registered is a no-op success.
    pub fn release(&mut self, path: &str, subscriber: Pid) {
        let Some(subscribers) = self.nodes.get_mut(path) else {
            return;
        };
        subscribers.remove(&subscriber);
        if subscribers.is_empty() {
            self.nodes.remove(path);
        }
    }

    /// Subscribers of a path, in pid order.
    pub fn subscribers(&mut self, path: &str) -> Vec<Pid> {
        self.nodes
            .get_mut(path)
            .map(|subscribers| subscribers.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_registration_is_flagged_but_harmless() {
        let mut tree = WatchTree::new();
        tree.register("/dev/storage", 7).unwrap();
        assert_eq!(tree.register("/dev/storage", 7), Err(Errno::EEXIST));
        assert_eq!(tree.subscribers("/dev/storage"), vec![7]);
    }

    #[test]
    fn release_prunes_empty_nodes() {
        let mut tree = WatchTree::new();
        tree.register("/dev/storage", 7).unwrap();
        tree.register("/dev/storage", 9).unwrap();
        tree.release("/dev/storage", 7);
        assert_eq!(tree.node_count(), 1);
        tree.release("/dev/storage", 9);
        assert_eq!(tree.node_count(), 0);
        // releasing on the now-missing node stays a no-op
        tree.release("/dev/storage", 9);
    }

    #[test]
    fn subscribers_come_out_in_pid_order() {
        let mut tree = WatchTree::new();
        for pid in [9, 3, 7] {
            tree.register("/dev", pid).unwrap();
        }
        assert_eq!(tree.subscribers("/dev"), vec![3, 7, 9]);
        assert!(tree.subscribers("/mnt").is_empty());
    }
}
