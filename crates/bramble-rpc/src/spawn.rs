//! Process spawning for DEV_START. The fork/exec pair belongs to the
//! bootstrap layer; servers only consume this contract.

use bramble_proto::{Errno, Pid};

pub trait ProcessSpawner {
    /// Fork and exec the daemon binary at `path`, returning the child.
    fn spawn(&mut self, path: &str) -> Result<Pid, Errno>;
}

/// Test spawner handing out predictable pids.
#[derive(Debug, Default)]
pub struct MockSpawner {
    next_pid: Pid,
    pub spawned: Vec<String>,
}

impl MockSpawner {
    pub fn new(first_pid: Pid) -> Self {
        Self {
            next_pid: first_pid,
            spawned: Vec::new(),
        }
    }
}

impl ProcessSpawner for MockSpawner {
    fn spawn(&mut self, path: &str) -> Result<Pid, Errno> {
        if path.is_empty() {
            return Err(Errno::EINVAL);
        }
        let pid = self.next_pid;
        self.next_pid += 1;
        self.spawned.push(path.to_string());
        Ok(pid)
    }
}
