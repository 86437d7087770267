use bramble_collections::SplayTree;
use bramble_proto::Pid;

/// What the namespace server knows about one declared ioctl command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoctlDescriptor {
    pub command: u32,
}

/// Two-level capability table: process, then command code. A command
/// resolves through a process only while that process owns a device
/// entry declaring it; ADD extends the table, process exit truncates
/// its whole first level.
#[derive(Debug, Default)]
pub struct IoctlTable {
    per_process: SplayTree<Pid, SplayTree<u32, IoctlDescriptor>>,
}

impl IoctlTable {
    pub fn new() -> Self {
        Self {
            per_process: SplayTree::new(),
        }
    }

    /// Register a command for a process. Re-pushing an existing code
    /// is a success, matching the idempotent ADD.
    pub fn push(&mut self, process: Pid, command: u32) {
        if let Some(commands) = self.per_process.get_mut(&process) {
            let _ = commands.insert(command, IoctlDescriptor { command });
            return;
        }
        let mut commands = SplayTree::new();
        let _ = commands.insert(command, IoctlDescriptor { command });
        let _ = self.per_process.insert(process, commands);
    }

    pub fn lookup(&mut self, process: Pid, command: u32) -> Option<IoctlDescriptor> {
        self.per_process
            .get_mut(&process)
            .and_then(|commands| commands.get(&command))
            .copied()
    }

    /// Process exit housekeeping.
    pub fn drop_process(&mut self, process: Pid) {
        self.per_process.remove(&process);
    }

    pub fn command_count(&mut self, process: Pid) -> usize {
        self.per_process
            .get_mut(&process)
            .map(|commands| commands.len())
            .unwrap_or(0)
    }
}
