use bramble_proto::{Pid, RpcCode};

/// Token tying an asynchronous completion back to its raise.
pub type Correlator = u64;

/// Set when an invocation is the completion half of an earlier raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub correlator: Correlator,
    /// True when the transport could not deliver the raise (the target
    /// vanished); `Envelope::data` is empty in that case.
    pub failed: bool,
}

/// One delivered invocation of a service handler.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub code: RpcCode,
    pub origin: Pid,
    pub data: Vec<u8>,
    pub completion: Option<Completion>,
}

impl Envelope {
    pub fn is_completion(&self) -> bool {
        self.completion.is_some()
    }
}
