//! Shared-memory attachment, the bulk-data sidecar of the RPC
//! transport. Regions are identified by kernel-issued ids; attach gives
//! byte access, detach releases it.

use crate::RpcError;
use bramble_proto::ShmId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// An attached region. Cloning shares the backing storage, mirroring
/// multiple processes mapping the same physical pages.
#[derive(Clone)]
pub struct SharedRegion {
    bytes: Rc<RefCell<Vec<u8>>>,
}

impl SharedRegion {
    pub fn len(&self) -> usize {
        self.bytes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn read(&self, offset: usize, out: &mut [u8]) -> Result<(), RpcError> {
        let bytes = self.bytes.borrow();
        let end = offset.checked_add(out.len()).ok_or(RpcError::NoSuchRegion)?;
        let src = bytes.get(offset..end).ok_or(RpcError::NoSuchRegion)?;
        out.copy_from_slice(src);
        Ok(())
    }

    pub fn write(&self, offset: usize, data: &[u8]) -> Result<(), RpcError> {
        let mut bytes = self.bytes.borrow_mut();
        let end = offset.checked_add(data.len()).ok_or(RpcError::NoSuchRegion)?;
        let dst = bytes.get_mut(offset..end).ok_or(RpcError::NoSuchRegion)?;
        dst.copy_from_slice(data);
        Ok(())
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.borrow().clone()
    }
}

pub trait SharedMemory {
    fn attach(&self, id: ShmId) -> Result<SharedRegion, RpcError>;
    fn detach(&self, id: ShmId) -> Result<(), RpcError>;
}

/// Test registry standing in for the kernel's shared-memory service.
#[derive(Clone, Default)]
pub struct MockSharedMemory {
    regions: Rc<RefCell<HashMap<ShmId, SharedRegion>>>,
}

impl MockSharedMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a region and hand back the id to pass over RPC.
    pub fn create(&self, id: ShmId, size: usize) -> SharedRegion {
        let region = SharedRegion {
            bytes: Rc::new(RefCell::new(vec![0u8; size])),
        };
        self.regions.borrow_mut().insert(id, region.clone());
        region
    }
}

impl SharedMemory for MockSharedMemory {
    fn attach(&self, id: ShmId) -> Result<SharedRegion, RpcError> {
        self.regions
            .borrow()
            .get(&id)
            .cloned()
            .ok_or(RpcError::NoSuchRegion)
    }

    fn detach(&self, _id: ShmId) -> Result<(), RpcError> {
        Ok(())
    }
}
