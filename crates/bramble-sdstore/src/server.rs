use crate::controller::HostController;
use crate::driver::{Operation, SdDriver};
use crate::port::IoMemPort;
use bramble_proto::wire::Message;
use bramble_proto::{
    Errno, IoctlRequest, IoctlResponse, ReadRequest, ReadResponse, RpcCode, WriteRequest,
    WriteResponse,
};
use bramble_rpc::shm::SharedMemory;
use bramble_rpc::{Ctx, Envelope, Service};
use std::rc::Rc;
use tracing::{debug, warn};

/// Ioctl probe: current block size as a little-endian u32.
pub const IOCTL_BLOCK_SIZE: u32 = 0x10;
/// Ioctl probe: card presence as a little-endian u32 flag.
pub const IOCTL_CARD_PRESENT: u32 = 0x11;

/// The block device RPC surface. Offsets and lengths must be
/// block-aligned; payloads travel inline or through a shared-memory
/// region named in the request.
pub struct SdStoreServer<C: HostController, P: IoMemPort> {
    driver: SdDriver<C, P>,
    shm: Rc<dyn SharedMemory>,
}

impl<C: HostController, P: IoMemPort> SdStoreServer<C, P> {
    pub fn new(driver: SdDriver<C, P>, shm: Rc<dyn SharedMemory>) -> Self {
        Self { driver, shm }
    }

    pub fn driver(&self) -> &SdDriver<C, P> {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut SdDriver<C, P> {
        &mut self.driver
    }

    fn handle_read(&mut self, request: ReadRequest) -> ReadResponse {
        let block_size = self.driver.block_size() as u64;
        if request.len as u64 % block_size != 0 || request.offset % block_size != 0 {
            return ReadResponse::error(Errno::EAGAIN);
        }
        let block_number = (request.offset / block_size) as u32;
        let mut buffer = Vec::new();
        if let Err(err) = self.driver.transfer_block(
            block_number,
            &mut buffer,
            request.len as usize,
            Operation::Read,
        ) {
            warn!(%err, "block read failed");
            return ReadResponse::error(err.errno());
        }
        if request.shm_id != 0 {
            let Ok(region) = self.shm.attach(request.shm_id) else {
                return ReadResponse::error(Errno::EIO);
            };
            if region.write(0, &buffer).is_err() {
                return ReadResponse::error(Errno::EIO);
            }
            let _ = self.shm.detach(request.shm_id);
            ReadResponse {
                len: request.len as i64,
                data: Vec::new(),
            }
        } else {
            ReadResponse {
                len: request.len as i64,
                data: buffer,
            }
        }
    }

    fn handle_write(&mut self, request: WriteRequest) -> WriteResponse {
        let block_size = self.driver.block_size() as u64;
        if request.len as u64 % block_size != 0 || request.offset % block_size != 0 {
            return WriteResponse {
                len: Errno::EAGAIN.length(),
            };
        }
        let mut payload = if request.shm_id != 0 {
            let Ok(region) = self.shm.attach(request.shm_id) else {
                return WriteResponse {
                    len: Errno::EIO.length(),
                };
            };
            let mut bytes = vec![0u8; request.len as usize];
            if region.read(0, &mut bytes).is_err() {
                return WriteResponse {
                    len: Errno::EIO.length(),
                };
            }
            let _ = self.shm.detach(request.shm_id);
            bytes
        } else {
            request.data
        };
        if payload.len() < request.len as usize {
            return WriteResponse {
                len: Errno::EINVAL.length(),
            };
        }
        let block_number = (request.offset / block_size) as u32;
        match self.driver.transfer_block(
            block_number,
            &mut payload,
            request.len as usize,
            Operation::Write,
        ) {
            Ok(()) => WriteResponse {
                len: request.len as i64,
            },
            Err(err) => {
                warn!(%err, "block write failed");
                WriteResponse {
                    len: err.errno().length(),
                }
            }
        }
    }

    fn handle_ioctl(&mut self, request: IoctlRequest) -> IoctlResponse {
        match request.command {
            IOCTL_BLOCK_SIZE => IoctlResponse {
                status: 0,
                container: self.driver.block_size().to_le_bytes().to_vec(),
            },
            IOCTL_CARD_PRESENT => IoctlResponse {
                status: 0,
                container: (self.driver.card_present() as u32).to_le_bytes().to_vec(),
            },
            other => {
                debug!(command = other, "unknown ioctl");
                IoctlResponse::error(Errno::EINVAL)
            }
        }
    }
}

impl<C: HostController + 'static, P: IoMemPort + 'static> Service for SdStoreServer<C, P> {
    fn handle(&mut self, ctx: &mut Ctx<'_>, env: Envelope) {
        if !ctx.validate_origin(env.origin) {
            ctx.reply(ReadResponse::error(Errno::EINVAL).encode());
            return;
        }
        match env.code {
            RpcCode::VfsRead => {
                let response = match ReadRequest::decode(&env.data) {
                    Ok(request) => self.handle_read(request),
                    Err(_) => ReadResponse::error(Errno::EINVAL),
                };
                ctx.reply(response.encode());
            }
            RpcCode::VfsWrite => {
                let response = match WriteRequest::decode(&env.data) {
                    Ok(request) => self.handle_write(request),
                    Err(_) => WriteResponse {
                        len: Errno::EINVAL.length(),
                    },
                };
                ctx.reply(response.encode());
            }
            RpcCode::VfsIoctl => {
                let response = match IoctlRequest::decode(&env.data) {
                    Ok(request) => self.handle_ioctl(request),
                    Err(_) => IoctlResponse::error(Errno::EINVAL),
                };
                ctx.reply(response.encode());
            }
            other => {
                debug!(?other, "unsupported request at the block driver");
                ctx.reply(IoctlResponse::error(Errno::ENOSYS).encode());
            }
        }
    }
}
