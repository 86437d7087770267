use crate::dma::DmaEngine;
use crate::executor::{execute, validate, ExecutorEnv};
use crate::gpio;
use crate::mailbox::{PropertyMailbox, VcModel};
use bramble_hw::regs::PERIPHERAL_BASE_BCM2836;
use bramble_hw::MmioWindow;
use bramble_proto::wire::Message;
use bramble_proto::{
    Errno, GpioDetectRequest, GpioFunctionRequest, GpioPinRequest, GpioPullRequest,
    GpioValueResponse, IoctlResponse, MailboxBuffer, MmioPerformResponse, MmioProgram, Pid,
    RpcCode, StatusResponse,
};
use bramble_rpc::shm::SharedMemory;
use bramble_rpc::time::Clock;
use bramble_rpc::{Ctx, Envelope, Service};
use std::rc::Rc;
use tracing::debug;

/// Nominal bus address of the device-mapped property page.
const PROPERTY_PAGE_BUS_ADDR: u32 = 0x0000_F000;
/// Nominal bus address of the DMA control block.
const DMA_BLOCK_BUS_ADDR: u32 = 0x0000_F100;

/// The peripheral gateway server. Owns the window exclusively; every
/// other process goes through it.
pub struct IoMemServer<W: MmioWindow> {
    window: W,
    clock: Rc<dyn Clock>,
    shm: Rc<dyn SharedMemory>,
    mailbox: PropertyMailbox,
    vc: Option<Box<dyn VcModel>>,
    dma: DmaEngine,
    mmio_lock: Option<Pid>,
    gpio_lock: Option<Pid>,
}

impl<W: MmioWindow> IoMemServer<W> {
    pub fn new(window: W, clock: Rc<dyn Clock>, shm: Rc<dyn SharedMemory>) -> Self {
        Self {
            window,
            clock,
            shm,
            mailbox: PropertyMailbox::new(PROPERTY_PAGE_BUS_ADDR),
            vc: None,
            dma: DmaEngine::new(DMA_BLOCK_BUS_ADDR, PERIPHERAL_BASE_BCM2836),
            mmio_lock: None,
            gpio_lock: None,
        }
    }

    /// Attach a VideoCore model for in-process builds.
    pub fn with_vc(mut self, vc: Box<dyn VcModel>) -> Self {
        self.vc = Some(vc);
        self
    }

    /// Shrink the mailbox and DMA poll budgets, for timeout tests.
    pub fn with_poll_budgets(mut self, mailbox: u32, dma: u32) -> Self {
        self.mailbox.set_watchdog(mailbox);
        self.dma.set_wait_budget(dma);
        self
    }

    pub fn window(&self) -> &W {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut W {
        &mut self.window
    }

    /// Execute a program atomically from other clients' perspective
    /// (the single-threaded loop provides the atomicity). The program
    /// comes back mutated so reads and abort outputs are visible.
    pub fn mmio_perform(&mut self, program: &mut MmioProgram) -> Result<(), Errno> {
        validate(&self.window, program)?;
        let mut env = ExecutorEnv {
            window: &mut self.window,
            clock: self.clock.as_ref(),
            dma: &mut self.dma,
            shm: self.shm.as_ref(),
        };
        execute(&mut env, program);
        Ok(())
    }

    /// One property-channel transaction; `words` is rewritten with the
    /// VideoCore's reply.
    pub fn mailbox_call(&mut self, words: &mut [u32]) -> Result<(), Errno> {
        if words.is_empty() {
            return Err(Errno::EINVAL);
        }
        let vc: Option<&mut dyn VcModel> = match self.vc.as_mut() {
            Some(b) => Some(&mut **b),
            None => None,
        };
        self.mailbox
            .call(&mut self.window, self.clock.as_ref(), vc, words)
    }

    pub fn gpio_set_function(
        &mut self,
        pin: u32,
        function: bramble_proto::GpioFunction,
    ) -> Result<(), Errno> {
        gpio::set_function(&mut self.window, self.clock.as_ref(), pin, function)
    }

    pub fn gpio_set_pull(&mut self, pin: u32, pull: bramble_proto::GpioPull) -> Result<(), Errno> {
        gpio::set_pull(&mut self.window, self.clock.as_ref(), pin, pull)
    }

    pub fn gpio_set_detect(
        &mut self,
        pin: u32,
        detect: bramble_proto::GpioDetect,
        enable: bool,
    ) -> Result<(), Errno> {
        gpio::set_detect(&mut self.window, pin, detect, enable)
    }

    pub fn gpio_status(&mut self, pin: u32) -> Result<u32, Errno> {
        gpio::status(&mut self.window, pin)
    }

    pub fn gpio_event(&mut self, pin: u32) -> Result<u32, Errno> {
        gpio::event(&mut self.window, pin)
    }

    fn lock(slot: &mut Option<Pid>, origin: Pid) -> Result<(), Errno> {
        match slot {
            None => {
                *slot = Some(origin);
                Ok(())
            }
            Some(holder) if *holder == origin => Ok(()),
            Some(_) => Err(Errno::EAGAIN),
        }
    }

    fn unlock(slot: &mut Option<Pid>, origin: Pid) -> Result<(), Errno> {
        match slot {
            Some(holder) if *holder == origin => {
                *slot = None;
                Ok(())
            }
            _ => Err(Errno::EPERM),
        }
    }

    pub fn mmio_lock(&mut self, origin: Pid) -> Result<(), Errno> {
        Self::lock(&mut self.mmio_lock, origin)
    }

    pub fn mmio_unlock(&mut self, origin: Pid) -> Result<(), Errno> {
        Self::unlock(&mut self.mmio_lock, origin)
    }

    pub fn gpio_lock(&mut self, origin: Pid) -> Result<(), Errno> {
        Self::lock(&mut self.gpio_lock, origin)
    }

    pub fn gpio_unlock(&mut self, origin: Pid) -> Result<(), Errno> {
        Self::unlock(&mut self.gpio_lock, origin)
    }
}

fn status_reply(ctx: &mut Ctx<'_>, result: Result<(), Errno>) {
    let response = match result {
        Ok(()) => StatusResponse::ok(),
        Err(errno) => StatusResponse::error(errno),
    };
    ctx.reply(response.encode());
}

impl<W: MmioWindow + 'static> Service for IoMemServer<W> {
    fn handle(&mut self, ctx: &mut Ctx<'_>, env: Envelope) {
        if !ctx.validate_origin(env.origin) {
            ctx.reply(StatusResponse::error(Errno::EINVAL).encode());
            return;
        }
        match env.code {
            RpcCode::IomemMmioPerform => {
                let response = match MmioProgram::decode(&env.data) {
                    Ok(mut program) => match self.mmio_perform(&mut program) {
                        Ok(()) => MmioPerformResponse { status: 0, program },
                        Err(errno) => MmioPerformResponse {
                            status: errno.status(),
                            program: MmioProgram::default(),
                        },
                    },
                    Err(_) => MmioPerformResponse {
                        status: Errno::EINVAL.status(),
                        program: MmioProgram::default(),
                    },
                };
                ctx.reply(response.encode());
            }
            RpcCode::IomemMailbox => {
                let response = match MailboxBuffer::decode(&env.data) {
                    Ok(mut buffer) => match self.mailbox_call(&mut buffer.words) {
                        Ok(()) => IoctlResponse {
                            status: 0,
                            container: buffer.encode(),
                        },
                        Err(errno) => IoctlResponse::error(errno),
                    },
                    Err(_) => IoctlResponse::error(Errno::EINVAL),
                };
                ctx.reply(response.encode());
            }
            RpcCode::IomemGpioSetFunction => {
                let result = GpioFunctionRequest::decode(&env.data)
                    .map_err(|_| Errno::EINVAL)
                    .and_then(|req| self.gpio_set_function(req.pin, req.function));
                status_reply(ctx, result);
            }
            RpcCode::IomemGpioSetPull => {
                let result = GpioPullRequest::decode(&env.data)
                    .map_err(|_| Errno::EINVAL)
                    .and_then(|req| self.gpio_set_pull(req.pin, req.pull));
                status_reply(ctx, result);
            }
            RpcCode::IomemGpioSetDetect => {
                let result = GpioDetectRequest::decode(&env.data)
                    .map_err(|_| Errno::EINVAL)
                    .and_then(|req| self.gpio_set_detect(req.pin, req.detect, req.value != 0));
                status_reply(ctx, result);
            }
            RpcCode::IomemGpioStatus | RpcCode::IomemGpioEvent => {
                let result = GpioPinRequest::decode(&env.data)
                    .map_err(|_| Errno::EINVAL)
                    .and_then(|req| {
                        if env.code == RpcCode::IomemGpioStatus {
                            self.gpio_status(req.pin)
                        } else {
                            self.gpio_event(req.pin)
                        }
                    });
                let response = match result {
                    Ok(value) => GpioValueResponse { status: 0, value },
                    Err(errno) => GpioValueResponse {
                        status: errno.status(),
                        value: 0,
                    },
                };
                ctx.reply(response.encode());
            }
            RpcCode::IomemMmioLock => status_reply(ctx, self.mmio_lock(env.origin)),
            RpcCode::IomemMmioUnlock => status_reply(ctx, self.mmio_unlock(env.origin)),
            RpcCode::IomemGpioLock => status_reply(ctx, self.gpio_lock(env.origin)),
            RpcCode::IomemGpioUnlock => status_reply(ctx, self.gpio_unlock(env.origin)),
            other => {
                debug!(?other, "unexpected code at the gateway");
                ctx.reply(StatusResponse::error(Errno::ENOSYS).encode());
            }
        }
    }
}
