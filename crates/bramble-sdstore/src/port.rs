//! The driver's view of the peripheral gateway.
//!
//! In production this is an RPC client of `/dev/iomem`; in tests it is
//! the gateway server itself, called in-process. Either way the driver
//! suspends until the gateway finishes, so the interface is
//! synchronous from this side.

use crate::SdError;
use bramble_hw::MmioWindow;
use bramble_iomem::IoMemServer;
use bramble_proto::{GpioDetect, GpioFunction, GpioPull, MmioProgram};

pub trait IoMemPort {
    fn mmio_perform(&mut self, program: &mut MmioProgram) -> Result<(), SdError>;
    fn mailbox(&mut self, words: &mut [u32]) -> Result<(), SdError>;
    fn gpio_set_function(&mut self, pin: u32, function: GpioFunction) -> Result<(), SdError>;
    fn gpio_set_pull(&mut self, pin: u32, pull: GpioPull) -> Result<(), SdError>;
    fn gpio_set_detect(&mut self, pin: u32, detect: GpioDetect, enable: bool)
        -> Result<(), SdError>;
    fn gpio_status(&mut self, pin: u32) -> Result<u32, SdError>;
    fn gpio_event(&mut self, pin: u32) -> Result<u32, SdError>;
}

/// Gateway reached by direct call, for single-process builds and the
/// test suites.
pub struct InProcessPort<W: MmioWindow> {
    pub server: IoMemServer<W>,
}

impl<W: MmioWindow> InProcessPort<W> {
    pub fn new(server: IoMemServer<W>) -> Self {
        Self { server }
    }
}

impl<W: MmioWindow> IoMemPort for InProcessPort<W> {
    fn mmio_perform(&mut self, program: &mut MmioProgram) -> Result<(), SdError> {
        self.server.mmio_perform(program).map_err(|_| SdError::Io)
    }

    fn mailbox(&mut self, words: &mut [u32]) -> Result<(), SdError> {
        self.server.mailbox_call(words).map_err(|_| SdError::Mailbox)
    }

    fn gpio_set_function(&mut self, pin: u32, function: GpioFunction) -> Result<(), SdError> {
        self.server
            .gpio_set_function(pin, function)
            .map_err(|_| SdError::Io)
    }

    fn gpio_set_pull(&mut self, pin: u32, pull: GpioPull) -> Result<(), SdError> {
        self.server.gpio_set_pull(pin, pull).map_err(|_| SdError::Io)
    }

    fn gpio_set_detect(
        &mut self,
        pin: u32,
        detect: GpioDetect,
        enable: bool,
    ) -> Result<(), SdError> {
        self.server
            .gpio_set_detect(pin, detect, enable)
            .map_err(|_| SdError::Io)
    }

    fn gpio_status(&mut self, pin: u32) -> Result<u32, SdError> {
        self.server.gpio_status(pin).map_err(|_| SdError::Io)
    }

    fn gpio_event(&mut self, pin: u32) -> Result<u32, SdError> {
        self.server.gpio_event(pin).map_err(|_| SdError::Io)
    }
}
