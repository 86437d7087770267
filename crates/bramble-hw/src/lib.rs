//! SoC peripheral window: register map, access abstraction, and the
//! recording mock the test suites drive.

pub mod mock;
pub mod regs;
mod window;

pub use mock::MockPeripheral;
pub use window::{DeviceWindow, MmioWindow, WindowError};
