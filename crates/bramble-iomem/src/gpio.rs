//! GPIO register operations. All of them are short synchronous
//! register dances; exclusion across clients is advisory via the GPIO
//! lock, not enforced here.

use bramble_hw::regs::gpio;
use bramble_hw::MmioWindow;
use bramble_proto::{Errno, GpioDetect, GpioFunction, GpioPull, GPIO_PIN_COUNT};
use bramble_rpc::time::Clock;

/// Cycle count of the settle delays in the pull sequence and after a
/// function select, straight from the datasheet's "wait 150 cycles".
const SETTLE_CYCLES: u64 = 150;

fn check_pin(pin: u32) -> Result<(), Errno> {
    if pin >= GPIO_PIN_COUNT {
        return Err(Errno::EINVAL);
    }
    Ok(())
}

/// Bank-split helper: register for pins 0..32 vs 32..54 plus the bit.
fn bank(pin: u32, reg0: u32, reg1: u32) -> (u32, u32) {
    if pin < 32 {
        (reg0, 1 << pin)
    } else {
        (reg1, 1 << (pin - 32))
    }
}

pub fn set_function<W: MmioWindow>(
    window: &mut W,
    clock: &dyn Clock,
    pin: u32,
    function: GpioFunction,
) -> Result<(), Errno> {
    check_pin(pin)?;
    let register = gpio::GPFSEL0 + (pin / 10) * 4;
    let shift = (pin % 10) * 3;
    let mut value = window.read32(register);
    value &= !(0b111 << shift);
    value |= (function as u32 & 0b111) << shift;
    window.write32(register, value);
    clock.delay_cycles(SETTLE_CYCLES);
    Ok(())
}

/// The classic three-step pull dance: program GPPUD, clock it into the
/// pin via GPPUDCLKn, then drop both back to zero.
pub fn set_pull<W: MmioWindow>(
    window: &mut W,
    clock: &dyn Clock,
    pin: u32,
    pull: GpioPull,
) -> Result<(), Errno> {
    check_pin(pin)?;
    let (clk_register, bit) = bank(pin, gpio::GPPUDCLK0, gpio::GPPUDCLK1);
    window.write32(gpio::GPPUD, pull as u32);
    clock.delay_cycles(SETTLE_CYCLES);
    window.write32(clk_register, bit);
    clock.delay_cycles(SETTLE_CYCLES);
    window.write32(gpio::GPPUD, 0);
    window.write32(clk_register, 0);
    Ok(())
}

pub fn set_detect<W: MmioWindow>(
    window: &mut W,
    pin: u32,
    detect: GpioDetect,
    enable: bool,
) -> Result<(), Errno> {
    check_pin(pin)?;
    let (reg0, reg1) = match detect {
        GpioDetect::Low => (gpio::GPLEN0, gpio::GPLEN1),
        GpioDetect::High => (gpio::GPHEN0, gpio::GPHEN1),
        GpioDetect::RisingEdge => (gpio::GPREN0, gpio::GPREN1),
        GpioDetect::FallingEdge => (gpio::GPFEN0, gpio::GPFEN1),
    };
    let (register, bit) = bank(pin, reg0, reg1);
    let mut value = window.read32(register);
    if enable {
        value |= bit;
    } else {
        value &= !bit;
    }
    window.write32(register, value);
    Ok(())
}

/// Current level of the pin, from GPLEVn.
pub fn status<W: MmioWindow>(window: &mut W, pin: u32) -> Result<u32, Errno> {
    check_pin(pin)?;
    let (register, bit) = bank(pin, gpio::GPLEV0, gpio::GPLEV1);
    Ok((window.read32(register) & bit != 0) as u32)
}

/// Pending event for the pin, from GPEDSn; a set bit is consumed by
/// writing it back.
pub fn event<W: MmioWindow>(window: &mut W, pin: u32) -> Result<u32, Errno> {
    check_pin(pin)?;
    let (register, bit) = bank(pin, gpio::GPEDS0, gpio::GPEDS1);
    let pending = window.read32(register) & bit != 0;
    if pending {
        window.write32(register, bit);
    }
    Ok(pending as u32)
}
