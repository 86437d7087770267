use bramble_hw::mock::Access;
use bramble_hw::regs::gpio;
use bramble_hw::MockPeripheral;
use bramble_iomem::IoMemServer;
use bramble_proto::{pins, Errno, GpioDetect, GpioFunction, GpioPull};
use bramble_rpc::shm::MockSharedMemory;
use bramble_rpc::time::MockClock;
use std::rc::Rc;

fn server(window: MockPeripheral) -> (IoMemServer<MockPeripheral>, MockClock) {
    let clock = MockClock::new();
    let shm = MockSharedMemory::new();
    let server = IoMemServer::new(window, Rc::new(clock.clone()), Rc::new(shm));
    (server, clock)
}

#[test]
fn pull_up_on_card_detect_issues_the_classic_sequence() {
    let (mut srv, clock) = server(MockPeripheral::new());
    srv.gpio_set_pull(pins::CARD_DETECT, GpioPull::Up).unwrap();

    // pin 47 lives in the high bank: bit 47-32
    assert_eq!(
        srv.window().writes(),
        vec![
            (gpio::GPPUD, 2),
            (gpio::GPPUDCLK1, 1 << 15),
            (gpio::GPPUD, 0),
            (gpio::GPPUDCLK1, 0),
        ]
    );
    // two settle delays of at least 150 cycles each
    assert!(clock.delayed_cycles() >= 300);
}

#[test]
fn function_select_rewrites_only_the_pin_field() {
    let mut window = MockPeripheral::new();
    // neighbouring pins already configured
    window.set(gpio::GPFSEL4, 0o7 << 18);

    let (mut srv, _clock) = server(window);
    srv.gpio_set_function(pins::CARD_DETECT, GpioFunction::Alt3)
        .unwrap();

    // pin 47 -> GPFSEL4, field 7 (bits 21..24); ALT3 encodes as 0b111
    assert_eq!(srv.window().get(gpio::GPFSEL4), (0o7 << 18) | (0b111 << 21));

    srv.window_mut().take_log();
    srv.gpio_set_function(pins::CARD_DETECT, GpioFunction::Input)
        .unwrap();
    assert_eq!(srv.window().get(gpio::GPFSEL4), 0o7 << 18);
}

#[test]
fn detect_enable_and_disable_touch_the_right_bank() {
    let (mut srv, _clock) = server(MockPeripheral::new());
    srv.gpio_set_detect(pins::CARD_DETECT, GpioDetect::RisingEdge, true)
        .unwrap();
    assert_eq!(srv.window().get(gpio::GPREN1), 1 << 15);

    srv.gpio_set_detect(pins::CARD_DETECT, GpioDetect::RisingEdge, false)
        .unwrap();
    assert_eq!(srv.window().get(gpio::GPREN1), 0);

    srv.gpio_set_detect(3, GpioDetect::Low, true).unwrap();
    assert_eq!(srv.window().get(gpio::GPLEN0), 1 << 3);
}

#[test]
fn status_reads_the_level_register() {
    let mut window = MockPeripheral::new();
    window.set(gpio::GPLEV1, 1 << 15);
    let (mut srv, _clock) = server(window);

    assert_eq!(srv.gpio_status(pins::CARD_DETECT), Ok(1));
    assert_eq!(srv.gpio_status(pins::CLK), Ok(0));
}

#[test]
fn event_read_consumes_the_pending_bit() {
    let mut window = MockPeripheral::new();
    window.set(gpio::GPEDS1, 1 << 15);
    let (mut srv, _clock) = server(window);

    assert_eq!(srv.gpio_event(pins::CARD_DETECT), Ok(1));
    // write-to-clear of exactly the consumed bit
    assert!(srv
        .window()
        .log()
        .contains(&Access::Write {
            offset: gpio::GPEDS1,
            value: 1 << 15
        }));
    // second query finds nothing pending
    srv.window_mut().set(gpio::GPEDS1, 0);
    assert_eq!(srv.gpio_event(pins::CARD_DETECT), Ok(0));
}

#[test]
fn out_of_range_pin_is_invalid() {
    let (mut srv, _clock) = server(MockPeripheral::new());
    assert_eq!(
        srv.gpio_set_pull(54, GpioPull::Down),
        Err(Errno::EINVAL)
    );
    assert_eq!(srv.gpio_status(255), Err(Errno::EINVAL));
    assert!(srv.window().log().is_empty());
}

#[test]
fn advisory_locks_are_per_client() {
    let (mut srv, _clock) = server(MockPeripheral::new());
    srv.gpio_lock(10).unwrap();
    // re-locking by the holder is fine
    srv.gpio_lock(10).unwrap();
    assert_eq!(srv.gpio_lock(11), Err(Errno::EAGAIN));
    assert_eq!(srv.gpio_unlock(11), Err(Errno::EPERM));
    srv.gpio_unlock(10).unwrap();
    srv.gpio_lock(11).unwrap();

    // the MMIO lock is independent state
    srv.mmio_lock(10).unwrap();
    assert_eq!(srv.mmio_lock(11), Err(Errno::EAGAIN));
}
