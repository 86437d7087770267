//! Peripheral gateway messages: MMIO programs and GPIO parameter blocks.

use crate::wire::{DecodeError, Message, Reader, Writer};

/// One action inside an MMIO program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MmioAction {
    /// Re-read while masked value equals `value`.
    LoopEqual = 1,
    LoopNotEqual,
    /// Re-read while masked value is non-zero.
    LoopTrue,
    LoopFalse,
    Read,
    ReadOr,
    ReadAnd,
    Write,
    WritePreviousRead,
    WriteOrPreviousRead,
    WriteAndPreviousRead,
    Delay,
    Sleep,
    DmaRead,
    DmaWrite,
}

impl MmioAction {
    pub fn from_u32(raw: u32) -> Result<Self, DecodeError> {
        use MmioAction::*;
        Ok(match raw {
            1 => LoopEqual,
            2 => LoopNotEqual,
            3 => LoopTrue,
            4 => LoopFalse,
            5 => Read,
            6 => ReadOr,
            7 => ReadAnd,
            8 => Write,
            9 => WritePreviousRead,
            10 => WriteOrPreviousRead,
            11 => WriteAndPreviousRead,
            12 => Delay,
            13 => Sleep,
            14 => DmaRead,
            15 => DmaWrite,
            other => return Err(DecodeError::UnknownTag(other)),
        })
    }

    pub fn is_read(self) -> bool {
        matches!(self, MmioAction::Read | MmioAction::ReadOr | MmioAction::ReadAnd)
    }

    pub fn is_write_previous(self) -> bool {
        matches!(
            self,
            MmioAction::WritePreviousRead
                | MmioAction::WriteOrPreviousRead
                | MmioAction::WriteAndPreviousRead
        )
    }

    pub fn is_loop(self) -> bool {
        matches!(
            self,
            MmioAction::LoopEqual
                | MmioAction::LoopNotEqual
                | MmioAction::LoopTrue
                | MmioAction::LoopFalse
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum MmioShift {
    #[default]
    None = 0,
    Left,
    Right,
}

impl MmioShift {
    fn from_u32(raw: u32) -> Result<Self, DecodeError> {
        Ok(match raw {
            0 => MmioShift::None,
            1 => MmioShift::Left,
            2 => MmioShift::Right,
            other => return Err(DecodeError::UnknownTag(other)),
        })
    }

    pub fn apply(self, value: u32, amount: u32) -> u32 {
        match self {
            MmioShift::None => value,
            _ if amount == 0 => value,
            MmioShift::Left => value.wrapping_shl(amount),
            MmioShift::Right => value.wrapping_shr(amount),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum MmioSleep {
    #[default]
    None = 0,
    Milliseconds,
    Seconds,
}

impl MmioSleep {
    fn from_u32(raw: u32) -> Result<Self, DecodeError> {
        Ok(match raw {
            0 => MmioSleep::None,
            1 => MmioSleep::Milliseconds,
            2 => MmioSleep::Seconds,
            other => return Err(DecodeError::UnknownTag(other)),
        })
    }
}

/// Output-only: why a step stopped executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum MmioAbort {
    #[default]
    None = 0,
    Timeout,
    Invalid,
}

impl MmioAbort {
    fn from_u32(raw: u32) -> Result<Self, DecodeError> {
        Ok(match raw {
            0 => MmioAbort::None,
            1 => MmioAbort::Timeout,
            2 => MmioAbort::Invalid,
            other => return Err(DecodeError::UnknownTag(other)),
        })
    }
}

/// One step of an MMIO program. The executor fills `value` for reads,
/// and `abort` / `skipped` on the way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmioStep {
    pub action: MmioAction,
    /// Offset into the peripheral window.
    pub offset: u32,
    /// Input operand for writes and loop comparisons; read result on
    /// the way back.
    pub value: u32,
    pub shift: MmioShift,
    pub shift_value: u32,
    /// Mask applied to loop reads before compare (0 = no mask).
    pub loop_and: u32,
    /// Loop bound; 0 means unbounded.
    pub loop_max_iterations: u32,
    /// When set, a loop read whose raw value intersects `failure_value`
    /// aborts the step as a timeout.
    pub failure_condition: bool,
    pub failure_value: u32,
    pub sleep: MmioSleep,
    pub sleep_value: u32,
    pub abort: MmioAbort,
    pub skipped: bool,
    /// Byte count for the DMA actions.
    pub dma_copy_size: u32,
}

impl MmioStep {
    pub fn new(action: MmioAction, offset: u32) -> Self {
        Self {
            action,
            offset,
            value: 0,
            shift: MmioShift::None,
            shift_value: 0,
            loop_and: 0,
            loop_max_iterations: 0,
            failure_condition: false,
            failure_value: 0,
            sleep: MmioSleep::None,
            sleep_value: 0,
            abort: MmioAbort::None,
            skipped: false,
            dma_copy_size: 0,
        }
    }

    pub fn read(offset: u32) -> Self {
        Self::new(MmioAction::Read, offset)
    }

    pub fn write(offset: u32, value: u32) -> Self {
        let mut step = Self::new(MmioAction::Write, offset);
        step.value = value;
        step
    }

    pub fn with_value(mut self, value: u32) -> Self {
        self.value = value;
        self
    }

    pub fn with_loop(mut self, mask: u32, max_iterations: u32) -> Self {
        self.loop_and = mask;
        self.loop_max_iterations = max_iterations;
        self
    }

    pub fn with_sleep(mut self, sleep: MmioSleep, amount: u32) -> Self {
        self.sleep = sleep;
        self.sleep_value = amount;
        self
    }

    pub fn with_failure(mut self, mask: u32) -> Self {
        self.failure_condition = true;
        self.failure_value = mask;
        self
    }

    fn put(&self, w: &mut Writer) {
        w.put_u32(self.action as u32);
        w.put_u32(self.offset);
        w.put_u32(self.value);
        w.put_u32(self.shift as u32);
        w.put_u32(self.shift_value);
        w.put_u32(self.loop_and);
        w.put_u32(self.loop_max_iterations);
        w.put_u32(self.failure_condition as u32);
        w.put_u32(self.failure_value);
        w.put_u32(self.sleep as u32);
        w.put_u32(self.sleep_value);
        w.put_u32(self.abort as u32);
        w.put_u32(self.skipped as u32);
        w.put_u32(self.dma_copy_size);
    }

    fn get(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            action: MmioAction::from_u32(r.get_u32()?)?,
            offset: r.get_u32()?,
            value: r.get_u32()?,
            shift: MmioShift::from_u32(r.get_u32()?)?,
            shift_value: r.get_u32()?,
            loop_and: r.get_u32()?,
            loop_max_iterations: r.get_u32()?,
            failure_condition: r.get_u32()? != 0,
            failure_value: r.get_u32()?,
            sleep: MmioSleep::from_u32(r.get_u32()?)?,
            sleep_value: r.get_u32()?,
            abort: MmioAbort::from_u32(r.get_u32()?)?,
            skipped: r.get_u32()? != 0,
            dma_copy_size: r.get_u32()?,
        })
    }
}

/// A whole program: ordered steps, executed atomically from the
/// clients' point of view and handed back mutated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MmioProgram {
    pub steps: Vec<MmioStep>,
}

impl MmioProgram {
    pub fn new(steps: Vec<MmioStep>) -> Self {
        Self { steps }
    }
}

impl Message for MmioProgram {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_u32(self.steps.len() as u32);
        for step in &self.steps {
            step.put(&mut w);
        }
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let count = r.get_u32()? as usize;
        let mut steps = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            steps.push(MmioStep::get(&mut r)?);
        }
        r.expect_end()?;
        Ok(Self { steps })
    }
}

/// PERFORM response: status plus the mutated program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MmioPerformResponse {
    pub status: i32,
    pub program: MmioProgram,
}

impl Message for MmioPerformResponse {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_i32(self.status);
        let body = self.program.encode();
        w.put_bytes(&body);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let status = r.get_i32()?;
        let body = r.get_bytes()?;
        r.expect_end()?;
        Ok(Self {
            status,
            program: MmioProgram::decode(&body)?,
        })
    }
}

// GPIO parameter blocks. Function selector values follow the GPFSELn
// encoding, which is not monotonic across the ALT functions.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum GpioFunction {
    Input = 0x0,
    Output = 0x1,
    Alt0 = 0x4,
    Alt1 = 0x5,
    Alt2 = 0x6,
    Alt3 = 0x7,
    Alt4 = 0x2,
    Alt5 = 0x3,
}

impl GpioFunction {
    fn from_u32(raw: u32) -> Result<Self, DecodeError> {
        use GpioFunction::*;
        Ok(match raw {
            0x0 => Input,
            0x1 => Output,
            0x4 => Alt0,
            0x5 => Alt1,
            0x6 => Alt2,
            0x7 => Alt3,
            0x2 => Alt4,
            0x3 => Alt5,
            other => return Err(DecodeError::UnknownTag(other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum GpioPull {
    None = 0x0,
    Down = 0x1,
    Up = 0x2,
}

impl GpioPull {
    fn from_u32(raw: u32) -> Result<Self, DecodeError> {
        Ok(match raw {
            0 => GpioPull::None,
            1 => GpioPull::Down,
            2 => GpioPull::Up,
            other => return Err(DecodeError::UnknownTag(other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum GpioDetect {
    Low = 0,
    High = 1,
    RisingEdge = 2,
    FallingEdge = 3,
}

impl GpioDetect {
    fn from_u32(raw: u32) -> Result<Self, DecodeError> {
        Ok(match raw {
            0 => GpioDetect::Low,
            1 => GpioDetect::High,
            2 => GpioDetect::RisingEdge,
            3 => GpioDetect::FallingEdge,
            other => return Err(DecodeError::UnknownTag(other)),
        })
    }
}

/// SD-slot pin assignments on the Pi.
pub mod pins {
    pub const CARD_DETECT: u32 = 47;
    pub const CLK: u32 = 48;
    pub const CMD: u32 = 49;
    pub const DAT0: u32 = 50;
    pub const DAT1: u32 = 51;
    pub const DAT2: u32 = 52;
    pub const DAT3: u32 = 53;
}

pub const GPIO_PIN_COUNT: u32 = 54;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioFunctionRequest {
    pub pin: u32,
    pub function: GpioFunction,
}

impl Message for GpioFunctionRequest {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_u32(self.pin);
        w.put_u32(self.function as u32);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self {
            pin: r.get_u32()?,
            function: GpioFunction::from_u32(r.get_u32()?)?,
        };
        r.expect_end()?;
        Ok(msg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioPullRequest {
    pub pin: u32,
    pub pull: GpioPull,
}

impl Message for GpioPullRequest {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_u32(self.pin);
        w.put_u32(self.pull as u32);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self {
            pin: r.get_u32()?,
            pull: GpioPull::from_u32(r.get_u32()?)?,
        };
        r.expect_end()?;
        Ok(msg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioDetectRequest {
    pub pin: u32,
    pub detect: GpioDetect,
    /// 1 enables the detect, 0 disables it.
    pub value: u32,
}

impl Message for GpioDetectRequest {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_u32(self.pin);
        w.put_u32(self.detect as u32);
        w.put_u32(self.value);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self {
            pin: r.get_u32()?,
            detect: GpioDetect::from_u32(r.get_u32()?)?,
            value: r.get_u32()?,
        };
        r.expect_end()?;
        Ok(msg)
    }
}

/// STATUS and EVENT queries carry just the pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioPinRequest {
    pub pin: u32,
}

impl Message for GpioPinRequest {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_u32(self.pin);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self { pin: r.get_u32()? };
        r.expect_end()?;
        Ok(msg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioValueResponse {
    pub status: i32,
    pub value: u32,
}

impl Message for GpioValueResponse {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_i32(self.status);
        w.put_u32(self.value);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self {
            status: r.get_i32()?,
            value: r.get_u32()?,
        };
        r.expect_end()?;
        Ok(msg)
    }
}

/// Raw property buffer for the MAILBOX call, in 32-bit words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxBuffer {
    pub words: Vec<u32>,
}

impl Message for MailboxBuffer {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_u32_slice(&self.words);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let msg = Self {
            words: r.get_u32_vec()?,
        };
        r.expect_end()?;
        Ok(msg)
    }
}
