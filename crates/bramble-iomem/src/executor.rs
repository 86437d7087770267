//! The MMIO program executor.
//!
//! Programs run step by step with two pieces of explicit run state: the
//! previous read value (feeding the write-previous variants) and the
//! skip flag an abort raises. A failed step never stops the walk — the
//! remaining steps are marked skipped so the caller sees exactly how
//! far execution got.

use crate::dma::DmaEngine;
use bramble_hw::MmioWindow;
use bramble_proto::{Errno, MmioAbort, MmioAction, MmioProgram, MmioSleep, MmioStep};
use bramble_rpc::shm::SharedMemory;
use bramble_rpc::time::Clock;
use tracing::trace;

pub struct ExecutorEnv<'a, W: MmioWindow> {
    pub window: &'a mut W,
    pub clock: &'a dyn Clock,
    pub dma: &'a mut DmaEngine,
    pub shm: &'a dyn SharedMemory,
}

/// Whole-program checks, run before any register is touched.
pub fn validate<W: MmioWindow>(window: &W, program: &MmioProgram) -> Result<(), Errno> {
    for (idx, step) in program.steps.iter().enumerate() {
        if step.action.is_write_previous() {
            let fed_by_read = idx
                .checked_sub(1)
                .map(|prev| program.steps[prev].action.is_read())
                .unwrap_or(false);
            if !fed_by_read {
                return Err(Errno::EINVAL);
            }
        }
        match step.action {
            // pure time actions carry no offset
            MmioAction::Delay | MmioAction::Sleep => {}
            _ => {
                window
                    .validate(step.offset, 4)
                    .map_err(|_| Errno::EINVAL)?;
            }
        }
    }
    Ok(())
}

fn apply_sleep(clock: &dyn Clock, sleep: MmioSleep, amount: u32) {
    if amount == 0 {
        return;
    }
    match sleep {
        MmioSleep::None => {}
        MmioSleep::Milliseconds => clock.sleep_ms(amount as u64),
        MmioSleep::Seconds => clock.sleep_ms(amount as u64 * 1000),
    }
}

fn loop_condition_holds(action: MmioAction, operand: u32, shifted: u32) -> bool {
    match action {
        MmioAction::LoopEqual => operand == shifted,
        MmioAction::LoopNotEqual => operand != shifted,
        MmioAction::LoopTrue => shifted != 0,
        MmioAction::LoopFalse => shifted == 0,
        _ => false,
    }
}

/// Outcome of one loop step.
enum LoopExit {
    Done(u32),
    /// Timed out (bound exhausted or failure predicate hit); carries
    /// the value to report.
    Timeout(u32),
}

fn run_loop<W: MmioWindow>(window: &mut W, clock: &dyn Clock, step: &MmioStep) -> LoopExit {
    let mut remaining = (step.loop_max_iterations > 0).then_some(step.loop_max_iterations);
    loop {
        let raw = window.read32(step.offset);
        let masked = if step.loop_and != 0 {
            raw & step.loop_and
        } else {
            raw
        };
        let shifted = step.shift.apply(masked, step.shift_value);
        if !loop_condition_holds(step.action, step.value, shifted) {
            return LoopExit::Done(shifted);
        }
        // the failure predicate inspects the raw register value and
        // reports it back so the caller can decode the error bits
        if step.failure_condition && raw & step.failure_value != 0 {
            trace!(offset = step.offset, raw, "loop failure predicate hit");
            return LoopExit::Timeout(raw);
        }
        match remaining.as_mut() {
            Some(0) => return LoopExit::Timeout(shifted),
            Some(n) => *n -= 1,
            None => {}
        }
        apply_sleep(clock, step.sleep, step.sleep_value);
    }
}

/// Run a validated program, mutating it in place.
pub fn execute<W: MmioWindow>(env: &mut ExecutorEnv<'_, W>, program: &mut MmioProgram) {
    let mut skip = false;
    let mut prev_read: u32 = 0;

    for step in &mut program.steps {
        step.abort = MmioAbort::None;
        step.skipped = false;
        if skip {
            step.skipped = true;
            continue;
        }
        match step.action {
            MmioAction::LoopEqual
            | MmioAction::LoopNotEqual
            | MmioAction::LoopTrue
            | MmioAction::LoopFalse => match run_loop(env.window, env.clock, step) {
                LoopExit::Done(value) => {
                    step.value = value;
                }
                LoopExit::Timeout(value) => {
                    step.value = value;
                    step.abort = MmioAbort::Timeout;
                    skip = true;
                }
            },
            MmioAction::Read => {
                step.value = env.window.read32(step.offset);
            }
            MmioAction::ReadOr => {
                step.value = env.window.read32(step.offset) | step.value;
            }
            MmioAction::ReadAnd => {
                step.value = env.window.read32(step.offset) & step.value;
            }
            MmioAction::Write => {
                env.window.write32(step.offset, step.value);
            }
            MmioAction::WritePreviousRead => {
                env.window.write32(step.offset, prev_read);
            }
            MmioAction::WriteOrPreviousRead => {
                env.window.write32(step.offset, prev_read | step.value);
            }
            MmioAction::WriteAndPreviousRead => {
                env.window.write32(step.offset, prev_read & step.value);
            }
            MmioAction::Delay => {
                env.clock.delay_cycles(step.value as u64);
            }
            MmioAction::Sleep => {
                apply_sleep(env.clock, step.sleep, step.sleep_value);
            }
            MmioAction::DmaRead | MmioAction::DmaWrite => {
                let outcome = env.dma.transfer(env.window, env.clock, env.shm, step);
                if let Err(abort) = outcome {
                    step.abort = abort;
                    skip = true;
                }
            }
        }
        // shift applies to the plain read family only; loops already
        // shifted per iteration
        if step.action.is_read() {
            step.value = step.shift.apply(step.value, step.shift_value);
            prev_read = step.value;
        }
    }
}
