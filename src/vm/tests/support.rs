//! Toy instruction set for driving the scheduler in tests
//!
//! One 16-bit word per instruction, opcode in the high byte, operand in the
//! low byte.

use crate::runtime::arrays::Array;
use crate::vm::{ClumpId, Codespace, Decoder, Executor, VMError, VMResult, VmContext};

pub const NOP: u16 = 0x0000;
/// Finish the current clump and signal its dependents
pub const DONE: u16 = 0x0100;
/// Request a halt at the end of the pass
pub const HALT: u16 = 0x0200;
/// Fail with an execution error
pub const FAIL: u16 = 0x0300;
/// Allocate a nested array with `operand` children of 4 bytes each
pub const ALLOC: u16 = 0x0400;
/// Make clump `operand` wait for one more signal
pub const WAIT: u16 = 0x0500;

/// Decodes one word, never touches VM state
#[derive(Debug, Default)]
pub struct WordDecoder {
    pub decoded: usize,
}

impl Decoder for WordDecoder {
    type Instruction = u16;

    fn decode(
        &mut self,
        code: Codespace<'_>,
        pc: usize,
    ) -> VMResult<(u16, usize)> {
        let word = code.word_at(pc)?;
        self.decoded += 1;
        Ok((word, pc + 2))
    }
}

/// One executed instruction as seen by the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub pass: u64,
    pub clump: ClumpId,
    pub word: u16,
    /// Fire count of the clump when its instruction executed
    pub fire_count: u8,
}

/// Executes the toy instruction set and records every step
#[derive(Debug, Default)]
pub struct ToyExecutor {
    pub steps: Vec<Step>,
}

impl ToyExecutor {
    /// Clump ids in execution order
    pub fn order(&self) -> Vec<usize> {
        self.steps.iter().map(|s| s.clump.0).collect()
    }

    fn done(ctx: &mut VmContext<'_>) -> VMResult<()> {
        let current = ctx
            .current_clump()
            .ok_or_else(|| VMError::InvalidState("no current clump".to_string()))?;
        // A finished clump waits for a new signal before running again
        ctx.clump_mut(current)?.set_fire_count(1);

        for &dependent in ctx.dependents(current)? {
            let clump = ctx.clump_mut(ClumpId(dependent as usize))?;
            clump.set_fire_count(clump.fire_count().saturating_sub(1));
            if clump.is_runnable() {
                ctx.activate_clump();
            }
        }
        ctx.retire_clump()
    }
}

impl Executor<u16> for ToyExecutor {
    fn execute(
        &mut self,
        word: u16,
        ctx: &mut VmContext<'_>,
    ) -> VMResult<()> {
        let clump = ctx
            .current_clump()
            .ok_or_else(|| VMError::InvalidState("no current clump".to_string()))?;
        self.steps.push(Step {
            pass: ctx.passes(),
            clump,
            word,
            fire_count: ctx.clump(clump)?.fire_count(),
        });

        match word & 0xFF00 {
            NOP => Ok(()),
            DONE => Self::done(ctx),
            HALT => {
                ctx.request_halt();
                Ok(())
            }
            FAIL => Err(VMError::Execution(format!("fail at {}", clump))),
            ALLOC => {
                let pool = ctx.pool().clone();
                let children = (0..(word & 0xFF))
                    .map(|_| Array::bytes(&pool, 4))
                    .collect::<Result<Vec<_>, _>>()?;
                ctx.arrays_mut().insert(Array::nested(children));
                Ok(())
            }
            WAIT => {
                let target = ctx.clump_mut(ClumpId((word & 0xFF) as usize))?;
                let was_runnable = target.is_runnable();
                target.set_fire_count(target.fire_count().saturating_add(1));
                if was_runnable {
                    ctx.retire_clump()?;
                }
                Ok(())
            }
            _ => Err(VMError::Execution(format!("unknown word {:#06x}", word))),
        }
    }
}
