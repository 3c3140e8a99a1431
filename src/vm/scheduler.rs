//! Cooperative clump scheduler
//!
//! Deterministic round-robin: each pass visits the clump table in ascending
//! index order and advances every runnable clump by exactly one instruction.
//! Whether a clump is runnable is decided at the start of its own turn, so a
//! fire count changed by an earlier clump in the same pass takes effect
//! immediately for later clumps and on the next pass for earlier ones.
//!
//! Decoding and instruction semantics are supplied by the caller through the
//! [`Decoder`] and [`Executor`] traits.

use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::vm::clump::ClumpId;
use crate::vm::context::{VmContext, VmState};
use crate::vm::errors::{VMError, VMResult};
use crate::vm::image::Codespace;

/// Turns a code position into an instruction
pub trait Decoder {
    /// Operand data handed on to the executor
    type Instruction;

    /// Decode the instruction at `pc`
    ///
    /// Returns the instruction and the position right after it. Must not
    /// touch VM state.
    fn decode(
        &mut self,
        code: Codespace<'_>,
        pc: usize,
    ) -> VMResult<(Self::Instruction, usize)>;
}

/// Applies an instruction's effect to the context
///
/// Runs with `ctx.current_clump()` set to the dispatched clump. Fire count
/// updates, `num_active_clumps` bookkeeping and array storage are the
/// executor's business.
pub trait Executor<I> {
    fn execute(
        &mut self,
        instruction: I,
        ctx: &mut VmContext<'_>,
    ) -> VMResult<()>;
}

/// Optional bounds on a single `run` call, checked between passes only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunLimits {
    pub max_passes: Option<u64>,
    pub time_limit: Option<Duration>,
}

impl RunLimits {
    /// No bounds; a program that never retires its clumps runs forever
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_max_passes(
        mut self,
        passes: u64,
    ) -> Self {
        self.max_passes = Some(passes);
        self
    }

    pub fn with_time_limit(
        mut self,
        limit: Duration,
    ) -> Self {
        self.time_limit = Some(limit);
        self
    }

    fn check(
        &self,
        passes: u64,
        started: Instant,
    ) -> VMResult<()> {
        if let Some(max) = self.max_passes {
            if passes >= max {
                return Err(VMError::PassLimitExceeded(passes));
            }
        }
        if let Some(limit) = self.time_limit {
            if started.elapsed() >= limit {
                return Err(VMError::Timeout(limit));
            }
        }
        Ok(())
    }
}

fn abort(
    ctx: &mut VmContext<'_>,
    err: VMError,
) -> VMError {
    warn!(
        "run aborted in {:?} after {} passes: {}",
        ctx.current_clump, ctx.passes, err
    );
    ctx.state = VmState::Aborted;
    err
}

/// Run one pass over the clump table
fn run_pass<D, E>(
    ctx: &mut VmContext<'_>,
    code: Codespace<'_>,
    decoder: &mut D,
    executor: &mut E,
) -> VMResult<()>
where
    D: Decoder,
    E: Executor<D::Instruction>,
{
    for index in 0..ctx.clumps.len() {
        let id = ClumpId(index);
        let clump = ctx.clump(id)?;
        if !clump.is_runnable() {
            continue;
        }
        let pc = clump.current_pc();

        ctx.current_clump = Some(id);
        trace!("pass {}: dispatch {} at {:#x}", ctx.passes, id, pc);

        let (instruction, next_pc) = decoder.decode(code, pc)?;
        ctx.clump_mut(id)?.set_pc(next_pc);
        executor.execute(instruction, ctx)?;
    }
    ctx.current_clump = None;
    Ok(())
}

/// Run a loaded context until it finishes, halts, fails or hits a limit
///
/// A context stopped by a limit stays `Running` and can be resumed by
/// calling `run` again.
pub fn run<D, E>(
    ctx: &mut VmContext<'_>,
    decoder: &mut D,
    executor: &mut E,
    limits: &RunLimits,
) -> VMResult<VmState>
where
    D: Decoder,
    E: Executor<D::Instruction>,
{
    match ctx.state {
        VmState::Ready => ctx.state = VmState::Running,
        VmState::Running => debug!("resuming run after {} passes", ctx.passes),
        other => {
            return Err(VMError::InvalidState(format!(
                "cannot run a {:?} context",
                other
            )))
        }
    }

    let image = ctx
        .image
        .ok_or_else(|| VMError::InvalidState("no image loaded".to_string()))?;
    let code = Codespace::new(image, ctx.layout.codespace)?;

    debug!(
        "run: {} clumps, {} active",
        ctx.clumps.len(),
        ctx.num_active_clumps
    );

    let started = Instant::now();
    let mut passes_this_run = 0u64;

    while ctx.state == VmState::Running {
        if let Err(err) = limits.check(passes_this_run, started) {
            warn!("run stopped between passes: {}", err);
            return Err(err);
        }

        if let Err(err) = run_pass(ctx, code, decoder, executor) {
            return Err(abort(ctx, err));
        }
        ctx.passes += 1;
        passes_this_run += 1;

        if ctx.num_active_clumps == 0 {
            ctx.state = VmState::Finished;
        } else if ctx.halt_requested {
            ctx.state = VmState::Halted;
        }
    }

    debug!("run ended {:?} after {} passes", ctx.state, ctx.passes);
    Ok(ctx.state)
}
