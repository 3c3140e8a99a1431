//! End-to-end load → run → teardown with a variable-length instruction set

use legovm::runtime::dataspace::{DataspaceInit, DataspaceSource};
use legovm::runtime::memory::MemoryPool;
use legovm::vm::{
    ClumpId, Codespace, Decoder, Executor, RunLimits, RxeBuilder, VMError, VMResult, Vm,
    VmContext, VmState,
};

/// `INC addr`: two words
const INC: u16 = 0x01;
/// `SET addr value`: three words
const SET: u16 = 0x02;
/// `FIN`: one word, completes the clump
const FIN: u16 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Inc(usize),
    Set(usize, u8),
    Fin,
}

#[derive(Default)]
struct OpDecoder;

impl Decoder for OpDecoder {
    type Instruction = Op;

    fn decode(
        &mut self,
        code: Codespace<'_>,
        pc: usize,
    ) -> VMResult<(Op, usize)> {
        match code.word_at(pc)? {
            INC => Ok((Op::Inc(code.word_at(pc + 2)? as usize), pc + 4)),
            SET => {
                let addr = code.word_at(pc + 2)? as usize;
                let value = code.word_at(pc + 4)? as u8;
                Ok((Op::Set(addr, value), pc + 6))
            }
            FIN => Ok((Op::Fin, pc + 2)),
            other => Err(VMError::Decode {
                pc,
                reason: format!("unknown opcode {:#06x}", other),
            }),
        }
    }
}

#[derive(Default)]
struct OpExecutor {
    trace: Vec<(u64, usize, Op)>,
}

impl Executor<Op> for OpExecutor {
    fn execute(
        &mut self,
        op: Op,
        ctx: &mut VmContext<'_>,
    ) -> VMResult<()> {
        let id = ctx
            .current_clump()
            .ok_or_else(|| VMError::InvalidState("no current clump".to_string()))?;
        self.trace.push((ctx.passes(), id.index(), op));

        match op {
            Op::Inc(addr) => {
                let cell = ctx
                    .dataspace_mut()
                    .get_mut(addr)
                    .ok_or_else(|| VMError::Execution(format!("bad address {}", addr)))?;
                *cell = cell.wrapping_add(1);
            }
            Op::Set(addr, value) => {
                let cell = ctx
                    .dataspace_mut()
                    .get_mut(addr)
                    .ok_or_else(|| VMError::Execution(format!("bad address {}", addr)))?;
                *cell = value;
            }
            Op::Fin => {
                ctx.current_mut()?.set_fire_count(1);
                for &dependent in ctx.dependents(id)? {
                    let clump = ctx.clump_mut(ClumpId(dependent as usize))?;
                    clump.set_fire_count(clump.fire_count().saturating_sub(1));
                    if clump.is_runnable() {
                        ctx.activate_clump();
                    }
                }
                ctx.retire_clump()?;
            }
        }
        Ok(())
    }
}

/// Copies the defaults block over the start of the static dataspace
struct CopyDefaults;

impl DataspaceInit for CopyDefaults {
    fn init(
        &mut self,
        source: &DataspaceSource<'_>,
        statics: &mut [u8],
    ) -> VMResult<()> {
        let n = source.defaults.len().min(statics.len());
        statics[..n].copy_from_slice(&source.defaults[..n]);
        Ok(())
    }
}

/// c0: INC 0, INC 0, FIN → releases c1
/// c1: INC 1, SET 3 7, FIN
fn counter_image() -> Vec<u8> {
    RxeBuilder::new()
        .static_size(4)
        .defaults(&[10, 20, 0])
        .clump(0, &[1], 0)
        .clump(1, &[], 5)
        .code(&[INC, 0, INC, 0, FIN, INC, 1, SET, 3, 7, FIN])
        .build()
        .unwrap()
}

#[test]
fn test_full_program_lifecycle() {
    let bytes = counter_image();
    let pool = MemoryPool::new(1024);
    let mut vm = Vm::with_pool(pool.clone());
    vm.load_with(&bytes, &mut CopyDefaults).unwrap();
    assert_eq!(vm.context().dataspace(), &[10, 20, 0, 0]);
    assert_eq!(vm.context().num_active_clumps(), 1);

    let mut executor = OpExecutor::default();
    let state = vm.run(&mut OpDecoder, &mut executor).unwrap();
    assert_eq!(state, VmState::Finished);
    assert_eq!(vm.context().dataspace(), &[12, 21, 0, 7]);
    assert_eq!(
        executor.trace,
        vec![
            (0, 0, Op::Inc(0)),
            (1, 0, Op::Inc(0)),
            (2, 0, Op::Fin),
            (2, 1, Op::Inc(1)),
            (3, 1, Op::Set(3, 7)),
            (4, 1, Op::Fin),
        ]
    );
    assert_eq!(vm.context().passes(), 5);

    vm.teardown();
    assert!(vm.context().is_zeroed());
    assert_eq!(pool.used(), 0);
}

#[test]
fn test_runs_are_deterministic() {
    let bytes = counter_image();
    let traces: Vec<_> = (0..3)
        .map(|_| {
            let mut vm = Vm::new();
            vm.load_with(&bytes, &mut CopyDefaults).unwrap();
            let mut executor = OpExecutor::default();
            vm.run(&mut OpDecoder, &mut executor).unwrap();
            executor.trace
        })
        .collect();
    assert_eq!(traces[0], traces[1]);
    assert_eq!(traces[1], traces[2]);
}

#[test]
fn test_sliced_run_matches_single_run() {
    let bytes = counter_image();
    let mut vm = Vm::new().limits(RunLimits::unbounded().with_max_passes(1));
    vm.load_with(&bytes, &mut CopyDefaults).unwrap();

    let mut executor = OpExecutor::default();
    let mut slices = 0;
    let state = loop {
        slices += 1;
        match vm.run(&mut OpDecoder, &mut executor) {
            Ok(state) => break state,
            Err(e) if e.is_run_limit() => continue,
            Err(e) => panic!("unexpected error: {}", e),
        }
    };
    assert_eq!(state, VmState::Finished);
    assert_eq!(slices, 5);
    assert_eq!(executor.trace.len(), 6);
    assert_eq!(vm.context().dataspace(), &[12, 21, 0, 7]);
}

#[test]
fn test_bad_opcode_aborts_and_tears_down() {
    let bytes = RxeBuilder::new()
        .clump(0, &[], 0)
        .code(&[0x7f])
        .build()
        .unwrap();
    let mut vm = Vm::new();
    vm.load(&bytes).unwrap();
    let base = vm.context().layout().codespace.offset;

    let err = vm
        .run(&mut OpDecoder, &mut OpExecutor::default())
        .unwrap_err();
    assert!(matches!(err, VMError::Decode { pc, .. } if pc == base));
    assert_eq!(vm.state(), VmState::Aborted);

    vm.teardown();
    assert!(vm.context().is_zeroed());
    vm.load(&bytes).unwrap();
    assert_eq!(vm.state(), VmState::Ready);
}
