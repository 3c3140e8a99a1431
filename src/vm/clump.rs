//! Runtime clump table
//!
//! One entry per clump descriptor. Entries are created by the loader and
//! mutated by the scheduler (`current_pc`) and the executor (`fire_count`).

use serde::Serialize;

use crate::runtime::memory::{MemoryPool, Reservation};
use crate::vm::errors::VMResult;
use crate::vm::image::Region;

/// Index of a clump in the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ClumpId(pub usize);

impl ClumpId {
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

impl From<usize> for ClumpId {
    fn from(val: usize) -> Self {
        Self(val)
    }
}

impl std::fmt::Display for ClumpId {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "Clump({})", self.0)
    }
}

/// Per-clump runtime state
///
/// All positions are absolute image offsets. The code start and the
/// dependency slice are fixed by the loader; only the readiness counter and
/// the program counter change afterwards.
///
/// ```compile_fail
/// let mut clump = legovm::vm::RuntimeClump::default();
/// clump.dependents_start = 0;
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeClump {
    fire_count: u8,
    start_pc: usize,
    current_pc: usize,
    dependents_start: usize,
    dependents_len: usize,
}

impl RuntimeClump {
    /// Entry as built by the loader, positioned at its first instruction
    pub(crate) fn loaded(
        fire_count: u8,
        start_pc: usize,
        dependents: Region,
    ) -> Self {
        Self {
            fire_count,
            start_pc,
            current_pc: start_pc,
            dependents_start: dependents.offset,
            dependents_len: dependents.len,
        }
    }

    /// Readiness counter; the clump runs only while this is 0
    #[inline]
    pub fn fire_count(&self) -> u8 {
        self.fire_count
    }

    pub fn set_fire_count(
        &mut self,
        count: u8,
    ) {
        self.fire_count = count;
    }

    /// First instruction of the clump
    #[inline]
    pub fn start_pc(&self) -> usize {
        self.start_pc
    }

    /// Next instruction to decode
    #[inline]
    pub fn current_pc(&self) -> usize {
        self.current_pc
    }

    /// Move the program counter, e.g. for a jump or a restart at `start_pc`
    pub fn set_pc(
        &mut self,
        pc: usize,
    ) {
        self.current_pc = pc;
    }

    /// Start of this clump's slice of the dependency table
    pub fn dependents_start(&self) -> usize {
        self.dependents_start
    }

    pub fn dependents_len(&self) -> usize {
        self.dependents_len
    }

    pub fn dependents(&self) -> Region {
        Region::new(self.dependents_start, self.dependents_len)
    }

    /// Whether the clump may execute an instruction this turn
    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.fire_count == 0
    }
}

/// Pool-accounted array of runtime clumps
#[derive(Debug, Default)]
pub struct ClumpTable {
    clumps: Vec<RuntimeClump>,
    reservation: Option<Reservation>,
}

impl ClumpTable {
    /// Allocate `count` zeroed entries
    pub fn zeroed(
        pool: &MemoryPool,
        count: usize,
    ) -> VMResult<Self> {
        let bytes = count.saturating_mul(std::mem::size_of::<RuntimeClump>());
        let reservation = pool.reserve(bytes)?;
        Ok(Self {
            clumps: vec![RuntimeClump::default(); count],
            reservation: Some(reservation),
        })
    }

    pub fn len(&self) -> usize {
        self.clumps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clumps.is_empty()
    }

    /// Whether the table holds pool memory
    pub fn is_allocated(&self) -> bool {
        self.reservation.is_some()
    }

    pub fn get(
        &self,
        id: ClumpId,
    ) -> Option<&RuntimeClump> {
        self.clumps.get(id.0)
    }

    pub fn get_mut(
        &mut self,
        id: ClumpId,
    ) -> Option<&mut RuntimeClump> {
        self.clumps.get_mut(id.0)
    }

    pub fn as_slice(&self) -> &[RuntimeClump] {
        &self.clumps
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [RuntimeClump] {
        &mut self.clumps
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClumpId, &RuntimeClump)> {
        self.clumps
            .iter()
            .enumerate()
            .map(|(i, clump)| (ClumpId(i), clump))
    }

    /// Number of clumps that are runnable right now
    pub fn runnable_count(&self) -> usize {
        self.clumps.iter().filter(|c| c.is_runnable()).count()
    }
}
