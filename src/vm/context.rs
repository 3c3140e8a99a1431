//! VM context
//!
//! Everything one load/run/teardown cycle owns. The scheduler lends the
//! executor `&mut VmContext` for exactly one clump turn at a time, which is
//! the mutual-exclusion contract over the clump table.

use serde::Serialize;

use crate::runtime::arrays::ArrayStorage;
use crate::runtime::memory::{Block, MemoryPool};
use crate::vm::clump::{ClumpId, ClumpTable, RuntimeClump};
use crate::vm::errors::{VMError, VMResult};
use crate::vm::image::{Dstoc, ProgramImage, RxeHeader};
use crate::vm::loader::ImageLayout;

/// Run state of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum VmState {
    /// Nothing loaded
    #[default]
    Empty,
    /// Loaded, not yet run
    Ready,
    /// Inside a run, or stopped between passes by a run limit
    Running,
    /// Every active clump completed
    Finished,
    /// The executor requested a stop
    Halted,
    /// A decode or execute error ended the run
    Aborted,
}

impl VmState {
    /// Whether the run completed normally
    #[inline]
    pub fn is_finished(&self) -> bool {
        matches!(self, VmState::Finished)
    }

    /// Whether no further instruction will run without a teardown
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, VmState::Finished | VmState::Halted | VmState::Aborted)
    }
}

/// Per-run VM state
#[derive(Debug, Default)]
pub struct VmContext<'img> {
    pub(crate) pool: MemoryPool,
    pub(crate) image: Option<ProgramImage<'img>>,
    pub(crate) header: Option<RxeHeader>,
    pub(crate) layout: ImageLayout,
    pub(crate) ds_static: Option<Block>,
    pub(crate) clumps: ClumpTable,
    pub(crate) num_active_clumps: usize,
    pub(crate) current_clump: Option<ClumpId>,
    pub(crate) arrays: ArrayStorage,
    pub(crate) state: VmState,
    pub(crate) passes: u64,
    pub(crate) halt_requested: bool,
}

impl<'img> VmContext<'img> {
    /// Empty context drawing memory from `pool`
    pub fn new(pool: MemoryPool) -> Self {
        Self {
            pool,
            ..Self::default()
        }
    }

    pub fn state(&self) -> VmState {
        self.state
    }

    pub fn pool(&self) -> &MemoryPool {
        &self.pool
    }

    pub fn image(&self) -> Option<ProgramImage<'img>> {
        self.image
    }

    pub fn header(&self) -> Option<&RxeHeader> {
        self.header.as_ref()
    }

    pub fn layout(&self) -> &ImageLayout {
        &self.layout
    }

    /// Dstoc records of the loaded image
    pub fn dstoc(&self) -> Option<Dstoc<'img>> {
        let image = self.image?;
        image.slice(self.layout.dstoc).ok().map(Dstoc::new)
    }

    /// Passes completed since the context was loaded
    pub fn passes(&self) -> u64 {
        self.passes
    }

    // === Clump table ===

    pub fn clumps(&self) -> &ClumpTable {
        &self.clumps
    }

    /// Clump whose turn is in progress
    pub fn current_clump(&self) -> Option<ClumpId> {
        self.current_clump
    }

    pub fn clump(
        &self,
        id: ClumpId,
    ) -> VMResult<&RuntimeClump> {
        self.clumps
            .get(id)
            .ok_or_else(|| VMError::InvalidState(format!("no such clump: {}", id)))
    }

    pub fn clump_mut(
        &mut self,
        id: ClumpId,
    ) -> VMResult<&mut RuntimeClump> {
        self.clumps
            .get_mut(id)
            .ok_or_else(|| VMError::InvalidState(format!("no such clump: {}", id)))
    }

    /// The dispatched clump, for use inside `Executor::execute`
    pub fn current_mut(&mut self) -> VMResult<&mut RuntimeClump> {
        let id = self
            .current_clump
            .ok_or_else(|| VMError::InvalidState("no clump dispatched".to_string()))?;
        self.clump_mut(id)
    }

    /// This clump's slice of the dependency table
    pub fn dependents(
        &self,
        id: ClumpId,
    ) -> VMResult<&'img [u8]> {
        let clump = *self.clump(id)?;
        let image = self
            .image
            .ok_or_else(|| VMError::InvalidState("no image loaded".to_string()))?;
        image.slice(clump.dependents())
    }

    // === Active clump accounting ===

    pub fn num_active_clumps(&self) -> usize {
        self.num_active_clumps
    }

    pub fn set_num_active_clumps(
        &mut self,
        count: usize,
    ) {
        self.num_active_clumps = count;
    }

    /// Count one more clump as active
    pub fn activate_clump(&mut self) {
        self.num_active_clumps += 1;
    }

    /// Count one active clump as done
    pub fn retire_clump(&mut self) -> VMResult<()> {
        self.num_active_clumps = self
            .num_active_clumps
            .checked_sub(1)
            .ok_or_else(|| VMError::InvalidState("no active clump to retire".to_string()))?;
        Ok(())
    }

    // === Storage ===

    /// Static dataspace bytes
    pub fn dataspace(&self) -> &[u8] {
        self.ds_static.as_deref().unwrap_or(&[])
    }

    pub fn dataspace_mut(&mut self) -> &mut [u8] {
        match self.ds_static.as_deref_mut() {
            Some(bytes) => bytes,
            None => &mut [],
        }
    }

    pub fn arrays(&self) -> &ArrayStorage {
        &self.arrays
    }

    pub fn arrays_mut(&mut self) -> &mut ArrayStorage {
        &mut self.arrays
    }

    pub fn num_arrays(&self) -> usize {
        self.arrays.len()
    }

    /// Ask the scheduler to stop once the current pass completes
    pub fn request_halt(&mut self) {
        self.halt_requested = true;
    }

    // === Lifecycle ===

    /// Whether every field is back to its pre-load value
    pub fn is_zeroed(&self) -> bool {
        self.image.is_none()
            && self.header.is_none()
            && self.layout == ImageLayout::default()
            && self.ds_static.is_none()
            && !self.clumps.is_allocated()
            && self.clumps.is_empty()
            && self.num_active_clumps == 0
            && self.current_clump.is_none()
            && self.arrays.is_empty()
            && self.arrays.footprint() == 0
            && self.state == VmState::Empty
            && self.passes == 0
            && !self.halt_requested
    }

    /// Release everything this context owns and return to the zero state
    ///
    /// Idempotent. Nested arrays are released through their owners.
    pub(crate) fn reset(&mut self) {
        let pool = self.pool.clone();
        *self = Self::new(pool);
    }
}
