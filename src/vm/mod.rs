//! Virtual machine core
//!
//! This module contains the RXE image loader, the runtime clump table and
//! the cooperative scheduler, tied together by the [`Vm`] lifecycle handle.

pub use builder::{ClumpSpec, RxeBuilder};
pub use clump::{ClumpId, ClumpTable, RuntimeClump};
pub use context::{VmContext, VmState};
pub use errors::{VMError, VMResult};
pub use image::{Codespace, ProgramImage, Region, RxeHeader};
pub use loader::ImageLayout;
pub use scheduler::{Decoder, Executor, RunLimits};

pub mod builder;
pub mod clump;
pub mod context;
pub mod errors;
pub mod image;
pub mod loader;
pub mod scheduler;

use tracing::debug;

use crate::runtime::dataspace::{DataspaceInit, ZeroFill};
use crate::runtime::memory::MemoryPool;
use crate::util::config::VmConfig;

/// One VM instance: load, run, tear down, repeat
///
/// The image is borrowed for `'img` and never modified. Dropping the handle
/// releases everything the loaded program owns.
#[derive(Debug)]
pub struct Vm<'img> {
    ctx: VmContext<'img>,
    limits: RunLimits,
}

impl<'img> Vm<'img> {
    /// VM with an unbounded pool and no run limits
    pub fn new() -> Self {
        Self::with_pool(MemoryPool::unbounded())
    }

    pub fn with_pool(pool: MemoryPool) -> Self {
        Self {
            ctx: VmContext::new(pool),
            limits: RunLimits::unbounded(),
        }
    }

    /// VM sized and bounded by `config`
    pub fn with_config(config: &VmConfig) -> Self {
        Self::with_pool(MemoryPool::new(config.memory_capacity)).limits(config.run_limits())
    }

    pub fn limits(
        mut self,
        limits: RunLimits,
    ) -> Self {
        self.limits = limits;
        self
    }

    pub fn set_limits(
        &mut self,
        limits: RunLimits,
    ) {
        self.limits = limits;
    }

    /// Load an image, leaving the static dataspace zeroed
    pub fn load(
        &mut self,
        image: &'img [u8],
    ) -> VMResult<()> {
        self.load_with(image, &mut ZeroFill)
    }

    /// Load an image, populating the static dataspace with `init`
    pub fn load_with(
        &mut self,
        image: &'img [u8],
        init: &mut dyn DataspaceInit,
    ) -> VMResult<()> {
        loader::load(&mut self.ctx, image, init)
    }

    /// Run the loaded program; see [`scheduler::run`]
    pub fn run<D, E>(
        &mut self,
        decoder: &mut D,
        executor: &mut E,
    ) -> VMResult<VmState>
    where
        D: Decoder,
        E: Executor<D::Instruction>,
    {
        scheduler::run(&mut self.ctx, decoder, executor, &self.limits)
    }

    /// Release the loaded program; safe to call at any time, any number of times
    pub fn teardown(&mut self) {
        if self.ctx.state != VmState::Empty {
            debug!(
                "teardown: releasing {} clumps, {} arrays, {} pool bytes",
                self.ctx.clumps.len(),
                self.ctx.num_arrays(),
                self.ctx.pool.used()
            );
        }
        self.ctx.reset();
    }

    pub fn state(&self) -> VmState {
        self.ctx.state()
    }

    pub fn context(&self) -> &VmContext<'img> {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut VmContext<'img> {
        &mut self.ctx
    }

    pub fn pool(&self) -> &MemoryPool {
        self.ctx.pool()
    }
}

impl Default for Vm<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
