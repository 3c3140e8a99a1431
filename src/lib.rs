//! LegoVM
//!
//! Execution core for RXE robotics programs: an image loader that turns the
//! raw program bytes into a runtime clump table, and a deterministic
//! cooperative scheduler that advances every runnable clump one instruction
//! per pass.
//!
//! Instruction decoding and semantics plug in through [`vm::Decoder`] and
//! [`vm::Executor`]; the static dataspace layout plugs in through
//! [`runtime::dataspace::DataspaceInit`].
//!
//! # Example
//!
//! ```
//! use legovm::vm::{RxeBuilder, Vm, VmState};
//!
//! let image = RxeBuilder::new().build().unwrap();
//! let mut vm = Vm::new();
//! vm.load(&image).unwrap();
//! assert_eq!(vm.state(), VmState::Ready);
//! vm.teardown();
//! assert!(vm.context().is_zeroed());
//! ```

#![doc(html_root_url = "https://docs.rs/legovm")]
#![warn(rust_2018_idioms)]

pub mod runtime;
pub mod util;
pub mod vm;

// Re-exports
pub use anyhow::{Context, Result};
pub use vm::{VMError, VMResult, Vm, VmState};

use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::util::config::VmConfig;
use crate::vm::image::{DstocRecord, RxeHeader};
use crate::vm::{ImageLayout, RuntimeClump};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Program name
pub const NAME: &str = "LegoVM";

/// Everything the loader derived from an image
#[derive(Debug, Clone, Serialize)]
pub struct ImageReport {
    pub size: usize,
    pub header: RxeHeader,
    pub layout: ImageLayout,
    pub dstoc: Vec<DstocRecord>,
    pub clumps: Vec<RuntimeClump>,
    pub num_active_clumps: usize,
    pub memory_used: usize,
}

/// Load an image with `config` and describe it, releasing it afterwards
pub fn inspect(
    image: &[u8],
    config: &VmConfig,
) -> Result<ImageReport> {
    let mut vm = Vm::with_config(config);
    vm.load(image)?;

    let ctx = vm.context();
    let header = *ctx
        .header()
        .ok_or_else(|| anyhow::anyhow!("loaded context has no header"))?;
    let report = ImageReport {
        size: image.len(),
        header,
        layout: *ctx.layout(),
        dstoc: ctx.dstoc().map(|d| d.iter().collect()).unwrap_or_default(),
        clumps: ctx.clumps().as_slice().to_vec(),
        num_active_clumps: ctx.num_active_clumps(),
        memory_used: ctx.pool().used(),
    };

    vm.teardown();
    Ok(report)
}

/// Read an image file and describe it
pub fn inspect_file(
    path: &Path,
    config: &VmConfig,
) -> Result<ImageReport> {
    debug!("inspecting {}", path.display());
    let image =
        fs::read(path).with_context(|| format!("Failed to read image: {}", path.display()))?;
    inspect(&image, config).with_context(|| format!("Failed to load image: {}", path.display()))
}
