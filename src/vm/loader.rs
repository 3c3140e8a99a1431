//! Image loader
//!
//! Turns a borrowed RXE image into a populated [`VmContext`]. Region
//! placement is derived, never stored in the image: the dependency table size
//! is the sum of every clump's `dependent_count`, so the descriptor table is
//! scanned twice.
//!
//! 1. [`measure_dependencies`] sums the dependency bytes to place the
//!    codespace.
//! 2. [`materialize_clumps`] fills the runtime clump table, handing out
//!    contiguous dependency slices in descriptor order.
//!
//! Everything is staged locally and committed to the context only once the
//! whole load succeeded, so a failed load leaves no allocation behind.

use serde::Serialize;
use tracing::{debug, trace};

use crate::runtime::dataspace::{DataspaceInit, DataspaceSource};
use crate::runtime::memory::MemoryPool;
use crate::vm::clump::{ClumpTable, RuntimeClump};
use crate::vm::context::{VmContext, VmState};
use crate::vm::errors::{VMError, VMResult};
use crate::vm::image::{
    Dstoc, ProgramImage, Region, RxeHeader, CLUMP_RECORD_SIZE, DSTOC_RECORD_SIZE, HEADER_SIZE,
};

/// Derived placement of every image region
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImageLayout {
    pub dstoc: Region,
    pub defaults: Region,
    pub clump_records: Region,
    pub dependencies: Region,
    pub codespace: Region,
}

/// Round `offset` up to the next 16-bit boundary
#[inline]
pub fn align_to_word(offset: usize) -> usize {
    offset + (offset & 1)
}

fn table_region(
    image: &ProgramImage<'_>,
    offset: usize,
    count: usize,
    record_size: usize,
    what: &str,
) -> VMResult<Region> {
    let len = count
        .checked_mul(record_size)
        .ok_or_else(|| VMError::corrupt(format!("{} size overflows", what)))?;
    image.check(Region::new(offset, len), what)
}

/// Pass 1: total size of the dependency table
pub fn measure_dependencies(
    image: &ProgramImage<'_>,
    clump_records: Region,
    clump_count: usize,
) -> VMResult<usize> {
    (0..clump_count).try_fold(0usize, |total, index| {
        let record = image.clump_record(clump_records, index)?;
        Ok(total + record.dependent_count as usize)
    })
}

/// Compute every region of the image
///
/// Pure: reads the image, allocates nothing.
pub fn plan_layout(
    image: &ProgramImage<'_>,
    header: &RxeHeader,
) -> VMResult<ImageLayout> {
    let dstoc = table_region(
        image,
        HEADER_SIZE,
        header.dstoc_entry_count as usize,
        DSTOC_RECORD_SIZE,
        "dstoc",
    )?;

    let defaults = image.check(
        Region::new(dstoc.end(), header.defaults_block_size as usize),
        "defaults block",
    )?;

    // The clump segment is 16-bit aligned
    let clump_records = table_region(
        image,
        align_to_word(defaults.end()),
        header.clump_count as usize,
        CLUMP_RECORD_SIZE,
        "clump descriptor table",
    )?;

    let dependency_bytes =
        measure_dependencies(image, clump_records, header.clump_count as usize)?;
    let dependencies = image.check(
        Region::new(clump_records.end(), dependency_bytes),
        "dependency table",
    )?;

    let codespace = image.check(
        Region::new(
            align_to_word(dependencies.end()),
            header.code_word_count as usize * 2,
        ),
        "codespace",
    )?;

    Ok(ImageLayout {
        dstoc,
        defaults,
        clump_records,
        dependencies,
        codespace,
    })
}

/// Pass 2: fill `table` from the descriptor records
///
/// Returns the number of clumps that are runnable at load.
pub fn materialize_clumps(
    image: &ProgramImage<'_>,
    layout: &ImageLayout,
    table: &mut ClumpTable,
) -> VMResult<usize> {
    let mut num_active = 0;
    let mut dependents = layout.dependencies.offset;

    for (index, clump) in table.as_mut_slice().iter_mut().enumerate() {
        let record = image.clump_record(layout.clump_records, index)?;

        if record.fire_count == 0 {
            num_active += 1;
        }

        let start_pc = layout.codespace.offset + record.code_offset as usize * 2;
        if layout.codespace.len > 0 && !layout.codespace.contains(start_pc) {
            return Err(VMError::corrupt(format!(
                "clump {} starts at {:#x}, outside codespace [{:#x}, {:#x})",
                index,
                start_pc,
                layout.codespace.offset,
                layout.codespace.end()
            )));
        }

        let slice = Region::new(dependents, record.dependent_count as usize);
        dependents += slice.len;
        *clump = RuntimeClump::loaded(record.fire_count, start_pc, slice);

        trace!(
            "clump {}: fire_count={} start_pc={:#x} dependents={:#x}+{}",
            index,
            record.fire_count,
            start_pc,
            slice.offset,
            slice.len
        );
    }

    // Both passes must agree on where the dependency table ends
    if dependents != layout.dependencies.end() {
        return Err(VMError::corrupt(format!(
            "dependency slices end at {:#x}, table ends at {:#x}",
            dependents,
            layout.dependencies.end()
        )));
    }

    Ok(num_active)
}

/// Validate `bytes` and populate an empty context
pub fn load<'img>(
    ctx: &mut VmContext<'img>,
    bytes: &'img [u8],
    init: &mut dyn DataspaceInit,
) -> VMResult<()> {
    if ctx.state != VmState::Empty {
        return Err(VMError::InvalidState(format!(
            "load into a {:?} context; tear down first",
            ctx.state
        )));
    }

    let image = ProgramImage::new(bytes);
    let header = RxeHeader::parse(bytes)?;
    debug!(
        "loading image: {} bytes, {} dstoc entries, {} clumps",
        image.len(),
        header.dstoc_entry_count,
        header.clump_count
    );

    let layout = plan_layout(&image, &header)?;
    debug!(
        "layout: clumps at {:#x}, dependencies {:#x}+{}, codespace {:#x}+{}",
        layout.clump_records.offset,
        layout.dependencies.offset,
        layout.dependencies.len,
        layout.codespace.offset,
        layout.codespace.len
    );

    let pool: &MemoryPool = &ctx.pool;
    let mut ds_static = pool.alloc_zeroed(header.ds_initial_static_size as usize)?;
    let source = DataspaceSource {
        header: &header,
        dstoc: Dstoc::new(image.slice(layout.dstoc)?),
        defaults: image.slice(layout.defaults)?,
    };
    init.init(&source, &mut ds_static)?;

    let mut clumps = ClumpTable::zeroed(pool, header.clump_count as usize)?;
    let num_active = materialize_clumps(&image, &layout, &mut clumps)?;

    ctx.image = Some(image);
    ctx.header = Some(header);
    ctx.layout = layout;
    ctx.ds_static = Some(ds_static);
    ctx.clumps = clumps;
    ctx.num_active_clumps = num_active;
    ctx.state = VmState::Ready;

    debug!(
        "image loaded: {} of {} clumps active, {} bytes in use",
        num_active,
        header.clump_count,
        ctx.pool.used()
    );
    Ok(())
}
