//! Static dataspace
//!
//! The loader allocates `ds_initial_static_size` zeroed bytes and hands them
//! to a [`DataspaceInit`] implementation, which owns the variable layout.

use crate::vm::errors::VMResult;
use crate::vm::image::{Dstoc, RxeHeader};

/// What a dataspace initializer gets to read
#[derive(Debug, Clone, Copy)]
pub struct DataspaceSource<'img> {
    pub header: &'img RxeHeader,
    pub dstoc: Dstoc<'img>,
    /// The defaults block, without alignment padding
    pub defaults: &'img [u8],
}

/// Populates the static dataspace from the image
pub trait DataspaceInit {
    fn init(
        &mut self,
        source: &DataspaceSource<'_>,
        statics: &mut [u8],
    ) -> VMResult<()>;
}

/// Leaves the static dataspace zeroed
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroFill;

impl DataspaceInit for ZeroFill {
    fn init(
        &mut self,
        _source: &DataspaceSource<'_>,
        _statics: &mut [u8],
    ) -> VMResult<()> {
        Ok(())
    }
}
