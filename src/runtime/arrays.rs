//! VM-owned array storage
//!
//! The executor creates arrays at runtime (dynamic dataspace). An array holds
//! either raw element bytes or a list of nested arrays, and owns whatever it
//! holds. Releasing an array therefore releases its whole subtree.

use crate::runtime::memory::{AllocError, Block, MemoryPool};

/// Handle to an array slot in [`ArrayStorage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArrayId(pub usize);

impl std::fmt::Display for ArrayId {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "Array({})", self.0)
    }
}

/// Array contents
#[derive(Debug)]
pub enum ArrayData {
    /// Flat element storage
    Bytes(Block),
    /// Array of arrays; each child is owned by this array
    Nested(Vec<Array>),
}

/// A single, possibly nested, array
#[derive(Debug)]
pub struct Array {
    data: ArrayData,
}

impl Array {
    /// Allocate a flat array of `len` zeroed bytes
    pub fn bytes(
        pool: &MemoryPool,
        len: usize,
    ) -> Result<Self, AllocError> {
        Ok(Self {
            data: ArrayData::Bytes(pool.alloc_zeroed(len)?),
        })
    }

    /// Build an array that owns `children`
    pub fn nested(children: Vec<Array>) -> Self {
        Self {
            data: ArrayData::Nested(children),
        }
    }

    /// Number of elements (bytes for flat arrays, children for nested ones)
    pub fn len(&self) -> usize {
        match &self.data {
            ArrayData::Bytes(block) => block.len(),
            ArrayData::Nested(children) => children.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    /// Element bytes, if this is a flat array
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.data {
            ArrayData::Bytes(block) => Some(block),
            ArrayData::Nested(_) => None,
        }
    }

    pub fn as_bytes_mut(&mut self) -> Option<&mut [u8]> {
        match &mut self.data {
            ArrayData::Bytes(block) => Some(block),
            ArrayData::Nested(_) => None,
        }
    }

    /// Child arrays, if this is a nested array
    pub fn children(&self) -> Option<&[Array]> {
        match &self.data {
            ArrayData::Bytes(_) => None,
            ArrayData::Nested(children) => Some(children),
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Array>> {
        match &mut self.data {
            ArrayData::Bytes(_) => None,
            ArrayData::Nested(children) => Some(children),
        }
    }

    /// Pool bytes held by this array and every array below it
    pub fn footprint(&self) -> usize {
        match &self.data {
            ArrayData::Bytes(block) => block.len(),
            ArrayData::Nested(children) => children.iter().map(Array::footprint).sum(),
        }
    }
}

/// Slot table of live arrays
///
/// Freed slots are reused so `ArrayId`s stay small.
#[derive(Debug, Default)]
pub struct ArrayStorage {
    slots: Vec<Option<Array>>,
    live: usize,
}

impl ArrayStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an array and return its handle
    pub fn insert(
        &mut self,
        array: Array,
    ) -> ArrayId {
        self.live += 1;
        if let Some(index) = self.slots.iter().position(Option::is_none) {
            self.slots[index] = Some(array);
            return ArrayId(index);
        }
        self.slots.push(Some(array));
        ArrayId(self.slots.len() - 1)
    }

    pub fn get(
        &self,
        id: ArrayId,
    ) -> Option<&Array> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(
        &mut self,
        id: ArrayId,
    ) -> Option<&mut Array> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Take an array out of storage; dropping it releases its subtree
    pub fn remove(
        &mut self,
        id: ArrayId,
    ) -> Option<Array> {
        let removed = self.slots.get_mut(id.0).and_then(Option::take);
        if removed.is_some() {
            self.live -= 1;
        }
        removed
    }

    /// Number of live top-level arrays
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Pool bytes held by all stored arrays, nested ones included
    pub fn footprint(&self) -> usize {
        self.slots.iter().flatten().map(Array::footprint).sum()
    }

    /// Release every array
    pub fn clear(&mut self) {
        self.slots = Vec::new();
        self.live = 0;
    }
}
