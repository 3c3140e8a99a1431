//! RXE program image format
//!
//! The image is a caller-owned byte buffer. Nothing here copies it; every
//! accessor is a bounds-checked view into the borrowed bytes. All multi-byte
//! fields are little-endian.
//!
//! ```text
//! +-----------------+  0
//! | header (38)     |
//! +-----------------+  HEADER_SIZE
//! | dstoc           |  dstoc_entry_count * 4
//! +-----------------+
//! | defaults block  |  defaults_block_size
//! +-----------------+  (pad to even)
//! | clump records   |  clump_count * 4
//! +-----------------+
//! | dependencies    |  sum(dependent_count)
//! +-----------------+  (pad to even)
//! | codespace       |  code_word_count * 2
//! +-----------------+
//! ```

use serde::Serialize;
use std::io::{self, Write};

use crate::vm::errors::{VMError, VMResult};

/// Format string at the start of every image, NUL terminated
pub const MAGIC: [u8; 14] = *b"MindstormsNXT\0";
/// The only supported format version
pub const VERSION: u16 = 0x0500;
/// Size of the fixed header
pub const HEADER_SIZE: usize = 38;
/// Size of one dstoc record
pub const DSTOC_RECORD_SIZE: usize = 4;
/// Size of one clump descriptor record
pub const CLUMP_RECORD_SIZE: usize = 4;

/// A validated `(offset, len)` pair inside the image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Region {
    pub offset: usize,
    pub len: usize,
}

impl Region {
    pub fn new(
        offset: usize,
        len: usize,
    ) -> Self {
        Self { offset, len }
    }

    /// One past the last byte, or `None` on overflow
    pub fn checked_end(&self) -> Option<usize> {
        self.offset.checked_add(self.len)
    }

    /// One past the last byte; only call on regions already checked against an image
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    pub fn contains(
        &self,
        offset: usize,
    ) -> bool {
        offset >= self.offset && offset < self.end()
    }
}

/// Fixed-size file header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RxeHeader {
    #[serde(skip)]
    pub magic: [u8; 14],
    pub version: u16,
    pub dstoc_entry_count: u16,
    pub ds_initial_size: u16,
    pub ds_initial_static_size: u16,
    pub defaults_block_size: u16,
    pub dynamic_defaults_offset: u16,
    pub dynamic_defaults_size: u16,
    pub mem_mgr_head: u16,
    pub mem_mgr_tail: u16,
    pub dope_vector_offset: u16,
    pub clump_count: u16,
    pub code_word_count: u16,
}

impl Default for RxeHeader {
    fn default() -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            dstoc_entry_count: 0,
            ds_initial_size: 0,
            ds_initial_static_size: 0,
            defaults_block_size: 0,
            dynamic_defaults_offset: 0,
            dynamic_defaults_size: 0,
            mem_mgr_head: 0,
            mem_mgr_tail: 0,
            dope_vector_offset: 0,
            clump_count: 0,
            code_word_count: 0,
        }
    }
}

impl RxeHeader {
    /// Parse and validate the header at the start of `bytes`
    ///
    /// Magic is checked before version, and both before anything else is
    /// read, so a foreign file is always reported as `InvalidMagic`.
    pub fn parse(bytes: &[u8]) -> VMResult<Self> {
        let magic: [u8; 14] = bytes
            .get(..MAGIC.len())
            .and_then(|m| m.try_into().ok())
            .ok_or(VMError::InvalidMagic)?;
        if magic != MAGIC {
            return Err(VMError::InvalidMagic);
        }

        if bytes.len() < HEADER_SIZE {
            return Err(VMError::corrupt(format!(
                "header truncated: {} of {} bytes",
                bytes.len(),
                HEADER_SIZE
            )));
        }

        let field = |offset: usize| u16::from_le_bytes([bytes[offset], bytes[offset + 1]]);

        let version = field(14);
        if version != VERSION {
            return Err(VMError::UnsupportedVersion {
                found: version,
                expected: VERSION,
            });
        }

        Ok(Self {
            magic,
            version,
            dstoc_entry_count: field(16),
            ds_initial_size: field(18),
            ds_initial_static_size: field(20),
            defaults_block_size: field(22),
            dynamic_defaults_offset: field(24),
            dynamic_defaults_size: field(26),
            mem_mgr_head: field(28),
            mem_mgr_tail: field(30),
            dope_vector_offset: field(32),
            clump_count: field(34),
            code_word_count: field(36),
        })
    }

    /// Serialize to a writer in on-disk layout
    pub fn write_to<W: Write>(
        &self,
        writer: &mut W,
    ) -> io::Result<()> {
        writer.write_all(&self.magic)?;
        for value in [
            self.version,
            self.dstoc_entry_count,
            self.ds_initial_size,
            self.ds_initial_static_size,
            self.defaults_block_size,
            self.dynamic_defaults_offset,
            self.dynamic_defaults_size,
            self.mem_mgr_head,
            self.mem_mgr_tail,
            self.dope_vector_offset,
            self.clump_count,
            self.code_word_count,
        ] {
            writer.write_all(&value.to_le_bytes())?;
        }
        Ok(())
    }
}

/// One dstoc (dataspace table of contents) entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DstocRecord {
    pub data_type: u8,
    pub flags: u8,
    pub data_desc: u16,
}

impl DstocRecord {
    fn from_bytes(raw: [u8; DSTOC_RECORD_SIZE]) -> Self {
        Self {
            data_type: raw[0],
            flags: raw[1],
            data_desc: u16::from_le_bytes([raw[2], raw[3]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; DSTOC_RECORD_SIZE] {
        let desc = self.data_desc.to_le_bytes();
        [self.data_type, self.flags, desc[0], desc[1]]
    }
}

/// One clump descriptor as stored in the image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClumpRecord {
    /// Initial readiness counter; 0 means runnable at load
    pub fire_count: u8,
    /// Bytes this clump owns in the dependency table
    pub dependent_count: u8,
    /// Code start, in 16-bit words from the codespace base
    pub code_offset: u16,
}

impl ClumpRecord {
    fn from_bytes(raw: [u8; CLUMP_RECORD_SIZE]) -> Self {
        Self {
            fire_count: raw[0],
            dependent_count: raw[1],
            code_offset: u16::from_le_bytes([raw[2], raw[3]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; CLUMP_RECORD_SIZE] {
        let offset = self.code_offset.to_le_bytes();
        [self.fire_count, self.dependent_count, offset[0], offset[1]]
    }
}

/// Borrowed program image
#[derive(Debug, Clone, Copy)]
pub struct ProgramImage<'img> {
    bytes: &'img [u8],
}

impl<'img> ProgramImage<'img> {
    pub fn new(bytes: &'img [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &'img [u8] {
        self.bytes
    }

    /// Check that `region` lies inside the image
    pub fn check(
        &self,
        region: Region,
        what: &str,
    ) -> VMResult<Region> {
        match region.checked_end() {
            Some(end) if end <= self.bytes.len() => Ok(region),
            _ => Err(VMError::corrupt(format!(
                "{} [{:#x}, +{}) exceeds image of {} bytes",
                what,
                region.offset,
                region.len,
                self.bytes.len()
            ))),
        }
    }

    /// Bytes covered by `region`
    pub fn slice(
        &self,
        region: Region,
    ) -> VMResult<&'img [u8]> {
        let region = self.check(region, "region")?;
        Ok(&self.bytes[region.offset..region.end()])
    }

    /// Clump descriptor `index` of a table starting at `table`
    pub fn clump_record(
        &self,
        table: Region,
        index: usize,
    ) -> VMResult<ClumpRecord> {
        let raw = record_at::<CLUMP_RECORD_SIZE>(self.slice(table)?, index).ok_or_else(|| {
            VMError::corrupt(format!("clump record {} outside descriptor table", index))
        })?;
        Ok(ClumpRecord::from_bytes(raw))
    }
}

fn record_at<const N: usize>(
    table: &[u8],
    index: usize,
) -> Option<[u8; N]> {
    let start = index.checked_mul(N)?;
    table.get(start..start.checked_add(N)?)?.try_into().ok()
}

/// View over the dstoc table
#[derive(Debug, Clone, Copy)]
pub struct Dstoc<'img> {
    bytes: &'img [u8],
}

impl<'img> Dstoc<'img> {
    pub fn new(bytes: &'img [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / DSTOC_RECORD_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(
        &self,
        index: usize,
    ) -> Option<DstocRecord> {
        record_at::<DSTOC_RECORD_SIZE>(self.bytes, index).map(DstocRecord::from_bytes)
    }

    pub fn iter(&self) -> impl Iterator<Item = DstocRecord> + 'img {
        let bytes = self.bytes;
        bytes
            .chunks_exact(DSTOC_RECORD_SIZE)
            .map(|raw| DstocRecord::from_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }
}

/// View over the codespace handed to the decoder
///
/// Program counters are absolute image offsets, so a decoder can report
/// positions that match `RuntimeClump::current_pc` directly.
#[derive(Debug, Clone, Copy)]
pub struct Codespace<'img> {
    image: &'img [u8],
    region: Region,
}

impl<'img> Codespace<'img> {
    pub fn new(
        image: ProgramImage<'img>,
        region: Region,
    ) -> VMResult<Self> {
        let region = image.check(region, "codespace")?;
        Ok(Self {
            image: image.as_bytes(),
            region,
        })
    }

    /// Image offset of the first code byte
    pub fn base(&self) -> usize {
        self.region.offset
    }

    /// Image offset one past the last code byte
    pub fn end(&self) -> usize {
        self.region.end()
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn contains(
        &self,
        pc: usize,
    ) -> bool {
        self.region.contains(pc)
    }

    /// Code bytes
    pub fn bytes(&self) -> &'img [u8] {
        &self.image[self.region.offset..self.region.end()]
    }

    /// Code word at absolute offset `pc`
    pub fn word_at(
        &self,
        pc: usize,
    ) -> VMResult<u16> {
        match pc.checked_add(2) {
            Some(end) if pc >= self.base() && end <= self.end() => {
                Ok(u16::from_le_bytes([self.image[pc], self.image[pc + 1]]))
            }
            _ => Err(VMError::Decode {
                pc,
                reason: format!(
                    "word outside codespace [{:#x}, {:#x})",
                    self.base(),
                    self.end()
                ),
            }),
        }
    }
}
