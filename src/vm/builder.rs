//! RXE image writer
//!
//! Lays regions out exactly the way the loader expects to find them, padding
//! the clump table and the codespace to even offsets. Header counts are taken
//! from the builder's contents.

use std::io::{self, Write};

use crate::vm::image::{ClumpRecord, DstocRecord, RxeHeader, HEADER_SIZE};

/// One clump as the builder sees it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClumpSpec {
    pub fire_count: u8,
    pub dependents: Vec<u8>,
    /// In 16-bit words from the codespace base
    pub code_offset: u16,
}

/// Builder for well-formed program images
#[derive(Debug, Clone, Default)]
pub struct RxeBuilder {
    header: RxeHeader,
    dstoc: Vec<DstocRecord>,
    defaults: Vec<u8>,
    clumps: Vec<ClumpSpec>,
    code: Vec<u16>,
}

impl RxeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header template; counts and sizes derived from contents are overwritten
    pub fn header_mut(&mut self) -> &mut RxeHeader {
        &mut self.header
    }

    pub fn static_size(
        mut self,
        bytes: u16,
    ) -> Self {
        self.header.ds_initial_static_size = bytes;
        self.header.ds_initial_size = self.header.ds_initial_size.max(bytes);
        self
    }

    pub fn dstoc_entry(
        mut self,
        record: DstocRecord,
    ) -> Self {
        self.dstoc.push(record);
        self
    }

    pub fn defaults(
        mut self,
        bytes: &[u8],
    ) -> Self {
        self.defaults = bytes.to_vec();
        self
    }

    pub fn clump(
        mut self,
        fire_count: u8,
        dependents: &[u8],
        code_offset: u16,
    ) -> Self {
        self.clumps.push(ClumpSpec {
            fire_count,
            dependents: dependents.to_vec(),
            code_offset,
        });
        self
    }

    pub fn code(
        mut self,
        words: &[u16],
    ) -> Self {
        self.code = words.to_vec();
        self
    }

    fn count<T>(
        items: &[T],
        what: &str,
    ) -> io::Result<u16> {
        u16::try_from(items.len()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("too many {}: {}", what, items.len()),
            )
        })
    }

    /// Header with counts filled in from the builder contents
    pub fn header(&self) -> io::Result<RxeHeader> {
        let mut header = self.header;
        header.dstoc_entry_count = Self::count(&self.dstoc, "dstoc entries")?;
        header.defaults_block_size = Self::count(&self.defaults, "default bytes")?;
        header.clump_count = Self::count(&self.clumps, "clumps")?;
        header.code_word_count = Self::count(&self.code, "code words")?;
        Ok(header)
    }

    /// Serialize to a writer
    pub fn write_to<W: Write>(
        &self,
        writer: &mut W,
    ) -> io::Result<()> {
        let header = self.header()?;
        header.write_to(writer)?;
        let mut written = HEADER_SIZE;

        for record in &self.dstoc {
            writer.write_all(&record.to_bytes())?;
            written += record.to_bytes().len();
        }

        writer.write_all(&self.defaults)?;
        written += self.defaults.len();
        written += pad_to_word(writer, written)?;

        for clump in &self.clumps {
            let dependent_count = u8::try_from(clump.dependents.len()).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("clump has {} dependents (max 255)", clump.dependents.len()),
                )
            })?;
            let record = ClumpRecord {
                fire_count: clump.fire_count,
                dependent_count,
                code_offset: clump.code_offset,
            };
            writer.write_all(&record.to_bytes())?;
            written += record.to_bytes().len();
        }

        for clump in &self.clumps {
            writer.write_all(&clump.dependents)?;
            written += clump.dependents.len();
        }
        pad_to_word(writer, written)?;

        for word in &self.code {
            writer.write_all(&word.to_le_bytes())?;
        }
        Ok(())
    }

    pub fn build(&self) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }
}

fn pad_to_word<W: Write>(
    writer: &mut W,
    written: usize,
) -> io::Result<usize> {
    if written & 1 == 1 {
        writer.write_all(&[0])?;
        return Ok(1);
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::image::MAGIC;

    #[test]
    fn test_empty_image_is_header_only() {
        let bytes = RxeBuilder::new().build().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[..14], &MAGIC);
        assert_eq!(&bytes[14..16], &[0x00, 0x05]);
    }

    #[test]
    fn test_padding_after_odd_defaults_and_dependencies() {
        let bytes = RxeBuilder::new()
            .defaults(&[1, 2, 3])
            .clump(0, &[9], 0)
            .code(&[0xBEEF])
            .build()
            .unwrap();
        // header + 3 defaults + 1 pad + 4 record + 1 dep + 1 pad + 2 code
        assert_eq!(bytes.len(), HEADER_SIZE + 3 + 1 + 4 + 1 + 1 + 2);
        assert_eq!(&bytes[bytes.len() - 2..], &[0xEF, 0xBE]);
    }

    #[test]
    fn test_too_many_dependents_is_rejected() {
        let deps = vec![0u8; 256];
        let err = RxeBuilder::new().clump(0, &deps, 0).build().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
