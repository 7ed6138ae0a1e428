//! Common framing shared by every sub-file.
//!
//! Each sub-file starts with its magic, total length, version, a signed
//! offset back to the enclosing container, one pointer per section, and a
//! name reference. The number of sections is fixed by `(magic, version)`.

use crate::binstream::{BinReader, BinWriter, Mark};
use crate::error::BrresError;

/// Sections per `(magic, version)` pair as emitted by the producer.
pub fn section_count(magic: &[u8; 4], version: u32) -> Option<usize> {
    match (magic, version) {
        (b"MDL0", 8) => Some(11),
        (b"MDL0", 11) => Some(14),
        (b"TEX0", 1) => Some(1),
        (b"TEX0", 2) => Some(2),
        (b"TEX0", 3) => Some(1),
        (b"SRT0", 4) => Some(1),
        (b"SRT0", 5) => Some(2),
        (b"PAT0", 3) => Some(5),
        (b"PAT0", 4) => Some(6),
        (b"CLR0", 3) => Some(1),
        (b"CLR0", 4) => Some(2),
        (b"CHR0", 3) => Some(1),
        (b"CHR0", 5) => Some(2),
        (b"SCN0", 4) => Some(6),
        (b"SCN0", 5) => Some(7),
        (b"SHP0", 3) => Some(2),
        (b"SHP0", 4) => Some(3),
        _ => None,
    }
}

/// The version written for new sub-files of each type.
pub fn expected_version(magic: &[u8; 4]) -> u32 {
    match magic {
        b"MDL0" => 11,
        b"TEX0" => 3,
        b"SRT0" => 5,
        b"PAT0" => 4,
        b"CLR0" => 4,
        b"CHR0" => 5,
        b"SCN0" => 5,
        b"SHP0" => 4,
        _ => 0,
    }
}

fn magic_str(magic: &[u8; 4]) -> &'static str {
    match magic {
        b"MDL0" => "MDL0",
        b"TEX0" => "TEX0",
        b"SRT0" => "SRT0",
        b"PAT0" => "PAT0",
        b"CLR0" => "CLR0",
        b"CHR0" => "CHR0",
        b"SCN0" => "SCN0",
        b"SHP0" => "SHP0",
        b"bres" => "bres",
        _ => "unknown",
    }
}

/// Starts a sub-file region and writes the common header.
/// Returns one mark per section pointer; the caller ends the region.
pub fn pack_header(
    writer: &mut BinWriter,
    magic: &[u8; 4],
    version: u32,
    name: &str,
) -> Result<Vec<Mark>, BrresError> {
    let num_sections = section_count(magic, version).ok_or(BrresError::UnsupportedVersion {
        magic: magic_str(magic),
        version,
    })?;
    writer.start();
    writer.write_magic(magic);
    writer.mark_len();
    writer.write_u32(version);
    writer.write_i32(writer.outer_offset());
    let marks = writer.mark_n(num_sections);
    writer.store_name_ref(name);
    Ok(marks)
}

/// Sub-file header fields after the magic.
#[derive(Debug, Clone, PartialEq)]
pub struct SubFileHeader {
    pub base: usize,
    pub version: u32,
    pub num_sections: usize,
    pub name: String,
}

/// Starts a sub-file region and reads the common header, storing the
/// section pointers for recall. The caller ends the region.
pub fn unpack_header(reader: &mut BinReader, magic: &[u8; 4]) -> Result<SubFileHeader, BrresError> {
    let base = reader.start();
    reader.expect_magic(magic)?;
    reader.read_len()?;
    let version = reader.read_u32()?;
    let _outer_offset = reader.read_i32()?;
    let num_sections = section_count(magic, version).ok_or(BrresError::UnsupportedVersion {
        magic: magic_str(magic),
        version,
    })?;
    reader.store(num_sections)?;
    let name = reader.read_name()?.unwrap_or_default();
    Ok(SubFileHeader {
        base,
        version,
        num_sections,
        name,
    })
}

/// A sub-file carried without interpretation. The payload keeps its
/// original bytes and the section pointers are replayed verbatim,
/// preserving types the editor does not model (SCN0, SHP0).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawSubFile {
    pub magic: [u8; 4],
    pub name: String,
    pub version: u32,
    pub section_offsets: Vec<u32>,
    pub data: Vec<u8>,
}

impl RawSubFile {
    pub fn unpack(reader: &mut BinReader, magic: &[u8; 4]) -> Result<Self, BrresError> {
        let header = unpack_header(reader, magic)?;
        let data = reader.read_remaining()?;
        let mut section_offsets = Vec::with_capacity(header.num_sections);
        for _ in 0..header.num_sections {
            section_offsets.push(reader.recall(0)?);
        }
        reader.end();
        Ok(Self {
            magic: *magic,
            name: header.name,
            version: header.version,
            section_offsets,
            data,
        })
    }

    pub fn pack(&self, writer: &mut BinWriter) -> Result<(), BrresError> {
        let marks = pack_header(writer, &self.magic, self.version, &self.name)?;
        writer.write_bytes(&self.data);
        for (mark, offset) in marks.into_iter().zip(&self.section_offsets) {
            writer.resolve_raw(mark, *offset);
        }
        writer.end();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn section_counts_match_producer_tables() {
        assert_eq!(section_count(b"MDL0", 11), Some(14));
        assert_eq!(section_count(b"MDL0", 8), Some(11));
        assert_eq!(section_count(b"TEX0", 3), Some(1));
        assert_eq!(section_count(b"SRT0", 5), Some(2));
        assert_eq!(section_count(b"PAT0", 4), Some(6));
        assert_eq!(section_count(b"CLR0", 4), Some(2));
        assert_eq!(section_count(b"CHR0", 5), Some(2));
        assert_eq!(section_count(b"MDL0", 7), None);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut writer = BinWriter::new();
        let result = pack_header(&mut writer, b"TEX0", 9, "tex");
        assert!(matches!(
            result,
            Err(BrresError::UnsupportedVersion {
                magic: "TEX0",
                version: 9
            })
        ));
    }

    #[test]
    fn raw_subfile_round_trip() {
        let raw = RawSubFile {
            magic: *b"SHP0",
            name: "morph".to_string(),
            version: 4,
            section_offsets: vec![0x30, 0x40, 0x50],
            data: vec![0xAA; 16],
        };
        let mut writer = BinWriter::new();
        raw.pack(&mut writer).unwrap();
        let file = writer.finish().unwrap();

        let mut reader = BinReader::new(file);
        let read = RawSubFile::unpack(&mut reader, b"SHP0").unwrap();
        assert_eq!(read.version, raw.version);
        assert_eq!(read.name, raw.name);
        assert_eq!(read.section_offsets, raw.section_offsets);
        assert_eq!(read.data, raw.data);
    }

    #[test]
    fn wrong_magic_is_invalid() {
        let mut writer = BinWriter::new();
        let raw = RawSubFile {
            magic: *b"SCN0",
            name: "scene".to_string(),
            version: 5,
            section_offsets: vec![0; 7],
            data: Vec::new(),
        };
        raw.pack(&mut writer).unwrap();
        let mut reader = BinReader::new(writer.finish().unwrap());
        assert!(matches!(
            RawSubFile::unpack(&mut reader, b"SHP0"),
            Err(BrresError::InvalidMagic { .. })
        ));
    }
}
