//! TEX0 texture sub-files: a short header plus an opaque encoded payload.
//!
//! The pixel data is never interpreted here. Conversion to and from
//! interchange formats is delegated to an [ImageCodec](crate::convert::ImageCodec).

use crate::binstream::{BinReader, BinWriter};
use crate::error::BrresError;
use crate::subfile::{expected_version, pack_header, unpack_header};

pub const MAGIC: &[u8; 4] = b"TEX0";

/// Hardware image formats that carry a palette and cannot be re-encoded
/// without one. These are preserved byte for byte.
pub const FORMAT_C4: u32 = 8;
pub const FORMAT_C8: u32 = 9;
pub const FORMAT_C14X2: u32 = 10;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tex0 {
    pub name: String,
    pub version: u32,
    pub width: u16,
    pub height: u16,
    pub format: u32,
    pub num_images: u32,
    pub num_mips: u32,
    /// Encoded image payload, including all mip levels.
    pub data: Vec<u8>,
}

impl Tex0 {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: expected_version(MAGIC),
            width: 0,
            height: 0,
            format: 0,
            num_images: 1,
            num_mips: 0,
            data: Vec::new(),
        }
    }

    pub fn is_palette_indexed(&self) -> bool {
        matches!(self.format, FORMAT_C4 | FORMAT_C8 | FORMAT_C14X2)
    }

    pub fn unpack(reader: &mut BinReader) -> Result<Self, BrresError> {
        let header = unpack_header(reader, MAGIC)?;
        let _ = reader.read_u32()?;
        let width = reader.read_u16()?;
        let height = reader.read_u16()?;
        let format = reader.read_u32()?;
        let num_images = reader.read_u32()?;
        let _ = reader.read_u32()?;
        let num_mips = reader.read_f32()? as u32;
        let _ = reader.read_u32()?;
        reader.recall(0)?;
        let data = reader.read_remaining()?;
        reader.end();
        Ok(Self {
            name: header.name,
            version: header.version,
            width,
            height,
            format,
            num_images,
            num_mips,
            data,
        })
    }

    pub fn pack(&self, writer: &mut BinWriter) -> Result<(), BrresError> {
        let marks = pack_header(writer, MAGIC, self.version, &self.name)?;
        writer.write_u32(0);
        writer.write_u16(self.width);
        writer.write_u16(self.height);
        writer.write_u32(self.format);
        writer.write_u32(self.num_images);
        writer.write_u32(0);
        // the mip count is stored as a float
        writer.write_f32(self.num_mips as f32);
        writer.write_u32(0);
        writer.align(0x20);
        writer.resolve(marks[0]);
        // version 2 files declare a palette section that is never present
        for mark in marks.into_iter().skip(1) {
            writer.resolve_raw(mark, 0);
        }
        writer.write_bytes(&self.data);
        writer.end();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Tex0 {
        Tex0 {
            name: "spray".to_string(),
            version: 3,
            width: 16,
            height: 8,
            format: 14,
            num_images: 1,
            num_mips: 3,
            data: vec![0x5A; 64],
        }
    }

    #[test]
    fn round_trip() {
        let tex = sample();
        let mut writer = BinWriter::new();
        tex.pack(&mut writer).unwrap();
        let file = writer.finish().unwrap();

        let mut reader = BinReader::new(file);
        let read = Tex0::unpack(&mut reader).unwrap();
        assert_eq!(read, tex);
    }

    #[test]
    fn payload_starts_aligned() {
        let tex = sample();
        let mut writer = BinWriter::new();
        tex.pack(&mut writer).unwrap();
        let file = writer.finish().unwrap();

        let mut reader = BinReader::new(file);
        reader.start();
        reader.skip(4).unwrap();
        let _len = reader.read_u32().unwrap();
        reader.skip(8).unwrap();
        let data_offset = reader.read_u32().unwrap();
        assert_eq!(data_offset % 0x20, 0);
    }

    #[test]
    fn palette_formats_are_flagged() {
        let mut tex = sample();
        tex.format = FORMAT_C8;
        assert!(tex.is_palette_indexed());
        tex.format = 14;
        assert!(!tex.is_palette_indexed());
    }
}
