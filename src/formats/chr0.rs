//! CHR0 per-bone SRT animation.
//!
//! The keyframe payload is preserved byte for byte; only the framing, the
//! per-bone index group, and the name pointers inside each record are
//! rebuilt when packing. This keeps bone animations intact through edits
//! that do not touch them.

use crate::binstream::{BinReader, BinWriter};
use crate::error::BrresError;
use crate::index_group::{IndexGroup, ReadGroup};
use crate::subfile::{expected_version, pack_header, unpack_header};

pub const MAGIC: &[u8; 4] = b"CHR0";

/// One animated bone: its name and where its record begins relative to the
/// sub-file, inside the opaque payload.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoneAnim {
    pub name: String,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Chr0 {
    pub name: String,
    pub version: u32,
    pub framecount: u16,
    pub loop_anim: bool,
    pub scaling_rule: u32,
    pub animations: Vec<BoneAnim>,
    /// Raw keyframe storage following the index group.
    pub data: Vec<u8>,
}

impl Chr0 {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: expected_version(MAGIC),
            framecount: 1,
            loop_anim: true,
            scaling_rule: 0,
            animations: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn unpack(reader: &mut BinReader) -> Result<Self, BrresError> {
        let header = unpack_header(reader, MAGIC)?;
        let _ = reader.read_u32()?;
        let framecount = reader.read_u16()?;
        let num_entries = reader.read_u16()? as usize;
        let loop_anim = reader.read_u32()? != 0;
        let scaling_rule = reader.read_u32()?;
        reader.recall(0)?;
        let mut group = ReadGroup::unpack(reader)?;
        let data = reader.read_remaining()?;
        let mut animations = Vec::with_capacity(num_entries);
        for _ in 0..group.len() {
            let name = group.recall_next(reader)?;
            let offset = (reader.pos() - header.base) as u32;
            animations.push(BoneAnim { name, offset });
        }
        reader.end();
        Ok(Self {
            name: header.name,
            version: header.version,
            framecount,
            loop_anim,
            scaling_rule,
            animations,
            data,
        })
    }

    pub fn pack(&self, writer: &mut BinWriter) -> Result<(), BrresError> {
        let marks = pack_header(writer, MAGIC, self.version, &self.name)?;
        let base = writer.base();
        writer.write_u32(0);
        writer.write_u16(self.framecount);
        writer.write_u16(self.animations.len() as u16);
        writer.write_u32(self.loop_anim as u32);
        writer.write_u32(self.scaling_rule);

        let mut group = IndexGroup::new();
        for anim in &self.animations {
            group.add_entry(&anim.name);
        }
        writer.resolve(marks[0]);
        for mark in marks.into_iter().skip(1) {
            writer.resolve_raw(mark, 0);
        }
        let mut packed = group.pack(writer);
        writer.write_bytes(&self.data);

        // each record begins with its own name pointer into the old pool;
        // repoint it and the group entry at the carried bytes
        for anim in &self.animations {
            let target = base + anim.offset as usize;
            packed.resolve_next_to(writer, target)?;
            writer.store_name_ref_at(&anim.name, base, target);
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
    fn round_trip_preserves_payload_and_names() {
        // header (0x2c with 2 sections) + group (8 + 16 * 2) = 0x54
        // record for the single bone starts at 0x54
        let mut data = vec![0u8; 0x20];
        data[4] = 0x12; // arbitrary keyframe bytes
        let chr0 = Chr0 {
            name: "walk".to_string(),
            version: 5,
            framecount: 59,
            loop_anim: true,
            scaling_rule: 0,
            animations: vec![BoneAnim {
                name: "hip".to_string(),
                offset: 0x54,
            }],
            data,
        };
        let mut writer = BinWriter::new();
        chr0.pack(&mut writer).unwrap();
        let file = writer.finish().unwrap();

        let mut reader = BinReader::new(file);
        let read = Chr0::unpack(&mut reader).unwrap();
        assert_eq!(read.framecount, 59);
        assert!(read.loop_anim);
        assert_eq!(read.animations, chr0.animations);
        // the name pointer patched into the record resolves in the new pool
        assert_eq!(read.data.len(), chr0.data.len());
        assert_eq!(&read.data[4..], &chr0.data[4..]);
    }
}
