//! CLR0 per-register color animation.

use crate::binstream::{BinReader, BinWriter};
use crate::error::BrresError;
use crate::index_group::{IndexGroup, ReadGroup};
use crate::subfile::{expected_version, pack_header, unpack_header};

pub const MAGIC: &[u8; 4] = b"CLR0";

/// Number of animatable color slots per material
/// (material colors, constant colors, light channels, fog).
pub const NUM_SLOTS: usize = 16;

/// Color samples for one slot: a single constant or one color per frame.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ColorTrack {
    Constant([u8; 4]),
    PerFrame(Vec<[u8; 4]>),
}

/// One animated slot of a material.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColorTarget {
    /// Which of the [NUM_SLOTS] slots this animates.
    pub slot: usize,
    /// Per channel mask applied before the animated color.
    pub mask: [u8; 4],
    pub colors: ColorTrack,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Clr0Anim {
    pub name: String,
    pub targets: Vec<ColorTarget>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Clr0 {
    pub name: String,
    pub version: u32,
    pub framecount: u16,
    pub loop_anim: bool,
    pub animations: Vec<Clr0Anim>,
}

impl Clr0 {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: expected_version(MAGIC),
            framecount: 1,
            loop_anim: true,
            animations: Vec::new(),
        }
    }

    pub fn unpack(reader: &mut BinReader) -> Result<Self, BrresError> {
        let header = unpack_header(reader, MAGIC)?;
        let _ = reader.read_i32()?;
        let framecount = reader.read_u16()?;
        let num_entries = reader.read_u16()? as usize;
        let loop_anim = reader.read_i32()? != 0;
        reader.recall(0)?;
        let mut group = ReadGroup::unpack(reader)?;
        let mut animations = Vec::with_capacity(num_entries);
        for _ in 0..group.len() {
            let name = group.recall_next(reader)?;
            animations.push(unpack_anim(reader, name, framecount)?);
        }
        reader.end();
        Ok(Self {
            name: header.name,
            version: header.version,
            framecount,
            loop_anim,
            animations,
        })
    }

    pub fn pack(&self, writer: &mut BinWriter) -> Result<(), BrresError> {
        let marks = pack_header(writer, MAGIC, self.version, &self.name)?;
        writer.write_i32(0);
        writer.write_u16(self.framecount);
        writer.write_u16(self.animations.len() as u16);
        writer.write_i32(self.loop_anim as i32);
        writer.resolve(marks[0]);
        for mark in marks.into_iter().skip(1) {
            writer.resolve_raw(mark, 0);
        }
        let mut group = IndexGroup::new();
        for anim in &self.animations {
            group.add_entry(&anim.name);
        }
        let mut packed = group.pack(writer);
        for anim in &self.animations {
            packed.resolve_next(writer)?;
            pack_anim(writer, anim, self.framecount)?;
        }
        writer.end();
        Ok(())
    }
}

fn unpack_anim(
    reader: &mut BinReader,
    name: String,
    framecount: u16,
) -> Result<Clr0Anim, BrresError> {
    reader.start();
    reader.skip(4)?; // name pointer
    let flags = reader.read_u32()?;
    let mut targets = Vec::new();
    for slot in 0..NUM_SLOTS {
        let exists = flags & (1 << (slot * 2)) != 0;
        let constant = flags & (1 << (slot * 2 + 1)) != 0;
        if !exists {
            continue;
        }
        let mut mask = [0u8; 4];
        for b in &mut mask {
            *b = reader.read_u8()?;
        }
        let colors = if constant {
            let mut c = [0u8; 4];
            for b in &mut c {
                *b = reader.read_u8()?;
            }
            ColorTrack::Constant(c)
        } else {
            // pointer relative to its own position
            let slot_pos = reader.pos();
            let rel = reader.read_u32()? as usize;
            let after = reader.pos();
            reader.seek(slot_pos + rel);
            let mut list = Vec::with_capacity(framecount as usize);
            for _ in 0..framecount {
                let mut c = [0u8; 4];
                for b in &mut c {
                    *b = reader.read_u8()?;
                }
                list.push(c);
            }
            reader.seek(after);
            ColorTrack::PerFrame(list)
        };
        targets.push(ColorTarget {
            slot,
            mask,
            colors,
        });
    }
    reader.end();
    Ok(Clr0Anim { name, targets })
}

fn pack_anim(
    writer: &mut BinWriter,
    anim: &Clr0Anim,
    framecount: u16,
) -> Result<(), BrresError> {
    writer.start();
    writer.store_name_ref(&anim.name);
    let mut flags = 0u32;
    for target in &anim.targets {
        if target.slot >= NUM_SLOTS {
            return Err(BrresError::IndexOutOfRange {
                kind: "color slot",
                index: target.slot,
                len: NUM_SLOTS,
            });
        }
        flags |= 1 << (target.slot * 2);
        if matches!(target.colors, ColorTrack::Constant(_)) {
            flags |= 1 << (target.slot * 2 + 1);
        }
    }
    writer.write_u32(flags);

    let mut deferred = Vec::new();
    for target in &anim.targets {
        writer.write_bytes(&target.mask);
        match &target.colors {
            ColorTrack::Constant(c) => writer.write_bytes(c),
            ColorTrack::PerFrame(list) => {
                if list.len() != framecount as usize {
                    return Err(BrresError::Packing(format!(
                        "color list for slot {} has {} frames, expected {}",
                        target.slot,
                        list.len(),
                        framecount
                    )));
                }
                deferred.push((writer.mark(), list));
            }
        }
    }
    for (mark, list) in deferred {
        writer.resolve_rel(mark);
        for color in list {
            writer.write_bytes(color);
        }
    }
    writer.end();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trip_constant_and_list() {
        let clr0 = Clr0 {
            name: "fade".to_string(),
            version: 4,
            framecount: 3,
            loop_anim: false,
            animations: vec![Clr0Anim {
                name: "body".to_string(),
                targets: vec![
                    ColorTarget {
                        slot: 0,
                        mask: [0, 0, 0, 0],
                        colors: ColorTrack::Constant([255, 0, 0, 255]),
                    },
                    ColorTarget {
                        slot: 5,
                        mask: [0xff, 0xff, 0xff, 0],
                        colors: ColorTrack::PerFrame(vec![
                            [0, 0, 0, 255],
                            [128, 128, 128, 255],
                            [255, 255, 255, 255],
                        ]),
                    },
                ],
            }],
        };
        let mut writer = BinWriter::new();
        clr0.pack(&mut writer).unwrap();
        let mut reader = BinReader::new(writer.finish().unwrap());
        let read = Clr0::unpack(&mut reader).unwrap();
        assert_eq!(read, clr0);
    }

    #[test]
    fn frame_count_mismatch_fails() {
        let clr0 = Clr0 {
            name: "bad".to_string(),
            version: 4,
            framecount: 10,
            loop_anim: true,
            animations: vec![Clr0Anim {
                name: "m".to_string(),
                targets: vec![ColorTarget {
                    slot: 1,
                    mask: [0; 4],
                    colors: ColorTrack::PerFrame(vec![[0; 4]; 3]),
                }],
            }],
        };
        let mut writer = BinWriter::new();
        assert!(matches!(
            clr0.pack(&mut writer),
            Err(BrresError::Packing(_))
        ));
    }
}
