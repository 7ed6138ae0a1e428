//! SRT0 texture coordinate animation.
//!
//! Each material entry animates up to eight layer slots with five tracks:
//! x/y scale, rotation, and x/y translation. Tracks are either a single
//! fixed value written inline or a pointer to a keyframe list. Equal lists
//! are stored once per file and shared by every referring track.

use crate::binstream::{BinReader, BinWriter, Mark};
use crate::error::BrresError;
use crate::index_group::{IndexGroup, ReadGroup};
use crate::subfile::{expected_version, pack_header, unpack_header};

pub const MAGIC: &[u8; 4] = b"SRT0";

/// One keyframe: frame index, value, and slope toward the next frame.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeyFrame {
    pub index: f32,
    pub value: f32,
    pub delta: f32,
}

/// An animation track. Always holds at least one entry; a single entry is a
/// fixed value.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeyFrameList {
    pub framecount: u16,
    pub entries: Vec<KeyFrame>,
}

// track equality ignores the frame count, matching the on-disk sharing rule
impl PartialEq for KeyFrameList {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl KeyFrameList {
    pub fn fixed(framecount: u16, value: f32) -> Self {
        Self {
            framecount,
            entries: vec![KeyFrame {
                index: 0.0,
                value,
                delta: 0.0,
            }],
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.entries.len() == 1
    }

    /// A track that never deviates from the neutral value
    /// (1 for scale, 0 for rotation and translation).
    pub fn is_default(&self, is_scale: bool) -> bool {
        match self.entries.len() {
            0 => true,
            1 => {
                let neutral = if is_scale { 1.0 } else { 0.0 };
                self.entries[0].value == neutral
            }
            _ => false,
        }
    }

    pub fn value(&self) -> f32 {
        self.entries.first().map(|e| e.value).unwrap_or_default()
    }

    fn delta(&self, i1: f32, v1: f32, i2: f32, v2: f32) -> f32 {
        if i1 == i2 {
            self.entries[0].delta
        } else {
            (v2 - v1) / (i2 - i1)
        }
    }

    /// Recomputes the slope of the entry at `i` and its predecessor,
    /// wrapping across the loop point.
    fn update_entry(&mut self, i: usize) {
        if self.entries.len() < 2 {
            self.entries[i].delta = 0.0;
            return;
        }
        let entry = self.entries[i];
        let (next_index, next_value) = match self.entries.get(i + 1) {
            Some(next) => (next.index, next.value),
            None => {
                let first = self.entries[0];
                (first.index + self.framecount as f32, first.value)
            }
        };
        let prev_i = if i == 0 { self.entries.len() - 1 } else { i - 1 };
        let prev = self.entries[prev_i];
        let prev_index = if i == 0 {
            prev.index - self.framecount as f32
        } else {
            prev.index
        };
        self.entries[i].delta = self.delta(entry.index, entry.value, next_index, next_value);
        self.entries[prev_i].delta =
            self.delta(prev_index, prev.value, entry.index, entry.value);
    }

    /// Inserts or updates a keyframe, keeping entries ordered by frame
    /// index and deltas consistent.
    pub fn set_key_frame(&mut self, index: f32, value: f32) {
        match self
            .entries
            .iter()
            .position(|e| e.index >= index)
        {
            Some(i) if self.entries[i].index == index => {
                self.entries[i].value = value;
                self.update_entry(i);
            }
            Some(i) => {
                self.entries.insert(
                    i,
                    KeyFrame {
                        index,
                        value,
                        delta: 0.0,
                    },
                );
                self.update_entry(i);
            }
            None => {
                self.entries.push(KeyFrame {
                    index,
                    value,
                    delta: 0.0,
                });
                self.update_entry(self.entries.len() - 1);
            }
        }
    }
}

/// Animation of one texture layer slot.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SrtTexAnim {
    /// Layer slot 0..8 this animates.
    pub layer: usize,
    pub xscale: KeyFrameList,
    pub yscale: KeyFrameList,
    pub rot: KeyFrameList,
    pub xtranslation: KeyFrameList,
    pub ytranslation: KeyFrameList,
}

impl SrtTexAnim {
    pub fn new(layer: usize, framecount: u16) -> Self {
        Self {
            layer,
            xscale: KeyFrameList::fixed(framecount, 1.0),
            yscale: KeyFrameList::fixed(framecount, 1.0),
            rot: KeyFrameList::fixed(framecount, 0.0),
            xtranslation: KeyFrameList::fixed(framecount, 0.0),
            ytranslation: KeyFrameList::fixed(framecount, 0.0),
        }
    }

    fn flags(&self) -> [bool; 9] {
        let mut f = [false; 9];
        f[4] = self.xscale.is_fixed();
        f[5] = self.yscale.is_fixed();
        f[0] = self.xscale.is_default(true) && self.yscale.is_default(true);
        f[3] = f[0] || self.xscale == self.yscale;
        f[6] = self.rot.is_fixed();
        f[1] = self.rot.is_default(false);
        f[7] = self.xtranslation.is_fixed();
        f[8] = self.ytranslation.is_fixed();
        f[2] = self.xtranslation.is_default(false) && self.ytranslation.is_default(false);
        f
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SrtMatAnim {
    pub name: String,
    pub tex_anims: Vec<SrtTexAnim>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Srt0 {
    pub name: String,
    pub version: u32,
    pub framecount: u16,
    pub matrix_mode: u32,
    pub loop_anim: bool,
    pub mat_anims: Vec<SrtMatAnim>,
}

fn frame_scale(framecount: u16) -> f32 {
    if framecount > 1 {
        1.0 / framecount as f32
    } else {
        1.0
    }
}

impl Srt0 {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: expected_version(MAGIC),
            framecount: 1,
            matrix_mode: 0,
            loop_anim: true,
            mat_anims: Vec::new(),
        }
    }

    /// Adds a material animation, which must agree with the file's frame
    /// count.
    pub fn add_mat_anim(&mut self, anim: SrtMatAnim) -> Result<(), BrresError> {
        for tex in &anim.tex_anims {
            for track in [
                &tex.xscale,
                &tex.yscale,
                &tex.rot,
                &tex.xtranslation,
                &tex.ytranslation,
            ] {
                if !track.is_fixed() && track.framecount != self.framecount {
                    return Err(BrresError::Packing(format!(
                        "animation {} has {} frames, file has {}",
                        anim.name, track.framecount, self.framecount
                    )));
                }
            }
        }
        self.mat_anims.push(anim);
        Ok(())
    }

    pub fn unpack(reader: &mut BinReader) -> Result<Self, BrresError> {
        let header = unpack_header(reader, MAGIC)?;
        let _ = reader.read_u32()?;
        let framecount = reader.read_u16()?;
        let size = reader.read_u16()? as usize;
        let matrix_mode = reader.read_u32()?;
        let loop_anim = reader.read_u32()? != 0;
        reader.recall(0)?;
        let mut group = ReadGroup::unpack(reader)?;
        let mut mat_anims = Vec::with_capacity(size);
        for _ in 0..group.len() {
            let name = group.recall_next(reader)?;
            mat_anims.push(unpack_mat_anim(reader, name, framecount)?);
        }
        reader.end();
        Ok(Self {
            name: header.name,
            version: header.version,
            framecount,
            matrix_mode,
            loop_anim,
            mat_anims,
        })
    }

    pub fn pack(&self, writer: &mut BinWriter) -> Result<(), BrresError> {
        let marks = pack_header(writer, MAGIC, self.version, &self.name)?;
        writer.write_u32(0);
        writer.write_u16(self.framecount);
        writer.write_u16(self.mat_anims.len() as u16);
        writer.write_u32(self.matrix_mode);
        writer.write_u32(self.loop_anim as u32);
        writer.resolve(marks[0]);
        for mark in marks.into_iter().skip(1) {
            writer.resolve_raw(mark, 0);
        }
        let mut group = IndexGroup::new();
        for anim in &self.mat_anims {
            group.add_entry(&anim.name);
        }
        let mut packed = group.pack(writer);
        let mut pending: Vec<(Mark, &KeyFrameList)> = Vec::new();
        for anim in &self.mat_anims {
            packed.resolve_next(writer)?;
            pack_mat_anim(writer, anim, &mut pending)?;
        }
        // shared keyframe storage: identical lists pack once
        let mut stored: Vec<(usize, &KeyFrameList)> = Vec::new();
        for (mark, list) in pending {
            match stored.iter().find(|(_, s)| *s == list) {
                Some((offset, _)) => writer.resolve_rel_to(mark, *offset),
                None => {
                    stored.push((writer.pos(), list));
                    writer.resolve_rel(mark);
                    writer.write_u16(list.entries.len() as u16);
                    writer.write_u16(0);
                    writer.write_f32(frame_scale(self.framecount));
                    for entry in &list.entries {
                        writer.write_f32(entry.index);
                        writer.write_f32(entry.value);
                        writer.write_f32(entry.delta);
                    }
                }
            }
        }
        writer.end();
        Ok(())
    }
}

fn pack_mat_anim<'a>(
    writer: &mut BinWriter,
    anim: &'a SrtMatAnim,
    pending: &mut Vec<(Mark, &'a KeyFrameList)>,
) -> Result<(), BrresError> {
    writer.start();
    writer.store_name_ref(&anim.name);
    let mut enabled = 0u32;
    for tex in &anim.tex_anims {
        if tex.layer >= 8 {
            return Err(BrresError::IndexOutOfRange {
                kind: "layer slot",
                index: tex.layer,
                len: 8,
            });
        }
        enabled |= 1 << tex.layer;
    }
    writer.write_u32(enabled);
    writer.write_u32(0);
    let tex_marks = writer.mark_n(anim.tex_anims.len());
    for (tex, mark) in anim.tex_anims.iter().zip(tex_marks) {
        writer.resolve(mark);
        let flags = tex.flags();
        let mut code = 0u32;
        for (i, flag) in flags.iter().enumerate() {
            code |= (*flag as u32) << i;
        }
        writer.write_u32(code << 1 | 1);
        let mut track = |list: &'a KeyFrameList, w: &mut BinWriter| {
            if list.is_fixed() {
                w.write_f32(list.value());
            } else {
                pending.push((w.mark(), list));
            }
        };
        if !flags[0] {
            track(&tex.xscale, writer);
            if !flags[3] {
                track(&tex.yscale, writer);
            }
        }
        if !flags[1] {
            track(&tex.rot, writer);
        }
        if !flags[2] {
            track(&tex.xtranslation, writer);
            track(&tex.ytranslation, writer);
        }
    }
    writer.end();
    Ok(())
}

fn unpack_track(reader: &mut BinReader, framecount: u16) -> Result<KeyFrameList, BrresError> {
    // pointer relative to its own slot
    let slot = reader.pos();
    let rel = reader.read_u32()? as usize;
    let after = reader.pos();
    reader.seek(slot + rel);
    let size = reader.read_u16()?;
    let _ = reader.read_u16()?;
    let _scale = reader.read_f32()?;
    if size == 0 {
        return Err(BrresError::Decode(
            "keyframe list has no entries".to_string(),
        ));
    }
    let mut entries = Vec::with_capacity(size as usize);
    for _ in 0..size {
        entries.push(KeyFrame {
            index: reader.read_f32()?,
            value: reader.read_f32()?,
            delta: reader.read_f32()?,
        });
    }
    reader.seek(after);
    Ok(KeyFrameList {
        framecount,
        entries,
    })
}

fn unpack_mat_anim(
    reader: &mut BinReader,
    name: String,
    framecount: u16,
) -> Result<SrtMatAnim, BrresError> {
    reader.start();
    reader.skip(4)?; // name pointer
    let enabled = reader.read_u32()?;
    let _ = reader.read_u32()?;
    let layers: Vec<usize> = (0..8).filter(|i| enabled & (1 << i) != 0).collect();
    reader.store(layers.len())?;
    let mut tex_anims = Vec::with_capacity(layers.len());
    for layer in layers {
        reader.recall(0)?;
        tex_anims.push(unpack_tex_anim(reader, layer, framecount)?);
    }
    reader.end();
    Ok(SrtMatAnim { name, tex_anims })
}

fn unpack_tex_anim(
    reader: &mut BinReader,
    layer: usize,
    framecount: u16,
) -> Result<SrtTexAnim, BrresError> {
    let code = reader.read_u32()? >> 1;
    let flags: Vec<bool> = (0..9).map(|i| code >> i & 1 != 0).collect();
    let mut anim = SrtTexAnim::new(layer, framecount);
    let fixed = |r: &mut BinReader| -> Result<KeyFrameList, BrresError> {
        Ok(KeyFrameList::fixed(framecount, r.read_f32()?))
    };
    if !flags[0] {
        if flags[3] {
            // isotropic
            if flags[4] {
                let list = fixed(reader)?;
                anim.xscale = list.clone();
                anim.yscale = list;
            } else {
                let list = unpack_track(reader, framecount)?;
                anim.xscale = list.clone();
                anim.yscale = list;
            }
        } else {
            anim.xscale = if flags[4] {
                fixed(reader)?
            } else {
                unpack_track(reader, framecount)?
            };
            anim.yscale = if flags[5] {
                fixed(reader)?
            } else {
                unpack_track(reader, framecount)?
            };
        }
    }
    if !flags[1] {
        anim.rot = if flags[6] {
            fixed(reader)?
        } else {
            unpack_track(reader, framecount)?
        };
    }
    if !flags[2] {
        anim.xtranslation = if flags[7] {
            fixed(reader)?
        } else {
            unpack_track(reader, framecount)?
        };
        anim.ytranslation = if flags[8] {
            fixed(reader)?
        } else {
            unpack_track(reader, framecount)?
        };
    }
    Ok(anim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    fn ramp(framecount: u16) -> KeyFrameList {
        let mut list = KeyFrameList::fixed(framecount, 0.0);
        list.set_key_frame(10.0, 5.0);
        list.set_key_frame(20.0, 0.0);
        list
    }

    #[test]
    fn deltas_are_linear_slopes() {
        let list = ramp(20);
        for pair in list.entries.windows(2) {
            let expected = (pair[1].value - pair[0].value) / (pair[1].index - pair[0].index);
            assert_relative_eq!(pair[0].delta, expected, epsilon = 1e-6);
        }
    }

    fn sample() -> Srt0 {
        let mut tex = SrtTexAnim::new(0, 20);
        tex.xtranslation = ramp(20);
        let mut tex2 = SrtTexAnim::new(1, 20);
        tex2.xtranslation = ramp(20);
        Srt0 {
            name: "scroll".to_string(),
            version: 5,
            framecount: 20,
            matrix_mode: 0,
            loop_anim: true,
            mat_anims: vec![
                SrtMatAnim {
                    name: "water".to_string(),
                    tex_anims: vec![tex],
                },
                SrtMatAnim {
                    name: "lava".to_string(),
                    tex_anims: vec![tex2],
                },
            ],
        }
    }

    #[test]
    fn round_trip() {
        let srt0 = sample();
        let mut writer = BinWriter::new();
        srt0.pack(&mut writer).unwrap();
        let mut reader = BinReader::new(writer.finish().unwrap());
        let read = Srt0::unpack(&mut reader).unwrap();
        assert_eq!(read, srt0);
    }

    #[test]
    fn equal_lists_are_stored_once() {
        let srt0 = sample();
        let mut writer = BinWriter::new();
        srt0.pack(&mut writer).unwrap();
        let file = writer.finish().unwrap();
        // the shared ramp packs a unique keyframe (10.0, 5.0, -0.5)
        let needle: Vec<u8> = [10.0f32, 5.0, -0.5]
            .iter()
            .flat_map(|f| f.to_be_bytes())
            .collect();
        let count = file
            .windows(needle.len())
            .filter(|w| *w == needle.as_slice())
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn isotropic_scale_shares_one_track() {
        let mut tex = SrtTexAnim::new(0, 10);
        let mut scale = KeyFrameList::fixed(10, 1.0);
        scale.set_key_frame(5.0, 2.0);
        tex.xscale = scale.clone();
        tex.yscale = scale;
        let srt0 = Srt0 {
            name: "pulse".to_string(),
            version: 5,
            framecount: 10,
            matrix_mode: 0,
            loop_anim: true,
            mat_anims: vec![SrtMatAnim {
                name: "m".to_string(),
                tex_anims: vec![tex],
            }],
        };
        let mut writer = BinWriter::new();
        srt0.pack(&mut writer).unwrap();
        let mut reader = BinReader::new(writer.finish().unwrap());
        let read = Srt0::unpack(&mut reader).unwrap();
        assert_eq!(read.mat_anims[0].tex_anims[0].xscale, read.mat_anims[0].tex_anims[0].yscale);
        assert_eq!(read, srt0);
    }

    #[test]
    fn frame_count_mismatch_is_rejected() {
        let mut srt0 = Srt0::new("bad");
        srt0.framecount = 30;
        let mut tex = SrtTexAnim::new(0, 20);
        tex.rot = ramp(20);
        assert!(matches!(
            srt0.add_mat_anim(SrtMatAnim {
                name: "m".to_string(),
                tex_anims: vec![tex],
            }),
            Err(BrresError::Packing(_))
        ));
    }
}
