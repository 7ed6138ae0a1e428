//! PAT0 texture swap animation.
//!
//! Frames select a texture by index into a per-file pool of texture names.
//! The pool is rebuilt from the frames at pack time. Palette animation is
//! not supported by the producer and is rejected here as well.

use log::warn;

use crate::binstream::{BinReader, BinWriter};
use crate::error::BrresError;
use crate::index_group::{IndexGroup, ReadGroup};
use crate::subfile::{expected_version, pack_header, unpack_header};

pub const MAGIC: &[u8; 4] = b"PAT0";

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pat0Frame {
    pub frame_id: f32,
    pub texture: String,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pat0Anim {
    pub name: String,
    pub fixed_texture: bool,
    pub has_texture: bool,
    pub has_palette: bool,
    pub frames: Vec<Pat0Frame>,
}

impl Pat0Anim {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fixed_texture: false,
            has_texture: true,
            has_palette: false,
            frames: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pat0 {
    pub name: String,
    pub version: u32,
    pub framecount: u16,
    pub loop_anim: bool,
    pub animations: Vec<Pat0Anim>,
}

fn frame_scale(framecount: u16) -> f32 {
    if framecount > 1 {
        1.0 / framecount as f32
    } else {
        1.0
    }
}

impl Pat0 {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: expected_version(MAGIC),
            framecount: 1,
            loop_anim: true,
            animations: Vec::new(),
        }
    }

    /// Unique texture names in order of first use.
    pub fn textures(&self) -> Vec<&str> {
        let mut pool: Vec<&str> = Vec::new();
        for anim in &self.animations {
            for frame in &anim.frames {
                if !pool.contains(&frame.texture.as_str()) {
                    pool.push(&frame.texture);
                }
            }
        }
        pool
    }

    pub fn rename_texture(&mut self, old: &str, new: &str) -> bool {
        let mut renamed = false;
        for anim in &mut self.animations {
            for frame in &mut anim.frames {
                if frame.texture == old {
                    frame.texture = new.to_string();
                    renamed = true;
                }
            }
        }
        renamed
    }

    pub fn unpack(reader: &mut BinReader) -> Result<Self, BrresError> {
        let header = unpack_header(reader, MAGIC)?;
        let _ = reader.read_u32()?;
        let framecount = reader.read_u16()?;
        let num_mats = reader.read_u16()? as usize;
        let num_tex = reader.read_u16()? as usize;
        let num_plt = reader.read_u16()? as usize;
        let loop_anim = reader.read_u32()? != 0;
        if num_plt != 0 {
            return Err(BrresError::Packing(
                "palette animation is not supported".to_string(),
            ));
        }
        reader.recall(0)?;
        let mut group = ReadGroup::unpack(reader)?;
        // frame texture ids are resolved after the pool is read
        let mut raw: Vec<(Pat0Anim, Vec<(f32, u16)>)> = Vec::with_capacity(num_mats);
        for _ in 0..group.len() {
            let name = group.recall_next(reader)?;
            raw.push(unpack_anim(reader, name, framecount)?);
        }
        reader.recall(0)?;
        reader.start();
        let mut textures = Vec::with_capacity(num_tex);
        for _ in 0..num_tex {
            textures.push(reader.read_name()?.unwrap_or_default());
        }
        reader.end();
        reader.recall(0)?;
        reader.recall(0)?;
        let mut animations = Vec::with_capacity(raw.len());
        for (mut anim, frames) in raw {
            for (frame_id, tex_id) in frames {
                let texture = match textures.get(tex_id as usize) {
                    Some(name) => name.clone(),
                    None => {
                        warn!(
                            "PAT0 {} texture id {} out of range",
                            anim.name, tex_id
                        );
                        textures.first().cloned().unwrap_or_default()
                    }
                };
                anim.frames.push(Pat0Frame { frame_id, texture });
            }
            animations.push(anim);
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
        let textures: Vec<String> = self.textures().iter().map(|s| s.to_string()).collect();
        writer.write_u32(0);
        writer.write_u16(self.framecount);
        writer.write_u16(self.animations.len() as u16);
        writer.write_u16(textures.len() as u16);
        writer.write_u16(0);
        writer.write_u32(self.loop_anim as u32);
        let mut marks = marks.into_iter();
        if let Some(m) = marks.next() {
            writer.resolve(m); // section 0
        }
        let mut group = IndexGroup::new();
        for anim in &self.animations {
            group.add_entry(&anim.name);
        }
        let mut packed = group.pack(writer);
        let mut pending = Vec::with_capacity(self.animations.len());
        for anim in &self.animations {
            packed.resolve_next(writer)?;
            let base = writer.start();
            writer.store_name_ref(&anim.name);
            let flags = 1u32
                | (anim.fixed_texture as u32) << 1
                | (anim.has_texture as u32) << 2
                | (anim.has_palette as u32) << 3;
            writer.write_u32(flags);
            let mark = writer.mark();
            writer.end();
            pending.push((base, mark, anim));
        }
        for (base, mark, anim) in pending {
            writer.resolve_from(mark, base);
            writer.write_u16(anim.frames.len() as u16);
            writer.write_u16(0);
            writer.write_f32(frame_scale(self.framecount));
            for frame in &anim.frames {
                let tex_id = textures
                    .iter()
                    .position(|t| t == &frame.texture)
                    .unwrap_or_default();
                writer.write_f32(frame.frame_id);
                writer.write_u16(tex_id as u16);
                writer.write_u16(0);
            }
        }
        if let Some(m) = marks.next() {
            writer.resolve(m); // section 1: texture names
        }
        writer.start();
        for texture in &textures {
            writer.store_name_ref(texture);
        }
        writer.end();
        if let Some(m) = marks.next() {
            writer.resolve(m); // section 2: palettes (empty)
        }
        if let Some(m) = marks.next() {
            writer.resolve(m); // section 3: runtime texture pointers
        }
        writer.advance(textures.len() * 4);
        if let Some(m) = marks.next() {
            writer.resolve(m); // section 4: runtime palette pointers
        }
        for mark in marks {
            writer.resolve_raw(mark, 0);
        }
        writer.end();
        Ok(())
    }
}

fn unpack_anim(
    reader: &mut BinReader,
    name: String,
    framecount: u16,
) -> Result<(Pat0Anim, Vec<(f32, u16)>), BrresError> {
    let base = reader.start();
    reader.skip(4)?; // name pointer
    let flags = reader.read_u32()?;
    let mut anim = Pat0Anim::new(&name);
    anim.fixed_texture = flags >> 1 & 1 != 0;
    anim.has_texture = flags >> 2 & 1 != 0;
    anim.has_palette = flags >> 3 & 1 != 0;
    let offset = reader.read_u32()? as usize;
    let after = reader.pos();
    reader.seek(base + offset);
    let size = reader.read_u16()?;
    let _ = reader.read_u16()?;
    let _scale = reader.read_f32()?;
    let mut frames = Vec::with_capacity(size as usize);
    for _ in 0..size {
        let frame_id = reader.read_f32()?;
        let tex_id = reader.read_u16()?;
        let _plt_id = reader.read_u16()?;
        if frame_id > framecount as f32 {
            warn!("PAT0 {} frame index {} out of range", name, frame_id);
            break;
        }
        frames.push((frame_id, tex_id));
    }
    reader.seek(after);
    reader.end();
    Ok((anim, frames))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Pat0 {
        Pat0 {
            name: "blink".to_string(),
            version: 4,
            framecount: 30,
            loop_anim: true,
            animations: vec![
                Pat0Anim {
                    name: "eyes".to_string(),
                    fixed_texture: false,
                    has_texture: true,
                    has_palette: false,
                    frames: vec![
                        Pat0Frame {
                            frame_id: 0.0,
                            texture: "eye_open".to_string(),
                        },
                        Pat0Frame {
                            frame_id: 15.0,
                            texture: "eye_shut".to_string(),
                        },
                    ],
                },
                Pat0Anim {
                    name: "mouth".to_string(),
                    fixed_texture: false,
                    has_texture: true,
                    has_palette: false,
                    frames: vec![Pat0Frame {
                        frame_id: 0.0,
                        texture: "eye_open".to_string(),
                    }],
                },
            ],
        }
    }

    #[test]
    fn round_trip() {
        let pat0 = sample();
        let mut writer = BinWriter::new();
        pat0.pack(&mut writer).unwrap();
        let mut reader = BinReader::new(writer.finish().unwrap());
        let read = Pat0::unpack(&mut reader).unwrap();
        assert_eq!(read, pat0);
    }

    #[test]
    fn texture_pool_is_deduplicated_in_use_order() {
        let pat0 = sample();
        assert_eq!(pat0.textures(), vec!["eye_open", "eye_shut"]);
    }

    #[test]
    fn rename_texture_updates_frames() {
        let mut pat0 = sample();
        assert!(pat0.rename_texture("eye_open", "eye_new"));
        assert_eq!(pat0.textures(), vec!["eye_new", "eye_shut"]);
    }
}
