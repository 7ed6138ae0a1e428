//! The outer BRES container.
//!
//! A container is a root index group of per-type folders, each folder
//! indexing sub-files by name. Folder names are fixed by the format; a
//! folder is present only when it has entries. Editing operations mark the
//! container modified so a registry can decide whether closing needs a save.

use log::{info, warn};

use crate::binstream::{BinReader, BinWriter, Endian};
use crate::config::Config;
use crate::error::BrresError;
use crate::formats::chr0::Chr0;
use crate::formats::clr0::Clr0;
use crate::formats::mdl0::Mdl0;
use crate::formats::pat0::Pat0;
use crate::formats::srt0::Srt0;
use crate::formats::tex0::Tex0;
use crate::index_group::{IndexGroup, ReadGroup};
use crate::subfile::RawSubFile;

pub const MAGIC: &[u8; 4] = b"bres";
pub const ROOT_MAGIC: &[u8; 4] = b"root";

const FOLDER_MODELS: &str = "3DModels(NW4R)";
const FOLDER_TEXTURES: &str = "Textures(NW4R)";
const FOLDER_PAT0: &str = "AnmTexPat(NW4R)";
const FOLDER_SRT0: &str = "AnmTexSrt(NW4R)";
const FOLDER_CHR0: &str = "AnmChr(NW4R)";
const FOLDER_SCN0: &str = "AnmScn(NW4R)";
const FOLDER_SHP0: &str = "AnmShp(NW4R)";
const FOLDER_CLR0: &str = "AnmClr(NW4R)";

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Brres {
    pub name: String,
    pub models: Vec<Mdl0>,
    pub textures: Vec<Tex0>,
    pub pat0: Vec<Pat0>,
    pub srt0: Vec<Srt0>,
    pub chr0: Vec<Chr0>,
    pub scn0: Vec<RawSubFile>,
    pub shp0: Vec<RawSubFile>,
    pub clr0: Vec<Clr0>,
    /// Sub-files and folders dropped during load, with the reason.
    #[cfg_attr(feature = "derive_serde", serde(skip))]
    pub load_errors: Vec<String>,
    #[cfg_attr(feature = "derive_serde", serde(skip))]
    pub modified: bool,
}

impl Brres {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn mark_modified(&mut self) {
        self.modified = true;
    }

    pub fn model(&self, name: &str) -> Option<&Mdl0> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn model_mut(&mut self, name: &str) -> Option<&mut Mdl0> {
        self.models.iter_mut().find(|m| m.name == name)
    }

    pub fn texture(&self, name: &str) -> Option<&Tex0> {
        self.textures.iter().find(|t| t.name == name)
    }

    pub fn has_texture(&self, name: &str) -> bool {
        self.texture(name).is_some()
    }

    /// Adds a model, replacing any existing model of the same name.
    pub fn add_model(&mut self, mdl0: Mdl0) {
        self.models.retain(|m| m.name != mdl0.name);
        self.models.push(mdl0);
        self.mark_modified();
    }

    /// Adds a texture, replacing any existing texture of the same name.
    pub fn add_texture(&mut self, tex0: Tex0) {
        if self.has_texture(&tex0.name) {
            info!("replaced tex0 {}", tex0.name);
            self.textures.retain(|t| t.name != tex0.name);
        }
        self.textures.push(tex0);
        self.mark_modified();
    }

    pub fn remove_texture(&mut self, name: &str) -> bool {
        let before = self.textures.len();
        self.textures.retain(|t| t.name != name);
        if self.textures.len() != before {
            self.mark_modified();
            true
        } else {
            warn!("no texture {} in {}", name, self.name);
            false
        }
    }

    /// Renames a TEX0 along with every layer and PAT0 frame using it.
    pub fn rename_texture(&mut self, old: &str, new: &str) -> bool {
        let mut renamed = false;
        for tex in &mut self.textures {
            if tex.name == old {
                tex.name = new.to_string();
                renamed = true;
            }
        }
        for model in &mut self.models {
            renamed |= model.rename_texture(old, new);
        }
        for pat0 in &mut self.pat0 {
            renamed |= pat0.rename_texture(old, new);
        }
        if renamed {
            self.mark_modified();
        }
        renamed
    }

    /// Texture names referenced by any layer or PAT0 frame.
    pub fn used_textures(&self) -> Vec<String> {
        let mut used: Vec<String> = Vec::new();
        for model in &self.models {
            for material in &model.materials {
                for layer in &material.layers {
                    if !used.contains(&layer.name) {
                        used.push(layer.name.clone());
                    }
                }
            }
        }
        for pat0 in &self.pat0 {
            for name in pat0.textures() {
                if !used.iter().any(|u| u == name) {
                    used.push(name.to_string());
                }
            }
        }
        used
    }

    /// Merges a material animation set, requiring frame count and loop
    /// flag to agree with any existing SRT0 of the same name.
    pub fn attach_srt0(&mut self, srt0: Srt0) -> Result<(), BrresError> {
        if let Some(existing) = self.srt0.iter_mut().find(|s| s.name == srt0.name) {
            if existing.framecount != srt0.framecount || existing.loop_anim != srt0.loop_anim {
                return Err(BrresError::Packing(format!(
                    "animation {} disagrees on frame count or looping",
                    srt0.name
                )));
            }
            for anim in srt0.mat_anims {
                existing.add_mat_anim(anim)?;
            }
        } else {
            self.srt0.push(srt0);
        }
        self.mark_modified();
        Ok(())
    }

    pub fn attach_pat0(&mut self, pat0: Pat0) -> Result<(), BrresError> {
        if let Some(existing) = self.pat0.iter_mut().find(|p| p.name == pat0.name) {
            if existing.framecount != pat0.framecount || existing.loop_anim != pat0.loop_anim {
                return Err(BrresError::Packing(format!(
                    "animation {} disagrees on frame count or looping",
                    pat0.name
                )));
            }
            existing.animations.extend(pat0.animations);
        } else {
            self.pat0.push(pat0);
        }
        self.mark_modified();
        Ok(())
    }

    /// Runs model checks and prunes unused textures when configured.
    /// Returns human readable findings.
    pub fn check(&mut self, config: &Config) -> Vec<String> {
        let texture_names: Vec<String> = self.textures.iter().map(|t| t.name.clone()).collect();
        let mut findings = Vec::new();
        let mut models = std::mem::take(&mut self.models);
        for model in &mut models {
            findings.extend(model.check(&texture_names, config));
        }
        self.models = models;
        let used = self.used_textures();
        let unused: Vec<String> = texture_names
            .into_iter()
            .filter(|name| !used.contains(name))
            .collect();
        if !unused.is_empty() {
            if config.remove_unused_textures {
                for name in &unused {
                    findings.push(format!("removed unused texture {}", name));
                    self.textures.retain(|t| &t.name != name);
                }
                self.mark_modified();
            } else {
                for name in &unused {
                    findings.push(format!("unused texture {}", name));
                    warn!("{}: unused texture {}", self.name, name);
                }
            }
        }
        findings
    }

    fn folders(&self) -> Vec<(&'static str, Vec<&str>)> {
        let mut folders: Vec<(&'static str, Vec<&str>)> = Vec::new();
        if !self.models.is_empty() {
            folders.push((
                FOLDER_MODELS,
                self.models.iter().map(|m| m.name.as_str()).collect(),
            ));
        }
        if !self.textures.is_empty() {
            folders.push((
                FOLDER_TEXTURES,
                self.textures.iter().map(|t| t.name.as_str()).collect(),
            ));
        }
        if !self.pat0.is_empty() {
            folders.push((
                FOLDER_PAT0,
                self.pat0.iter().map(|p| p.name.as_str()).collect(),
            ));
        }
        if !self.srt0.is_empty() {
            folders.push((
                FOLDER_SRT0,
                self.srt0.iter().map(|s| s.name.as_str()).collect(),
            ));
        }
        if !self.chr0.is_empty() {
            folders.push((
                FOLDER_CHR0,
                self.chr0.iter().map(|c| c.name.as_str()).collect(),
            ));
        }
        if !self.scn0.is_empty() {
            folders.push((
                FOLDER_SCN0,
                self.scn0.iter().map(|s| s.name.as_str()).collect(),
            ));
        }
        if !self.shp0.is_empty() {
            folders.push((
                FOLDER_SHP0,
                self.shp0.iter().map(|s| s.name.as_str()).collect(),
            ));
        }
        if !self.clr0.is_empty() {
            folders.push((
                FOLDER_CLR0,
                self.clr0.iter().map(|c| c.name.as_str()).collect(),
            ));
        }
        folders
    }

    pub fn pack(&self, writer: &mut BinWriter) -> Result<(), BrresError> {
        let folders = self.folders();
        let num_sections = 1 + folders.iter().map(|(_, n)| n.len()).sum::<usize>();

        writer.start();
        writer.write_magic(MAGIC);
        writer.write_u16(0xfeff);
        writer.advance(2);
        writer.mark_len();
        writer.write_u16(0x10);
        writer.write_u16(num_sections as u16);

        // root section: the folder-of-folders with precomputed pointers
        let groups: Vec<IndexGroup> = folders
            .iter()
            .map(|(_, names)| {
                let mut group = IndexGroup::new();
                for name in names {
                    group.add_entry(name);
                }
                group
            })
            .collect();
        let root_size = {
            let mut sizing = IndexGroup::new();
            for (name, _) in &folders {
                sizing.add_entry(name);
            }
            sizing.byte_size()
        };
        let mut root = IndexGroup::new();
        let mut offset = root_size;
        for ((name, _), group) in folders.iter().zip(&groups) {
            root.add_entry_with_ptr(name, offset as u32);
            offset += group.byte_size();
        }

        writer.start();
        writer.write_magic(ROOT_MAGIC);
        writer.mark_len();
        root.pack(writer);
        let mut packed: Vec<_> = groups.iter().map(|g| g.pack(writer)).collect();
        writer.end();
        writer.align(0x20);

        for ((name, _), group) in folders.iter().zip(&mut packed) {
            match *name {
                FOLDER_MODELS => {
                    for model in &self.models {
                        group.resolve_next(writer)?;
                        model.pack(writer)?;
                    }
                }
                FOLDER_TEXTURES => {
                    for tex in &self.textures {
                        group.resolve_next(writer)?;
                        tex.pack(writer)?;
                    }
                }
                FOLDER_PAT0 => {
                    for pat in &self.pat0 {
                        group.resolve_next(writer)?;
                        pat.pack(writer)?;
                    }
                }
                FOLDER_SRT0 => {
                    for srt in &self.srt0 {
                        group.resolve_next(writer)?;
                        srt.pack(writer)?;
                    }
                }
                FOLDER_CHR0 => {
                    for chr in &self.chr0 {
                        group.resolve_next(writer)?;
                        chr.pack(writer)?;
                    }
                }
                FOLDER_SCN0 => {
                    for scn in &self.scn0 {
                        group.resolve_next(writer)?;
                        scn.pack(writer)?;
                    }
                }
                FOLDER_SHP0 => {
                    for shp in &self.shp0 {
                        group.resolve_next(writer)?;
                        shp.pack(writer)?;
                    }
                }
                FOLDER_CLR0 => {
                    for clr in &self.clr0 {
                        group.resolve_next(writer)?;
                        clr.pack(writer)?;
                    }
                }
                _ => {}
            }
        }
        writer.pack_names();
        writer.end();
        Ok(())
    }

    pub fn unpack(reader: &mut BinReader) -> Result<Self, BrresError> {
        reader.start();
        reader.expect_magic(MAGIC)?;
        let bom = reader.read_u16()?;
        if bom == 0xfffe {
            reader.set_endian(Endian::Little);
        }
        reader.skip(2)?;
        reader.read_len()?;
        let root_offset = reader.read_u16()? as usize;
        let _num_sections = reader.read_u16()?;

        reader.seek(root_offset);
        reader.expect_magic(ROOT_MAGIC)?;
        let _root_length = reader.read_u32()?;
        let mut brres = Self::default();
        let mut root = ReadGroup::unpack(reader)?;
        for _ in 0..root.len() {
            let folder_name = root.recall_next(reader)?;
            let mut folder = ReadGroup::unpack(reader)?;
            let known = matches!(
                folder_name.as_str(),
                FOLDER_MODELS
                    | FOLDER_TEXTURES
                    | FOLDER_PAT0
                    | FOLDER_SRT0
                    | FOLDER_CHR0
                    | FOLDER_SCN0
                    | FOLDER_SHP0
                    | FOLDER_CLR0
            );
            if !known {
                warn!("skipping unknown folder {}", folder_name);
                brres
                    .load_errors
                    .push(format!("unknown folder {}", folder_name));
                continue;
            }
            // a corrupt sub-file loses only itself: the other entries seek
            // to their own stored offsets
            for _ in 0..folder.len() {
                let entry = folder.recall_next(reader)?;
                let depth = reader.region_depth();
                let result = match folder_name.as_str() {
                    FOLDER_MODELS => Mdl0::unpack(reader).map(|m| brres.models.push(m)),
                    FOLDER_TEXTURES => Tex0::unpack(reader).map(|t| brres.textures.push(t)),
                    FOLDER_PAT0 => Pat0::unpack(reader).map(|p| brres.pat0.push(p)),
                    FOLDER_SRT0 => Srt0::unpack(reader).map(|s| brres.srt0.push(s)),
                    FOLDER_CHR0 => Chr0::unpack(reader).map(|c| brres.chr0.push(c)),
                    FOLDER_SCN0 => {
                        RawSubFile::unpack(reader, b"SCN0").map(|s| brres.scn0.push(s))
                    }
                    FOLDER_SHP0 => {
                        RawSubFile::unpack(reader, b"SHP0").map(|s| brres.shp0.push(s))
                    }
                    _ => Clr0::unpack(reader).map(|c| brres.clr0.push(c)),
                };
                if let Err(error) = result {
                    warn!("dropped {} entry {}: {}", folder_name, entry, error);
                    brres
                        .load_errors
                        .push(format!("dropped {} entry {}: {}", folder_name, entry, error));
                    reader.unwind_to(depth);
                }
            }
        }
        reader.end();
        Ok(brres)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_texture(name: &str) -> Tex0 {
        let mut tex = Tex0::new(name);
        tex.width = 8;
        tex.height = 8;
        tex.format = 14;
        tex.data = vec![0x11; 32];
        tex
    }

    fn sample() -> Brres {
        let mut brres = Brres::new("course_model.brres");
        brres.textures.push(sample_texture("grass"));
        brres.textures.push(sample_texture("road"));
        let mut clr0 = Clr0::new("course");
        clr0.framecount = 10;
        brres.clr0.push(clr0);
        brres
    }

    #[test]
    fn container_round_trip() {
        let brres = sample();
        let mut writer = BinWriter::new();
        brres.pack(&mut writer).unwrap();
        let file = writer.finish().unwrap();
        assert_eq!(&file[0..4], b"bres");

        let mut reader = BinReader::new(file);
        let read = Brres::unpack(&mut reader).unwrap();
        assert_eq!(read.textures.len(), 2);
        assert_eq!(read.textures[0].name, "grass");
        assert_eq!(read.clr0.len(), 1);
        assert_eq!(read.clr0[0].framecount, 10);
    }

    #[test]
    fn rename_texture_updates_pat0_pool() {
        use crate::formats::pat0::{Pat0Anim, Pat0Frame};
        let mut brres = sample();
        let mut anim = Pat0Anim::new("road");
        anim.frames.push(Pat0Frame {
            frame_id: 0.0,
            texture: "grass".to_string(),
        });
        let mut pat0 = Pat0::new("course");
        pat0.animations.push(anim);
        brres.pat0.push(pat0);

        assert!(brres.rename_texture("grass", "grass2"));
        assert!(brres.has_texture("grass2"));
        assert_eq!(brres.pat0[0].animations[0].frames[0].texture, "grass2");
        assert!(brres.modified);
    }

    #[test]
    fn check_removes_unused_textures_when_configured() {
        let mut brres = sample();
        let mut config = Config::default();
        config.set("remove_unused_textures", "true").unwrap();
        let findings = brres.check(&config);
        // no model or pat0 uses either texture
        assert_eq!(findings.len(), 2);
        assert!(brres.textures.is_empty());
    }

    #[test]
    fn attach_rejects_frame_count_mismatch() {
        let mut brres = sample();
        let mut first = Pat0::new("course");
        first.framecount = 100;
        brres.attach_pat0(first).unwrap();
        let mut second = Pat0::new("course");
        second.framecount = 50;
        assert!(matches!(
            brres.attach_pat0(second),
            Err(BrresError::Packing(_))
        ));
    }

    #[test]
    fn corrupt_subfile_loses_only_itself() {
        let brres = sample();
        let mut writer = BinWriter::new();
        brres.pack(&mut writer).unwrap();
        let mut file = writer.finish().unwrap();
        // break the second texture's magic
        let pos = file
            .windows(4)
            .enumerate()
            .filter(|(_, w)| w == b"TEX0")
            .map(|(i, _)| i)
            .nth(1)
            .expect("two textures packed");
        file[pos] = b'X';
        let mut reader = BinReader::new(file);
        let read = Brres::unpack(&mut reader).unwrap();
        assert_eq!(read.textures.len(), 1);
        assert_eq!(read.textures[0].name, "grass");
        assert_eq!(read.clr0.len(), 1);
        assert_eq!(read.load_errors.len(), 1);
    }

    #[test]
    fn unknown_folder_is_skipped() {
        let brres = sample();
        let mut writer = BinWriter::new();
        brres.pack(&mut writer).unwrap();
        let mut file = writer.finish().unwrap();
        // corrupt the folder name: "AnmClr" -> "AnmClx"
        let pos = file
            .windows(6)
            .position(|w| w == b"AnmClr")
            .expect("folder name present");
        file[pos + 5] = b'x';
        let mut reader = BinReader::new(file);
        let read = Brres::unpack(&mut reader).unwrap();
        assert_eq!(read.textures.len(), 2);
        assert!(read.clr0.is_empty());
        assert_eq!(read.load_errors.len(), 1);
    }
}
