//! Materials and their texture layers.
//!
//! A material record is a fixed layout: header, precompiled display list
//! space, layer flag block with eight SRT and texture matrix slots, two
//! light channels, the layer records, and finally the MatGX display list
//! (BP state then per layer XF commands).

use std::collections::VecDeque;

use ahash::AHashMap;

use crate::binstream::{BinReader, BinWriter, Mark};
use crate::error::BrresError;
use crate::formats::mdl0::gpu::{self, IndMatrix};
use crate::formats::mdl0::shader::Shader;

/// Byte offset from the material start to the layer flag block.
const LAYER_INFO_OFFSET: usize = 0x1a8;

/// One texture reference of a material.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Layer {
    pub name: String,
    pub enable: bool,
    pub scale: [f32; 2],
    pub rotation: f32,
    pub translation: [f32; 2],
    pub uwrap: u32,
    pub vwrap: u32,
    pub minfilter: u32,
    pub magfilter: u32,
    pub lod_bias: f32,
    pub max_anisotrophy: u32,
    pub clamp_bias: bool,
    pub texel_interpolate: bool,
    pub scn0_camera_ref: i8,
    pub scn0_light_ref: i8,
    pub map_mode: i8,
    pub enable_identity_matrix: bool,
    pub texture_matrix: [f32; 12],
    pub projection: u8,
    pub inputform: u8,
    pub coord_type: u8,
    pub coordinates: u8,
    pub emboss_source: u8,
    pub emboss_light: u16,
    pub normalize: bool,
}

impl Layer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            enable: true,
            scale: [1.0, 1.0],
            rotation: 0.0,
            translation: [0.0, 0.0],
            uwrap: 0,
            vwrap: 0,
            minfilter: 1,
            magfilter: 1,
            lod_bias: 0.0,
            max_anisotrophy: 0,
            clamp_bias: false,
            texel_interpolate: false,
            scn0_camera_ref: -1,
            scn0_light_ref: -1,
            map_mode: 0,
            enable_identity_matrix: true,
            texture_matrix: [
                1.0, 0.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, 0.0, //
                0.0, 0.0, 1.0, 0.0,
            ],
            projection: 0,
            inputform: 0,
            coord_type: 0,
            coordinates: 5,
            emboss_source: 5,
            emboss_light: 0,
            normalize: false,
        }
    }

    fn flag_nibble(&self) -> u32 {
        let scale_default = self.scale == [1.0, 1.0];
        let rotation_default = self.rotation == 0.0;
        let translation_default = self.translation == [0.0, 0.0];
        self.enable as u32
            | (scale_default as u32) << 1
            | (rotation_default as u32) << 2
            | (translation_default as u32) << 3
    }
}

/// A lighting channel. The control words keep the raw register layout.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LightChannel {
    pub flags: u8,
    pub material_color: [u8; 4],
    pub ambient_color: [u8; 4],
    pub color_control: u32,
    pub alpha_control: u32,
}

impl Default for LightChannel {
    fn default() -> Self {
        Self {
            flags: 0x3f,
            material_color: [0x80, 0x80, 0x80, 0xff],
            ambient_color: [0, 0, 0, 0xff],
            color_control: 0x700,
            alpha_control: 0x700,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Material {
    pub name: String,
    pub xlu: bool,
    pub layers: Vec<Layer>,
    pub light_channels: Vec<LightChannel>,
    pub shader: Shader,
    pub shader_stages: u8,
    pub indirect_stages: u8,
    pub cullmode: u32,
    pub compare_before_texture: bool,
    pub lightset: i8,
    pub fogset: i8,
    pub texture_matrix_mode: u32,
    // MatGX state
    pub ref0: u8,
    pub ref1: u8,
    pub comp0: u8,
    pub comp1: u8,
    pub logic: u8,
    pub depth_test: bool,
    pub depth_update: bool,
    pub depth_function: u8,
    pub blend_enabled: bool,
    pub blend_logic_enabled: bool,
    pub blend_dither: bool,
    pub blend_update_color: bool,
    pub blend_update_alpha: bool,
    pub blend_subtract: bool,
    pub blend_logic: u8,
    pub blend_source: u8,
    pub blend_dest: u8,
    pub constant_alpha_enabled: bool,
    pub constant_alpha: u8,
    pub colors: [[u16; 4]; 3],
    pub constant_colors: [[u16; 4]; 4],
    pub ras1_ss: [u32; 2],
    pub indirect_matrices: [IndMatrix; 3],
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            xlu: false,
            layers: Vec::new(),
            light_channels: vec![LightChannel::default()],
            shader: Shader::default(),
            shader_stages: 1,
            indirect_stages: 0,
            cullmode: 2,
            compare_before_texture: false,
            lightset: -1,
            fogset: 0,
            texture_matrix_mode: 0,
            ref0: 0,
            ref1: 0,
            comp0: 7,
            comp1: 7,
            logic: 0,
            depth_test: true,
            depth_update: true,
            depth_function: 3,
            blend_enabled: false,
            blend_logic_enabled: false,
            blend_dither: false,
            blend_update_color: false,
            blend_update_alpha: false,
            blend_subtract: false,
            blend_logic: 5,
            blend_source: 4,
            blend_dest: 5,
            constant_alpha_enabled: false,
            constant_alpha: 0,
            colors: [[0; 4]; 3],
            constant_colors: [[0; 4]; 4],
            ras1_ss: [0; 2],
            indirect_matrices: Default::default(),
        }
    }

    pub fn is_xlu(&self) -> bool {
        self.xlu
    }

    /// Swaps a texture reference on every layer that uses it.
    pub fn rename_texture(&mut self, old: &str, new: &str) -> bool {
        let mut renamed = false;
        for layer in &mut self.layers {
            if layer.name == old {
                layer.name = new.to_string();
                renamed = true;
            }
        }
        renamed
    }
}

/// Pending texture link slots for one texture, filled in as materials pack.
pub struct TexLinkSlots {
    pub base: usize,
    pub slots: VecDeque<Mark>,
}

pub type TexLinkMap = AHashMap<String, TexLinkSlots>;

/// Offsets noted while packing a material, needed to hook up its shader.
pub struct PackedMaterial {
    pub base: usize,
    shader_mark: Mark,
}

impl PackedMaterial {
    /// Points this material's shader pointer at the current offset.
    pub fn resolve_shader(&self, writer: &mut BinWriter) {
        writer.resolve_from(self.shader_mark, self.base);
    }
}

impl Material {
    pub fn pack(
        &self,
        writer: &mut BinWriter,
        index: u32,
        version: u32,
        tex_links: &mut TexLinkMap,
    ) -> Result<PackedMaterial, BrresError> {
        if self.layers.len() > 8 {
            return Err(BrresError::Packing(format!(
                "material {} has {} layers, limit is 8",
                self.name,
                self.layers.len()
            )));
        }
        if self.light_channels.len() > 2 {
            return Err(BrresError::Packing(format!(
                "material {} has {} light channels, limit is 2",
                self.name,
                self.light_channels.len()
            )));
        }
        let base = writer.start();
        writer.mark_len();
        writer.write_i32(writer.outer_offset());
        writer.store_name_ref(&self.name);
        writer.write_u32(index);
        writer.write_u32((self.xlu as u32) << 31);
        writer.write_u8(self.layers.len() as u8);
        writer.write_u8(self.light_channels.len() as u8);
        writer.write_u8(self.shader_stages);
        writer.write_u8(self.indirect_stages);
        writer.write_u32(self.cullmode);
        writer.write_u8(self.compare_before_texture as u8);
        writer.write_u8(self.lightset as u8);
        writer.write_u8(self.fogset as u8);
        writer.write_u8(0); // pad
        writer.write_u32(0); // indirect method
        writer.write_bytes(&[0xff; 4]); // light normal map refs
        let shader_mark = writer.mark();
        writer.write_u32(self.layers.len() as u32);
        let layer_mark = writer.mark();
        writer.write_u32(0); // fur
        let matgx_mark = if version >= 10 {
            writer.advance(4);
            writer.mark()
        } else {
            let m = writer.mark();
            writer.advance(4);
            m
        };
        // precompiled display list space
        writer.advance(360);

        // layer flag block
        let mut flag_word = 0u32;
        for (i, layer) in self.layers.iter().enumerate() {
            flag_word |= layer.flag_nibble() << (4 * i);
        }
        writer.write_u32(flag_word);
        writer.write_u32(self.texture_matrix_mode);
        for layer in &self.layers {
            writer.write_f32(layer.scale[0]);
            writer.write_f32(layer.scale[1]);
            writer.write_f32(layer.rotation);
            writer.write_f32(layer.translation[0]);
            writer.write_f32(layer.translation[1]);
        }
        for _ in self.layers.len()..8 {
            for v in [1.0f32, 1.0, 0.0, 0.0, 0.0] {
                writer.write_f32(v);
            }
        }
        for layer in &self.layers {
            writer.write_u8(layer.scn0_camera_ref as u8);
            writer.write_u8(layer.scn0_light_ref as u8);
            writer.write_u8(layer.map_mode as u8);
            writer.write_u8(layer.enable_identity_matrix as u8);
            for v in layer.texture_matrix {
                writer.write_f32(v);
            }
        }
        for _ in self.layers.len()..8 {
            writer.write_bytes(&[0xff, 0xff, 0, 1]);
            for v in [
                1.0f32, 0.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, 0.0, //
                0.0, 0.0, 1.0, 0.0,
            ] {
                writer.write_f32(v);
            }
        }
        for i in 0..2 {
            match self.light_channels.get(i) {
                Some(lc) => {
                    writer.write_u32(lc.flags as u32);
                    writer.write_bytes(&lc.material_color);
                    writer.write_bytes(&lc.ambient_color);
                    writer.write_u32(lc.color_control);
                    writer.write_u32(lc.alpha_control);
                }
                None => {
                    writer.write_u32(0xf);
                    writer.write_u32(0xff);
                    writer.write_u32(0);
                    writer.write_u32(0);
                    writer.write_u32(0);
                }
            }
        }

        // layer records, patching the texture link placeholders
        writer.resolve(layer_mark);
        for (layer_index, layer) in self.layers.iter().enumerate() {
            let link = tex_links
                .get_mut(&layer.name)
                .ok_or_else(|| BrresError::UnknownName(layer.name.clone()))?;
            let mat_slot = link.slots.pop_front().ok_or_else(|| {
                BrresError::Packing(format!("no link slot left for texture {}", layer.name))
            })?;
            let layer_slot = link.slots.pop_front().ok_or_else(|| {
                BrresError::Packing(format!("no link slot left for texture {}", layer.name))
            })?;
            writer.resolve_raw(mat_slot, (base - link.base) as u32);
            writer.resolve_raw(layer_slot, (writer.pos() - link.base) as u32);
            writer.start();
            writer.store_name_ref(&layer.name);
            writer.advance(12); // palette name and runtime pointers
            writer.write_u32(layer_index as u32); // texture id
            writer.write_u32(layer_index as u32); // palette id
            writer.write_u32(layer.uwrap);
            writer.write_u32(layer.vwrap);
            writer.write_u32(layer.minfilter);
            writer.write_u32(layer.magfilter);
            writer.write_f32(layer.lod_bias);
            writer.write_u32(layer.max_anisotrophy);
            writer.write_u8(layer.clamp_bias as u8);
            writer.write_u8(layer.texel_interpolate as u8);
            writer.write_u16(0);
            writer.end();
        }

        writer.align_to_parent(0x20);
        writer.resolve(matgx_mark);
        writer.start();
        self.pack_mat_gx(writer);
        let xf_start = writer.pos();
        for (i, layer) in self.layers.iter().enumerate() {
            gpu::pack_tex_matrix_xf(
                writer,
                i,
                layer.projection,
                layer.inputform,
                layer.coord_type,
                layer.coordinates,
                layer.emboss_source,
                layer.emboss_light,
            );
            gpu::pack_dual_tex_xf(writer, i, layer.normalize);
        }
        writer.advance(0xa0 - (writer.pos() - xf_start));
        writer.end();
        writer.end();
        Ok(PackedMaterial { base, shader_mark })
    }

    fn pack_mat_gx(&self, writer: &mut BinWriter) {
        gpu::pack_alpha_function(
            writer,
            gpu::AlphaFunction::new()
                .with_ref0(self.ref0)
                .with_ref1(self.ref1)
                .with_comp0(self.comp0 & 7)
                .with_comp1(self.comp1 & 7)
                .with_logic(self.logic & 3),
        );
        gpu::pack_zmode(
            writer,
            gpu::ZMode::new()
                .with_depth_test(self.depth_test)
                .with_depth_function(self.depth_function & 7)
                .with_depth_update(self.depth_update),
        );
        gpu::pack_bp_mask(writer, 0xffe3);
        gpu::pack_blend_mode(
            writer,
            gpu::BlendMode::new()
                .with_enabled(self.blend_enabled)
                .with_logic_enabled(self.blend_logic_enabled)
                .with_dither(self.blend_dither)
                .with_update_color(self.blend_update_color)
                .with_update_alpha(self.blend_update_alpha)
                .with_dest(self.blend_dest & 7)
                .with_source(self.blend_source & 7)
                .with_subtract(self.blend_subtract)
                .with_logic(self.blend_logic & 0xf),
        );
        gpu::pack_constant_alpha(
            writer,
            gpu::ConstantAlpha::new()
                .with_alpha(self.constant_alpha)
                .with_enabled(self.constant_alpha_enabled),
        );
        writer.advance(7);
        for (i, color) in self.colors.iter().enumerate() {
            gpu::pack_color(writer, i + 1, *color, false);
        }
        writer.advance(4);
        for (i, color) in self.constant_colors.iter().enumerate() {
            gpu::pack_color(writer, i, *color, true);
        }
        writer.advance(24);
        for (i, data) in self.ras1_ss.iter().enumerate() {
            gpu::pack_ras1_ss(writer, *data, i);
        }
        for (i, mtx) in self.indirect_matrices.iter().enumerate() {
            mtx.pack(writer, i);
        }
        writer.advance(9);
    }

    /// Unpacks a material record. Returns the material (without its shader,
    /// which lives in a separate section) and the shader offset relative to
    /// the material start.
    pub fn unpack(
        reader: &mut BinReader,
        name: String,
        version: u32,
    ) -> Result<(Self, i32), BrresError> {
        let base = reader.start();
        reader.read_len()?;
        reader.skip(8)?; // outer offset, name
        let _index = reader.read_u32()?;
        let xlu_flags = reader.read_u32()?;
        let nlayers = reader.read_u8()? as usize;
        let nlights = reader.read_u8()? as usize;
        let shader_stages = reader.read_u8()?;
        let indirect_stages = reader.read_u8()?;
        let cullmode = reader.read_u32()?;
        let compare_before_texture = reader.read_u8()? != 0;
        let lightset = reader.read_u8()? as i8;
        let fogset = reader.read_u8()? as i8;
        reader.skip(1)?; // pad
        if nlayers > 8 || nlights > 2 {
            return Err(BrresError::Decode(format!(
                "material {} has {} layers and {} light channels",
                name, nlayers, nlights
            )));
        }
        reader.skip(8)?; // indirect method, light normal map
        let shader_offset = reader.read_i32()?;
        let ntexgens = reader.read_u32()? as usize;
        if ntexgens != nlayers {
            return Err(BrresError::Decode(format!(
                "material {} has {} layers but {} texgens",
                name, nlayers, ntexgens
            )));
        }
        reader.store(1)?; // layer offset
        reader.skip(4)?; // fur
        if version >= 10 {
            reader.skip(4)?;
            reader.store(1)?; // matgx offset
        } else {
            reader.store(1)?;
            reader.skip(4)?;
        }
        reader.skip(360)?;

        // layer flag block
        debug_assert_eq!(reader.pos() - base, LAYER_INFO_OFFSET);
        let flag_word = reader.read_u32()?;
        let texture_matrix_mode = reader.read_u32()?;
        let mut srt = Vec::with_capacity(nlayers);
        for i in 0..8 {
            let s0 = reader.read_f32()?;
            let s1 = reader.read_f32()?;
            let rot = reader.read_f32()?;
            let t0 = reader.read_f32()?;
            let t1 = reader.read_f32()?;
            if i < nlayers {
                srt.push(([s0, s1], rot, [t0, t1]));
            }
        }
        let mut tex_mtx = Vec::with_capacity(nlayers);
        for i in 0..8 {
            let cam = reader.read_u8()? as i8;
            let light = reader.read_u8()? as i8;
            let map_mode = reader.read_u8()? as i8;
            let identity = reader.read_u8()? != 0;
            let mut m = [0.0f32; 12];
            for v in &mut m {
                *v = reader.read_f32()?;
            }
            if i < nlayers {
                tex_mtx.push((cam, light, map_mode, identity, m));
            }
        }
        let mut light_channels = Vec::with_capacity(nlights);
        for i in 0..2 {
            let flags = reader.read_u32()? as u8;
            let mut material_color = [0u8; 4];
            for b in &mut material_color {
                *b = reader.read_u8()?;
            }
            let mut ambient_color = [0u8; 4];
            for b in &mut ambient_color {
                *b = reader.read_u8()?;
            }
            let color_control = reader.read_u32()?;
            let alpha_control = reader.read_u32()?;
            if i < nlights {
                light_channels.push(LightChannel {
                    flags,
                    material_color,
                    ambient_color,
                    color_control,
                    alpha_control,
                });
            }
        }

        reader.recall(0)?; // layer records
        let mut layers = Vec::with_capacity(nlayers);
        for i in 0..nlayers {
            reader.start();
            let layer_name = reader.read_name()?.unwrap_or_default();
            reader.skip(12)?;
            reader.skip(8)?; // runtime texture and palette ids
            let uwrap = reader.read_u32()?;
            let vwrap = reader.read_u32()?;
            let minfilter = reader.read_u32()?;
            let magfilter = reader.read_u32()?;
            let lod_bias = reader.read_f32()?;
            let max_anisotrophy = reader.read_u32()?;
            let clamp_bias = reader.read_u8()? != 0;
            let texel_interpolate = reader.read_u8()? != 0;
            reader.skip(2)?;
            reader.end();
            let (scale, rotation, translation) = srt[i];
            let (cam, light, map_mode, identity, matrix) = tex_mtx[i];
            layers.push(Layer {
                name: layer_name,
                enable: flag_word >> (4 * i) & 1 != 0,
                scale,
                rotation,
                translation,
                uwrap,
                vwrap,
                minfilter,
                magfilter,
                lod_bias,
                max_anisotrophy,
                clamp_bias,
                texel_interpolate,
                scn0_camera_ref: cam,
                scn0_light_ref: light,
                map_mode,
                enable_identity_matrix: identity,
                texture_matrix: matrix,
                projection: 0,
                inputform: 0,
                coord_type: 0,
                coordinates: 5,
                emboss_source: 5,
                emboss_light: 0,
                normalize: false,
            });
        }

        reader.recall(0)?; // matgx
        let mut material = Material {
            name,
            xlu: xlu_flags >> 31 & 1 != 0,
            layers,
            light_channels,
            shader: Shader::default(),
            shader_stages,
            indirect_stages,
            cullmode,
            compare_before_texture,
            lightset,
            fogset,
            texture_matrix_mode,
            ..Material::new("")
        };
        material.unpack_mat_gx(reader)?;
        reader.end();
        Ok((material, shader_offset))
    }

    fn unpack_mat_gx(&mut self, reader: &mut BinReader) -> Result<(), BrresError> {
        reader.start();
        let alpha = gpu::unpack_alpha_function(reader)?;
        self.ref0 = alpha.ref0();
        self.ref1 = alpha.ref1();
        self.comp0 = alpha.comp0();
        self.comp1 = alpha.comp1();
        self.logic = alpha.logic();
        let zmode = gpu::unpack_zmode(reader)?;
        self.depth_test = zmode.depth_test();
        self.depth_function = zmode.depth_function();
        self.depth_update = zmode.depth_update();
        gpu::unpack_bp(reader)?; // mask 0xffe3
        let blend = gpu::unpack_blend_mode(reader)?;
        self.blend_enabled = blend.enabled();
        self.blend_logic_enabled = blend.logic_enabled();
        self.blend_dither = blend.dither();
        self.blend_update_color = blend.update_color();
        self.blend_update_alpha = blend.update_alpha();
        self.blend_dest = blend.dest();
        self.blend_source = blend.source();
        self.blend_subtract = blend.subtract();
        self.blend_logic = blend.logic();
        let calpha = gpu::unpack_constant_alpha(reader)?;
        self.constant_alpha_enabled = calpha.enabled();
        self.constant_alpha = calpha.alpha();
        reader.skip(7)?;
        for color in &mut self.colors {
            *color = gpu::unpack_color(reader, false)?;
        }
        reader.skip(4)?;
        for color in &mut self.constant_colors {
            *color = gpu::unpack_color(reader, true)?;
        }
        reader.skip(24)?;
        for slot in &mut self.ras1_ss {
            let (_, data) = gpu::unpack_bp(reader)?;
            *slot = data;
        }
        for slot in &mut self.indirect_matrices {
            *slot = IndMatrix::unpack(reader)?;
        }
        reader.skip(9)?;
        for i in 0..self.layers.len() {
            let layer = &mut self.layers[i];
            if let Some((_, data)) = gpu::unpack_xf(reader)? {
                layer.projection = (data >> 1 & 1) as u8;
                layer.inputform = (data >> 2 & 3) as u8;
                layer.coord_type = (data >> 4 & 7) as u8;
                layer.coordinates = (data >> 7 & 0x1f) as u8;
                layer.emboss_source = (data >> 0xc & 7) as u8;
                layer.emboss_light = (data >> 0xf & 0xffff) as u16;
            }
            if let Some((_, data)) = gpu::unpack_xf(reader)? {
                layer.normalize = data >> 8 & 1 != 0;
            }
        }
        reader.end();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn link_map_for(writer: &mut BinWriter, names: &[&str]) -> TexLinkMap {
        let mut map = TexLinkMap::default();
        for name in names {
            let base = writer.start();
            writer.write_u32(1);
            let slots = writer.mark_n(2).into();
            writer.end();
            map.insert(name.to_string(), TexLinkSlots { base, slots });
        }
        map
    }

    fn sample() -> Material {
        let mut mat = Material::new("body");
        let mut layer = Layer::new("skin");
        layer.scale = [2.0, 2.0];
        layer.uwrap = 1;
        layer.vwrap = 1;
        layer.projection = 0;
        layer.coordinates = 4;
        mat.layers.push(layer);
        mat.xlu = true;
        mat.colors[0] = [255, 128, 0, 255];
        mat.constant_colors[3] = [1, 2, 3, 4];
        mat.ras1_ss = [0x1234, 0];
        mat.ref0 = 128;
        mat.comp0 = 4;
        mat.depth_function = 3;
        mat.blend_source = 4;
        mat.blend_dest = 5;
        mat.blend_logic = 0xa;
        mat.constant_alpha_enabled = true;
        mat.constant_alpha = 0x40;
        mat
    }

    fn round_trip(version: u32) {
        let mat = sample();
        let mut writer = BinWriter::new();
        writer.start();
        let mut links = link_map_for(&mut writer, &["skin"]);
        let packed = mat.pack(&mut writer, 0, version, &mut links).unwrap();
        // fake shader right after so the pointer resolves
        packed.resolve_shader(&mut writer);
        writer.end();
        let file = writer.finish().unwrap();

        let mut reader = BinReader::new(file);
        reader.start();
        reader.seek(packed.base);
        let (read, shader_offset) = Material::unpack(&mut reader, "body".to_string(), version).unwrap();
        assert_eq!(read, mat);
        assert!(shader_offset > 0);
    }

    #[test]
    fn round_trip_v11() {
        round_trip(11);
    }

    #[test]
    fn round_trip_v8() {
        round_trip(8);
    }

    #[test]
    fn too_many_layers_rejected() {
        let mut mat = Material::new("m");
        for i in 0..9 {
            mat.layers.push(Layer::new(&format!("t{}", i)));
        }
        let mut writer = BinWriter::new();
        writer.start();
        let mut links = TexLinkMap::default();
        assert!(mat.pack(&mut writer, 0, 11, &mut links).is_err());
    }
}
