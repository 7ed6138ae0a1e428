//! TEV shader records.
//!
//! A shader is a fixed 512 byte block of BP commands describing the swap
//! table, indirect texture references, and up to sixteen TEV stages packed
//! two per command group. Equal shaders are written once and shared by
//! every material that uses them.

use crate::binstream::{BinReader, BinWriter};
use crate::error::BrresError;
use crate::formats::mdl0::gpu;

pub const BYTE_SIZE: usize = 512;
const SWAP_MASK: u32 = 0x00000f;
const SEL_MASK: u32 = 0xfffff0;

const DEFAULT_SWAP_TABLE: [u32; 8] = [0x4, 0xe, 0x0, 0xc, 0x5, 0xd, 0xa, 0xe];

/// One TEV stage. Field pairs ending in `_a` are the alpha channel
/// counterparts of the color channel settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Stage {
    pub enabled: bool,
    pub map_id: u8,
    pub coord_id: u8,
    pub raster_color: u8,
    pub constant: u8,
    pub constant_a: u8,
    pub sel_a: u8,
    pub sel_b: u8,
    pub sel_c: u8,
    pub sel_d: u8,
    pub dest: u8,
    pub bias: u8,
    pub oper: u8,
    pub clamp: bool,
    pub scale: u8,
    pub sel_a_a: u8,
    pub sel_b_a: u8,
    pub sel_c_a: u8,
    pub sel_d_a: u8,
    pub dest_a: u8,
    pub bias_a: u8,
    pub oper_a: u8,
    pub clamp_a: bool,
    pub scale_a: u8,
    pub texture_swap_sel: u8,
    pub raster_swap_sel: u8,
    pub ind_stage: u8,
    pub ind_format: u8,
    pub ind_bias: u8,
    pub ind_alpha: u8,
    pub ind_matrix: u8,
    pub ind_s_wrap: u8,
    pub ind_t_wrap: u8,
    pub ind_use_prev: bool,
    pub ind_unmodify_lod: bool,
}

impl Default for Stage {
    fn default() -> Self {
        Self {
            enabled: true,
            map_id: 0,
            coord_id: 0,
            raster_color: 0,
            constant: 0xc,
            constant_a: 0x1c,
            sel_a: 0xf,
            sel_b: 8,
            sel_c: 0xa,
            sel_d: 0xf,
            dest: 0,
            bias: 0,
            oper: 0,
            clamp: true,
            scale: 0,
            sel_a_a: 7,
            sel_b_a: 4,
            sel_c_a: 5,
            sel_d_a: 7,
            dest_a: 0,
            bias_a: 0,
            oper_a: 0,
            clamp_a: true,
            scale_a: 0,
            texture_swap_sel: 0,
            raster_swap_sel: 0,
            ind_stage: 0,
            ind_format: 0,
            ind_bias: 0,
            ind_alpha: 0,
            ind_matrix: 0,
            ind_s_wrap: 0,
            ind_t_wrap: 0,
            ind_use_prev: false,
            ind_unmodify_lod: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Shader {
    pub stages: Vec<Stage>,
    pub swap_table: [u32; 8],
    pub ind_tex_maps: [u8; 4],
    pub ind_tex_coords: [u8; 4],
    /// Number of layers the shader loads, set from its widest material.
    pub tex_ref_count: u8,
}

impl Default for Shader {
    fn default() -> Self {
        Self {
            stages: vec![Stage::default()],
            swap_table: DEFAULT_SWAP_TABLE,
            ind_tex_maps: [7; 4],
            ind_tex_coords: [7; 4],
            tex_ref_count: 1,
        }
    }
}

fn pack_tref_half(map: u8, coord: u8, enable: bool, raster: u8) -> u32 {
    map as u32 & 7 | (coord as u32 & 7) << 3 | (enable as u32) << 6 | (raster as u32 & 7) << 7
}

fn pack_kcel(writer: &mut BinWriter, index: usize, c0: u8, a0: u8, c1: u8, a1: u8) {
    let data = (c0 as u32 & 0x1f) << 4
        | (a0 as u32 & 0x1f) << 9
        | (c1 as u32 & 0x1f) << 14
        | (a1 as u32 & 0x1f) << 19;
    gpu::pack_bp(writer, gpu::BP_TEV_KSEL0 + index as u8, data);
}

fn pack_color_env(writer: &mut BinWriter, index: usize, s: &Stage) {
    let data = (s.sel_d as u32 & 0xf)
        | (s.sel_c as u32 & 0xf) << 4
        | (s.sel_b as u32 & 0xf) << 8
        | (s.sel_a as u32 & 0xf) << 12
        | (s.bias as u32 & 3) << 16
        | (s.oper as u32 & 1) << 18
        | (s.clamp as u32) << 19
        | (s.scale as u32 & 3) << 20
        | (s.dest as u32 & 3) << 22;
    gpu::pack_bp(writer, gpu::BP_TEV_COLOR_ENV0 + (index * 2) as u8, data);
}

fn pack_alpha_env(writer: &mut BinWriter, index: usize, s: &Stage) {
    let data = (s.raster_swap_sel as u32 & 3)
        | (s.texture_swap_sel as u32 & 3) << 2
        | (s.sel_d_a as u32 & 7) << 4
        | (s.sel_c_a as u32 & 7) << 7
        | (s.sel_b_a as u32 & 7) << 10
        | (s.sel_a_a as u32 & 7) << 13
        | (s.bias_a as u32 & 3) << 16
        | (s.oper_a as u32 & 1) << 18
        | (s.clamp_a as u32) << 19
        | (s.scale_a as u32 & 3) << 20
        | (s.dest_a as u32 & 3) << 22;
    gpu::pack_bp(writer, gpu::BP_TEV_ALPHA_ENV0 + (index * 2) as u8, data);
}

fn pack_ind_cmd(writer: &mut BinWriter, index: usize, s: &Stage) {
    let data = (s.ind_stage as u32 & 3)
        | (s.ind_format as u32 & 3) << 2
        | (s.ind_bias as u32 & 7) << 4
        | (s.ind_alpha as u32 & 3) << 7
        | (s.ind_matrix as u32 & 7) << 9
        | (s.ind_s_wrap as u32 & 7) << 13
        | (s.ind_t_wrap as u32 & 7) << 16
        | (s.ind_use_prev as u32) << 19
        | (s.ind_unmodify_lod as u32) << 20;
    gpu::pack_bp(writer, gpu::BP_IND_CMD0 + index as u8, data);
}

impl Shader {
    /// True when two shaders produce the same TEV program, ignoring how
    /// many layers each one loads. Used to share shader records between
    /// materials at pack time.
    pub fn equivalent(&self, other: &Shader) -> bool {
        self.stages == other.stages
            && self.swap_table == other.swap_table
            && self.ind_tex_maps == other.ind_tex_maps
            && self.ind_tex_coords == other.ind_tex_coords
    }

    pub fn pack(&self, writer: &mut BinWriter, index: u32) -> Result<(), BrresError> {
        if self.stages.len() > 16 {
            return Err(BrresError::Packing(format!(
                "shader has {} stages, limit is 16",
                self.stages.len()
            )));
        }
        writer.start();
        writer.write_u32(BYTE_SIZE as u32);
        writer.write_i32(writer.outer_offset());
        writer.write_u32(index);
        writer.write_u8(self.stages.len() as u8);
        writer.advance(3);
        let mut layer_indices = [0xffu8; 8];
        for (i, slot) in layer_indices
            .iter_mut()
            .take(self.tex_ref_count as usize)
            .enumerate()
        {
            *slot = i as u8;
        }
        writer.write_bytes(&layer_indices);
        writer.align(0x20);
        for (i, data) in self.swap_table.iter().enumerate() {
            gpu::pack_bp_mask(writer, SWAP_MASK);
            gpu::pack_bp(writer, gpu::BP_TEV_KSEL0 + i as u8, *data);
        }
        gpu::pack_ras1_iref(writer, &self.ind_tex_maps, &self.ind_tex_coords);
        writer.align(0x20);
        self.pack_stages(writer);
        writer.pad_to_end(BYTE_SIZE);
        Ok(())
    }

    fn pack_stages(&self, writer: &mut BinWriter) {
        let mut i = 0;
        let mut pair = 0;
        while i < self.stages.len() {
            let s0 = &self.stages[i];
            let s0_id = i;
            i += 1;
            let s1 = if i < self.stages.len() {
                let s = &self.stages[i];
                i += 1;
                Some(s)
            } else {
                None
            };
            gpu::pack_bp_mask(writer, SEL_MASK);
            match s1 {
                Some(s1) => {
                    pack_kcel(writer, pair, s0.constant, s0.constant_a, s1.constant, s1.constant_a);
                    let data = pack_tref_half(s0.map_id, s0.coord_id, s0.enabled, s0.raster_color)
                        | pack_tref_half(s1.map_id, s1.coord_id, s1.enabled, s1.raster_color)
                            << 12;
                    gpu::pack_bp(writer, gpu::BP_TREF0 + pair as u8, data);
                }
                None => {
                    pack_kcel(writer, pair, s0.constant, s0.constant_a, 0, 0);
                    let data = pack_tref_half(s0.map_id, s0.coord_id, s0.enabled, s0.raster_color)
                        | pack_tref_half(7, 7, false, 7) << 12;
                    gpu::pack_bp(writer, gpu::BP_TREF0 + pair as u8, data);
                }
            }
            pack_color_env(writer, s0_id, s0);
            match s1 {
                Some(s1) => pack_color_env(writer, s0_id + 1, s1),
                None => writer.advance(5),
            }
            pack_alpha_env(writer, s0_id, s0);
            match s1 {
                Some(s1) => pack_alpha_env(writer, s0_id + 1, s1),
                None => writer.advance(5),
            }
            pack_ind_cmd(writer, s0_id, s0);
            match s1 {
                Some(s1) => pack_ind_cmd(writer, s0_id + 1, s1),
                None => writer.advance(5),
            }
            writer.align(16);
            pair += 1;
        }
    }

    pub fn unpack(reader: &mut BinReader) -> Result<Self, BrresError> {
        reader.start();
        reader.read_len()?;
        let _outer = reader.read_i32()?;
        let _index = reader.read_u32()?;
        let stage_count = reader.read_u8()? as usize;
        if stage_count > 16 {
            return Err(BrresError::Decode(format!(
                "shader stage count {} out of range",
                stage_count
            )));
        }
        reader.skip(3)?;
        let layer_indices = reader.read_bytes(8)?;
        let tex_ref_count = layer_indices.iter().take_while(|&&b| b != 0xff).count() as u8;
        reader.align(0x20)?;
        let mut swap_table = [0u32; 8];
        for slot in &mut swap_table {
            reader.skip(5)?; // mask
            let (_, data) = gpu::unpack_bp(reader)?;
            *slot = data;
        }
        let (ind_tex_maps, ind_tex_coords) = gpu::unpack_ras1_iref(reader)?;
        reader.align(0x20)?;
        let mut stages = vec![Stage::default(); stage_count];
        let mut i = 0;
        while i < stage_count {
            let has_second = i + 1 < stage_count;
            reader.skip(5)?; // mask
            let (_, kcel) = gpu::unpack_bp(reader)?;
            let (_, tref) = gpu::unpack_bp(reader)?;
            unpack_stage_refs(&mut stages[i], kcel, tref, false);
            if has_second {
                unpack_stage_refs(&mut stages[i + 1], kcel, tref, true);
            }
            let (_, cenv) = gpu::unpack_bp(reader)?;
            unpack_color_env(&mut stages[i], cenv);
            if has_second {
                let (_, cenv) = gpu::unpack_bp(reader)?;
                unpack_color_env(&mut stages[i + 1], cenv);
            } else {
                reader.skip(5)?;
            }
            let (_, aenv) = gpu::unpack_bp(reader)?;
            unpack_alpha_env(&mut stages[i], aenv);
            if has_second {
                let (_, aenv) = gpu::unpack_bp(reader)?;
                unpack_alpha_env(&mut stages[i + 1], aenv);
            } else {
                reader.skip(5)?;
            }
            let (_, ind) = gpu::unpack_bp(reader)?;
            unpack_ind_cmd(&mut stages[i], ind);
            if has_second {
                let (_, ind) = gpu::unpack_bp(reader)?;
                unpack_ind_cmd(&mut stages[i + 1], ind);
            } else {
                reader.skip(5)?;
            }
            reader.align(16)?;
            i += 2;
        }
        reader.seek(reader.base() + BYTE_SIZE);
        reader.end();
        Ok(Self {
            stages,
            swap_table,
            ind_tex_maps,
            ind_tex_coords,
            tex_ref_count,
        })
    }
}

fn unpack_stage_refs(stage: &mut Stage, kcel: u32, tref: u32, second: bool) {
    if second {
        stage.constant = (kcel >> 14 & 0x1f) as u8;
        stage.constant_a = (kcel >> 19 & 0x1f) as u8;
    } else {
        stage.constant = (kcel >> 4 & 0x1f) as u8;
        stage.constant_a = (kcel >> 9 & 0x1f) as u8;
    }
    let half = if second { tref >> 12 } else { tref };
    stage.map_id = (half & 7) as u8;
    stage.coord_id = (half >> 3 & 7) as u8;
    stage.enabled = half >> 6 & 1 != 0;
    stage.raster_color = (half >> 7 & 7) as u8;
}

fn unpack_color_env(stage: &mut Stage, data: u32) {
    stage.sel_d = (data & 0xf) as u8;
    stage.sel_c = (data >> 4 & 0xf) as u8;
    stage.sel_b = (data >> 8 & 0xf) as u8;
    stage.sel_a = (data >> 12 & 0xf) as u8;
    stage.bias = (data >> 16 & 3) as u8;
    stage.oper = (data >> 18 & 1) as u8;
    stage.clamp = data >> 19 & 1 != 0;
    stage.scale = (data >> 20 & 3) as u8;
    stage.dest = (data >> 22 & 3) as u8;
}

fn unpack_alpha_env(stage: &mut Stage, data: u32) {
    stage.raster_swap_sel = (data & 3) as u8;
    stage.texture_swap_sel = (data >> 2 & 3) as u8;
    stage.sel_d_a = (data >> 4 & 7) as u8;
    stage.sel_c_a = (data >> 7 & 7) as u8;
    stage.sel_b_a = (data >> 10 & 7) as u8;
    stage.sel_a_a = (data >> 13 & 7) as u8;
    stage.bias_a = (data >> 16 & 3) as u8;
    stage.oper_a = (data >> 18 & 1) as u8;
    stage.clamp_a = data >> 19 & 1 != 0;
    stage.scale_a = (data >> 20 & 3) as u8;
    stage.dest_a = (data >> 22 & 3) as u8;
}

fn unpack_ind_cmd(stage: &mut Stage, data: u32) {
    stage.ind_stage = (data & 3) as u8;
    stage.ind_format = (data >> 2 & 3) as u8;
    stage.ind_bias = (data >> 4 & 7) as u8;
    stage.ind_alpha = (data >> 7 & 3) as u8;
    stage.ind_matrix = (data >> 9 & 7) as u8;
    stage.ind_s_wrap = (data >> 13 & 7) as u8;
    stage.ind_t_wrap = (data >> 16 & 7) as u8;
    stage.ind_use_prev = data >> 19 & 1 != 0;
    stage.ind_unmodify_lod = data >> 20 & 1 != 0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn record_is_exactly_512_bytes() {
        let shader = Shader::default();
        let mut writer = BinWriter::new();
        writer.start();
        shader.pack(&mut writer, 0).unwrap();
        writer.end();
        let file = writer.finish().unwrap();
        assert_eq!(file.len(), BYTE_SIZE);
    }

    #[test]
    fn round_trip_single_stage() {
        let shader = Shader::default();
        let mut writer = BinWriter::new();
        writer.start();
        shader.pack(&mut writer, 0).unwrap();
        writer.end();
        let mut reader = BinReader::new(writer.finish().unwrap());
        let read = Shader::unpack(&mut reader).unwrap();
        assert_eq!(read, shader);
    }

    #[test]
    fn round_trip_three_stages() {
        let mut shader = Shader::default();
        let mut s1 = Stage::default();
        s1.map_id = 1;
        s1.coord_id = 1;
        s1.constant = 0x1f;
        let mut s2 = Stage::default();
        s2.raster_color = 5;
        s2.dest = 2;
        s2.scale_a = 1;
        shader.stages.push(s1);
        shader.stages.push(s2);
        shader.tex_ref_count = 2;
        let mut writer = BinWriter::new();
        writer.start();
        shader.pack(&mut writer, 3).unwrap();
        writer.end();
        let mut reader = BinReader::new(writer.finish().unwrap());
        let read = Shader::unpack(&mut reader).unwrap();
        assert_eq!(read, shader);
    }

    #[test]
    fn equal_shaders_compare_equal() {
        assert_eq!(Shader::default(), Shader::default());
        let mut other = Shader::default();
        other.ind_tex_maps[0] = 0;
        assert_ne!(Shader::default(), other);
    }
}
