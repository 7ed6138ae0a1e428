//! Draw objects.
//!
//! An object couples the raw facepoint display list with the vertex
//! attribute declaration the GPU needs to walk it: which attribute arrays
//! the facepoints index, how wide each index is and how the arrays are
//! quantized.

use std::convert::TryFrom;

use crate::binstream::{BinReader, BinWriter};
use crate::error::BrresError;
use crate::formats::mdl0::gpu;
use crate::formats::mdl0::point::{Color, Normal, Uv, Vertex};

pub const INDEX_NONE: u32 = 0;
pub const INDEX_DIRECT: u32 = 1;
pub const INDEX_BYTE: u32 = 2;
pub const INDEX_SHORT: u32 = 3;

/// Byte width of one facepoint index, `None` when the attribute is absent.
pub fn index_width(format: u32, context: &str) -> Result<Option<usize>, BrresError> {
    match format {
        INDEX_NONE => Ok(None),
        INDEX_BYTE => Ok(Some(1)),
        INDEX_SHORT => Ok(Some(2)),
        INDEX_DIRECT => Err(BrresError::Decode(format!(
            "{} has direct indices, which are not supported",
            context
        ))),
        other => Err(BrresError::Decode(format!(
            "{} index format {} out of range",
            context, other
        ))),
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Polygon {
    pub name: String,
    pub flags: u32,
    /// Index into the model's bone table, negative when multi weighted.
    pub bone_id: i32,
    pub facepoint_count: u32,
    pub face_count: u32,
    pub vertex_group: i16,
    pub normal_group: i16,
    pub color_groups: [i16; 2],
    pub uv_groups: [i16; 8],
    pub has_weighted_matrix: bool,
    pub uv_matrices: [bool; 8],
    pub vertex_index_format: u32,
    pub normal_index_format: u32,
    pub color_index_formats: [u32; 2],
    pub uv_index_formats: [u32; 8],
    pub vertex_e: u32,
    pub normal_e: u32,
    pub color0_e: u32,
    pub color1_e: u32,
    pub tex_e: [u32; 8],
    pub normal_index3: u32,
    pub bone_table: Option<Vec<u16>>,
    /// Raw facepoint display list.
    pub data: Vec<u8>,
    /// Draw-list linkage, filled from DrawOpa/DrawXlu on unpack.
    pub material: usize,
    pub visible_bone: usize,
    pub priority: u8,
}

impl Polygon {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            flags: 0,
            bone_id: 0,
            facepoint_count: 0,
            face_count: 0,
            vertex_group: -1,
            normal_group: -1,
            color_groups: [-1; 2],
            uv_groups: [-1; 8],
            has_weighted_matrix: false,
            uv_matrices: [false; 8],
            vertex_index_format: INDEX_NONE,
            normal_index_format: INDEX_NONE,
            color_index_formats: [INDEX_NONE; 2],
            uv_index_formats: [INDEX_NONE; 8],
            vertex_e: 1,
            normal_e: 0,
            color0_e: 1,
            color1_e: 1,
            tex_e: [1; 8],
            normal_index3: 0,
            bone_table: None,
            data: Vec::new(),
            material: 0,
            visible_bone: 0,
            priority: 0,
        }
    }

    pub fn has_normals(&self) -> bool {
        self.normal_group >= 0
    }

    pub fn count_colors(&self) -> u32 {
        self.color_groups.iter().filter(|&&g| g >= 0).count() as u32
    }

    pub fn count_uvs(&self) -> u32 {
        self.uv_groups.iter().filter(|&&g| g >= 0).count() as u32
    }

    fn cp_vertex_format(&self) -> (u32, u32) {
        let mut lo = self.has_weighted_matrix as u32;
        for i in 0..8 {
            lo |= (self.uv_matrices[i] as u32) << (i + 1);
        }
        lo |= (self.vertex_index_format
            | self.normal_index_format << 2
            | self.color_index_formats[0] << 4
            | self.color_index_formats[1] << 6)
            << 9;
        let mut hi = 0;
        for (i, f) in self.uv_index_formats.iter().enumerate() {
            hi |= f << (2 * i);
        }
        (lo, hi)
    }

    fn xf_vertex_specs(&self) -> u32 {
        self.count_colors() | (self.has_normals() as u32) << 2 | self.count_uvs() << 4
    }

    fn xf_array_flags(&self) -> u32 {
        let mut flag = (self.vertex_group >= 0) as u32;
        flag |= (self.has_normals() as u32) << 1;
        flag |= ((self.color_groups[0] >= 0) as u32) << 2;
        flag |= ((self.color_groups[1] >= 0) as u32) << 3;
        for i in 0..8 {
            flag |= ((self.uv_groups[i] >= 0) as u32) << (4 + i);
        }
        flag <<= 9;
        flag |= self.has_weighted_matrix as u32;
        for i in 0..8 {
            flag |= (self.uv_matrices[i] as u32) << (i + 1);
        }
        flag
    }

    fn uvat(&self, groups: &Groups) -> (u32, u32, u32) {
        let vert = groups.vertex(self.vertex_group);
        let normal = groups.normal(self.normal_group);
        let color0 = groups.color(self.color_groups[0]);
        let color1 = groups.color(self.color_groups[1]);
        let uvs: Vec<(u32, u32)> = (0..8).map(|i| groups.uv(self.uv_groups[i])).collect();
        let uvata = self.vertex_e
            | vert.0 << 1
            | vert.1 << 4
            | self.normal_e << 9
            | normal.0 << 10
            | self.color0_e << 13
            | color0 << 14
            | self.color1_e << 17
            | color1 << 18
            | self.tex_e[0] << 21
            | uvs[0].0 << 22
            | uvs[0].1 << 25
            | 1 << 30
            | self.normal_index3 << 31;
        let mut uvatb = 0;
        let mut shifter = 0;
        for i in 1..4 {
            uvatb |= (uvs[i].0 << 1 | uvs[i].1 << 4 | self.tex_e[i]) << shifter;
            shifter += 9;
        }
        uvatb |= self.tex_e[4] << shifter | uvs[4].0 << (shifter + 1) | 1 << 31;
        let mut uvatc = uvs[4].1;
        shifter = 5;
        for i in 5..8 {
            uvatc |= (self.tex_e[i] | uvs[i].0 << 1 | uvs[i].1 << 3) << shifter;
            shifter += 9;
        }
        (uvata, uvatb, uvatc)
    }

    pub fn pack(
        &self,
        writer: &mut BinWriter,
        index: u32,
        version: u32,
        groups: &Groups,
    ) {
        writer.start();
        writer.mark_len();
        writer.write_i32(writer.outer_offset());
        let (lo, hi) = self.cp_vertex_format();
        let xf_specs = self.xf_vertex_specs();
        writer.write_i32(self.bone_id);
        writer.write_u32(lo);
        writer.write_u32(hi);
        writer.write_u32(xf_specs);
        writer.write_u32(0xe0);
        writer.write_u32(0x80);
        let dec_mark = writer.mark();
        let dec_mark_pos = writer.mark_pos(dec_mark);
        let data_len = self.data.len() as u32;
        writer.write_u32(data_len);
        writer.write_u32(data_len);
        let data_mark = writer.mark();
        let data_mark_pos = writer.mark_pos(data_mark);
        writer.write_u32(self.xf_array_flags());
        writer.write_u32(self.flags);
        writer.store_name_ref(&self.name);
        writer.write_u32(index);
        writer.write_u32(self.facepoint_count);
        writer.write_u32(self.face_count);
        writer.write_i16(self.vertex_group);
        writer.write_i16(self.normal_group);
        writer.write_i16(self.color_groups[0]);
        writer.write_i16(self.color_groups[1]);
        for g in &self.uv_groups {
            writer.write_i16(*g);
        }
        if version >= 10 {
            // fur vector and coord groups
            writer.write_i16(-1);
            writer.write_i16(-1);
        }
        let table_mark = writer.mark();
        writer.resolve(table_mark);
        match &self.bone_table {
            Some(table) => {
                writer.write_u32(table.len() as u32);
                for id in table {
                    writer.write_u16(*id);
                }
            }
            None => writer.write_u32(0),
        }
        writer.align(0x20);
        // vertex declaration block
        let dec_start = writer.pos();
        writer.resolve_raw(dec_mark, (dec_start - dec_mark_pos + 8) as u32);
        let dec_end = dec_start + 0xe0;
        writer.advance(10);
        writer.write_u16(0x0850);
        writer.write_u32(lo);
        writer.write_u16(0x0860);
        writer.write_u32(hi);
        gpu::pack_xf(writer, gpu::XF_VT_SPECS, xf_specs);
        writer.advance(1);
        let (uvata, uvatb, uvatc) = self.uvat(groups);
        writer.write_u16(0x0870);
        writer.write_u32(uvata);
        writer.write_u16(0x0880);
        writer.write_u32(uvatb);
        writer.write_u16(0x0890);
        writer.write_u32(uvatc);
        writer.advance(dec_end - writer.pos());
        // vertex data
        writer.resolve_raw(data_mark, (writer.pos() - data_mark_pos + 8) as u32);
        writer.write_bytes(&self.data);
        writer.end();
    }

    pub fn unpack(reader: &mut BinReader, name: String, version: u32) -> Result<Self, BrresError> {
        reader.start();
        reader.read_len()?;
        reader.skip(4)?; // outer offset
        let bone_id = reader.read_i32()?;
        let lo = reader.read_u32()?;
        let hi = reader.read_u32()?;
        let _xf_specs = reader.read_u32()?;
        let dec_base = reader.pos();
        reader.skip(8)?; // declaration sizes
        let dec_offset = dec_base + reader.read_u32()? as usize;
        let data_base = reader.pos();
        reader.skip(8)?; // data sizes
        let data_offset = data_base + reader.read_u32()? as usize;
        reader.skip(4)?; // array flags
        let flags = reader.read_u32()?;
        reader.skip(4)?; // name
        let _index = reader.read_u32()?;
        let facepoint_count = reader.read_u32()?;
        let face_count = reader.read_u32()?;
        let vertex_group = reader.read_i16()?;
        let normal_group = reader.read_i16()?;
        let color_groups = [reader.read_i16()?, reader.read_i16()?];
        let mut uv_groups = [0i16; 8];
        for g in &mut uv_groups {
            *g = reader.read_i16()?;
        }
        if version >= 10 {
            reader.skip(4)?; // fur groups
        }
        reader.store(1)?;
        reader.recall(0)?;
        let count = reader.read_u32()? as usize;
        let bone_table = if count > 0 {
            let mut table = Vec::with_capacity(count);
            for _ in 0..count {
                table.push(reader.read_u16()?);
            }
            Some(table)
        } else {
            None
        };

        let mut poly = Self {
            name,
            flags,
            bone_id,
            facepoint_count,
            face_count,
            vertex_group,
            normal_group,
            color_groups,
            uv_groups,
            bone_table,
            ..Self::new("")
        };
        poly.parse_cp_vertex_format(lo, hi)?;
        reader.seek(dec_offset + 32);
        reader.skip(2)?;
        let uvata = reader.read_u32()?;
        reader.skip(2)?;
        let uvatb = reader.read_u32()?;
        reader.skip(2)?;
        let uvatc = reader.read_u32()?;
        poly.parse_uvat(uvata, uvatb, uvatc);
        reader.seek(data_offset);
        poly.data = reader.read_remaining()?;
        reader.end();
        Ok(poly)
    }

    fn parse_cp_vertex_format(&mut self, mut lo: u32, mut hi: u32) -> Result<(), BrresError> {
        self.has_weighted_matrix = lo & 1 != 0;
        lo >>= 1;
        for i in 0..8 {
            self.uv_matrices[i] = lo & 1 != 0;
            lo >>= 1;
        }
        let name = self.name.clone();
        let check = move |format: u32, what: &str| -> Result<u32, BrresError> {
            index_width(format, &format!("object {} {}", name, what))?;
            Ok(format)
        };
        self.vertex_index_format = check(lo & 3, "vertex")?;
        self.normal_index_format = check(lo >> 2 & 3, "normal")?;
        self.color_index_formats = [check(lo >> 4 & 3, "color")?, check(lo >> 6 & 3, "color")?];
        for f in &mut self.uv_index_formats {
            *f = check(hi & 3, "uv")?;
            hi >>= 2;
        }
        Ok(())
    }

    fn parse_uvat(&mut self, uvata: u32, mut uvatb: u32, mut uvatc: u32) {
        self.vertex_e = uvata & 1;
        self.normal_e = uvata >> 9 & 1;
        self.color0_e = uvata >> 13 & 1;
        self.color1_e = uvata >> 17 & 1;
        self.tex_e[0] = uvata >> 21 & 1;
        self.normal_index3 = uvata >> 31;
        for i in 1..4 {
            self.tex_e[i] = uvatb & 1;
            uvatb >>= 9;
        }
        self.tex_e[4] = uvatb & 1;
        uvatc >>= 5;
        for i in 5..8 {
            self.tex_e[i] = uvatc & 1;
            uvatc >>= 9;
        }
    }

    /// Bytes per facepoint for the current attribute layout.
    pub fn facepoint_width(&self) -> Result<usize, BrresError> {
        let mut width = self.has_weighted_matrix as usize;
        width += self.uv_matrices.iter().filter(|&&m| m).count();
        let context = format!("object {}", self.name);
        for format in [self.vertex_index_format, self.normal_index_format]
            .iter()
            .chain(&self.color_index_formats)
            .chain(&self.uv_index_formats)
        {
            if let Some(w) = index_width(*format, &context)? {
                width += w;
            }
        }
        Ok(width)
    }
}

/// Quantization of the model's point groups, looked up while packing the
/// vertex attribute table.
pub struct Groups<'a> {
    pub vertices: &'a [Vertex],
    pub normals: &'a [Normal],
    pub colors: &'a [Color],
    pub uvs: &'a [Uv],
}

impl Groups<'_> {
    fn vertex(&self, id: i16) -> (u32, u32) {
        match usize::try_from(id).ok().and_then(|i| self.vertices.get(i)) {
            Some(v) => (v.points.format, v.points.divisor as u32),
            None => (0, 0),
        }
    }

    fn normal(&self, id: i16) -> (u32, u32) {
        match usize::try_from(id).ok().and_then(|i| self.normals.get(i)) {
            Some(n) => (n.points.format, n.points.divisor as u32),
            None => (4, 0),
        }
    }

    fn color(&self, id: i16) -> u32 {
        match usize::try_from(id).ok().and_then(|i| self.colors.get(i)) {
            Some(c) => c.format,
            None => 5,
        }
    }

    fn uv(&self, id: i16) -> (u32, u32) {
        match usize::try_from(id).ok().and_then(|i| self.uvs.get(i)) {
            Some(uv) => (uv.points.format, uv.points.divisor as u32),
            None => (4, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Polygon {
        let mut poly = Polygon::new("body");
        poly.vertex_group = 0;
        poly.normal_group = 0;
        poly.color_groups[0] = 0;
        poly.uv_groups[0] = 0;
        poly.vertex_index_format = INDEX_SHORT;
        poly.normal_index_format = INDEX_SHORT;
        poly.color_index_formats[0] = INDEX_BYTE;
        poly.uv_index_formats[0] = INDEX_SHORT;
        poly.facepoint_count = 3;
        poly.face_count = 1;
        poly.bone_table = Some(vec![0]);
        // one triangle: 0x90, count, then 7 bytes per facepoint
        poly.data = vec![
            0x90, 0x00, 0x03, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 1, 0, 1, 0, 0, 2, 0, 2, 1, 0, 2,
        ];
        poly
    }

    fn groups() -> (Vec<Vertex>, Vec<Normal>, Vec<Color>, Vec<Uv>) {
        let mut vertex = Vertex::new("pos0");
        vertex
            .points
            .encode(&[vec![0.0, 0.0, 0.0], vec![1.0, 1.0, 1.0]])
            .unwrap();
        let mut normal = Normal::new("nrm0");
        normal.points.encode(&[vec![0.0, 1.0, 0.0]]).unwrap();
        let mut color = Color::new("clr0");
        color.encode(&[[255, 255, 255, 255]]).unwrap();
        let mut uv = Uv::new("uv0");
        uv.points.encode(&[vec![0.0, 1.0]]).unwrap();
        (vec![vertex], vec![normal], vec![color], vec![uv])
    }

    #[test]
    fn round_trip() {
        let poly = sample();
        let (vertices, normals, colors, uvs) = groups();
        let groups = Groups {
            vertices: &vertices,
            normals: &normals,
            colors: &colors,
            uvs: &uvs,
        };
        let mut writer = BinWriter::new();
        writer.start();
        poly.pack(&mut writer, 0, 11, &groups);
        writer.end();
        writer.pack_names();
        let file = writer.finish().unwrap();

        let mut reader = BinReader::new(file);
        reader.start();
        let read = Polygon::unpack(&mut reader, "body".to_string(), 11).unwrap();
        assert_eq!(read, poly);
    }

    #[test]
    fn facepoint_width_counts_all_columns() {
        let poly = sample();
        assert_eq!(poly.facepoint_width().unwrap(), 7);
    }

    #[test]
    fn direct_indices_are_rejected() {
        let mut poly = sample();
        poly.vertex_index_format = INDEX_DIRECT;
        assert!(poly.facepoint_width().is_err());
    }
}
