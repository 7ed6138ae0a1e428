//! MDL0 models.
//!
//! A model is a set of indexed section lists: bones, attribute arrays,
//! materials, shaders, draw objects, plus byte-code definition lists that
//! drive hierarchy setup and draw order. Pack rebuilds everything that is
//! derived (definitions, shader sharing, texture links, counts) from the
//! section lists, so editing only ever touches the lists.

pub mod bone;
pub mod definition;
pub mod geometry;
pub mod gpu;
pub mod material;
pub mod point;
pub mod polygon;
pub mod shader;
pub mod tristrip;

use ahash::AHashMap;
use log::warn;

use crate::binstream::{BinReader, BinWriter};
use crate::config::{Config, UnknownRefPolicy};
use crate::error::BrresError;
use crate::index_group::{IndexGroup, PackedGroup, ReadGroup};
use crate::subfile;

use bone::Bone;
use definition::{DrawList, NodeMix, NodeTree};
use material::{Material, TexLinkMap, TexLinkSlots};
use point::{Color, Normal, Uv, Vertex};
use polygon::{Groups, Polygon};
use shader::Shader;

pub const SECTION_NAMES: [&str; 13] = [
    "Definitions",
    "Bones",
    "Vertices",
    "Normals",
    "Colors",
    "UVs",
    "FurVectors",
    "FurLayers",
    "Materials",
    "Shaders",
    "Objects",
    "Textures",
    "Palettes",
];

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mdl0 {
    pub name: String,
    pub version: u32,
    pub scaling_rule: u32,
    pub texture_matrix_mode: u32,
    pub minimum: [f32; 3],
    pub maximum: [f32; 3],
    /// Maps weight slots to bone indices, -1 for mixed slots.
    pub bone_table: Vec<i32>,
    pub node_tree: NodeTree,
    pub node_mix: Option<NodeMix>,
    pub bones: Vec<Bone>,
    pub vertices: Vec<Vertex>,
    pub normals: Vec<Normal>,
    pub colors: Vec<Color>,
    pub uvs: Vec<Uv>,
    pub materials: Vec<Material>,
    pub objects: Vec<Polygon>,
}

impl Mdl0 {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: subfile::expected_version(b"MDL0"),
            scaling_rule: 0,
            texture_matrix_mode: 0,
            minimum: [0.0; 3],
            maximum: [0.0; 3],
            bone_table: Vec::new(),
            node_tree: NodeTree::default(),
            node_mix: None,
            bones: Vec::new(),
            vertices: Vec::new(),
            normals: Vec::new(),
            colors: Vec::new(),
            uvs: Vec::new(),
            materials: Vec::new(),
            objects: Vec::new(),
        }
    }

    /// Appends a bone, giving it an identity weight slot and a hierarchy
    /// command. Returns its index.
    pub fn add_bone(&mut self, mut bone: Bone) -> usize {
        let index = self.bones.len();
        bone.weight_id = index as u32;
        let parent = bone.parent.unwrap_or(0) as u16;
        self.bones.push(bone);
        self.bone_table.push(index as i32);
        self.node_tree.add_entry(index as u16, parent);
        index
    }

    pub fn facepoint_count(&self) -> u32 {
        self.objects.iter().map(|o| o.facepoint_count).sum()
    }

    pub fn face_count(&self) -> u32 {
        self.objects.iter().map(|o| o.face_count).sum()
    }

    /// Recomputes the model bounding box from the vertex groups.
    pub fn recalculate_extents(&mut self) {
        let mut minimum = [f32::MAX; 3];
        let mut maximum = [f32::MIN; 3];
        for vertex in &self.vertices {
            for i in 0..3 {
                minimum[i] = minimum[i].min(vertex.minimum[i]);
                maximum[i] = maximum[i].max(vertex.maximum[i]);
            }
        }
        if !self.vertices.is_empty() {
            self.minimum = minimum;
            self.maximum = maximum;
        }
    }

    pub fn rename_texture(&mut self, old: &str, new: &str) -> bool {
        let mut renamed = false;
        for material in &mut self.materials {
            renamed |= material.rename_texture(old, new);
        }
        renamed
    }

    fn build_draw_lists(&self) -> Result<(DrawList, DrawList), BrresError> {
        let mut opa = DrawList::default();
        let mut xlu = DrawList::default();
        for (i, poly) in self.objects.iter().enumerate() {
            let material =
                self.materials
                    .get(poly.material)
                    .ok_or(BrresError::IndexOutOfRange {
                        kind: "material",
                        index: poly.material,
                        len: self.materials.len(),
                    })?;
            if poly.visible_bone >= self.bones.len() {
                return Err(BrresError::IndexOutOfRange {
                    kind: "bone",
                    index: poly.visible_bone,
                    len: self.bones.len(),
                });
            }
            let list = if material.is_xlu() { &mut xlu } else { &mut opa };
            list.add_entry(
                poly.material as u16,
                i as u16,
                poly.visible_bone as u16,
                poly.priority,
            );
        }
        opa.sort();
        xlu.sort();
        Ok((opa, xlu))
    }

    /// Groups materials by equivalent shaders, widest material first.
    fn build_shaders(&self) -> (Vec<Shader>, Vec<Vec<usize>>) {
        let mut shaders: Vec<Shader> = Vec::new();
        let mut shader_mats: Vec<Vec<usize>> = Vec::new();
        for (i, material) in self.materials.iter().enumerate() {
            match shaders
                .iter()
                .position(|s| s.equivalent(&material.shader))
            {
                Some(at) => {
                    shader_mats[at].push(i);
                    if material.shader.tex_ref_count > shaders[at].tex_ref_count {
                        shaders[at] = material.shader.clone();
                    }
                }
                None => {
                    shaders.push(material.shader.clone());
                    shader_mats.push(vec![i]);
                }
            }
        }
        (shaders, shader_mats)
    }

    /// Counts layer references per texture name, in first-use order.
    fn build_texture_links(&self) -> Vec<(String, u32)> {
        let mut links: Vec<(String, u32)> = Vec::new();
        for material in &self.materials {
            for layer in &material.layers {
                match links.iter_mut().find(|(name, _)| *name == layer.name) {
                    Some((_, count)) => *count += 1,
                    None => links.push((layer.name.clone(), 1)),
                }
            }
        }
        links
    }

    /// Validates cross references, resolving unknown texture names by the
    /// configured policy. Returns human readable findings.
    pub fn check(&mut self, textures: &[String], config: &Config) -> Vec<String> {
        let mut findings = Vec::new();
        for poly in &self.objects {
            let mut group = |kind: &'static str, id: i16, len: usize| {
                if id >= 0 && id as usize >= len {
                    findings.push(format!(
                        "object {} {} group {} out of range ({} groups)",
                        poly.name, kind, id, len
                    ));
                }
            };
            group("vertex", poly.vertex_group, self.vertices.len());
            group("normal", poly.normal_group, self.normals.len());
            for id in poly.color_groups {
                group("color", id, self.colors.len());
            }
            for id in poly.uv_groups {
                group("uv", id, self.uvs.len());
            }
            if poly.material >= self.materials.len() {
                findings.push(format!(
                    "object {} references material {} of {}",
                    poly.name,
                    poly.material,
                    self.materials.len()
                ));
            }
            if poly.visible_bone >= self.bones.len() {
                findings.push(format!(
                    "object {} references bone {} of {}",
                    poly.name,
                    poly.visible_bone,
                    self.bones.len()
                ));
            }
        }
        for material in &mut self.materials {
            let mut keep = Vec::with_capacity(material.layers.len());
            for mut layer in material.layers.drain(..) {
                let known = textures.iter().any(|t| *t == layer.name);
                if known {
                    keep.push(layer);
                    continue;
                }
                match config.unknown_refs {
                    UnknownRefPolicy::Rename => {
                        match textures
                            .iter()
                            .find(|t| t.eq_ignore_ascii_case(&layer.name))
                        {
                            Some(target) => {
                                findings.push(format!(
                                    "renamed layer {} to {} in material {}",
                                    layer.name, target, material.name
                                ));
                                layer.name = target.clone();
                                keep.push(layer);
                            }
                            None => {
                                findings.push(format!(
                                    "layer {} in material {} resolves to no texture",
                                    layer.name, material.name
                                ));
                                keep.push(layer);
                            }
                        }
                    }
                    UnknownRefPolicy::Remove => {
                        findings.push(format!(
                            "removed layer {} from material {}",
                            layer.name, material.name
                        ));
                    }
                    UnknownRefPolicy::Report => {
                        findings.push(format!(
                            "layer {} in material {} resolves to no texture",
                            layer.name, material.name
                        ));
                        keep.push(layer);
                    }
                }
            }
            material.layers = keep;
        }
        for finding in &findings {
            warn!("{}: {}", self.name, finding);
        }
        findings
    }

    pub fn pack(&self, writer: &mut BinWriter) -> Result<(), BrresError> {
        let section_marks = subfile::pack_header(writer, b"MDL0", self.version, &self.name)?;
        let subfile_base = writer.base();
        let mut resolved = vec![false; section_marks.len()];

        let (draw_opa, draw_xlu) = self.build_draw_lists()?;
        let (shaders, shader_mats) = self.build_shaders();
        let texture_links = self.build_texture_links();

        // header
        writer.start();
        writer.write_u32(0x40);
        writer.write_i32(writer.outer_offset());
        writer.write_u32(self.scaling_rule);
        writer.write_u32(self.texture_matrix_mode);
        writer.write_u32(self.facepoint_count());
        writer.write_u32(self.face_count());
        writer.write_u32(0);
        writer.write_u32(self.bones.len() as u32);
        writer.write_u32(0x01000000);
        let table_mark = writer.mark();
        for v in self.minimum.iter().chain(&self.maximum) {
            writer.write_f32(*v);
        }
        writer.resolve(table_mark);
        writer.write_u32(self.bone_table.len() as u32);
        for slot in &self.bone_table {
            writer.write_i32(*slot);
        }
        writer.end();

        // folders, one per non-empty section
        let mut definition_names: Vec<&str> = vec!["NodeTree"];
        if self.node_mix.is_some() {
            definition_names.push("NodeMix");
        }
        if !draw_opa.is_empty() {
            definition_names.push("DrawOpa");
        }
        if !draw_xlu.is_empty() {
            definition_names.push("DrawXlu");
        }
        let section_entries: [Vec<&str>; 12] = [
            definition_names.clone(),
            self.bones.iter().map(|b| b.name.as_str()).collect(),
            self.vertices.iter().map(|v| v.name()).collect(),
            self.normals.iter().map(|n| n.name()).collect(),
            self.colors.iter().map(|c| c.name.as_str()).collect(),
            self.uvs.iter().map(|u| u.name()).collect(),
            Vec::new(),
            Vec::new(),
            self.materials.iter().map(|m| m.name.as_str()).collect(),
            self.materials.iter().map(|m| m.name.as_str()).collect(),
            self.objects.iter().map(|o| o.name.as_str()).collect(),
            texture_links.iter().map(|(n, _)| n.as_str()).collect(),
        ];
        let mut folders: Vec<Option<PackedGroup>> = Vec::with_capacity(12);
        for (i, names) in section_entries.iter().enumerate() {
            if names.is_empty() {
                folders.push(None);
                continue;
            }
            let mut group = IndexGroup::new();
            for name in names {
                group.add_entry(name);
            }
            // fur sections are absent from the v8 section table
            let mark_index = if self.version < 10 && i >= 8 { i - 2 } else { i };
            writer.resolve_from(section_marks[mark_index], subfile_base);
            resolved[mark_index] = true;
            folders.push(Some(group.pack(writer)));
        }

        // texture links
        let mut tex_links: TexLinkMap = AHashMap::new();
        if let Some(folder) = &mut folders[11] {
            for (name, num_refs) in &texture_links {
                folder.resolve_next(writer)?;
                let base = writer.start();
                writer.write_u32(*num_refs);
                let mut slots = std::collections::VecDeque::new();
                for _ in 0..*num_refs {
                    slots.push_back(writer.mark());
                    slots.push_back(writer.mark());
                }
                writer.end();
                tex_links.insert(name.clone(), TexLinkSlots { base, slots });
            }
        }

        // definitions
        if let Some(folder) = &mut folders[0] {
            for name in &definition_names {
                folder.resolve_next(writer)?;
                match *name {
                    "NodeTree" => self.node_tree.pack(writer),
                    "NodeMix" => {
                        if let Some(mix) = &self.node_mix {
                            mix.pack(writer)
                        }
                    }
                    "DrawOpa" => draw_opa.pack(writer),
                    _ => draw_xlu.pack(writer),
                }
            }
            writer.align(4);
        }

        // bones
        if let Some(folder) = &mut folders[1] {
            let offsets = bone::pack_bones(writer, &self.bones, |_| {})?;
            for offset in offsets {
                folder.resolve_next_to(writer, offset)?;
            }
        }

        // materials
        let mut packed_mats = Vec::with_capacity(self.materials.len());
        if let Some(folder) = &mut folders[8] {
            for (i, mat) in self.materials.iter().enumerate() {
                folder.resolve_next(writer)?;
                packed_mats.push(mat.pack(writer, i as u32, self.version, &mut tex_links)?);
            }
        }
        for (name, slots) in &tex_links {
            if !slots.slots.is_empty() {
                return Err(BrresError::Packing(format!(
                    "unused texture link {}",
                    name
                )));
            }
        }

        // shaders, shared between materials with the same TEV program
        if let Some(folder) = &mut folders[9] {
            for (i, (shader, mats)) in shaders.iter().zip(&shader_mats).enumerate() {
                for &mat_index in mats {
                    folder.resolve_at(writer, mat_index)?;
                    packed_mats[mat_index].resolve_shader(writer);
                }
                shader.pack(writer, i as u32)?;
            }
        }

        // objects
        if let Some(folder) = &mut folders[10] {
            let groups = Groups {
                vertices: &self.vertices,
                normals: &self.normals,
                colors: &self.colors,
                uvs: &self.uvs,
            };
            for (i, poly) in self.objects.iter().enumerate() {
                folder.resolve_next(writer)?;
                poly.pack(writer, i as u32, self.version, &groups);
            }
        }

        // attribute arrays
        if let Some(folder) = &mut folders[2] {
            for (i, vertex) in self.vertices.iter().enumerate() {
                folder.resolve_next(writer)?;
                vertex.pack(writer, i as u32);
            }
        }
        if let Some(folder) = &mut folders[3] {
            for (i, normal) in self.normals.iter().enumerate() {
                folder.resolve_next(writer)?;
                normal.pack(writer, i as u32);
            }
        }
        if let Some(folder) = &mut folders[4] {
            for (i, color) in self.colors.iter().enumerate() {
                folder.resolve_next(writer)?;
                color.pack(writer, i as u32);
            }
        }
        if let Some(folder) = &mut folders[5] {
            for (i, uv) in self.uvs.iter().enumerate() {
                folder.resolve_next(writer)?;
                uv.pack(writer, i as u32);
            }
        }
        writer.align_and_end(0x20);

        // unused section slots stay zero
        for (mark, used) in section_marks.into_iter().zip(resolved) {
            if !used {
                writer.resolve_raw(mark, 0);
            }
        }
        Ok(())
    }

    pub fn unpack(reader: &mut BinReader) -> Result<Self, BrresError> {
        let header = subfile::unpack_header(reader, b"MDL0")?;
        let base = header.base;
        let version = header.version;
        let mut mdl0 = Self::new(&header.name);
        mdl0.version = version;

        // model header
        let hstart = reader.start();
        let hlen = reader.read_len()?;
        reader.skip(4)?; // outer offset
        mdl0.scaling_rule = reader.read_u32()?;
        mdl0.texture_matrix_mode = reader.read_u32()?;
        let _facepoint_count = reader.read_u32()?;
        let _face_count = reader.read_u32()?;
        reader.skip(4)?;
        let _bone_count = reader.read_u32()?;
        reader.skip(4)?;
        reader.store(1)?; // bone table
        let mut has_extents = false;
        if reader.pos() - hstart < hlen {
            mdl0.minimum = reader.read_f32x3()?;
            mdl0.maximum = reader.read_f32x3()?;
            has_extents = true;
        }
        reader.end();
        reader.recall_offset(hstart, 0)?;
        let table_len = reader.read_u32()? as usize;
        mdl0.bone_table = Vec::with_capacity(table_len);
        for _ in 0..table_len {
            mdl0.bone_table.push(reader.read_i32()?);
        }

        let section_indices: Vec<usize> = if version < 10 {
            (0..13).filter(|i| *i != 6 && *i != 7).collect()
        } else {
            (0..14).collect()
        };
        let mut draw_opa = DrawList::default();
        let mut draw_xlu = DrawList::default();
        for section in section_indices {
            let offset = reader.recall_offset(base, 0)?;
            if offset == 0 {
                continue;
            }
            match section {
                0 => {
                    let mut group = ReadGroup::unpack(reader)?;
                    for _ in 0..group.len() {
                        let name = group.recall_next(reader)?;
                        match name.as_str() {
                            "NodeTree" => mdl0.node_tree = NodeTree::unpack(reader)?,
                            "NodeMix" => mdl0.node_mix = Some(NodeMix::unpack(reader)?),
                            "DrawOpa" => draw_opa = DrawList::unpack(reader)?,
                            "DrawXlu" => draw_xlu = DrawList::unpack(reader)?,
                            other => {
                                warn!("skipping unknown definition list {}", other);
                                definition::skip_list(reader)?;
                            }
                        }
                    }
                }
                1 => {
                    let mut group = ReadGroup::unpack(reader)?;
                    let names = group.names().to_vec();
                    mdl0.bones = bone::unpack_bones(reader, names, |r| {
                        group.recall_next(r).map(|_| ())
                    })?;
                }
                2 => {
                    let mut group = ReadGroup::unpack(reader)?;
                    for _ in 0..group.len() {
                        let name = group.recall_next(reader)?;
                        mdl0.vertices.push(Vertex::unpack(reader, name)?);
                    }
                }
                3 => {
                    let mut group = ReadGroup::unpack(reader)?;
                    for _ in 0..group.len() {
                        let name = group.recall_next(reader)?;
                        mdl0.normals.push(Normal::unpack(reader, name)?);
                    }
                }
                4 => {
                    let mut group = ReadGroup::unpack(reader)?;
                    for _ in 0..group.len() {
                        let name = group.recall_next(reader)?;
                        mdl0.colors.push(Color::unpack(reader, name)?);
                    }
                }
                5 => {
                    let mut group = ReadGroup::unpack(reader)?;
                    for _ in 0..group.len() {
                        let name = group.recall_next(reader)?;
                        mdl0.uvs.push(Uv::unpack(reader, name)?);
                    }
                }
                8 => {
                    let mut group = ReadGroup::unpack(reader)?;
                    for _ in 0..group.len() {
                        let name = group.recall_next(reader)?;
                        let (material, _shader_offset) =
                            Material::unpack(reader, name, version)?;
                        mdl0.materials.push(material);
                    }
                }
                9 => {
                    let mut group = ReadGroup::unpack(reader)?;
                    let mut cache: AHashMap<usize, Shader> = AHashMap::new();
                    for _ in 0..group.len() {
                        let name = group.recall_next(reader)?;
                        let at = reader.pos();
                        let index = match mdl0.materials.iter().position(|m| m.name == name) {
                            Some(i) => i,
                            None => {
                                warn!("removing unlinked shader {}", name);
                                continue;
                            }
                        };
                        let shader = match cache.get(&at) {
                            Some(shader) => shader.clone(),
                            None => {
                                let shader = Shader::unpack(reader)?;
                                cache.insert(at, shader.clone());
                                shader
                            }
                        };
                        mdl0.materials[index].shader = shader;
                    }
                }
                10 => {
                    let mut group = ReadGroup::unpack(reader)?;
                    for _ in 0..group.len() {
                        let name = group.recall_next(reader)?;
                        mdl0.objects.push(Polygon::unpack(reader, name, version)?);
                    }
                }
                // texture links and palettes are rebuilt on pack
                _ => {}
            }
        }
        reader.end();

        mdl0.link_draw_lists(&draw_opa, &draw_xlu)?;
        if !has_extents {
            mdl0.recalculate_extents();
        }
        Ok(mdl0)
    }

    fn link_draw_lists(&mut self, opa: &DrawList, xlu: &DrawList) -> Result<(), BrresError> {
        let len = self.objects.len();
        for entry in opa.entries.iter().chain(&xlu.entries) {
            let poly = self.objects.get_mut(entry.object as usize).ok_or(
                BrresError::IndexOutOfRange {
                    kind: "object",
                    index: entry.object as usize,
                    len,
                },
            )?;
            poly.material = entry.material as usize;
            poly.visible_bone = entry.bone as usize;
            poly.priority = entry.priority;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::mdl0::geometry::{decode_facepoints, encode_facepoints, FacepointLayout};
    use crate::formats::mdl0::material::Layer;
    use crate::formats::mdl0::polygon::INDEX_BYTE;
    use pretty_assertions::assert_eq;

    fn minimal_model() -> Mdl0 {
        let mut mdl0 = Mdl0::new("course");
        mdl0.add_bone(Bone::new("root"));

        let mut vertex = Vertex::new("coursepos");
        vertex
            .points
            .encode(&[
                vec![0.0, 0.0, 0.0],
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![1.0, 1.0, 0.0],
                vec![1.0, 2.0, 0.0],
            ])
            .unwrap();
        vertex.minimum = [0.0, 0.0, 0.0];
        vertex.maximum = [1.0, 2.0, 0.0];
        mdl0.vertices.push(vertex);

        let mut material = Material::new("road");
        material.layers.push(Layer::new("asphalt"));
        mdl0.materials.push(material);

        let mut poly = Polygon::new("roadmesh");
        poly.vertex_group = 0;
        poly.vertex_index_format = INDEX_BYTE;
        let layout = FacepointLayout::from_polygon(&poly).unwrap();
        let tris = vec![
            [vec![0], vec![1], vec![2]],
            [vec![2], vec![1], vec![3]],
            [vec![2], vec![3], vec![4]],
        ];
        let (data, facepoint_count, face_count) = encode_facepoints(&layout, tris);
        poly.data = data;
        poly.facepoint_count = facepoint_count;
        poly.face_count = face_count;
        poly.bone_table = Some(vec![0]);
        mdl0.objects.push(poly);
        mdl0.recalculate_extents();
        mdl0
    }

    #[test]
    fn round_trip_preserves_triangles() {
        let mdl0 = minimal_model();
        let mut writer = BinWriter::new();
        writer.start();
        mdl0.pack(&mut writer).unwrap();
        writer.end();
        writer.pack_names();
        let file = writer.finish().unwrap();

        let mut reader = BinReader::new(file);
        reader.start();
        let read = Mdl0::unpack(&mut reader).unwrap();
        assert_eq!(read.name, "course");
        assert_eq!(read.bones.len(), 1);
        assert_eq!(read.materials.len(), 1);
        assert_eq!(read.objects.len(), 1);
        assert_eq!(read.facepoint_count(), mdl0.facepoint_count());
        assert_eq!(read.face_count(), 3);

        let mut original: Vec<_> = decode_facepoints(&mdl0.objects[0])
            .unwrap()
            .triangles
            .into_iter()
            .map(|t| {
                let mut t = t.to_vec();
                t.sort();
                t
            })
            .collect();
        let mut round: Vec<_> = decode_facepoints(&read.objects[0])
            .unwrap()
            .triangles
            .into_iter()
            .map(|t| {
                let mut t = t.to_vec();
                t.sort();
                t
            })
            .collect();
        original.sort();
        round.sort();
        assert_eq!(original, round);
    }

    #[test]
    fn shaders_are_shared_between_equivalent_materials() {
        let mut mdl0 = minimal_model();
        let mut second = Material::new("wall");
        second.layers.push(Layer::new("asphalt"));
        mdl0.materials.push(second);
        let (shaders, shader_mats) = mdl0.build_shaders();
        assert_eq!(shaders.len(), 1);
        assert_eq!(shader_mats[0], vec![0, 1]);
    }

    #[test]
    fn draw_lists_split_by_xlu_and_sort_by_priority() {
        let mut mdl0 = minimal_model();
        let mut glass = Material::new("glass");
        glass.xlu = true;
        mdl0.materials.push(glass);

        let mut pane = Polygon::new("pane");
        pane.material = 1;
        pane.priority = 1;
        mdl0.objects.push(pane);
        let mut pane2 = Polygon::new("pane2");
        pane2.material = 1;
        mdl0.objects.push(pane2);

        let (opa, xlu) = mdl0.build_draw_lists().unwrap();
        assert_eq!(opa.entries.len(), 1);
        assert_eq!(xlu.entries.len(), 2);
        // priority ascending
        assert_eq!(xlu.entries[0].object, 2);
        assert_eq!(xlu.entries[1].object, 1);
    }

    #[test]
    fn unused_texture_links_are_a_packing_error() {
        let mut mdl0 = minimal_model();
        // layer removed after link building is simulated by a material
        // whose shader folder entry exists but has no layers
        mdl0.materials[0].layers.clear();
        let links = mdl0.build_texture_links();
        assert!(links.is_empty());
    }

    #[test]
    fn check_reports_out_of_range_groups() {
        let mut mdl0 = minimal_model();
        mdl0.objects[0].vertex_group = 7;
        let config = Config::default();
        let findings = mdl0.check(&["asphalt".to_string()], &config);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].contains("vertex group 7"));
    }

    #[test]
    fn check_removes_unknown_layers_when_configured() {
        let mut mdl0 = minimal_model();
        let mut config = Config::default();
        config.set("remove_unknown_refs", "true").unwrap();
        mdl0.check(&[], &config);
        assert!(mdl0.materials[0].layers.is_empty());
    }
}
