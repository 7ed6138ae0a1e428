//! Facepoint display list encoding and decoding.
//!
//! The display list is a run of draw commands: 0x98 draws a triangle
//! strip, 0x90 separate triangles, and 0x20/0x28/0x30 load weight
//! matrices for the section that follows. Each facepoint is a row of
//! attribute indices whose order and width come from the object's index
//! formats.

use std::collections::BTreeMap;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use log::warn;

use crate::error::BrresError;
use crate::formats::mdl0::definition::{MixCommand, NodeMix};
use crate::formats::mdl0::polygon::{index_width, Polygon};
use crate::formats::mdl0::tristrip::{Facepoint, TriangleSet};

pub const CMD_NOP: u8 = 0x00;
pub const CMD_LOAD_POS_MTX: u8 = 0x20;
pub const CMD_LOAD_NRM_MTX: u8 = 0x28;
pub const CMD_LOAD_TEX_MTX: u8 = 0x30;
pub const CMD_DRAW_TRIS: u8 = 0x90;
pub const CMD_DRAW_STRIP: u8 = 0x98;

/// Maps facepoint columns back to the attributes they index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FacepointLayout {
    pub weight: Option<usize>,
    pub uv_matrices: [Option<usize>; 8],
    pub vertex: Option<usize>,
    pub normal: Option<usize>,
    pub colors: [Option<usize>; 2],
    pub uvs: [Option<usize>; 8],
    /// Byte width of each column in order.
    pub widths: Vec<usize>,
}

impl FacepointLayout {
    pub fn from_polygon(poly: &Polygon) -> Result<Self, BrresError> {
        let mut layout = Self::default();
        let context = format!("object {}", poly.name);
        if poly.has_weighted_matrix {
            layout.weight = Some(layout.widths.len());
            layout.widths.push(1);
        }
        for i in 0..8 {
            if poly.uv_matrices[i] {
                layout.uv_matrices[i] = Some(layout.widths.len());
                layout.widths.push(1);
            }
        }
        let mut column = |format: u32, widths: &mut Vec<usize>| -> Result<Option<usize>, BrresError> {
            Ok(match index_width(format, &context)? {
                Some(w) => {
                    let at = widths.len();
                    widths.push(w);
                    Some(at)
                }
                None => None,
            })
        };
        layout.vertex = column(poly.vertex_index_format, &mut layout.widths)?;
        layout.normal = column(poly.normal_index_format, &mut layout.widths)?;
        for i in 0..2 {
            layout.colors[i] = column(poly.color_index_formats[i], &mut layout.widths)?;
        }
        for i in 0..8 {
            layout.uvs[i] = column(poly.uv_index_formats[i], &mut layout.widths)?;
        }
        Ok(layout)
    }

    pub fn stride(&self) -> usize {
        self.widths.iter().sum()
    }

    pub fn columns(&self) -> usize {
        self.widths.len()
    }

    fn read_facepoint(&self, data: &[u8], offset: usize) -> Result<Facepoint, BrresError> {
        if offset + self.stride() > data.len() {
            return Err(BrresError::UnexpectedEof { offset });
        }
        let mut fp = Vec::with_capacity(self.columns());
        let mut at = offset;
        for width in &self.widths {
            fp.push(match width {
                1 => data[at] as u16,
                _ => BigEndian::read_u16(&data[at..]),
            });
            at += width;
        }
        Ok(fp)
    }

    fn write_facepoint(&self, data: &mut Vec<u8>, fp: &Facepoint) {
        for (value, width) in fp.iter().zip(&self.widths) {
            match width {
                1 => data.push(*value as u8),
                _ => {
                    let _ = data.write_u16::<BigEndian>(*value);
                }
            }
        }
    }
}

/// Decoded facepoint triangles plus the weight matrix slots loaded before
/// each section, keyed by the triangle index the section starts at.
pub struct DecodedFacepoints {
    pub triangles: Vec<[Facepoint; 3]>,
    pub weight_groups: BTreeMap<usize, Vec<u16>>,
}

pub fn decode_facepoints(poly: &Polygon) -> Result<DecodedFacepoints, BrresError> {
    let layout = FacepointLayout::from_polygon(poly)?;
    let stride = layout.stride();
    let data = &poly.data;
    let mut triangles = Vec::new();
    let mut weight_groups: BTreeMap<usize, Vec<u16>> = BTreeMap::new();
    let mut group_start = None;
    let mut total = 0u32;
    let mut i = 0usize;
    while total < poly.facepoint_count {
        if i >= data.len() {
            return Err(BrresError::UnexpectedEof { offset: i });
        }
        let cmd = data[i];
        i += 1;
        match cmd {
            CMD_DRAW_STRIP | CMD_DRAW_TRIS => {
                if i + 2 > data.len() {
                    return Err(BrresError::UnexpectedEof { offset: i });
                }
                let count = BigEndian::read_u16(&data[i..]) as usize;
                i += 2;
                if cmd == CMD_DRAW_STRIP {
                    let mut points = Vec::with_capacity(count);
                    for n in 0..count {
                        points.push(layout.read_facepoint(data, i)?);
                        i += stride;
                        if n >= 2 {
                            let tri = if n % 2 == 1 {
                                [
                                    points[n - 1].clone(),
                                    points[n - 2].clone(),
                                    points[n].clone(),
                                ]
                            } else {
                                [
                                    points[n - 2].clone(),
                                    points[n - 1].clone(),
                                    points[n].clone(),
                                ]
                            };
                            triangles.push(tri);
                        }
                    }
                } else {
                    if count % 3 != 0 {
                        return Err(BrresError::Decode(format!(
                            "object {} triangle draw of {} facepoints",
                            poly.name, count
                        )));
                    }
                    for _ in 0..count / 3 {
                        let mut tri = Vec::with_capacity(3);
                        for _ in 0..3 {
                            tri.push(layout.read_facepoint(data, i)?);
                            i += stride;
                        }
                        triangles.push([tri[0].clone(), tri[1].clone(), tri[2].clone()]);
                    }
                }
                total += count as u32;
                group_start = None;
            }
            CMD_LOAD_POS_MTX | CMD_LOAD_NRM_MTX | CMD_LOAD_TEX_MTX => {
                if i + 4 > data.len() {
                    return Err(BrresError::UnexpectedEof { offset: i });
                }
                let start = *group_start.get_or_insert(triangles.len());
                let bone_index = BigEndian::read_u16(&data[i..]);
                let xf_address = BigEndian::read_u16(&data[i + 2..]) & 0xfff;
                i += 4;
                if cmd == CMD_LOAD_POS_MTX {
                    let weights = weight_groups.entry(start).or_default();
                    let slot = xf_address as usize / 12;
                    if slot == weights.len() {
                        weights.push(bone_index);
                    } else if slot < weights.len() {
                        weights[slot] = bone_index;
                    }
                }
            }
            CMD_NOP => {
                warn!("finished parsing {} indices early", poly.name);
                break;
            }
            cmd => {
                return Err(BrresError::Decode(format!(
                    "object {} has unsupported draw command {:#x}",
                    poly.name, cmd
                )))
            }
        }
    }
    Ok(DecodedFacepoints {
        triangles,
        weight_groups,
    })
}

/// Bones affecting one weight slot. Single-bone slots carry one entry
/// with weight 1.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Influence {
    /// `(bone index, weight)` pairs.
    pub weights: Vec<(usize, f32)>,
}

/// Resolves the bone table and node mix into per-slot influences.
///
/// Slots with a bone index map straight to that bone; mixed slots (-1)
/// are defined by blend commands referencing single-bone slots.
pub fn decode_influences(
    bone_table: &[i32],
    node_mix: Option<&NodeMix>,
) -> Result<Vec<Influence>, BrresError> {
    let mut influences = vec![Influence::default(); bone_table.len()];
    for (slot, bone) in bone_table.iter().enumerate() {
        if *bone >= 0 {
            influences[slot].weights.push((*bone as usize, 1.0));
        }
    }
    if let Some(mix) = node_mix {
        for command in &mix.commands {
            let (weight_id, weights) = match command {
                MixCommand::Blend { weight_id, weights } => (*weight_id as usize, weights),
                _ => continue,
            };
            if weight_id >= influences.len() {
                return Err(BrresError::IndexOutOfRange {
                    kind: "weight slot",
                    index: weight_id,
                    len: influences.len(),
                });
            }
            let mut resolved = Vec::with_capacity(weights.len());
            for (slot, weight) in weights {
                let bone = bone_table
                    .get(*slot as usize)
                    .copied()
                    .ok_or(BrresError::IndexOutOfRange {
                        kind: "weight slot",
                        index: *slot as usize,
                        len: bone_table.len(),
                    })?;
                if bone < 0 {
                    return Err(BrresError::Decode(format!(
                        "blend slot {} references mixed slot {}",
                        weight_id, slot
                    )));
                }
                resolved.push((bone as usize, *weight));
            }
            influences[weight_id].weights = resolved;
        }
    }
    Ok(influences)
}

/// Matrix slots available to one draw section.
const SECTION_SLOTS: usize = 10;

/// Strips the triangles and writes the draw commands.
///
/// When the layout carries a weight column, that column holds weight slot
/// ids from the model's bone table. The triangles are split into sections
/// of at most ten distinct ids; each section loads its matrices with
/// 0x20/0x28/0x30 commands and the column is rewritten to the local
/// matrix address.
///
/// Returns the encoded list with the facepoint and face counts.
pub fn encode_facepoints(
    layout: &FacepointLayout,
    triangles: Vec<[Facepoint; 3]>,
) -> (Vec<u8>, u32, u32) {
    let face_count = triangles.len() as u32;
    let mut data = Vec::new();
    let mut facepoints = 0u32;
    match layout.weight {
        Some(col) => {
            let mut section = Vec::new();
            let mut slots: Vec<u16> = Vec::new();
            for tri in triangles {
                let mut added: Vec<u16> = tri
                    .iter()
                    .map(|fp| fp[col])
                    .filter(|id| !slots.contains(id))
                    .collect();
                added.sort_unstable();
                added.dedup();
                if slots.len() + added.len() > SECTION_SLOTS && !section.is_empty() {
                    write_weighted_section(
                        layout,
                        col,
                        &slots,
                        std::mem::take(&mut section),
                        &mut data,
                        &mut facepoints,
                    );
                    slots.clear();
                    added = tri.iter().map(|fp| fp[col]).collect();
                    added.sort_unstable();
                    added.dedup();
                }
                slots.extend(added);
                section.push(tri);
            }
            if !section.is_empty() {
                write_weighted_section(layout, col, &slots, section, &mut data, &mut facepoints);
            }
        }
        None => write_draws(layout, triangles, &mut data, &mut facepoints),
    }
    // display lists are padded to a 0x20 boundary
    while data.len() % 0x20 != 0 {
        data.push(0);
    }
    (data, facepoints, face_count)
}

/// Loads one section's matrices, rewrites its weight column from slot ids
/// to local matrix addresses, then draws it. Position matrices occupy
/// twelve floats from address 0, normal matrices nine from 0x400, texture
/// matrices follow the position bank at 0x78.
fn write_weighted_section(
    layout: &FacepointLayout,
    col: usize,
    slots: &[u16],
    mut section: Vec<[Facepoint; 3]>,
    data: &mut Vec<u8>,
    facepoints: &mut u32,
) {
    let load_tex = layout.uv_matrices.iter().any(Option::is_some);
    for (slot, id) in slots.iter().enumerate() {
        data.push(CMD_LOAD_POS_MTX);
        let _ = data.write_u16::<BigEndian>(*id);
        let _ = data.write_u16::<BigEndian>(0xb000 | (slot * 12) as u16);
        if layout.normal.is_some() {
            data.push(CMD_LOAD_NRM_MTX);
            let _ = data.write_u16::<BigEndian>(*id);
            let _ = data.write_u16::<BigEndian>(0x8000 | (0x400 + slot * 9) as u16);
        }
        if load_tex {
            data.push(CMD_LOAD_TEX_MTX);
            let _ = data.write_u16::<BigEndian>(*id);
            let _ = data.write_u16::<BigEndian>(0xb000 | (0x78 + slot * 12) as u16);
        }
    }
    for tri in &mut section {
        for fp in tri.iter_mut() {
            if let Some(slot) = slots.iter().position(|id| *id == fp[col]) {
                fp[col] = (slot * 3) as u16;
                for column in layout.uv_matrices.iter().flatten() {
                    fp[*column] = (30 + slot * 3) as u16;
                }
            }
        }
    }
    write_draws(layout, section, data, facepoints);
}

fn write_draws(
    layout: &FacepointLayout,
    triangles: Vec<[Facepoint; 3]>,
    data: &mut Vec<u8>,
    facepoints: &mut u32,
) {
    let result = TriangleSet::new(triangles).build();
    for strip in &result.strips {
        data.push(CMD_DRAW_STRIP);
        let _ = data.write_u16::<BigEndian>(strip.len() as u16);
        for fp in strip {
            layout.write_facepoint(data, fp);
        }
        *facepoints += strip.len() as u32;
    }
    if !result.triangles.is_empty() {
        data.push(CMD_DRAW_TRIS);
        let _ = data.write_u16::<BigEndian>((result.triangles.len() * 3) as u16);
        for tri in &result.triangles {
            for fp in tri {
                layout.write_facepoint(data, fp);
            }
        }
        *facepoints += result.triangles.len() as u32 * 3;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::mdl0::polygon::{INDEX_BYTE, INDEX_SHORT};
    use pretty_assertions::assert_eq;

    fn layout_poly() -> Polygon {
        let mut poly = Polygon::new("mesh");
        poly.vertex_group = 0;
        poly.uv_groups[0] = 0;
        poly.vertex_index_format = INDEX_SHORT;
        poly.uv_index_formats[0] = INDEX_BYTE;
        poly
    }

    #[test]
    fn layout_orders_columns() {
        let layout = FacepointLayout::from_polygon(&layout_poly()).unwrap();
        assert_eq!(layout.vertex, Some(0));
        assert_eq!(layout.uvs[0], Some(1));
        assert_eq!(layout.stride(), 3);
    }

    #[test]
    fn encode_decode_round_trips_triangles() {
        let mut poly = layout_poly();
        let layout = FacepointLayout::from_polygon(&poly).unwrap();
        let tris = vec![
            [vec![0, 0], vec![1, 1], vec![2, 2]],
            [vec![2, 2], vec![1, 1], vec![3, 3]],
            [vec![9, 9], vec![10, 10], vec![11, 11]],
        ];
        let (data, facepoint_count, face_count) = encode_facepoints(&layout, tris.clone());
        assert_eq!(face_count, 3);
        assert_eq!(data.len() % 0x20, 0);
        poly.data = data;
        poly.facepoint_count = facepoint_count;
        poly.face_count = face_count;

        let decoded = decode_facepoints(&poly).unwrap();
        assert_eq!(decoded.triangles.len(), 3);
        // same vertices survive, possibly in a different strip order
        let mut original: Vec<Facepoint> = tris.iter().flatten().cloned().collect();
        let mut round: Vec<Facepoint> = decoded.triangles.iter().flatten().cloned().collect();
        original.sort();
        round.sort();
        assert_eq!(original, round);
    }

    #[test]
    fn weighted_sections_record_matrix_slots() {
        let mut poly = Polygon::new("skin");
        poly.has_weighted_matrix = true;
        poly.vertex_index_format = INDEX_BYTE;
        // load two pos matrices then draw one triangle
        poly.data = vec![
            CMD_LOAD_POS_MTX, 0x00, 0x02, 0x00, 0x00, // bone 2 at slot 0
            CMD_LOAD_POS_MTX, 0x00, 0x05, 0x00, 0x0c, // bone 5 at slot 1
            CMD_DRAW_TRIS, 0x00, 0x03, 0x00, 0x00, 0x0c, 0x01, 0x00, 0x02,
        ];
        poly.facepoint_count = 3;
        let decoded = decode_facepoints(&poly).unwrap();
        assert_eq!(decoded.triangles.len(), 1);
        assert_eq!(decoded.weight_groups.get(&0), Some(&vec![2, 5]));
    }

    #[test]
    fn weighted_encode_splits_after_ten_slots() {
        let mut poly = Polygon::new("skin");
        poly.has_weighted_matrix = true;
        poly.vertex_index_format = INDEX_BYTE;
        let layout = FacepointLayout::from_polygon(&poly).unwrap();
        // each triangle brings three new weight ids; the fourth cannot fit
        let tris: Vec<[Facepoint; 3]> = (0u16..4)
            .map(|t| [vec![t * 3, 0], vec![t * 3 + 1, 1], vec![t * 3 + 2, 2]])
            .collect();
        let (data, facepoint_count, face_count) = encode_facepoints(&layout, tris);
        assert_eq!(face_count, 4);
        assert_eq!(data.len() % 0x20, 0);
        poly.data = data;
        poly.facepoint_count = facepoint_count;

        let decoded = decode_facepoints(&poly).unwrap();
        assert_eq!(decoded.triangles.len(), 4);
        assert_eq!(
            decoded.weight_groups.get(&0),
            Some(&(0..9).collect::<Vec<u16>>())
        );
        assert_eq!(decoded.weight_groups.get(&3), Some(&vec![9, 10, 11]));
        // weight columns hold local position matrix addresses
        for tri in &decoded.triangles {
            for fp in tri {
                assert_eq!(fp[0] % 3, 0);
                assert!(fp[0] / 3 < 9);
            }
        }
    }

    #[test]
    fn influences_resolve_single_and_mixed_slots() {
        let mut mix = NodeMix::default();
        mix.add_blend(2, vec![(0, 0.75), (1, 0.25)]);
        let influences = decode_influences(&[0, 1, -1], Some(&mix)).unwrap();
        assert_eq!(influences[0].weights, vec![(0, 1.0)]);
        assert_eq!(influences[1].weights, vec![(1, 1.0)]);
        assert_eq!(influences[2].weights, vec![(0, 0.75), (1, 0.25)]);
    }

    #[test]
    fn blends_may_not_reference_mixed_slots() {
        let mut mix = NodeMix::default();
        mix.add_blend(2, vec![(2, 1.0)]);
        assert!(decode_influences(&[0, 1, -1], Some(&mix)).is_err());
    }

    #[test]
    fn unknown_command_is_rejected() {
        let mut poly = layout_poly();
        poly.data = vec![0x42];
        poly.facepoint_count = 1;
        assert!(decode_facepoints(&poly).is_err());
    }
}
