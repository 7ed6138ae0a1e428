//! Interfaces to mesh and image converters.
//!
//! The library never reads interchange formats or pixel data itself.
//! Converters implement these traits and hand the core a [Geometry] per
//! draw object; [add_geometry] quantizes the attribute arrays, strips the
//! triangles, and wires the object into the model's draw pass.

use std::path::Path;

use crate::brres::Brres;
use crate::error::BrresError;
use crate::formats::mdl0::geometry::{encode_facepoints, FacepointLayout};
use crate::formats::mdl0::point::{Color, Normal, Uv, Vertex};
use crate::formats::mdl0::polygon::{Polygon, INDEX_BYTE, INDEX_SHORT};
use crate::formats::mdl0::tristrip::Facepoint;
use crate::formats::mdl0::Mdl0;
use crate::formats::tex0::Tex0;

/// Converts between a mesh interchange format on disk and MDL0 models.
pub trait MeshConverter {
    /// Reads the file at `path` and attaches the resulting model to
    /// `brres`, returning its name.
    fn encode(&mut self, brres: &mut Brres, path: &Path) -> Result<String, BrresError>;

    /// Writes `mdl0` (with its textures from `brres`) to `path`.
    fn decode(&mut self, brres: &Brres, mdl0: &Mdl0, path: &Path) -> Result<(), BrresError>;
}

/// Converts between image files and encoded TEX0 payloads.
pub trait ImageCodec {
    fn encode(&mut self, path: &Path, format: u32, mip_count: u32) -> Result<Tex0, BrresError>;
    fn decode(&mut self, tex0: &Tex0, path: &Path) -> Result<(), BrresError>;
    fn convert(&mut self, tex0: &mut Tex0, format: u32) -> Result<(), BrresError>;
    fn set_dimensions(&mut self, tex0: &mut Tex0, width: u16, height: u16)
        -> Result<(), BrresError>;
    fn set_mipmap_count(&mut self, tex0: &mut Tex0, count: u32) -> Result<(), BrresError>;
}

/// One triangle corner: indices into the carrier's attribute arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Corner {
    pub position: u16,
    pub normal: Option<u16>,
    pub color: Option<u16>,
    pub uvs: [Option<u16>; 8],
    /// Weight slot in the model's bone table, for skinned objects.
    pub influence: Option<u16>,
}

/// A draw object as a converter hands it over: indexed attribute arrays
/// plus triangles of corners.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Geometry {
    pub name: String,
    pub material: String,
    pub positions: Vec<Vec<f32>>,
    pub normals: Vec<Vec<f32>>,
    pub colors: Vec<[u8; 4]>,
    pub uv_channels: Vec<Vec<Vec<f32>>>,
    pub triangles: Vec<[Corner; 3]>,
}

fn index_format(count: usize) -> u32 {
    if count > 0xff {
        INDEX_SHORT
    } else {
        INDEX_BYTE
    }
}

fn extents(rows: &[Vec<f32>]) -> ([f32; 3], [f32; 3]) {
    let mut minimum = [f32::MAX; 3];
    let mut maximum = [f32::MIN; 3];
    for row in rows {
        for (i, v) in row.iter().take(3).enumerate() {
            minimum[i] = minimum[i].min(*v);
            maximum[i] = maximum[i].max(*v);
        }
    }
    (minimum, maximum)
}

/// Builds the point groups and polygon for `geometry` and attaches them to
/// `mdl0`, drawn with the named material under the given bone. Returns the
/// object's index.
pub fn add_geometry(
    mdl0: &mut Mdl0,
    geometry: &Geometry,
    visible_bone: usize,
) -> Result<usize, BrresError> {
    if geometry.triangles.is_empty() {
        return Err(BrresError::Convert(format!(
            "object {} has no triangles",
            geometry.name
        )));
    }
    let material = mdl0
        .materials
        .iter()
        .position(|m| m.name == geometry.material)
        .ok_or_else(|| BrresError::UnknownName(geometry.material.clone()))?;
    if visible_bone >= mdl0.bones.len() {
        return Err(BrresError::IndexOutOfRange {
            kind: "bone",
            index: visible_bone,
            len: mdl0.bones.len(),
        });
    }

    let mut poly = Polygon::new(&geometry.name);
    poly.material = material;
    poly.visible_bone = visible_bone;
    poly.bone_id = visible_bone as i32;

    let weighted = geometry
        .triangles
        .iter()
        .flatten()
        .any(|corner| corner.influence.is_some());
    if weighted {
        poly.has_weighted_matrix = true;
        // the object spans several weight slots, so no single bone applies
        poly.bone_id = -1;
        let mut slots: Vec<u16> = geometry
            .triangles
            .iter()
            .flatten()
            .map(|corner| corner.influence.unwrap_or(0))
            .collect();
        slots.sort_unstable();
        slots.dedup();
        poly.bone_table = Some(slots);
    } else {
        poly.bone_table = Some(vec![visible_bone as u16]);
    }

    let mut vertex = Vertex::new(&format!("{}_position", geometry.name));
    vertex.points.encode(&geometry.positions)?;
    let (minimum, maximum) = extents(&geometry.positions);
    vertex.minimum = minimum;
    vertex.maximum = maximum;
    poly.vertex_group = mdl0.vertices.len() as i16;
    poly.vertex_index_format = index_format(geometry.positions.len());
    mdl0.vertices.push(vertex);

    if !geometry.normals.is_empty() {
        let mut normal = Normal::new(&format!("{}_normal", geometry.name));
        normal.points.encode(&geometry.normals)?;
        poly.normal_group = mdl0.normals.len() as i16;
        poly.normal_index_format = index_format(geometry.normals.len());
        mdl0.normals.push(normal);
    }
    if !geometry.colors.is_empty() {
        let mut color = Color::new(&format!("{}_color", geometry.name));
        color.encode(&geometry.colors)?;
        poly.color_groups[0] = mdl0.colors.len() as i16;
        poly.color_index_formats[0] = index_format(geometry.colors.len());
        mdl0.colors.push(color);
    }
    for (i, channel) in geometry.uv_channels.iter().take(8).enumerate() {
        if channel.is_empty() {
            continue;
        }
        let mut uv = Uv::new(&format!("{}_uv{}", geometry.name, i));
        uv.points.encode(channel)?;
        poly.uv_groups[i] = mdl0.uvs.len() as i16;
        poly.uv_index_formats[i] = index_format(channel.len());
        mdl0.uvs.push(uv);
    }

    let layout = FacepointLayout::from_polygon(&poly)?;
    let mut triangles = Vec::with_capacity(geometry.triangles.len());
    for tri in &geometry.triangles {
        let mut points: [Facepoint; 3] = Default::default();
        for (corner, point) in tri.iter().zip(&mut points) {
            let mut fp = Vec::with_capacity(layout.columns());
            if layout.weight.is_some() {
                fp.push(corner.influence.unwrap_or(0));
            }
            fp.push(corner.position);
            if layout.normal.is_some() {
                fp.push(corner.normal.unwrap_or(0));
            }
            if layout.colors[0].is_some() {
                fp.push(corner.color.unwrap_or(0));
            }
            for (i, uv) in corner.uvs.iter().enumerate() {
                if layout.uvs[i].is_some() {
                    fp.push(uv.unwrap_or(0));
                }
            }
            *point = fp;
        }
        triangles.push(points);
    }
    let (data, facepoint_count, face_count) = encode_facepoints(&layout, triangles);
    poly.data = data;
    poly.facepoint_count = facepoint_count;
    poly.face_count = face_count;

    let index = mdl0.objects.len();
    mdl0.objects.push(poly);
    mdl0.recalculate_extents();
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::mdl0::bone::Bone;
    use crate::formats::mdl0::geometry::decode_facepoints;
    use crate::formats::mdl0::material::Material;
    use pretty_assertions::assert_eq;

    fn quad() -> Geometry {
        let corner = |p: u16, uv: u16| Corner {
            position: p,
            uvs: [Some(uv), None, None, None, None, None, None, None],
            ..Default::default()
        };
        Geometry {
            name: "quad".to_string(),
            material: "mat".to_string(),
            positions: vec![
                vec![0.0, 0.0, 0.0],
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![1.0, 1.0, 0.0],
            ],
            uv_channels: vec![vec![
                vec![0.0, 0.0],
                vec![1.0, 0.0],
                vec![0.0, 1.0],
                vec![1.0, 1.0],
            ]],
            triangles: vec![
                [corner(0, 0), corner(1, 1), corner(2, 2)],
                [corner(2, 2), corner(1, 1), corner(3, 3)],
            ],
            ..Default::default()
        }
    }

    #[test]
    fn geometry_attaches_groups_and_object() {
        let mut mdl0 = Mdl0::new("course");
        mdl0.add_bone(Bone::new("root"));
        mdl0.materials.push(Material::new("mat"));

        let index = add_geometry(&mut mdl0, &quad(), 0).unwrap();
        assert_eq!(index, 0);
        assert_eq!(mdl0.vertices.len(), 1);
        assert_eq!(mdl0.uvs.len(), 1);
        let poly = &mdl0.objects[0];
        assert_eq!(poly.material, 0);
        assert_eq!(poly.face_count, 2);
        let decoded = decode_facepoints(poly).unwrap();
        assert_eq!(decoded.triangles.len(), 2);
        assert_eq!(mdl0.maximum, [1.0, 1.0, 0.0]);
    }

    #[test]
    fn weighted_corners_build_a_skinned_object() {
        let mut mdl0 = Mdl0::new("course");
        mdl0.add_bone(Bone::new("root"));
        mdl0.add_bone(Bone::new("arm"));
        mdl0.materials.push(Material::new("mat"));

        let mut geometry = quad();
        for tri in &mut geometry.triangles {
            for corner in tri.iter_mut() {
                corner.influence = Some(if corner.position < 2 { 0 } else { 1 });
            }
        }
        add_geometry(&mut mdl0, &geometry, 0).unwrap();
        let poly = &mdl0.objects[0];
        assert!(poly.has_weighted_matrix);
        assert_eq!(poly.bone_id, -1);
        assert_eq!(poly.bone_table, Some(vec![0, 1]));
        let decoded = decode_facepoints(poly).unwrap();
        assert_eq!(decoded.triangles.len(), 2);
        assert_eq!(decoded.weight_groups.get(&0), Some(&vec![0, 1]));
    }

    #[test]
    fn unknown_material_is_rejected() {
        let mut mdl0 = Mdl0::new("course");
        mdl0.add_bone(Bone::new("root"));
        assert!(matches!(
            add_geometry(&mut mdl0, &quad(), 0),
            Err(BrresError::UnknownName(_))
        ));
    }
}
