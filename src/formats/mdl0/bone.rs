//! Skeleton bones.
//!
//! Bones are stored as fixed 0xd0 byte records linked four ways: parent,
//! first child, next and previous sibling, each as a signed offset between
//! record starts. The crate keeps the links as indices into the model's
//! bone list and rebuilds the offsets on pack.

use ahash::AHashMap;
use glam::{EulerRot, Mat4, Quat, Vec3, Vec4};

use crate::binstream::{BinReader, BinWriter, Mark};
use crate::error::BrresError;

pub const RECORD_SIZE: usize = 0xd0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoneFlags {
    pub no_transform: bool,
    pub fixed_translation: bool,
    pub fixed_rotation: bool,
    pub fixed_scale: bool,
    pub scale_equal: bool,
    pub seg_scale_comp_apply: bool,
    pub seg_scale_comp_parent: bool,
    pub classic_scale_off: bool,
    pub visible: bool,
    pub has_geometry: bool,
    pub has_billboard_parent: bool,
}

impl BoneFlags {
    fn to_u32(self) -> u32 {
        self.no_transform as u32
            | (self.fixed_translation as u32) << 1
            | (self.fixed_rotation as u32) << 2
            | (self.fixed_scale as u32) << 3
            | (self.scale_equal as u32) << 4
            | (self.seg_scale_comp_apply as u32) << 5
            | (self.seg_scale_comp_parent as u32) << 6
            | (self.classic_scale_off as u32) << 7
            | (self.visible as u32) << 8
            | (self.has_geometry as u32) << 9
            | (self.has_billboard_parent as u32) << 10
    }

    fn from_u32(flags: u32) -> Self {
        Self {
            no_transform: flags & 1 != 0,
            fixed_translation: flags & 0x2 != 0,
            fixed_rotation: flags & 0x4 != 0,
            fixed_scale: flags & 0x8 != 0,
            scale_equal: flags & 0x10 != 0,
            seg_scale_comp_apply: flags & 0x20 != 0,
            seg_scale_comp_parent: flags & 0x40 != 0,
            classic_scale_off: flags & 0x80 != 0,
            visible: flags & 0x100 != 0,
            has_geometry: flags & 0x200 != 0,
            has_billboard_parent: flags & 0x400 != 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "derive_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bone {
    pub name: String,
    pub weight_id: u32,
    pub flags: BoneFlags,
    pub billboard: u32,
    pub scale: [f32; 3],
    pub rotation: [f32; 3],
    pub translation: [f32; 3],
    pub minimum: [f32; 3],
    pub maximum: [f32; 3],
    pub parent: Option<usize>,
    pub child: Option<usize>,
    pub next: Option<usize>,
    pub prev: Option<usize>,
    pub part2: i32,
    /// Rows of the 4x3 bone to model matrix.
    pub transform_matrix: [[f32; 4]; 3],
    pub inverse_matrix: [[f32; 4]; 3],
}

impl Bone {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            weight_id: 0,
            flags: BoneFlags {
                no_transform: true,
                fixed_translation: true,
                fixed_rotation: true,
                fixed_scale: true,
                scale_equal: true,
                visible: true,
                ..Default::default()
            },
            billboard: 0,
            scale: [1.0; 3],
            rotation: [0.0; 3],
            translation: [0.0; 3],
            minimum: [0.0; 3],
            maximum: [0.0; 3],
            parent: None,
            child: None,
            next: None,
            prev: None,
            part2: 0,
            transform_matrix: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
            ],
            inverse_matrix: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
            ],
        }
    }
}

fn rows_to_mat4(rows: &[[f32; 4]; 3]) -> Mat4 {
    Mat4::from_cols(
        Vec4::new(rows[0][0], rows[1][0], rows[2][0], 0.0),
        Vec4::new(rows[0][1], rows[1][1], rows[2][1], 0.0),
        Vec4::new(rows[0][2], rows[1][2], rows[2][2], 0.0),
        Vec4::new(rows[0][3], rows[1][3], rows[2][3], 1.0),
    )
}

fn mat4_to_rows(m: Mat4) -> [[f32; 4]; 3] {
    [m.row(0).to_array(), m.row(1).to_array(), m.row(2).to_array()]
}

impl Bone {
    /// Rebuilds the bone-to-model and inverse matrices from the local
    /// scale, rotation (degrees), and translation, composed onto the
    /// parent's transform.
    pub fn recalculate_matrices(&mut self, parent: Option<&Bone>) {
        let local = Mat4::from_scale_rotation_translation(
            Vec3::from(self.scale),
            Quat::from_euler(
                EulerRot::ZYX,
                self.rotation[2].to_radians(),
                self.rotation[1].to_radians(),
                self.rotation[0].to_radians(),
            ),
            Vec3::from(self.translation),
        );
        let world = match parent {
            Some(parent) => rows_to_mat4(&parent.transform_matrix) * local,
            None => local,
        };
        self.transform_matrix = mat4_to_rows(world);
        self.inverse_matrix = mat4_to_rows(world.inverse());
    }
}

fn write_matrix(writer: &mut BinWriter, m: &[[f32; 4]; 3]) {
    for row in m {
        for v in row {
            writer.write_f32(*v);
        }
    }
}

fn read_matrix(reader: &mut BinReader) -> Result<[[f32; 4]; 3], BrresError> {
    let mut m = [[0.0f32; 4]; 3];
    for row in &mut m {
        for v in row.iter_mut() {
            *v = reader.read_f32()?;
        }
    }
    Ok(m)
}

struct PendingLinks {
    offset: usize,
    child: Mark,
    next: Mark,
}

/// Packs all bones as consecutive records, then patches the forward child
/// and sibling offsets.
pub fn pack_bones(
    writer: &mut BinWriter,
    bones: &[Bone],
    mut on_record: impl FnMut(&mut BinWriter),
) -> Result<Vec<usize>, BrresError> {
    let mut pending: Vec<PendingLinks> = Vec::with_capacity(bones.len());
    let mut offsets = Vec::with_capacity(bones.len());
    for (i, bone) in bones.iter().enumerate() {
        on_record(writer);
        let offset = writer.start();
        offsets.push(offset);
        writer.mark_len();
        writer.write_i32(writer.outer_offset());
        writer.store_name_ref(&bone.name);
        writer.write_u32(i as u32);
        writer.write_u32(bone.weight_id);
        writer.write_u32(bone.flags.to_u32());
        writer.write_u32(bone.billboard);
        writer.write_u32(0);
        for v in bone
            .scale
            .iter()
            .chain(&bone.rotation)
            .chain(&bone.translation)
            .chain(&bone.minimum)
            .chain(&bone.maximum)
        {
            writer.write_f32(*v);
        }
        match bone.parent {
            Some(p) if p < i => writer.write_i32(offsets[p] as i32 - offset as i32),
            Some(p) => {
                return Err(BrresError::Packing(format!(
                    "bone {} appears before its parent {}",
                    bone.name, p
                )))
            }
            None => writer.advance(4),
        }
        let child = writer.mark();
        let next = writer.mark();
        match bone.prev {
            Some(p) if p < i => writer.write_i32(offsets[p] as i32 - offset as i32),
            Some(p) => {
                return Err(BrresError::Packing(format!(
                    "bone {} appears before its sibling {}",
                    bone.name, p
                )))
            }
            None => writer.advance(4),
        }
        writer.write_i32(bone.part2);
        write_matrix(writer, &bone.transform_matrix);
        write_matrix(writer, &bone.inverse_matrix);
        writer.end();
        pending.push(PendingLinks {
            offset,
            child,
            next,
        });
    }
    for (bone, links) in bones.iter().zip(&pending) {
        let value = |target: Option<usize>| -> u32 {
            match target {
                Some(t) => (offsets[t] as i32 - links.offset as i32) as u32,
                None => 0,
            }
        };
        writer.resolve_raw(links.child, value(bone.child));
        writer.resolve_raw(links.next, value(bone.next));
    }
    Ok(offsets)
}

struct RawBone {
    bone: Bone,
    offset: usize,
    parent: i32,
    child: i32,
    next: i32,
    prev: i32,
}

fn unpack_bone(reader: &mut BinReader, name: String) -> Result<RawBone, BrresError> {
    let offset = reader.start();
    reader.read_len()?;
    reader.skip(8)?; // outer offset, name
    let _index = reader.read_u32()?;
    let weight_id = reader.read_u32()?;
    let flags = BoneFlags::from_u32(reader.read_u32()?);
    let billboard = reader.read_u32()?;
    reader.skip(4)?;
    let scale = reader.read_f32x3()?;
    let rotation = reader.read_f32x3()?;
    let translation = reader.read_f32x3()?;
    let minimum = reader.read_f32x3()?;
    let maximum = reader.read_f32x3()?;
    let parent = reader.read_i32()?;
    let child = reader.read_i32()?;
    let next = reader.read_i32()?;
    let prev = reader.read_i32()?;
    let part2 = reader.read_i32()?;
    let transform_matrix = read_matrix(reader)?;
    let inverse_matrix = read_matrix(reader)?;
    reader.end();
    Ok(RawBone {
        bone: Bone {
            name,
            weight_id,
            flags,
            billboard,
            scale,
            rotation,
            translation,
            minimum,
            maximum,
            parent: None,
            child: None,
            next: None,
            prev: None,
            part2,
            transform_matrix,
            inverse_matrix,
        },
        offset,
        parent,
        child,
        next,
        prev,
    })
}

/// Unpacks bone records and resolves the offset links into list indices.
pub fn unpack_bones(
    reader: &mut BinReader,
    names: Vec<String>,
    mut seek_next: impl FnMut(&mut BinReader) -> Result<(), BrresError>,
) -> Result<Vec<Bone>, BrresError> {
    let mut raw = Vec::with_capacity(names.len());
    for name in names {
        seek_next(reader)?;
        raw.push(unpack_bone(reader, name)?);
    }
    let by_offset: AHashMap<usize, usize> =
        raw.iter().enumerate().map(|(i, r)| (r.offset, i)).collect();
    let link = |rel: i32, from: usize| -> Result<Option<usize>, BrresError> {
        if rel == 0 {
            return Ok(None);
        }
        let target = (from as i64 + rel as i64) as usize;
        by_offset
            .get(&target)
            .copied()
            .map(Some)
            .ok_or(BrresError::MissingReference {
                base: from,
                index: target,
            })
    };
    let mut bones = Vec::with_capacity(raw.len());
    for r in &raw {
        let mut bone = r.bone.clone();
        bone.parent = link(r.parent, r.offset)?;
        bone.child = link(r.child, r.offset)?;
        bone.next = link(r.next, r.offset)?;
        bone.prev = link(r.prev, r.offset)?;
        bones.push(bone);
    }
    Ok(bones)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn skeleton() -> Vec<Bone> {
        let mut root = Bone::new("root");
        root.child = Some(1);
        let mut hip = Bone::new("hip");
        hip.parent = Some(0);
        hip.next = Some(2);
        hip.translation = [0.0, 4.5, 0.0];
        let mut tail = Bone::new("tail");
        tail.parent = Some(0);
        tail.prev = Some(1);
        tail.flags.has_geometry = true;
        vec![root, hip, tail]
    }

    #[test]
    fn records_are_fixed_size_and_linked() {
        let bones = skeleton();
        let mut writer = BinWriter::new();
        writer.start();
        let offsets = pack_bones(&mut writer, &bones, |_| {}).unwrap();
        writer.end();
        let file = writer.finish().unwrap();
        assert_eq!(offsets, vec![0, RECORD_SIZE, RECORD_SIZE * 2]);

        let mut reader = BinReader::new(file);
        reader.start();
        let names = bones.iter().map(|b| b.name.clone()).collect();
        let mut next_offset = 0;
        let read = unpack_bones(&mut reader, names, |r| {
            r.seek(next_offset);
            next_offset += RECORD_SIZE;
            Ok(())
        })
        .unwrap();
        assert_eq!(read, bones);
    }

    #[test]
    fn matrices_compose_onto_the_parent() {
        use approx::assert_relative_eq;
        let mut root = Bone::new("root");
        root.translation = [0.0, 5.0, 0.0];
        root.recalculate_matrices(None);
        assert_relative_eq!(root.transform_matrix[1][3], 5.0);

        let mut child = Bone::new("child");
        child.translation = [2.0, 0.0, 0.0];
        child.scale = [3.0, 3.0, 3.0];
        child.recalculate_matrices(Some(&root));
        assert_relative_eq!(child.transform_matrix[0][3], 2.0);
        assert_relative_eq!(child.transform_matrix[1][3], 5.0);
        assert_relative_eq!(child.transform_matrix[0][0], 3.0);
        // inverse undoes the world transform
        assert_relative_eq!(child.inverse_matrix[0][3], -2.0 / 3.0);
    }

    #[test]
    fn child_before_parent_is_rejected() {
        let mut child = Bone::new("leaf");
        child.parent = Some(1);
        let bones = vec![child, Bone::new("root")];
        let mut writer = BinWriter::new();
        writer.start();
        assert!(pack_bones(&mut writer, &bones, |_| {}).is_err());
    }
}
