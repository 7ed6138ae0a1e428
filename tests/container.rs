//! End-to-end container scenarios: build a file with the library, write it,
//! read it back, and check what survived.

use brres_lib::convert::{add_geometry, Corner, Geometry};
use brres_lib::formats::mdl0::bone::Bone;
use brres_lib::formats::mdl0::geometry::decode_facepoints;
use brres_lib::formats::mdl0::material::{Layer, Material};
use brres_lib::formats::srt0::{Srt0, SrtMatAnim, SrtTexAnim};
use brres_lib::prelude::*;

fn texture(name: &str) -> Tex0 {
    let mut tex = Tex0::new(name);
    tex.width = 16;
    tex.height = 16;
    tex.format = 14;
    tex.data = vec![0x33; 128];
    tex
}

fn course_model() -> Mdl0 {
    let mut mdl0 = Mdl0::new("course");
    mdl0.add_bone(Bone::new("root"));
    let mut material = Material::new("road");
    material.layers.push(Layer::new("asphalt"));
    mdl0.materials.push(material);

    let corner = |p: u16| Corner {
        position: p,
        ..Default::default()
    };
    let geometry = Geometry {
        name: "roadmesh".to_string(),
        material: "road".to_string(),
        positions: vec![
            vec![0.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![1.0, 1.0, 0.0],
            vec![1.0, 2.0, 0.0],
        ],
        triangles: vec![
            [corner(0), corner(1), corner(2)],
            [corner(2), corner(1), corner(3)],
            [corner(2), corner(3), corner(4)],
        ],
        ..Default::default()
    };
    add_geometry(&mut mdl0, &geometry, 0).unwrap();
    mdl0
}

fn course_container() -> Brres {
    let mut brres = Brres::new("course_model.brres");
    brres.add_texture(texture("asphalt"));
    brres.add_model(course_model());
    brres
}

#[test]
fn save_reload_preserves_counts_and_is_deterministic() {
    let brres = course_container();
    let first = brres.write().unwrap();
    let reloaded = Brres::read(first.clone()).unwrap();
    assert_eq!(reloaded.models.len(), brres.models.len());
    assert_eq!(reloaded.textures.len(), brres.textures.len());
    assert_eq!(reloaded.models[0].name, "course");

    let second = reloaded.write().unwrap();
    assert_eq!(first, second);
}

#[test]
fn model_triangles_survive_a_container_round_trip() {
    let brres = course_container();
    let reloaded = Brres::read(brres.write().unwrap()).unwrap();
    let model = reloaded.model("course").unwrap();
    assert_eq!(model.objects.len(), 1);
    assert_eq!(model.face_count(), 3);
    assert_eq!(model.objects[0].material, 0);

    let sort = |mut tris: Vec<Vec<Vec<u16>>>| {
        for t in &mut tris {
            t.sort();
        }
        tris.sort();
        tris
    };
    let original = decode_facepoints(&brres.models[0].objects[0]).unwrap();
    let read = decode_facepoints(&model.objects[0]).unwrap();
    assert_eq!(
        sort(original.triangles.iter().map(|t| t.to_vec()).collect()),
        sort(read.triangles.iter().map(|t| t.to_vec()).collect()),
    );
}

#[test]
fn positions_survive_quantization_in_the_container() {
    let brres = course_container();
    let reloaded = Brres::read(brres.write().unwrap()).unwrap();
    let model = reloaded.model("course").unwrap();
    let decoded = model.vertices[0].points.decode(3).unwrap();
    assert_eq!(decoded[4], vec![1.0, 2.0, 0.0]);
}

#[test]
fn srt0_with_shared_tracks_round_trips() {
    let mut brres = course_container();
    let mut srt0 = Srt0::new("course");
    srt0.framecount = 50;
    for material in ["road", "wall"] {
        let mut tex = SrtTexAnim::new(0, 50);
        tex.xtranslation.set_key_frame(0.0, 0.0);
        tex.xtranslation.set_key_frame(25.0, 1.0);
        tex.xtranslation.set_key_frame(49.0, 0.0);
        srt0.add_mat_anim(SrtMatAnim {
            name: material.to_string(),
            tex_anims: vec![tex],
        })
        .unwrap();
    }
    brres.attach_srt0(srt0).unwrap();

    let reloaded = Brres::read(brres.write().unwrap()).unwrap();
    assert_eq!(reloaded.srt0.len(), 1);
    let srt0 = &reloaded.srt0[0];
    assert_eq!(srt0.framecount, 50);
    assert_eq!(srt0.mat_anims.len(), 2);
    assert_eq!(
        srt0.mat_anims[0].tex_anims[0].xtranslation,
        srt0.mat_anims[1].tex_anims[0].xtranslation
    );
    assert_eq!(srt0.mat_anims[0].tex_anims[0].xtranslation.entries.len(), 3);
}

#[test]
fn mismatched_frame_count_cannot_attach() {
    let mut brres = course_container();
    let mut first = Srt0::new("course");
    first.framecount = 50;
    brres.attach_srt0(first).unwrap();
    let mut second = Srt0::new("course");
    second.framecount = 60;
    assert!(brres.attach_srt0(second).is_err());
}

#[test]
fn unused_textures_are_pruned_when_configured() {
    let mut brres = course_container();
    brres.add_texture(texture("leftover"));
    let mut config = Config::default();
    config.set("remove_unused_textures", "true").unwrap();
    let findings = brres.check(&config);
    assert!(findings.iter().any(|f| f.contains("leftover")));
    assert!(brres.has_texture("asphalt"));
    assert!(!brres.has_texture("leftover"));

    // the pruned container still packs and reloads
    let reloaded = Brres::read(brres.write().unwrap()).unwrap();
    assert_eq!(reloaded.textures.len(), 1);
}

#[test]
fn write_to_file_is_atomic_and_reloadable() {
    let dir = std::env::temp_dir().join("brres_container_test");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("course_model.brres");

    let brres = course_container();
    brres.write_to_file(&path).unwrap();
    assert!(path.exists());
    assert!(!dir.join("course_model.brres.tmp").exists());

    let reloaded = Brres::from_file(&path).unwrap();
    assert_eq!(reloaded.models.len(), 1);
    let _ = std::fs::remove_file(&path);
}
