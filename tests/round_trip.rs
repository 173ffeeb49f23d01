use std::path::Path;

use approx::assert_relative_eq;
use dae_scene::convert::{import_dae_file_with_loader, import_dae_reader, LoadedImage, MemoryImageLoader};
use dae_scene::scene::{CameraKind, Channel, Mesh, ObjectData, Scene, ShadingModel};
use dae_scene::{export_scene_to_dae, import_dae_file, ExportConfig, ExportMode, ImportConfig};
use glam::{Mat4, Vec3};

const SOURCE: &str = r##"<?xml version="1.0" encoding="utf-8"?>
<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">
  <asset><up_axis>Z_UP</up_axis></asset>
  <library_images>
    <image id="leaf-png"><init_from>textures/leaf.png</init_from></image>
  </library_images>
  <library_effects>
    <effect id="shiny-fx"><profile_COMMON><technique sid="common">
      <phong>
        <diffuse><color>0.2 0.4 0.6 1</color></diffuse>
        <specular><color>0.5 0.5 0.5 1</color></specular>
        <shininess><float>40</float></shininess>
      </phong>
    </technique></profile_COMMON></effect>
    <effect id="leaf-fx"><profile_COMMON>
      <newparam sid="leaf-surface"><surface type="2D"><init_from>leaf-png</init_from></surface></newparam>
      <newparam sid="leaf-sampler"><sampler2D><source>leaf-surface</source></sampler2D></newparam>
      <technique sid="common">
        <lambert><diffuse><texture texture="leaf-sampler" texcoord="UVSET0"/></diffuse></lambert>
      </technique>
    </profile_COMMON></effect>
  </library_effects>
  <library_materials>
    <material id="shiny" name="Shiny"><instance_effect url="#shiny-fx"/></material>
    <material id="leaf" name="Leaf"><instance_effect url="#leaf-fx"/></material>
  </library_materials>
  <library_geometries>
    <geometry id="quad" name="Quad">
      <mesh>
        <source id="quad-pos">
          <float_array id="quad-pos-array" count="12">0 0 0 1 0 0 1 1 0 0 1 0</float_array>
          <technique_common><accessor source="#quad-pos-array" count="4" stride="3"/></technique_common>
        </source>
        <source id="quad-nrm">
          <float_array id="quad-nrm-array" count="3">0 0 1</float_array>
          <technique_common><accessor source="#quad-nrm-array" count="1" stride="3"/></technique_common>
        </source>
        <source id="quad-uv">
          <float_array id="quad-uv-array" count="8">0 0 1 0 1 1 0 1</float_array>
          <technique_common><accessor source="#quad-uv-array" count="4" stride="2"/></technique_common>
        </source>
        <vertices id="quad-vtx"><input semantic="POSITION" source="#quad-pos"/></vertices>
        <triangles count="2" material="surface">
          <input semantic="VERTEX" source="#quad-vtx" offset="0"/>
          <input semantic="NORMAL" source="#quad-nrm" offset="1"/>
          <input semantic="TEXCOORD" source="#quad-uv" offset="2" set="0"/>
          <p>0 0 0 1 0 1 2 0 2 0 0 0 2 0 2 3 0 3</p>
        </triangles>
      </mesh>
    </geometry>
  </library_geometries>
  <library_cameras>
    <camera id="cam" name="Main"><optics><technique_common>
      <perspective><yfov>50</yfov><znear>0.25</znear><zfar>400</zfar></perspective>
    </technique_common></optics></camera>
  </library_cameras>
  <library_visual_scenes>
    <visual_scene id="scene">
      <node id="root" name="Root">
        <translate>0 0 3</translate>
        <node id="left" name="Left">
          <translate>-2 0 0</translate>
          <instance_geometry url="#quad">
            <bind_material><technique_common>
              <instance_material symbol="surface" target="#shiny"/>
            </technique_common></bind_material>
          </instance_geometry>
        </node>
        <node id="right" name="Right">
          <rotate>0 0 1 90</rotate>
          <instance_geometry url="#quad">
            <bind_material><technique_common>
              <instance_material symbol="surface" target="#leaf"/>
            </technique_common></bind_material>
          </instance_geometry>
        </node>
      </node>
      <node id="camera" name="CameraRig">
        <translate>0 -5 1</translate>
        <instance_camera url="#cam"/>
      </node>
    </visual_scene>
  </library_visual_scenes>
  <scene><instance_visual_scene url="#scene"/></scene>
</COLLADA>"##;

const LEAF: LoadedImage = LoadedImage {
    width: 16,
    height: 16,
    has_alpha: true,
};

fn leaf_loader() -> MemoryImageLoader {
    MemoryImageLoader::new().with_image("/models/textures/leaf.png", LEAF)
}

fn import_source() -> Scene {
    import_dae_reader(
        SOURCE.as_bytes(),
        Some(Path::new("/models")),
        &ImportConfig::default(),
        leaf_loader(),
    )
    .unwrap()
}

fn mesh_bindings(scene: &Scene) -> Vec<(Mat4, &Mesh, Option<usize>)> {
    scene
        .mesh_objects()
        .map(|o| match o.data {
            ObjectData::Mesh { mesh, material } => (o.world_transform, &scene.meshes[mesh], material),
            _ => unreachable!(),
        })
        .collect()
}

fn assert_same_geometry(expected: &Mesh, actual: &Mesh) {
    assert_eq!(expected.vertex_count(), actual.vertex_count());
    assert_eq!(expected.face_count(), actual.face_count());
    assert_eq!(expected.smooth, actual.smooth);
    for (a, b) in expected.positions.iter().zip(&actual.positions) {
        assert!(Vec3::from(*a).abs_diff_eq(Vec3::from(*b), 1e-5));
    }
    // Faces keep their winding and refer to the same corner positions.
    for (fa, fb) in expected.faces.iter().zip(&actual.faces) {
        for (ia, ib) in fa.iter().zip(fb) {
            let pa = expected.positions[*ia as usize];
            let pb = actual.positions[*ib as usize];
            assert!(Vec3::from(pa).abs_diff_eq(Vec3::from(pb), 1e-5));
        }
    }
    assert_eq!(expected.uv_layers.len(), actual.uv_layers.len());
}

#[test]
fn source_document_imports() {
    let scene = import_source();

    assert_eq!(1, scene.meshes.len());
    let quad = &scene.meshes[0];
    assert_eq!(4, quad.vertex_count());
    assert_eq!(vec![false, false], quad.smooth);
    assert_eq!("UVSET0", quad.uv_layers[0].name);

    let bindings = mesh_bindings(&scene);
    assert_eq!(2, bindings.len());
    assert!(bindings[0]
        .0
        .abs_diff_eq(Mat4::from_translation(Vec3::new(-2.0, 0.0, 3.0)), 1e-6));
    assert_eq!(Some(0), bindings[0].2);
    assert_eq!(Some(1), bindings[1].2);

    assert_eq!(ShadingModel::Phong, scene.materials[0].shading);
    assert_relative_eq!(40.0, scene.materials[0].specular.as_ref().unwrap().hardness);
    assert!(matches!(scene.materials[1].diffuse, Channel::Texture(_)));
    assert_eq!(1, scene.images.len());
}

#[test]
fn export_then_import_preserves_scene() {
    let original = import_source();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scene.dae");
    let config = ExportConfig {
        export_mode: ExportMode::DaeOnly,
        up_axis: original.up_axis,
    };
    export_scene_to_dae(&original, &path, &config).unwrap();

    let mut loader = leaf_loader();
    let reimported = import_dae_file_with_loader(&path, &ImportConfig::default(), &mut loader).unwrap();
    assert_eq!(1, loader.loads());

    assert_eq!(original.up_axis, reimported.up_axis);
    assert_eq!(original.meshes.len(), reimported.meshes.len());
    assert_same_geometry(&original.meshes[0], &reimported.meshes[0]);

    let before = mesh_bindings(&original);
    let after = mesh_bindings(&reimported);
    assert_eq!(before.len(), after.len());
    for ((world_a, _, material_a), (world_b, _, material_b)) in before.iter().zip(&after) {
        assert!(world_a.abs_diff_eq(*world_b, 1e-5));
        assert_eq!(material_a.is_some(), material_b.is_some());
    }

    assert_eq!(original.materials.len(), reimported.materials.len());
    for (a, b) in original.materials.iter().zip(&reimported.materials) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.shading, b.shading);
        assert_eq!(a.specular.is_some(), b.specular.is_some());
        assert_eq!(
            matches!(a.diffuse, Channel::Texture(_)),
            matches!(b.diffuse, Channel::Texture(_))
        );
    }
    if let (Channel::Color(a), Channel::Color(b)) =
        (&original.materials[0].diffuse, &reimported.materials[0].diffuse)
    {
        assert!(Vec3::from(*a).abs_diff_eq(Vec3::from(*b), 1e-5));
    } else {
        panic!("diffuse colour lost");
    }

    assert_eq!(1, reimported.cameras.len());
    let (a, b) = (&original.cameras[0], &reimported.cameras[0]);
    assert_eq!(a.name, b.name);
    assert_eq!(CameraKind::Perspective, b.kind);
    assert_relative_eq!(a.fov, b.fov, epsilon = 1e-5);
    assert_relative_eq!(a.clip_start, b.clip_start, epsilon = 1e-5);
    assert_relative_eq!(a.clip_end, b.clip_end, epsilon = 1e-5);

    let camera_world = |scene: &Scene| {
        scene
            .objects
            .iter()
            .find(|o| matches!(o.data, ObjectData::Camera(_)))
            .map(|o| o.world_transform)
            .unwrap()
    };
    assert!(camera_world(&original).abs_diff_eq(camera_world(&reimported), 1e-5));
}

#[test]
fn bundle_copies_images_next_to_output() {
    let source_dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(source_dir.path().join("textures")).unwrap();
    image::RgbaImage::from_pixel(4, 2, image::Rgba([10, 200, 30, 128]))
        .save(source_dir.path().join("textures").join("leaf.png"))
        .unwrap();
    let source = source_dir.path().join("scene.dae");
    std::fs::write(&source, SOURCE).unwrap();

    let scene = import_dae_file(&source, &ImportConfig::default()).unwrap();
    assert_eq!(1, scene.images.len());
    assert_eq!((4, 2), (scene.images[0].width, scene.images[0].height));
    assert!(scene.images[0].has_alpha);

    let output_dir = tempfile::tempdir().unwrap();
    let output = output_dir.path().join("bundle.dae");
    let config = ExportConfig {
        export_mode: ExportMode::Bundle,
        up_axis: scene.up_axis,
    };
    export_scene_to_dae(&scene, &output, &config).unwrap();
    assert!(output_dir.path().join("leaf.png").is_file());

    let written = std::fs::read_to_string(&output).unwrap();
    assert!(written.contains("<init_from>leaf.png</init_from>"));

    let reimported = import_dae_file(&output, &ImportConfig::default()).unwrap();
    assert_eq!(1, reimported.images.len());
    assert_eq!(output_dir.path().join("leaf.png"), reimported.images[0].path);
    assert!(reimported.images[0].has_alpha);
}

#[test]
fn export_fails_for_unwritable_path() {
    let scene = import_source();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("scene.dae");
    assert!(export_scene_to_dae(&scene, &path, &ExportConfig::default()).is_err());
}
