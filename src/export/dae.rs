use anyhow::{Context, Result};
use glam::Mat4;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use strum::{Display, EnumString};
use xmltree::{Element, EmitterConfig, XMLNode};

use crate::collada::UpAxis;
use crate::error::DaeResult;
use crate::scene::{
    Camera, CameraKind, Channel, MaterialDescriptor, Mesh, ObjectData, Scene, ShadingModel,
};

const COLLADA_NAMESPACE: &str = "http://www.collada.org/2005/11/COLLADASchema";
const AUTHORING_TOOL: &str = concat!("dae_scene ", env!("CARGO_PKG_VERSION"));
/// Symbol every exported primitive uses for its material slot.
const MATERIAL_SYMBOL: &str = "material";

/// How texture images are written next to the document.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExportMode {
    /// Only the `.dae` is written and images keep their original paths.
    #[default]
    DaeOnly,
    /// Images are copied next to the `.dae` and referenced by file name.
    Bundle,
}

/// Configuration for DAE export
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub export_mode: ExportMode,
    pub up_axis: UpAxis,
}

/// Export a scene to a COLLADA (.dae) file with geometry, materials, cameras and transforms
pub fn export_scene_to_dae(scene: &Scene, output_path: &Path, config: &ExportConfig) -> Result<()> {
    let image_paths = match config.export_mode {
        ExportMode::DaeOnly => scene
            .images
            .iter()
            .map(|i| i.path.display().to_string())
            .collect(),
        ExportMode::Bundle => bundle_images(scene, output_path)?,
    };

    let collada = build_collada(scene, config, &image_paths);

    let mut file = std::fs::File::create(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    write_collada(&collada, &mut file)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;
    file.flush()?;

    log::info!(
        "Exported {} objects and {} meshes to {}",
        scene.objects.len(),
        scene.meshes.len(),
        output_path.display()
    );
    Ok(())
}

/// Serializes a COLLADA DOM with indentation.
pub fn write_collada<W: Write>(collada: &Element, writer: W) -> DaeResult<()> {
    collada.write_with_config(writer, EmitterConfig::new().perform_indent(true))?;
    Ok(())
}

/// Copies every image next to the output file and returns the names to reference them by.
///
/// Distinct images sharing a file name get a numeric suffix (`tex.png`, `tex-1.png`, ...).
fn bundle_images(scene: &Scene, output_path: &Path) -> Result<Vec<String>> {
    let directory = output_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    // Bundled file name to the image path it was copied from.
    let mut taken: HashMap<String, &Path> = HashMap::new();
    let mut names = Vec::with_capacity(scene.images.len());
    for image in &scene.images {
        let file_name = image
            .path
            .file_name()
            .with_context(|| format!("Image path {} has no file name", image.path.display()))?
            .to_string_lossy()
            .into_owned();

        let mut name = file_name.clone();
        let mut suffix = 0;
        while let Some(source) = taken.get(&name) {
            if *source == image.path.as_path() {
                break;
            }
            suffix += 1;
            name = suffixed_file_name(&file_name, suffix);
        }
        if taken.contains_key(&name) {
            names.push(name);
            continue;
        }

        let target = directory.join(&name);
        if target != image.path {
            std::fs::copy(&image.path, &target).with_context(|| {
                format!(
                    "Failed to copy {} to {}",
                    image.path.display(),
                    target.display()
                )
            })?;
        }
        log::debug!("Bundled {} as {}", image.path.display(), name);
        taken.insert(name.clone(), &image.path);
        names.push(name);
    }
    Ok(names)
}

fn suffixed_file_name(file_name: &str, suffix: usize) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => format!("{stem}-{suffix}.{extension}"),
        _ => format!("{file_name}-{suffix}"),
    }
}

/// Builds the COLLADA DOM for a scene. `image_paths` gives the `<init_from>` of each image.
pub fn build_collada(scene: &Scene, config: &ExportConfig, image_paths: &[String]) -> Element {
    let mut collada = Element::new("COLLADA");
    collada
        .attributes
        .insert("xmlns".to_string(), COLLADA_NAMESPACE.to_string());
    collada
        .attributes
        .insert("version".to_string(), "1.4.1".to_string());

    collada.children.push(XMLNode::Element(build_asset(scene, config)));

    let mut library_images = Element::new("library_images");
    for (index, path) in image_paths.iter().enumerate() {
        let mut image = element("image", &[("id", image_id(index))]);
        if let Some(entry) = scene.images.get(index) {
            image
                .attributes
                .insert("name".to_string(), entry.name.clone());
        }
        image.children.push(text_element("init_from", path.clone()));
        library_images.children.push(XMLNode::Element(image));
    }
    collada.children.push(XMLNode::Element(library_images));

    let mut library_effects = Element::new("library_effects");
    let mut library_materials = Element::new("library_materials");
    for (index, material) in scene.materials.iter().enumerate() {
        library_effects
            .children
            .push(XMLNode::Element(build_effect(index, material)));

        let mut element = element(
            "material",
            &[("id", material_id(index)), ("name", material.name.clone())],
        );
        element.children.push(XMLNode::Element(self::element(
            "instance_effect",
            &[("url", format!("#{}", effect_id(index)))],
        )));
        library_materials.children.push(XMLNode::Element(element));
    }
    collada.children.push(XMLNode::Element(library_effects));
    collada.children.push(XMLNode::Element(library_materials));

    // Only meshes some object still instances are written.
    let mut library_geometries = Element::new("library_geometries");
    let mut written = HashSet::new();
    for object in &scene.objects {
        if let ObjectData::Mesh { mesh, .. } = object.data {
            if written.insert(mesh) {
                if let Some(data) = scene.meshes.get(mesh) {
                    library_geometries
                        .children
                        .push(XMLNode::Element(build_geometry(mesh, data)));
                }
            }
        }
    }
    collada.children.push(XMLNode::Element(library_geometries));

    let mut library_cameras = Element::new("library_cameras");
    for (index, camera) in scene.cameras.iter().enumerate() {
        library_cameras
            .children
            .push(XMLNode::Element(build_camera(index, camera)));
    }
    collada.children.push(XMLNode::Element(library_cameras));

    let mut library_visual_scenes = Element::new("library_visual_scenes");
    let mut visual_scene = element(
        "visual_scene",
        &[("id", "Scene".to_string()), ("name", "Scene".to_string())],
    );
    for root in scene.roots() {
        visual_scene
            .children
            .push(XMLNode::Element(build_node(scene, root)));
    }
    library_visual_scenes
        .children
        .push(XMLNode::Element(visual_scene));
    collada
        .children
        .push(XMLNode::Element(library_visual_scenes));

    let mut scene_element = Element::new("scene");
    scene_element.children.push(XMLNode::Element(element(
        "instance_visual_scene",
        &[("url", "#Scene".to_string())],
    )));
    collada.children.push(XMLNode::Element(scene_element));

    collada
}

fn build_asset(scene: &Scene, config: &ExportConfig) -> Element {
    let mut asset = Element::new("asset");

    let mut contributor = Element::new("contributor");
    contributor
        .children
        .push(text_element("authoring_tool", AUTHORING_TOOL.to_string()));
    asset.children.push(XMLNode::Element(contributor));

    let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    asset.children.push(text_element("created", now.clone()));
    asset.children.push(text_element("modified", now));
    asset.children.push(XMLNode::Element(element(
        "unit",
        &[
            ("meter", format_float(scene.unit_meter.unwrap_or(1.0))),
            ("name", unit_name(scene.unit_meter).to_string()),
        ],
    )));
    asset
        .children
        .push(text_element("up_axis", config.up_axis.as_str().to_string()));
    asset
}

fn unit_name(meter: Option<f32>) -> &'static str {
    match meter {
        None => "meter",
        Some(m) if (m - 1.0).abs() < 1e-6 => "meter",
        Some(m) if (m - 0.01).abs() < 1e-8 => "centimeter",
        Some(m) if (m - 0.001).abs() < 1e-9 => "millimeter",
        Some(m) if (m - 0.0254).abs() < 1e-8 => "inch",
        Some(_) => "unit",
    }
}

fn build_geometry(index: usize, mesh: &Mesh) -> Element {
    let geom_id = geometry_id(index);
    let mut geometry = element(
        "geometry",
        &[("id", geom_id.clone()), ("name", mesh.name.clone())],
    );
    let mut element_mesh = Element::new("mesh");

    let pos_source_id = format!("{}-positions", geom_id);
    element_mesh.children.push(XMLNode::Element(build_source_float_array(
        &pos_source_id,
        &flatten(&mesh.positions),
        3,
    )));

    let normal_source_id = format!("{}-normals", geom_id);
    if let Some(normals) = &mesh.normals {
        element_mesh.children.push(XMLNode::Element(build_source_float_array(
            &normal_source_id,
            &flatten(normals),
            3,
        )));
    }

    let uv_source_ids: Vec<String> = (0..mesh.uv_layers.len())
        .map(|i| format!("{}-texcoord{}", geom_id, i))
        .collect();
    for (layer, id) in mesh.uv_layers.iter().zip(&uv_source_ids) {
        element_mesh.children.push(XMLNode::Element(build_source_float_array(
            id,
            &flatten(&layer.uvs),
            2,
        )));
    }

    let vertices_id = format!("{}-vertices", geom_id);
    let mut vertices = element("vertices", &[("id", vertices_id.clone())]);
    vertices.children.push(XMLNode::Element(element(
        "input",
        &[
            ("semantic", "POSITION".to_string()),
            ("source", format!("#{}", pos_source_id)),
        ],
    )));
    element_mesh.children.push(XMLNode::Element(vertices));

    // Vertices are already shared, so every input reads the same index at offset 0.
    let mut triangles = element(
        "triangles",
        &[
            ("count", mesh.faces.len().to_string()),
            ("material", MATERIAL_SYMBOL.to_string()),
        ],
    );
    triangles.children.push(XMLNode::Element(input(
        "VERTEX",
        &vertices_id,
        None,
    )));
    if mesh.normals.is_some() {
        triangles.children.push(XMLNode::Element(input(
            "NORMAL",
            &normal_source_id,
            None,
        )));
    }
    for (set, id) in uv_source_ids.iter().enumerate() {
        triangles
            .children
            .push(XMLNode::Element(input("TEXCOORD", id, Some(set))));
    }
    let indices: Vec<String> = mesh
        .faces
        .iter()
        .flatten()
        .map(|i| i.to_string())
        .collect();
    triangles.children.push(text_element("p", indices.join(" ")));
    element_mesh.children.push(XMLNode::Element(triangles));

    geometry.children.push(XMLNode::Element(element_mesh));
    geometry
}

fn input(semantic: &str, source: &str, set: Option<usize>) -> Element {
    let mut input = element(
        "input",
        &[
            ("semantic", semantic.to_string()),
            ("source", format!("#{}", source)),
            ("offset", "0".to_string()),
        ],
    );
    if let Some(set) = set {
        input.attributes.insert("set".to_string(), set.to_string());
    }
    input
}

fn build_effect(index: usize, material: &MaterialDescriptor) -> Element {
    let mut effect = element(
        "effect",
        &[("id", effect_id(index)), ("name", material.name.clone())],
    );
    let mut profile = Element::new("profile_COMMON");

    // Each distinct texture gets a surface and a sampler param.
    let mut textures: Vec<usize> = Vec::new();
    for channel in material_channels(material) {
        if let Channel::Texture(slot) = channel {
            if !textures.contains(&slot.image) {
                textures.push(slot.image);
            }
        }
    }
    for &image in &textures {
        let surface_sid = format!("{}-surface", image_id(image));
        let mut surface_param = element("newparam", &[("sid", surface_sid.clone())]);
        let mut surface = element("surface", &[("type", "2D".to_string())]);
        surface.children.push(text_element("init_from", image_id(image)));
        surface_param.children.push(XMLNode::Element(surface));
        profile.children.push(XMLNode::Element(surface_param));

        let mut sampler_param = element("newparam", &[("sid", sampler_sid(image))]);
        let mut sampler = Element::new("sampler2D");
        sampler.children.push(text_element("source", surface_sid));
        sampler_param.children.push(XMLNode::Element(sampler));
        profile.children.push(XMLNode::Element(sampler_param));
    }

    let mut technique = element("technique", &[("sid", "common".to_string())]);
    let mut shader = Element::new(&material.shading.to_string());

    if let Some(emit) = material.emit {
        shader.children.push(XMLNode::Element(color_element(
            "emission",
            [emit, emit, emit],
        )));
    }
    if material.shading != ShadingModel::Constant {
        shader
            .children
            .push(XMLNode::Element(channel_element("diffuse", &material.diffuse)));
    }
    if let Some(specular) = &material.specular {
        shader
            .children
            .push(XMLNode::Element(channel_element("specular", &specular.channel)));
        shader
            .children
            .push(XMLNode::Element(float_element("shininess", specular.hardness)));
    }
    if let Some(mirror) = &material.mirror {
        if let Some(channel) = &mirror.channel {
            shader
                .children
                .push(XMLNode::Element(channel_element("reflective", channel)));
        }
        shader.children.push(XMLNode::Element(float_element(
            "reflectivity",
            mirror.reflect_factor,
        )));
    }
    if material.alpha_blend && material.alpha > 0.0 && material.alpha < 1.0 {
        shader.children.push(XMLNode::Element(float_element(
            "transparency",
            material.alpha,
        )));
    }
    if let Some(ior) = material.ior {
        shader
            .children
            .push(XMLNode::Element(float_element("index_of_refraction", ior)));
    }

    technique.children.push(XMLNode::Element(shader));
    profile.children.push(XMLNode::Element(technique));
    effect.children.push(XMLNode::Element(profile));
    effect
}

fn material_channels(material: &MaterialDescriptor) -> impl Iterator<Item = &Channel> {
    std::iter::once(&material.diffuse)
        .chain(material.specular.as_ref().map(|s| &s.channel))
        .chain(material.mirror.as_ref().and_then(|m| m.channel.as_ref()))
}

fn channel_element(name: &str, channel: &Channel) -> Element {
    match channel {
        Channel::Color(rgb) => color_element(name, *rgb),
        Channel::Texture(slot) => {
            let mut element = Element::new(name);
            element.children.push(XMLNode::Element(self::element(
                "texture",
                &[
                    ("texture", sampler_sid(slot.image)),
                    (
                        "texcoord",
                        slot.uv_layer.clone().unwrap_or_else(|| "UVSET0".to_string()),
                    ),
                ],
            )));
            element
        }
    }
}

fn color_element(name: &str, [r, g, b]: [f32; 3]) -> Element {
    let mut element = Element::new(name);
    element.children.push(text_element(
        "color",
        [r, g, b, 1.0].map(format_float).join(" "),
    ));
    element
}

fn float_element(name: &str, value: f32) -> Element {
    let mut element = Element::new(name);
    element
        .children
        .push(text_element("float", format_float(value)));
    element
}

fn build_camera(index: usize, camera: &Camera) -> Element {
    let mut element = element(
        "camera",
        &[("id", camera_id(index)), ("name", camera.name.clone())],
    );
    let mut optics = Element::new("optics");
    let mut technique = Element::new("technique_common");
    let mut projection = match camera.kind {
        CameraKind::Perspective => {
            let mut perspective = Element::new("perspective");
            perspective.children.push(text_element(
                "yfov",
                format_float(camera.fov.to_degrees()),
            ));
            perspective
        }
        CameraKind::Orthographic => {
            let mut orthographic = Element::new("orthographic");
            orthographic
                .children
                .push(text_element("xmag", format_float(camera.ortho_scale)));
            orthographic
        }
    };
    projection
        .children
        .push(text_element("znear", format_float(camera.clip_start)));
    projection
        .children
        .push(text_element("zfar", format_float(camera.clip_end)));
    technique.children.push(XMLNode::Element(projection));
    optics.children.push(XMLNode::Element(technique));
    element.children.push(XMLNode::Element(optics));
    element
}

/// Root nodes carry their world transform, children the transform relative to their parent.
fn build_node(scene: &Scene, index: usize) -> Element {
    let object = &scene.objects[index];
    let mut node = element(
        "node",
        &[
            ("id", format!("node-{}-{}", index, sanitize_id(&object.name))),
            ("name", object.name.clone()),
        ],
    );
    node.children.push(text_element(
        "matrix",
        matrix_to_string(&object.local_transform),
    ));

    match object.data {
        ObjectData::Empty => (),
        ObjectData::Mesh { mesh, material } => {
            let mut instance = element(
                "instance_geometry",
                &[("url", format!("#{}", geometry_id(mesh)))],
            );
            if let Some(material) = material {
                let mut bind_material = Element::new("bind_material");
                let mut technique = Element::new("technique_common");
                technique.children.push(XMLNode::Element(element(
                    "instance_material",
                    &[
                        ("symbol", MATERIAL_SYMBOL.to_string()),
                        ("target", format!("#{}", material_id(material))),
                    ],
                )));
                bind_material.children.push(XMLNode::Element(technique));
                instance.children.push(XMLNode::Element(bind_material));
            }
            node.children.push(XMLNode::Element(instance));
        }
        ObjectData::Camera(camera) => {
            node.children.push(XMLNode::Element(element(
                "instance_camera",
                &[("url", format!("#{}", camera_id(camera)))],
            )));
        }
    }

    for child in scene.children(index) {
        node.children
            .push(XMLNode::Element(build_node(scene, child)));
    }
    node
}

fn element(name: &str, attributes: &[(&str, String)]) -> Element {
    let mut element = Element::new(name);
    for (key, value) in attributes {
        element.attributes.insert(key.to_string(), value.clone());
    }
    element
}

fn text_element(name: &str, text: String) -> XMLNode {
    let mut element = Element::new(name);
    element.children.push(XMLNode::Text(text));
    XMLNode::Element(element)
}

fn build_source_float_array(id: &str, flat_data: &[f32], stride: usize) -> Element {
    let mut source = element("source", &[("id", id.to_string())]);

    let mut float_array = element(
        "float_array",
        &[
            ("id", format!("{}-array", id)),
            ("count", flat_data.len().to_string()),
        ],
    );
    float_array.children.push(XMLNode::Text(
        flat_data
            .iter()
            .map(|v| format_float(*v))
            .collect::<Vec<_>>()
            .join(" "),
    ));
    source.children.push(XMLNode::Element(float_array));

    let mut tech = Element::new("technique_common");
    let mut accessor = element(
        "accessor",
        &[
            ("source", format!("#{}-array", id)),
            ("count", (flat_data.len() / stride).to_string()),
            ("stride", stride.to_string()),
        ],
    );
    let names: &[&str] = match stride {
        2 => &["S", "T"],
        3 => &["X", "Y", "Z"],
        _ => &[],
    };
    for name in names {
        accessor.children.push(XMLNode::Element(element(
            "param",
            &[("name", name.to_string()), ("type", "float".to_string())],
        )));
    }

    tech.children.push(XMLNode::Element(accessor));
    source.children.push(XMLNode::Element(tech));
    source
}

fn flatten<const N: usize>(data: &[[f32; N]]) -> Vec<f32> {
    data.iter().flatten().copied().collect()
}

fn geometry_id(mesh: usize) -> String {
    format!("geometry-{}", mesh)
}

fn material_id(material: usize) -> String {
    format!("material-{}", material)
}

fn effect_id(material: usize) -> String {
    format!("material-{}-effect", material)
}

fn image_id(image: usize) -> String {
    format!("image-{}", image)
}

fn sampler_sid(image: usize) -> String {
    format!("{}-sampler", image_id(image))
}

fn camera_id(camera: usize) -> String {
    format!("camera-{}", camera)
}

/// COLLADA matrices are written row by row.
fn matrix_to_string(m: &Mat4) -> String {
    m.transpose()
        .to_cols_array()
        .iter()
        .map(|v| format_float(*v))
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_float(v: f32) -> String {
    if v == 0.0 {
        "0".to_string()
    } else {
        format!("{:.6}", v)
    }
}

fn sanitize_id(s: &str) -> String {
    let out: String = s
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || ch == '_' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if out.is_empty() {
        "id".to_string()
    } else {
        out
    }
}
