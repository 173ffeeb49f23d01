//! Depth-first walk over the instantiated visual scene.
//!
//! Every node becomes an empty object carrying the node's world transform. Geometry
//! instances add one mesh object per primitive below it and camera instances add one
//! camera object. Meshes, materials, images and cameras are built once per run and
//! shared by every object instancing them.
use std::collections::HashMap;

use glam::Mat4;
use indexmap::IndexMap;

use crate::collada::geometry::{Geometry, TriangleSet};
use crate::collada::scene::{self as dae_scene, InstanceGeometry, Node, Projection};
use crate::collada::Document;
use crate::convert::dae::ImportConfig;
use crate::convert::dialect::{Dialect, DialectRegistry};
use crate::convert::face::classify_faces;
use crate::convert::image::ImageLoader;
use crate::convert::index_merge::merge_streams;
use crate::convert::material::MaterialResolver;
use crate::convert::naming::mesh_identity;
use crate::error::{DaeError, DaeResult};
use crate::scene::{Camera, CameraKind, Mesh, ObjectData, Scene, SceneObject, UvLayer};

/// Converts one parsed document into a [Scene]. All caches live in the importer, so
/// independent documents can be imported concurrently with separate importers.
pub struct Importer<'d, L> {
    document: &'d Document,
    materials: MaterialResolver<'d, L>,
    /// Mesh identity to mesh index. Skipped primitives are cached as `None`.
    meshes: IndexMap<String, Option<usize>>,
    cameras: HashMap<String, usize>,
    scene: Scene,
}

impl<'d, L: ImageLoader> Importer<'d, L> {
    pub fn new(document: &'d Document, config: &ImportConfig, loader: L) -> Self {
        Self::with_registry(document, config, loader, &DialectRegistry::builtin())
    }

    /// Uses `registry` instead of the built-in dialect profiles.
    pub fn with_registry(
        document: &'d Document,
        config: &ImportConfig,
        loader: L,
        registry: &DialectRegistry,
    ) -> Self {
        let dialect = registry.detect(document);
        let scene = Scene {
            up_axis: document.asset.up_axis,
            unit_meter: document.asset.unit_meter,
            dialect: dialect.profile.clone(),
            ..Default::default()
        };
        Self {
            document,
            materials: MaterialResolver::new(document, dialect, config.clone(), loader),
            meshes: IndexMap::new(),
            cameras: HashMap::new(),
            scene,
        }
    }

    pub fn dialect(&self) -> &Dialect {
        self.materials.dialect()
    }

    pub fn loader(&self) -> &L {
        self.materials.loader()
    }

    /// Walks the instantiated visual scene and returns everything that could be resolved.
    pub fn import(mut self) -> Scene {
        let document = self.document;
        match document.scene() {
            Some(visual_scene) => {
                for node in &visual_scene.nodes {
                    self.walk(node, None, Mat4::IDENTITY);
                }
            }
            None => log::warn!("Document has no visual scene, nothing to import"),
        }

        let (materials, images) = self.materials.into_parts();
        self.scene.materials = materials;
        self.scene.images = images;
        log::info!(
            "Imported {} objects, {} meshes, {} materials, {} images and {} cameras",
            self.scene.objects.len(),
            self.scene.meshes.len(),
            self.scene.materials.len(),
            self.scene.images.len(),
            self.scene.cameras.len()
        );
        self.scene
    }

    fn walk(&mut self, node: &'d Node, parent: Option<usize>, parent_world: Mat4) {
        let world = parent_world * node.local;
        let name = node
            .name
            .as_deref()
            .or(node.id.as_deref())
            .unwrap_or("node");
        let index = self.push_object(name.to_string(), parent, world, node.local, ObjectData::Empty);

        for instance in &node.geometries {
            self.instance_geometry(instance, index, world);
        }
        for camera in &node.cameras {
            self.instance_camera(camera, index, world);
        }
        for child in &node.children {
            self.walk(child, Some(index), world);
        }
    }

    fn push_object(
        &mut self,
        name: String,
        parent: Option<usize>,
        world_transform: Mat4,
        local_transform: Mat4,
        data: ObjectData,
    ) -> usize {
        self.scene.objects.push(SceneObject {
            name,
            parent,
            world_transform,
            local_transform,
            data,
        });
        self.scene.objects.len() - 1
    }

    fn instance_geometry(&mut self, instance: &'d InstanceGeometry, parent: usize, world: Mat4) {
        let document = self.document;
        let Some(geometry) = document.geometries.get(&instance.geometry) else {
            log::warn!("Skipping instance of unknown geometry {}", instance.geometry);
            return;
        };

        let base_name = geometry.name.as_deref().unwrap_or(&geometry.id);
        let many = geometry.primitives.len() > 1;
        for (i, primitive) in geometry.primitives.iter().enumerate() {
            let Some(mesh) = self.mesh(geometry, i, primitive) else {
                continue;
            };

            // Bindings are per instance, so this runs on cached meshes too.
            let material = primitive
                .material
                .as_deref()
                .and_then(|symbol| self.bound_material(instance, symbol));

            let name = if many {
                format!("{base_name}.{i}")
            } else {
                base_name.to_string()
            };
            self.push_object(
                name,
                Some(parent),
                world,
                Mat4::IDENTITY,
                ObjectData::Mesh { mesh, material },
            );
        }
    }

    fn bound_material(&mut self, instance: &InstanceGeometry, symbol: &str) -> Option<usize> {
        let document = self.document;
        let target = match instance.material_for(symbol) {
            Some(target) => target,
            // Some exporters use the material id as the symbol and skip the binding.
            None if document.materials.contains_key(symbol) => {
                log::debug!("Material symbol {} is unbound, using it as a material id", symbol);
                symbol
            }
            None => {
                log::warn!(
                    "Material symbol {} is not bound on geometry {}",
                    symbol,
                    instance.geometry
                );
                return None;
            }
        };
        self.materials.resolve(target)
    }

    fn mesh(&mut self, geometry: &Geometry, index: usize, triangles: &TriangleSet) -> Option<usize> {
        let identity = mesh_identity(&geometry.id, index);
        if let Some(cached) = self.meshes.get(&identity) {
            return *cached;
        }

        let built = match build_mesh(&identity, triangles) {
            Ok(mesh) => {
                log::debug!(
                    "Built mesh {} from {} primitive {}: {} vertices, {} faces",
                    mesh.name,
                    geometry.id,
                    index,
                    mesh.vertex_count(),
                    mesh.face_count()
                );
                self.scene.meshes.push(mesh);
                Some(self.scene.meshes.len() - 1)
            }
            Err(e) => {
                log::warn!("Skipping primitive {} of geometry {}: {}", index, geometry.id, e);
                None
            }
        };
        self.meshes.insert(identity, built);
        built
    }

    fn instance_camera(&mut self, camera_id: &str, parent: usize, world: Mat4) {
        let document = self.document;
        let Some(camera) = document.cameras.get(camera_id) else {
            log::warn!("Skipping instance of unknown camera {}", camera_id);
            return;
        };
        let index = match self.cameras.get(camera_id).copied() {
            Some(index) => index,
            None => {
                self.scene.cameras.push(convert_camera(camera));
                let index = self.scene.cameras.len() - 1;
                self.cameras.insert(camera_id.to_string(), index);
                index
            }
        };
        let name = camera.name.clone().unwrap_or_else(|| camera.id.clone());
        self.push_object(name, Some(parent), world, Mat4::IDENTITY, ObjectData::Camera(index));
    }
}

/// Builds a shared-vertex mesh from one triangulated primitive.
///
/// Positions are required. Normal and texture coordinate streams that point outside
/// their data are dropped with a warning rather than failing the primitive.
pub fn build_mesh(name: &str, triangles: &TriangleSet) -> DaeResult<Mesh> {
    let positions = triangles
        .positions
        .as_ref()
        .ok_or_else(|| DaeError::missing("triangles", "VERTEX"))?;
    if triangles.face_count() == 0 {
        return Err(DaeError::DegeneratePrimitive(format!("{name} has no faces")));
    }
    positions.validate("position")?;
    let corners = positions.index.len();

    let normals = triangles.normals.as_ref().filter(|n| {
        let usable = n.index.len() == corners && n.validate("normal").is_ok();
        if !usable {
            log::warn!("Ignoring unusable normals of {}", name);
        }
        usable
    });
    let texcoords: Vec<_> = triangles
        .texcoords
        .iter()
        .filter(|t| {
            let usable = t.stream.index.len() == corners && t.stream.validate("texcoord").is_ok();
            if !usable {
                log::warn!("Ignoring unusable texcoord set {} of {}", t.set, name);
            }
            usable
        })
        .collect();

    let mut streams: Vec<&[u32]> = vec![positions.index.as_slice()];
    if let Some(normals) = normals {
        streams.push(normals.index.as_slice());
    }
    let uv_offset = streams.len();
    streams.extend(texcoords.iter().map(|t| t.stream.index.as_slice()));

    let merged = merge_streams(&streams);
    let broken = || DaeError::BrokenReference(format!("{name} vertex data"));

    let merged_positions = merged.compact(0, &positions.data).ok_or_else(broken)?;
    let merged_normals = match normals {
        Some(n) => Some(merged.compact(1, &n.data).ok_or_else(broken)?),
        None => None,
    };
    let uv_layers = texcoords
        .iter()
        .enumerate()
        .map(|(i, t)| {
            merged
                .compact(uv_offset + i, &t.stream.data)
                .map(|uvs| UvLayer {
                    name: format!("UVSET{}", t.set),
                    uvs,
                })
                .ok_or_else(broken)
        })
        .collect::<DaeResult<Vec<_>>>()?;

    let faces = merged.faces();
    // Without normals the host derives face normals, so faces stay flat.
    let smooth = match normals {
        Some(n) => classify_faces(&n.data, &n.index),
        None => vec![false; faces.len()],
    };

    Ok(Mesh {
        name: name.to_string(),
        positions: merged_positions,
        normals: merged_normals,
        uv_layers,
        faces,
        smooth,
    })
}

/// Reads the camera intrinsics the document specifies, leaving the rest at their defaults.
pub fn convert_camera(camera: &dae_scene::Camera) -> Camera {
    let mut result = Camera {
        name: camera.name.clone().unwrap_or_else(|| camera.id.clone()),
        ..Default::default()
    };

    match &camera.projection {
        Projection::Perspective { xfov, yfov, .. } => {
            result.kind = CameraKind::Perspective;
            if let Some(fov) = larger(*xfov, *yfov) {
                result.fov = fov.to_radians();
            }
        }
        Projection::Orthographic { xmag, ymag, .. } => {
            result.kind = CameraKind::Orthographic;
            if let Some(scale) = larger(*xmag, *ymag) {
                result.ortho_scale = scale;
            }
        }
    }
    if let Some(znear) = camera.znear {
        result.clip_start = znear;
    }
    if let Some(zfar) = camera.zfar {
        result.clip_end = zfar;
    }
    result
}

fn larger(a: Option<f32>, b: Option<f32>) -> Option<f32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collada::geometry::{IndexedStream, TexcoordStream};
    use crate::convert::image::MemoryImageLoader;
    use approx::assert_relative_eq;

    fn triangles(
        positions: IndexedStream<[f32; 3]>,
        normals: Option<IndexedStream<[f32; 3]>>,
    ) -> TriangleSet {
        TriangleSet {
            material: None,
            positions: Some(positions),
            normals,
            texcoords: Vec::new(),
        }
    }

    #[test]
    fn single_flat_triangle() {
        let set = triangles(
            IndexedStream {
                data: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                index: vec![0, 1, 2],
            },
            Some(IndexedStream {
                data: vec![[0.0, 0.0, 1.0]],
                index: vec![0, 0, 0],
            }),
        );
        let mesh = build_mesh("tri", &set).unwrap();
        assert_eq!(3, mesh.vertex_count());
        assert_eq!(vec![[0, 1, 2]], mesh.faces);
        assert_eq!(vec![false], mesh.smooth);
        assert_eq!(Some(vec![[0.0, 0.0, 1.0]; 3]), mesh.normals);
    }

    #[test]
    fn quad_shares_edge_vertices() {
        let set = triangles(
            IndexedStream {
                data: vec![
                    [0.0, 0.0, 0.0],
                    [1.0, 0.0, 0.0],
                    [1.0, 1.0, 0.0],
                    [0.0, 1.0, 0.0],
                ],
                index: vec![0, 1, 2, 0, 2, 3],
            },
            Some(IndexedStream {
                data: vec![[0.0, 0.0, 1.0]],
                index: vec![0; 6],
            }),
        );
        let mesh = build_mesh("quad", &set).unwrap();
        assert_eq!(4, mesh.vertex_count());
        assert_eq!(vec![[0, 1, 2], [0, 2, 3]], mesh.faces);
        assert_eq!(vec![false, false], mesh.smooth);
    }

    #[test]
    fn texcoord_sets_split_vertices() {
        let mut set = triangles(
            IndexedStream {
                data: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]],
                index: vec![0, 1, 2, 2, 1, 3],
            },
            None,
        );
        set.texcoords.push(TexcoordStream {
            set: 0,
            stream: IndexedStream {
                data: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [0.5, 0.5], [1.0, 1.0]],
                index: vec![0, 1, 2, 3, 1, 4],
            },
        });
        let mesh = build_mesh("uv", &set).unwrap();
        // Position 2 appears with two different UVs.
        assert_eq!(5, mesh.vertex_count());
        assert_eq!(1, mesh.uv_layers.len());
        assert_eq!("UVSET0", mesh.uv_layers[0].name);
        assert_eq!(mesh.vertex_count(), mesh.uv_layers[0].uvs.len());
        assert_eq!(None, mesh.normals);
        assert_eq!(vec![false, false], mesh.smooth);
    }

    #[test]
    fn smooth_normals() {
        let set = triangles(
            IndexedStream {
                data: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                index: vec![0, 1, 2],
            },
            Some(IndexedStream {
                data: vec![[0.0, 0.0, 1.0], [0.0, 0.6, 0.8], [0.6, 0.0, 0.8]],
                index: vec![0, 1, 2],
            }),
        );
        assert_eq!(vec![true], build_mesh("smooth", &set).unwrap().smooth);
    }

    #[test]
    fn empty_primitive_is_degenerate() {
        let set = triangles(
            IndexedStream {
                data: vec![[0.0; 3]],
                index: Vec::new(),
            },
            None,
        );
        assert!(matches!(
            build_mesh("empty", &set),
            Err(DaeError::DegeneratePrimitive(_))
        ));
        assert!(matches!(
            build_mesh("none", &TriangleSet::default()),
            Err(DaeError::MissingElement { .. })
        ));
    }

    #[test]
    fn out_of_range_positions_fail() {
        let set = triangles(
            IndexedStream {
                data: vec![[0.0; 3]],
                index: vec![0, 0, 4],
            },
            None,
        );
        assert!(matches!(
            build_mesh("broken", &set),
            Err(DaeError::BrokenReference(_))
        ));
    }

    #[test]
    fn broken_normals_are_dropped() {
        let set = triangles(
            IndexedStream {
                data: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                index: vec![0, 1, 2],
            },
            Some(IndexedStream {
                data: vec![[0.0, 0.0, 1.0]],
                index: vec![0, 0, 9],
            }),
        );
        let mesh = build_mesh("tri", &set).unwrap();
        assert_eq!(None, mesh.normals);
        assert_eq!(3, mesh.vertex_count());
    }

    #[test]
    fn camera_uses_larger_fov() {
        let camera = dae_scene::Camera {
            id: "cam".to_string(),
            name: None,
            projection: Projection::Perspective {
                xfov: Some(30.0),
                yfov: Some(45.0),
                aspect_ratio: None,
            },
            znear: Some(0.5),
            zfar: None,
        };
        let converted = convert_camera(&camera);
        assert_eq!("cam", converted.name);
        assert_relative_eq!(45f32.to_radians(), converted.fov);
        assert_eq!(0.5, converted.clip_start);
        assert_eq!(Camera::default().clip_end, converted.clip_end);
    }

    #[test]
    fn orthographic_camera() {
        let camera = dae_scene::Camera {
            id: "top".to_string(),
            name: Some("Top".to_string()),
            projection: Projection::Orthographic {
                xmag: None,
                ymag: Some(12.0),
                aspect_ratio: Some(1.5),
            },
            znear: None,
            zfar: Some(500.0),
        };
        let converted = convert_camera(&camera);
        assert_eq!(CameraKind::Orthographic, converted.kind);
        assert_eq!(12.0, converted.ortho_scale);
        assert_eq!(Camera::default().fov, converted.fov);
        assert_eq!(500.0, converted.clip_end);
    }

    #[test]
    fn missing_scene_imports_nothing() {
        let document = Document::from_reader("<COLLADA/>".as_bytes()).unwrap();
        let scene = Importer::new(&document, &ImportConfig::default(), MemoryImageLoader::new())
            .import();
        assert!(scene.objects.is_empty());
        assert_eq!(None, scene.dialect);
    }

    #[test]
    fn local_transforms_survive_degenerate_parent() {
        let xml = r##"<COLLADA>
            <asset><unit meter="0.01" name="centimeter"/></asset>
            <library_visual_scenes><visual_scene id="s">
              <node id="flat"><scale>0 0 0</scale>
                <node id="child"><translate>1 2 3</translate></node>
              </node>
            </visual_scene></library_visual_scenes>
          </COLLADA>"##;
        let document = Document::from_reader(xml.as_bytes()).unwrap();
        let scene = Importer::new(&document, &ImportConfig::default(), MemoryImageLoader::new())
            .import();

        assert_eq!(Some(0.01), scene.unit_meter);
        let child = &scene.objects[1];
        assert_eq!(Some(0), child.parent);
        assert_eq!(0.0, child.world_transform.determinant());
        assert_eq!(
            Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0)),
            child.local_transform
        );
        assert!(child.local_transform.is_finite());
    }
}
