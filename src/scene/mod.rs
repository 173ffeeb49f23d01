//! Host-side scene produced by the importer and consumed by the exporter.
//!
//! Everything here is a plain value: meshes, materials and cameras live in flat
//! arrays and objects refer to them by index.
pub mod camera;
pub mod material;
pub mod mesh;

use glam::Mat4;
use serde::Serialize;

use crate::collada::UpAxis;
pub use camera::{Camera, CameraKind};
pub use material::{
    Channel, ImageEntry, MaterialDescriptor, Mirror, ShadingModel, Specular, SpecularShader,
    TextureSlot, TransparencyMethod,
};
pub use mesh::{Mesh, UvLayer};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ObjectData {
    /// A transform-only object standing in for a scene node.
    Empty,
    Mesh {
        mesh: usize,
        material: Option<usize>,
    },
    Camera(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneObject {
    pub name: String,
    pub parent: Option<usize>,
    pub world_transform: Mat4,
    /// Transform relative to `parent`. Equal to `world_transform` for roots.
    pub local_transform: Mat4,
    pub data: ObjectData,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Scene {
    pub up_axis: UpAxis,
    /// Length of one scene unit in meters, `None` when the document does not say.
    pub unit_meter: Option<f32>,
    /// Authoring tool dialect the document was decoded with, `None` for standard COLLADA.
    pub dialect: Option<String>,
    pub objects: Vec<SceneObject>,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<MaterialDescriptor>,
    pub images: Vec<ImageEntry>,
    pub cameras: Vec<Camera>,
}

impl Scene {
    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.objects
            .iter()
            .enumerate()
            .filter(|(_, o)| o.parent.is_none())
            .map(|(i, _)| i)
    }

    pub fn children(&self, parent: usize) -> impl Iterator<Item = usize> + '_ {
        self.objects
            .iter()
            .enumerate()
            .filter(move |(_, o)| o.parent == Some(parent))
            .map(|(i, _)| i)
    }

    pub fn mesh_objects(&self) -> impl Iterator<Item = &SceneObject> {
        self.objects
            .iter()
            .filter(|o| matches!(o.data, ObjectData::Mesh { .. }))
    }
}
