use serde::Serialize;

/// A named set of texture coordinates, one entry per shared vertex.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UvLayer {
    pub name: String,
    pub uvs: Vec<[f32; 2]>,
}

/// Shared-vertex triangle mesh produced by the importer.
///
/// Every attribute array is indexed by shared vertex id. `smooth` holds one
/// flag per face.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Mesh {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub uv_layers: Vec<UvLayer>,
    pub faces: Vec<[u32; 3]>,
    pub smooth: Vec<bool>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }
}
