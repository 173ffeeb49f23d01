use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CameraKind {
    Perspective,
    Orthographic,
}

/// A camera in the host scene. Fields the document does not specify keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Camera {
    pub name: String,
    pub kind: CameraKind,
    /// Field of view in radians.
    pub fov: f32,
    pub ortho_scale: f32,
    pub clip_start: f32,
    pub clip_end: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: CameraKind::Perspective,
            fov: 0.857_556,
            ortho_scale: 7.0,
            clip_start: 0.1,
            clip_end: 100.0,
        }
    }
}
