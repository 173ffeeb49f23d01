use std::path::PathBuf;

use serde::Serialize;
use strum::{Display, EnumString, IntoStaticStr};

/// The closed set of `profile_COMMON` shading models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ShadingModel {
    Constant,
    Lambert,
    Phong,
    Blinn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpecularShader {
    Phong,
    Blinn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TransparencyMethod {
    #[default]
    ZTransparency,
    Raytrace,
}

/// An image referenced by one or more texture slots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageEntry {
    pub name: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// The image carries an alpha channel (32 bit RGBA).
    pub has_alpha: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextureSlot {
    /// Index into [crate::scene::Scene::images].
    pub image: usize,
    pub uv_layer: Option<String>,
    /// Texture alpha drives material alpha.
    pub use_map_alpha: bool,
}

/// A shading channel: either a constant colour or an image map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Channel {
    Color([f32; 3]),
    Texture(TextureSlot),
}

impl Channel {
    /// Diagnostic colour used when a texture cannot be loaded.
    pub const MISSING_TEXTURE: Channel = Channel::Color([1.0, 0.0, 0.0]);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Specular {
    pub shader: SpecularShader,
    pub channel: Channel,
    pub hardness: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mirror {
    pub reflect_factor: f32,
    pub channel: Option<Channel>,
}

/// Normalized material produced from a COLLADA material and its effect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialDescriptor {
    pub name: String,
    pub shading: ShadingModel,
    pub shadeless: bool,
    pub diffuse: Channel,
    pub specular: Option<Specular>,
    pub specular_intensity: f32,
    pub emit: Option<f32>,
    pub alpha: f32,
    pub alpha_blend: bool,
    pub premultiplied_alpha: bool,
    pub transparency_method: TransparencyMethod,
    pub ior: Option<f32>,
    pub fresnel: Option<f32>,
    pub mirror: Option<Mirror>,
    pub transparent_shadows: bool,
}

impl MaterialDescriptor {
    pub fn new(name: &str, shading: ShadingModel) -> Self {
        Self {
            name: name.to_string(),
            shading,
            shadeless: false,
            diffuse: Channel::Color([0.8, 0.8, 0.8]),
            specular: None,
            specular_intensity: 0.5,
            emit: None,
            alpha: 1.0,
            alpha_blend: false,
            premultiplied_alpha: false,
            transparency_method: TransparencyMethod::default(),
            ior: None,
            fresnel: None,
            mirror: None,
            transparent_shadows: false,
        }
    }
}
