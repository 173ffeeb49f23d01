//! Resolves COLLADA materials and their `profile_COMMON` effects into [MaterialDescriptor]s.
//!
//! Dispatch happens on the shading model. Diffuse, specular and reflective channels
//! share the same colour-or-texture resolution, and a texture that cannot be loaded is
//! replaced by [Channel::MISSING_TEXTURE] instead of failing the material.
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use crate::collada::effect::{ColorOrTexture, Effect, TextureRef};
use crate::collada::Document;
use crate::convert::dae::ImportConfig;
use crate::convert::dialect::Dialect;
use crate::convert::image::ImageLoader;
use crate::error::{DaeError, DaeResult};
use crate::scene::{
    Channel, ImageEntry, MaterialDescriptor, Mirror, ShadingModel, Specular, SpecularShader,
    TextureSlot, TransparencyMethod,
};

/// Specular hardness used when an effect has no `<shininess>`.
pub const DEFAULT_HARDNESS: f32 = 50.0;

/// Specular colour used when a phong or blinn effect has no `<specular>`.
const DEFAULT_SPECULAR: [f32; 3] = [1.0, 1.0, 1.0];

/// Per-import material state. Descriptors and images are appended to flat lists and
/// referred to by index.
pub struct MaterialResolver<'d, L> {
    document: &'d Document,
    dialect: Dialect,
    config: ImportConfig,
    loader: L,
    /// Material id to descriptor index. Failed materials are cached as `None`.
    by_id: HashMap<String, Option<usize>>,
    /// Image path to image index. Images that failed to load are cached as `None`.
    by_path: HashMap<PathBuf, Option<usize>>,
    materials: Vec<MaterialDescriptor>,
    images: Vec<ImageEntry>,
}

impl<'d, L: ImageLoader> MaterialResolver<'d, L> {
    pub fn new(document: &'d Document, dialect: Dialect, config: ImportConfig, loader: L) -> Self {
        Self {
            document,
            dialect,
            config,
            loader,
            by_id: HashMap::new(),
            by_path: HashMap::new(),
            materials: Vec::new(),
            images: Vec::new(),
        }
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn materials(&self) -> &[MaterialDescriptor] {
        &self.materials
    }

    pub fn images(&self) -> &[ImageEntry] {
        &self.images
    }

    pub fn into_parts(self) -> (Vec<MaterialDescriptor>, Vec<ImageEntry>) {
        (self.materials, self.images)
    }

    /// Index of the descriptor for `material_id`, building it on first use.
    /// Returns `None` if the material could not be resolved.
    pub fn resolve(&mut self, material_id: &str) -> Option<usize> {
        if let Some(cached) = self.by_id.get(material_id) {
            return *cached;
        }

        let resolved = match self.build(material_id) {
            Ok(descriptor) => {
                log::debug!(
                    "Resolved material {} as {} with {:?} diffuse",
                    material_id,
                    descriptor.shading,
                    descriptor.diffuse
                );
                self.materials.push(descriptor);
                Some(self.materials.len() - 1)
            }
            Err(e) => {
                log::warn!("Material {} could not be resolved: {}", material_id, e);
                None
            }
        };
        self.by_id.insert(material_id.to_string(), resolved);
        resolved
    }

    fn build(&mut self, material_id: &str) -> DaeResult<MaterialDescriptor> {
        let document = self.document;
        let (material, effect) = document.material_effect(material_id)?;
        let shading = ShadingModel::from_str(&effect.shading)
            .map_err(|_| DaeError::UnknownShadingModel(effect.shading.clone()))?;

        let name = material.name.as_deref().unwrap_or(&material.id);
        let mut descriptor = MaterialDescriptor::new(name, shading);
        match shading {
            ShadingModel::Constant => descriptor.shadeless = true,
            ShadingModel::Lambert => {
                self.diffuse(effect, &mut descriptor);
                descriptor.specular_intensity = 0.0;
            }
            ShadingModel::Phong => self.specular(effect, &mut descriptor, SpecularShader::Phong),
            ShadingModel::Blinn => self.specular(effect, &mut descriptor, SpecularShader::Blinn),
        }

        self.emission(effect, &mut descriptor);
        self.transparency(effect, &mut descriptor);
        self.reflectivity(effect, &mut descriptor);
        descriptor.transparent_shadows = self.config.transparent_shadows;
        Ok(descriptor)
    }

    fn diffuse(&mut self, effect: &Effect, descriptor: &mut MaterialDescriptor) {
        if let Some(diffuse) = &effect.diffuse {
            descriptor.diffuse = self.channel(diffuse);
        }

        if self.dialect.overrides.premultiplied_texture_alpha {
            if let Channel::Texture(slot) = &mut descriptor.diffuse {
                let has_alpha = self.images.get(slot.image).is_some_and(|i| i.has_alpha);
                if has_alpha {
                    slot.use_map_alpha = true;
                    descriptor.alpha = 0.0;
                    descriptor.alpha_blend = true;
                    descriptor.premultiplied_alpha = true;
                }
            }
        }
    }

    fn specular(
        &mut self,
        effect: &Effect,
        descriptor: &mut MaterialDescriptor,
        shader: SpecularShader,
    ) {
        self.diffuse(effect, descriptor);
        let channel = match &effect.specular {
            Some(specular) => self.channel(specular),
            None => Channel::Color(DEFAULT_SPECULAR),
        };
        descriptor.specular = Some(Specular {
            shader,
            channel,
            hardness: effect.shininess.unwrap_or(DEFAULT_HARDNESS),
        });
    }

    fn emission(&mut self, effect: &Effect, descriptor: &mut MaterialDescriptor) {
        match &effect.emission {
            Some(ColorOrTexture::Color([r, g, b, _])) => descriptor.emit = Some((r + g + b) / 3.0),
            Some(ColorOrTexture::Texture(t)) => {
                log::debug!("Ignoring emission texture {} on {}", t.texture, effect.id)
            }
            None => (),
        }
    }

    fn transparency(&mut self, effect: &Effect, descriptor: &mut MaterialDescriptor) {
        let Some(transparency) = effect.transparency.filter(|t| *t > 0.0 && *t < 1.0) else {
            return;
        };
        descriptor.alpha_blend = true;
        descriptor.alpha = transparency;

        if self.config.raytrace_transparency {
            descriptor.transparency_method = TransparencyMethod::Raytrace;
            descriptor.ior = Some(1.0);
            descriptor.fresnel = Some(2.0);
        }
        if let Some(ior) = effect.index_of_refraction {
            descriptor.transparency_method = TransparencyMethod::Raytrace;
            descriptor.ior = Some(ior);
        }
    }

    fn reflectivity(&mut self, effect: &Effect, descriptor: &mut MaterialDescriptor) {
        if let Some(profile) = &self.dialect.overrides.suppress_reflectivity_profile {
            if effect.has_extra_profile(profile) {
                return;
            }
        }
        let Some(reflect_factor) = effect.reflectivity.filter(|r| *r > 0.0) else {
            return;
        };
        let channel = effect.reflective.as_ref().map(|r| self.channel(r));
        descriptor.mirror = Some(Mirror {
            reflect_factor,
            channel,
        });
    }

    fn channel(&mut self, value: &ColorOrTexture) -> Channel {
        match value {
            ColorOrTexture::Color([r, g, b, _]) => Channel::Color([*r, *g, *b]),
            ColorOrTexture::Texture(texture) => match self.texture(texture) {
                Some(slot) => Channel::Texture(slot),
                None => Channel::MISSING_TEXTURE,
            },
        }
    }

    fn texture(&mut self, texture: &TextureRef) -> Option<TextureSlot> {
        let document = self.document;
        let Some(image_id) = texture.image.as_deref() else {
            log::warn!(
                "Texture {} does not lead to an image, using fallback colour",
                texture.texture
            );
            return None;
        };
        let Some(path) = document.image_path(image_id) else {
            log::warn!("Image {} has no usable path, using fallback colour", image_id);
            return None;
        };

        let image = match self.by_path.get(&path).copied() {
            Some(cached) => cached?,
            None => {
                let name = document
                    .images
                    .get(image_id)
                    .and_then(|i| i.name.clone())
                    .unwrap_or_else(|| image_id.to_string());
                let loaded = self.load_image(name, path.clone());
                self.by_path.insert(path, loaded);
                loaded?
            }
        };

        Some(TextureSlot {
            image,
            uv_layer: texture.texcoord.clone(),
            use_map_alpha: false,
        })
    }

    fn load_image(&mut self, name: String, path: PathBuf) -> Option<usize> {
        match self.loader.load(&path) {
            Ok(loaded) => {
                self.images.push(ImageEntry {
                    name,
                    path,
                    width: loaded.width,
                    height: loaded.height,
                    has_alpha: loaded.has_alpha,
                });
                Some(self.images.len() - 1)
            }
            Err(e) => {
                log::warn!("{}, using fallback colour", e);
                None
            }
        }
    }
}
