//! A typed view of a COLLADA document, built on `xmltree`.
//!
//! This covers the subset the importer needs: geometries, materials/effects/images,
//! cameras, the instantiated visual scene and the metadata used to recognise
//! which tool wrote the file.
pub mod effect;
pub mod geometry;
pub mod scene;
pub mod xml;

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use xmltree::Element;

use crate::error::{DaeError, DaeResult};
use effect::{Effect, Image, Material};
use geometry::Geometry;
use scene::{Camera, VisualScene};
use xml::{attr, descendants, find_all_children, find_child, get_element_text, url_fragment};

/// Up axis options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UpAxis {
    #[serde(rename = "X_UP")]
    XUp,
    #[default]
    #[serde(rename = "Y_UP")]
    YUp,
    #[serde(rename = "Z_UP")]
    ZUp,
}

impl UpAxis {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpAxis::XUp => "X_UP",
            UpAxis::YUp => "Y_UP",
            UpAxis::ZUp => "Z_UP",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Asset {
    /// `<authoring_tool>` of every `<contributor>`.
    pub authoring_tools: Vec<String>,
    pub up_axis: UpAxis,
    pub unit_meter: Option<f32>,
}

/// Parsed COLLADA document
#[derive(Debug, Clone, Default)]
pub struct Document {
    /// Directory relative image paths are resolved against.
    pub base_dir: Option<PathBuf>,
    pub asset: Asset,
    pub geometries: IndexMap<String, Geometry>,
    pub materials: IndexMap<String, Material>,
    pub effects: IndexMap<String, Effect>,
    pub images: IndexMap<String, Image>,
    pub cameras: IndexMap<String, Camera>,
    pub visual_scenes: Vec<VisualScene>,
    /// Target of `<scene><instance_visual_scene>`.
    pub scene_url: Option<String>,
    /// `profile` of every `<extra><technique>` anywhere in the document.
    pub extra_profiles: Vec<String>,
}

impl Document {
    /// Reads and parses a `.dae` file. The file handle is released before parsing starts.
    pub fn from_file(path: &Path) -> DaeResult<Self> {
        let content = std::fs::read(path).map_err(|source| DaeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut document = Self::from_reader(content.as_slice())?;
        document.base_dir = path.parent().map(Path::to_path_buf);
        Ok(document)
    }

    pub fn from_reader<R: Read>(reader: R) -> DaeResult<Self> {
        let root = Element::parse(reader)?;
        Self::from_element(&root)
    }

    pub fn from_element(root: &Element) -> DaeResult<Self> {
        if root.name != "COLLADA" {
            return Err(DaeError::NotCollada(root.name.clone()));
        }

        let mut document = Document {
            asset: find_child(root, "asset").map(parse_asset).unwrap_or_default(),
            ..Default::default()
        };

        for library in find_all_children(root, "library_geometries") {
            for g in geometry::parse_geometries(library)? {
                document.geometries.insert(g.id.clone(), g);
            }
        }
        for library in find_all_children(root, "library_materials") {
            for m in effect::parse_materials(library) {
                document.materials.insert(m.id.clone(), m);
            }
        }
        for library in find_all_children(root, "library_effects") {
            for e in effect::parse_effects(library)? {
                document.effects.insert(e.id.clone(), e);
            }
        }
        for library in find_all_children(root, "library_images") {
            for i in effect::parse_images(library) {
                document.images.insert(i.id.clone(), i);
            }
        }
        for library in find_all_children(root, "library_cameras") {
            for c in scene::parse_cameras(library)? {
                document.cameras.insert(c.id.clone(), c);
            }
        }

        let library_nodes: HashMap<String, &Element> = find_all_children(root, "library_nodes")
            .into_iter()
            .flat_map(|l| find_all_children(l, "node"))
            .filter_map(|n| Some((attr(n, "id")?.to_string(), n)))
            .collect();
        for library in find_all_children(root, "library_visual_scenes") {
            document
                .visual_scenes
                .extend(scene::parse_visual_scenes(library, &library_nodes)?);
        }
        document.scene_url = find_child(root, "scene")
            .and_then(|s| find_child(s, "instance_visual_scene"))
            .and_then(|i| attr(i, "url"))
            .map(|u| url_fragment(u).to_string());

        let mut extras = Vec::new();
        descendants(root, "extra", &mut extras);
        for extra in extras {
            for technique in find_all_children(extra, "technique") {
                if let Some(profile) = attr(technique, "profile") {
                    if !document.extra_profiles.iter().any(|p| p == profile) {
                        document.extra_profiles.push(profile.to_string());
                    }
                }
            }
        }

        log::debug!(
            "Parsed COLLADA document: {} geometries, {} materials, {} effects, {} images, {} cameras, {} visual scenes",
            document.geometries.len(),
            document.materials.len(),
            document.effects.len(),
            document.images.len(),
            document.cameras.len(),
            document.visual_scenes.len()
        );
        Ok(document)
    }

    /// The instantiated visual scene, falling back to the first one declared.
    pub fn scene(&self) -> Option<&VisualScene> {
        match &self.scene_url {
            Some(url) => self
                .visual_scenes
                .iter()
                .find(|s| &s.id == url)
                .or_else(|| self.visual_scenes.first()),
            None => self.visual_scenes.first(),
        }
    }

    pub fn has_extra_profile(&self, profile: &str) -> bool {
        self.extra_profiles.iter().any(|p| p == profile)
    }

    /// The effect of a material, following `<instance_effect>`.
    pub fn material_effect(&self, material_id: &str) -> DaeResult<(&Material, &Effect)> {
        let material = self
            .materials
            .get(material_id)
            .ok_or_else(|| DaeError::BrokenReference(material_id.to_string()))?;
        let effect_id = material
            .effect
            .as_deref()
            .ok_or_else(|| DaeError::missing("material", "instance_effect"))?;
        let effect = self
            .effects
            .get(effect_id)
            .ok_or_else(|| DaeError::BrokenReference(effect_id.to_string()))?;
        Ok((material, effect))
    }

    /// File system path of an `<image>`, resolved against the document directory.
    pub fn image_path(&self, image_id: &str) -> Option<PathBuf> {
        let init_from = self.images.get(image_id)?.init_from.as_deref()?;
        let decoded = init_from
            .trim_start_matches("file://")
            .replace("%20", " ");
        let path = PathBuf::from(decoded);
        match &self.base_dir {
            Some(base) if path.is_relative() => Some(base.join(path)),
            _ => Some(path),
        }
    }
}

fn parse_asset(asset: &Element) -> Asset {
    let authoring_tools = find_all_children(asset, "contributor")
        .into_iter()
        .filter_map(|c| find_child(c, "authoring_tool"))
        .filter_map(get_element_text)
        .map(|t| t.trim().to_string())
        .collect();

    let up_axis = match find_child(asset, "up_axis")
        .and_then(get_element_text)
        .as_deref()
        .map(str::trim)
    {
        Some("X_UP") => UpAxis::XUp,
        Some("Z_UP") => UpAxis::ZUp,
        _ => UpAxis::YUp,
    };

    let unit_meter = find_child(asset, "unit")
        .and_then(|u| attr(u, "meter"))
        .and_then(|m| m.parse().ok());

    Asset {
        authoring_tools,
        up_axis,
        unit_meter,
    }
}
