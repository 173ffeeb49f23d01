use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

use crate::collada::Document;
use crate::convert::image::{FsImageLoader, ImageLoader};
use crate::convert::walker::Importer;
use crate::error::DaeResult;
use crate::scene::Scene;

/// Configuration for DAE import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Let every imported material receive transparent shadows.
    pub transparent_shadows: bool,
    /// Use ray-traced transparency for transparent materials.
    pub raytrace_transparency: bool,
}

impl ImportConfig {
    /// Loads a config from JSON. Missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read import config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse import config {}", path.display()))
    }
}

/// Import a DAE file, loading textures from disk.
///
/// Only a document that cannot be read or parsed fails the import. Broken parts of
/// a valid document are skipped or substituted and reported through `log`.
pub fn import_dae_file(path: &Path, config: &ImportConfig) -> DaeResult<Scene> {
    import_dae_file_with_loader(path, config, FsImageLoader)
}

pub fn import_dae_file_with_loader<L: ImageLoader>(
    path: &Path,
    config: &ImportConfig,
    loader: L,
) -> DaeResult<Scene> {
    let document = Document::from_file(path)?;
    log::info!("Importing {}", path.display());
    Ok(Importer::new(&document, config, loader).import())
}

/// Import a DAE document from memory. Relative image paths are resolved against `base_dir`.
pub fn import_dae_reader<R: Read, L: ImageLoader>(
    reader: R,
    base_dir: Option<&Path>,
    config: &ImportConfig,
    loader: L,
) -> DaeResult<Scene> {
    let mut document = Document::from_reader(reader)?;
    document.base_dir = base_dir.map(Path::to_path_buf);
    Ok(Importer::new(&document, config, loader).import())
}
