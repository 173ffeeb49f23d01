//! Loading of texture images referenced by effects.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::ImageReader;

use crate::error::{DaeError, DaeResult};

/// What the importer needs to know about a texture image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedImage {
    pub width: u32,
    pub height: u32,
    pub has_alpha: bool,
}

/// Source of texture images. The importer only talks to images through this trait
/// so hosts and tests can supply their own.
pub trait ImageLoader {
    fn load(&mut self, path: &Path) -> DaeResult<LoadedImage>;
}

impl<L: ImageLoader + ?Sized> ImageLoader for &mut L {
    fn load(&mut self, path: &Path) -> DaeResult<LoadedImage> {
        (**self).load(path)
    }
}

/// Decodes images from disk with the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsImageLoader;

impl ImageLoader for FsImageLoader {
    fn load(&mut self, path: &Path) -> DaeResult<LoadedImage> {
        let io_error = |source| DaeError::Io {
            path: path.to_path_buf(),
            source,
        };
        let image = ImageReader::open(path)
            .map_err(io_error)?
            .with_guessed_format()
            .map_err(io_error)?
            .decode()
            .map_err(|source| DaeError::Image {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(LoadedImage {
            width: image.width(),
            height: image.height(),
            has_alpha: image.color().has_alpha(),
        })
    }
}

/// Serves already decoded images by path and counts how often it was asked.
#[derive(Debug, Default, Clone)]
pub struct MemoryImageLoader {
    images: HashMap<PathBuf, LoadedImage>,
    loads: usize,
}

impl MemoryImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, path: impl Into<PathBuf>, image: LoadedImage) -> Self {
        self.images.insert(path.into(), image);
        self
    }

    /// Number of [ImageLoader::load] calls so far, failed ones included.
    pub fn loads(&self) -> usize {
        self.loads
    }
}

impl ImageLoader for MemoryImageLoader {
    fn load(&mut self, path: &Path) -> DaeResult<LoadedImage> {
        self.loads += 1;
        self.images.get(path).copied().ok_or_else(|| DaeError::Io {
            path: path.to_path_buf(),
            source: std::io::ErrorKind::NotFound.into(),
        })
    }
}
