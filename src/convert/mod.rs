//! COLLADA to host scene conversion.
pub mod dae;
pub mod dialect;
pub mod face;
pub mod image;
pub mod index_merge;
pub mod material;
pub mod naming;
pub mod walker;

pub use self::dae::{import_dae_file, import_dae_file_with_loader, import_dae_reader, ImportConfig};
pub use self::dialect::{Dialect, DialectOverrides, DialectProfile, DialectRegistry, Signal};
pub use self::image::{FsImageLoader, ImageLoader, LoadedImage, MemoryImageLoader};
pub use self::walker::Importer;
