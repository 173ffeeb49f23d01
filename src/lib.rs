//! COLLADA (.dae) import into a plain host scene, and export back to COLLADA.
//!
//! [convert] turns a parsed [collada::Document] into a [scene::Scene] of shared-vertex
//! meshes, normalized materials, cameras and transformed objects. [export] writes a
//! scene back out.
pub mod collada;
pub mod convert;
pub mod error;
pub mod export;
pub mod scene;

pub use convert::{import_dae_file, ImportConfig, Importer};
pub use error::{DaeError, DaeResult};
pub use export::{export_scene_to_dae, ExportConfig, ExportMode};
pub use scene::Scene;
