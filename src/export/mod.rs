//! Host scene to COLLADA conversion.
pub mod dae;

pub use self::dae::{build_collada, export_scene_to_dae, write_collada, ExportConfig, ExportMode};
