//! Stable names for imported meshes.
use sha2::{Digest, Sha256};

const PREFIX_CHARS: usize = 10;
const DIGEST_CHARS: usize = 10;

/// Longest name [mesh_identity] can return, in characters.
pub const MAX_IDENTITY_CHARS: usize = PREFIX_CHARS + DIGEST_CHARS;

/// Name of the mesh built from primitive `index` of geometry `geometry_id`.
///
/// The readable prefix is cut to fit host name limits and the digest keeps names
/// of long ids with a common prefix apart. The same inputs always give the same name.
pub fn mesh_identity(geometry_id: &str, index: usize) -> String {
    let base = format!("{geometry_id}-{index}");

    let mut hasher = Sha256::new();
    hasher.update(base.as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    let mut name: String = base.chars().take(PREFIX_CHARS).collect();
    name.push_str(&digest[..DIGEST_CHARS]);
    name
}
