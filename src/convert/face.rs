//! Flat versus smooth shading per face.
//!
//! A face is flat when all of its corner normals agree with the first one, that is
//! when every dot product with the first normal lies within [FLAT_DOT_MIN, FLAT_DOT_MAX].
//! Faces with fewer than two normals have nothing to compare and stay smooth.
//! The raw per-corner normals are used, never the merged per-vertex normals.
use glam::Vec3;

pub const FLAT_DOT_MIN: f32 = 0.99999;
pub const FLAT_DOT_MAX: f32 = 1.00001;

/// Returns `true` when the face should be shaded smooth.
pub fn is_smooth(normals: &[[f32; 3]]) -> bool {
    !is_flat(normals)
}

pub fn is_flat(normals: &[[f32; 3]]) -> bool {
    let [first, rest @ ..] = normals else {
        return false;
    };
    if rest.is_empty() {
        return false;
    }
    let reference = Vec3::from_array(*first);
    rest.iter().all(|n| {
        let dot = reference.dot(Vec3::from_array(*n));
        (FLAT_DOT_MIN..=FLAT_DOT_MAX).contains(&dot)
    })
}

/// Classifies every face of a triangle list from raw normal data and per-corner normal
/// indices. Faces whose normal indices fall outside `normals` are left smooth.
pub fn classify_faces(normals: &[[f32; 3]], normal_index: &[u32]) -> Vec<bool> {
    normal_index
        .chunks_exact(3)
        .map(|corners| {
            let face: Option<Vec<[f32; 3]>> = corners
                .iter()
                .map(|&i| normals.get(i as usize).copied())
                .collect();
            face.map_or(true, |n| is_smooth(&n))
        })
        .collect()
}
