//! Collapses COLLADA's independently indexed vertex streams into one shared-vertex buffer.
//!
//! Each triangle corner carries one raw index per stream (position, normal, every UV set).
//! The tuple of those indices is the corner's key, and corners with equal keys become the
//! same shared vertex. Ids are handed out in first-occurrence order, so the result only
//! depends on the corner order.
use indexmap::IndexSet;

#[derive(Debug, Clone, PartialEq)]
pub struct MergedIndices {
    /// Unique key tuples, position in the set is the shared vertex id.
    keys: IndexSet<Vec<u32>>,
    /// Shared vertex id of every corner.
    corners: Vec<u32>,
}

/// Merges parallel per-corner index streams. All streams are expected to have the same
/// length; extra trailing corners in longer streams are ignored.
pub fn merge_streams(streams: &[&[u32]]) -> MergedIndices {
    let corner_count = streams.iter().map(|s| s.len()).min().unwrap_or(0);
    debug_assert!(streams.iter().all(|s| s.len() == corner_count));

    let mut keys = IndexSet::with_capacity(corner_count);
    let mut corners = Vec::with_capacity(corner_count);
    for corner in 0..corner_count {
        let key: Vec<u32> = streams.iter().map(|s| s[corner]).collect();
        let (id, _) = keys.insert_full(key);
        corners.push(id as u32);
    }

    MergedIndices { keys, corners }
}

impl MergedIndices {
    pub fn vertex_count(&self) -> usize {
        self.keys.len()
    }

    pub fn corners(&self) -> &[u32] {
        &self.corners
    }

    /// Raw stream indices of a shared vertex.
    pub fn key(&self, id: usize) -> Option<&[u32]> {
        self.keys.get_index(id).map(Vec::as_slice)
    }

    /// Corner ids grouped into triangles.
    pub fn faces(&self) -> Vec<[u32; 3]> {
        self.corners
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect()
    }

    /// Resamples the source data of `stream` to one element per shared vertex.
    /// Returns `None` if a key points outside `data`.
    pub fn compact<T: Copy>(&self, stream: usize, data: &[T]) -> Option<Vec<T>> {
        self.keys
            .iter()
            .map(|key| key.get(stream).and_then(|&i| data.get(i as usize)).copied())
            .collect()
    }
}
