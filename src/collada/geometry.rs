//! `<library_geometries>`: sources, inputs and primitives.
//!
//! Every supported primitive kind is fanned into a [TriangleSet] so the importer only
//! ever sees three corners per face, each corner carrying one raw index per stream.
use std::collections::HashMap;

use xmltree::Element;

use super::xml::{attr, children, find_all_children, find_child, parse_list, url_fragment};
use crate::error::{DaeError, DaeResult};

/// A `<source>` holding a flat `<float_array>` read through its accessor stride.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub id: String,
    pub data: Vec<f32>,
    pub stride: usize,
}

impl Source {
    pub fn count(&self) -> usize {
        if self.stride == 0 {
            0
        } else {
            self.data.len() / self.stride
        }
    }

    /// Reads every element as `N` components, padding short strides with zeros.
    pub fn elements<const N: usize>(&self) -> Vec<[f32; N]> {
        (0..self.count())
            .map(|i| {
                let chunk = &self.data[i * self.stride..(i + 1) * self.stride];
                let mut out = [0.0; N];
                for (o, v) in out.iter_mut().zip(chunk) {
                    *o = *v;
                }
                out
            })
            .collect()
    }
}

/// A primitive `<input>` after `VERTEX` has been expanded into the `<vertices>` inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Input {
    pub semantic: String,
    pub source: String,
    pub offset: usize,
    pub set: Option<u32>,
}

/// Source data plus one raw index per triangle corner.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedStream<T> {
    pub data: Vec<T>,
    pub index: Vec<u32>,
}

impl<T> IndexedStream<T> {
    /// Checks that every corner index points into `data`.
    pub fn validate(&self, what: &str) -> DaeResult<()> {
        match self.index.iter().find(|&&i| i as usize >= self.data.len()) {
            Some(i) => Err(DaeError::BrokenReference(format!(
                "{what} index {i} (only {} elements)",
                self.data.len()
            ))),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TexcoordStream {
    pub set: u32,
    pub stream: IndexedStream<[f32; 2]>,
}

/// Triangulated primitive. `positions` is `None` when the vertex data could not be resolved.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TriangleSet {
    pub material: Option<String>,
    pub positions: Option<IndexedStream<[f32; 3]>>,
    pub normals: Option<IndexedStream<[f32; 3]>>,
    pub texcoords: Vec<TexcoordStream>,
}

impl TriangleSet {
    pub fn face_count(&self) -> usize {
        self.positions.as_ref().map_or(0, |p| p.index.len() / 3)
    }
}

#[derive(Clone, Copy)]
enum PrimitiveKind {
    Triangles,
    Polylist,
    Polygons,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub id: String,
    pub name: Option<String>,
    /// One triangulated set per supported primitive, in document order.
    pub primitives: Vec<TriangleSet>,
}

pub fn parse_geometries(library: &Element) -> DaeResult<Vec<Geometry>> {
    let mut geometries = Vec::new();
    for geometry in find_all_children(library, "geometry") {
        let Some(id) = attr(geometry, "id") else {
            log::warn!("Skipping <geometry> without an id");
            continue;
        };
        let Some(mesh) = find_child(geometry, "mesh") else {
            log::debug!("Geometry '{}' has no <mesh> (splines and B-reps are not imported)", id);
            continue;
        };
        geometries.push(Geometry {
            id: id.to_string(),
            name: attr(geometry, "name").map(str::to_string),
            primitives: parse_mesh(id, mesh)?,
        });
    }
    Ok(geometries)
}

fn parse_mesh(geometry_id: &str, mesh: &Element) -> DaeResult<Vec<TriangleSet>> {
    let sources = parse_sources(mesh)?;
    let vertices = find_child(mesh, "vertices");

    let mut primitives = Vec::new();
    for element in children(mesh) {
        let kind = match element.name.as_str() {
            "triangles" => PrimitiveKind::Triangles,
            "polylist" => PrimitiveKind::Polylist,
            "polygons" => PrimitiveKind::Polygons,
            "lines" | "linestrips" | "tristrips" | "trifans" => {
                log::debug!(
                    "Geometry '{}': <{}> primitives are not imported",
                    geometry_id,
                    element.name
                );
                continue;
            }
            _ => continue,
        };
        let Some(stride) = primitive_stride(element) else {
            log::warn!(
                "Geometry '{}': <{}> has an input offset outside its inputs, skipping it",
                geometry_id,
                element.name
            );
            continue;
        };
        let inputs = expand_inputs(element, vertices);
        let polygons = read_polygons(kind, stride, element)?;
        let triangles = build_triangle_set(
            geometry_id,
            attr(element, "material").map(str::to_string),
            &inputs,
            &polygons,
            &sources,
        );
        primitives.push(triangles);
    }
    Ok(primitives)
}

fn parse_sources(mesh: &Element) -> DaeResult<HashMap<String, Source>> {
    let mut sources = HashMap::new();
    for source in find_all_children(mesh, "source") {
        let Some(id) = attr(source, "id") else {
            continue;
        };
        let Some(float_array) = find_child(source, "float_array") else {
            continue;
        };
        let data: Vec<f32> = parse_list(float_array)?;
        let stride = find_child(source, "technique_common")
            .and_then(|t| find_child(t, "accessor"))
            .and_then(|a| attr(a, "stride"))
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);
        sources.insert(
            id.to_string(),
            Source {
                id: id.to_string(),
                data,
                stride,
            },
        );
    }
    Ok(sources)
}

/// Resolves `VERTEX` into the inputs declared on `<vertices>`, which share its offset.
fn expand_inputs(primitive: &Element, vertices: Option<&Element>) -> Vec<Input> {
    let mut inputs = Vec::new();
    for input in find_all_children(primitive, "input") {
        let (Some(semantic), Some(source)) = (attr(input, "semantic"), attr(input, "source"))
        else {
            continue;
        };
        let offset = attr(input, "offset")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let set = attr(input, "set").and_then(|s| s.parse().ok());

        if semantic == "VERTEX" {
            let source = url_fragment(source);
            match vertices.filter(|v| attr(v, "id") == Some(source)) {
                Some(vertices) => {
                    for vinput in find_all_children(vertices, "input") {
                        if let (Some(s), Some(src)) = (attr(vinput, "semantic"), attr(vinput, "source")) {
                            inputs.push(Input {
                                semantic: s.to_string(),
                                source: url_fragment(src).to_string(),
                                offset,
                                set: attr(vinput, "set").and_then(|s| s.parse().ok()),
                            });
                        }
                    }
                }
                None => log::warn!("VERTEX input references unknown <vertices> '{}'", source),
            }
        } else {
            inputs.push(Input {
                semantic: semantic.to_string(),
                source: url_fragment(source).to_string(),
                offset,
                set,
            });
        }
    }
    inputs
}

struct Polygons {
    stride: usize,
    /// Raw `<p>` values of each polygon, `stride` values per corner.
    polygons: Vec<Vec<u32>>,
}

/// Values per corner in `<p>`. Offsets index the primitive's own `<input>`s, so one
/// that is not below the input count is malformed and yields `None`.
fn primitive_stride(element: &Element) -> Option<usize> {
    let inputs = find_all_children(element, "input");
    let mut stride = 1;
    for input in &inputs {
        if let Some(offset) = attr(input, "offset").and_then(|s| s.parse::<usize>().ok()) {
            if offset >= inputs.len() {
                return None;
            }
            stride = stride.max(offset + 1);
        }
    }
    Some(stride)
}

fn read_polygons(kind: PrimitiveKind, stride: usize, element: &Element) -> DaeResult<Polygons> {
    let polygons = match kind {
        PrimitiveKind::Triangles => {
            let p: Vec<u32> = match find_child(element, "p") {
                Some(p) => parse_list(p)?,
                None => Vec::new(),
            };
            p.chunks_exact(stride * 3).map(<[u32]>::to_vec).collect()
        }
        PrimitiveKind::Polylist => {
            let vcount: Vec<usize> = match find_child(element, "vcount") {
                Some(v) => parse_list(v)?,
                None => Vec::new(),
            };
            let p: Vec<u32> = match find_child(element, "p") {
                Some(p) => parse_list(p)?,
                None => Vec::new(),
            };
            let mut polygons = Vec::with_capacity(vcount.len());
            let mut start = 0;
            for n in vcount {
                let end = n
                    .checked_mul(stride)
                    .and_then(|len| len.checked_add(start))
                    .filter(|&end| end <= p.len());
                let Some(end) = end else {
                    log::warn!("<polylist> <vcount> exceeds <p> length, truncating");
                    break;
                };
                polygons.push(p[start..end].to_vec());
                start = end;
            }
            polygons
        }
        PrimitiveKind::Polygons => {
            let mut polygons = Vec::new();
            for p in find_all_children(element, "p") {
                polygons.push(parse_list(p)?);
            }
            // Holes are ignored, only the outer ring of <ph> is kept.
            for ph in find_all_children(element, "ph") {
                if let Some(p) = find_child(ph, "p") {
                    polygons.push(parse_list(p)?);
                }
            }
            polygons
        }
    };

    Ok(Polygons { stride, polygons })
}

/// Fan triangulates the polygons and splits the corner tuples into per-stream indices.
fn build_triangle_set(
    geometry_id: &str,
    material: Option<String>,
    inputs: &[Input],
    polygons: &Polygons,
    sources: &HashMap<String, Source>,
) -> TriangleSet {
    let mut corners: Vec<&[u32]> = Vec::new();
    for polygon in &polygons.polygons {
        let ring: Vec<&[u32]> = polygon.chunks_exact(polygons.stride).collect();
        if ring.len() < 3 {
            continue;
        }
        for i in 1..ring.len() - 1 {
            corners.extend([ring[0], ring[i], ring[i + 1]]);
        }
    }

    let stream = |input: &Input| corner_stream(geometry_id, input, &corners, sources);

    let mut set = TriangleSet {
        material,
        ..Default::default()
    };
    for input in inputs {
        match input.semantic.as_str() {
            "POSITION" if set.positions.is_none() => {
                set.positions = stream(input).map(|(s, index)| IndexedStream {
                    data: s.elements::<3>(),
                    index,
                });
            }
            "NORMAL" if set.normals.is_none() => {
                set.normals = stream(input).map(|(s, index)| IndexedStream {
                    data: s.elements::<3>(),
                    index,
                });
            }
            "TEXCOORD" => {
                if let Some((s, index)) = stream(input) {
                    let set_index = input.set.unwrap_or(set.texcoords.len() as u32);
                    set.texcoords.push(TexcoordStream {
                        set: set_index,
                        stream: IndexedStream {
                            data: s.elements::<2>(),
                            index,
                        },
                    });
                }
            }
            _ => (),
        }
    }
    set
}

fn corner_stream<'s>(
    geometry_id: &str,
    input: &Input,
    corners: &[&[u32]],
    sources: &'s HashMap<String, Source>,
) -> Option<(&'s Source, Vec<u32>)> {
    let Some(source) = sources.get(&input.source) else {
        log::warn!(
            "Geometry '{}': {} input references missing source '{}'",
            geometry_id,
            input.semantic,
            input.source
        );
        return None;
    };
    let index = corners
        .iter()
        .map(|c| c.get(input.offset).copied().unwrap_or(0))
        .collect();
    Some((source, index))
}
