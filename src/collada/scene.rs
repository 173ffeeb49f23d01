//! `<library_visual_scenes>`, `<library_nodes>` and `<library_cameras>`.
use std::collections::HashMap;

use glam::{Mat4, Vec3};
use xmltree::Element;

use super::xml::{attr, children, find_all_children, find_child, parse_list, parse_single, url_fragment};
use crate::error::DaeResult;

/// Upper bound on `<instance_node>` expansions per visual scene. Acyclic references
/// can still fan out exponentially.
const MAX_INSTANCED_NODES: usize = 100_000;

/// Library nodes being expanded on the current path, and the expansion count so far.
#[derive(Default)]
struct Expansion {
    path: Vec<String>,
    expanded: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Perspective {
        xfov: Option<f32>,
        yfov: Option<f32>,
        aspect_ratio: Option<f32>,
    },
    Orthographic {
        xmag: Option<f32>,
        ymag: Option<f32>,
        aspect_ratio: Option<f32>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub id: String,
    pub name: Option<String>,
    pub projection: Projection,
    pub znear: Option<f32>,
    pub zfar: Option<f32>,
}

/// `<instance_material symbol target>` inside `<bind_material>`.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialBinding {
    pub symbol: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceGeometry {
    pub geometry: String,
    pub bindings: Vec<MaterialBinding>,
}

impl InstanceGeometry {
    /// Material id bound to a primitive's material symbol.
    pub fn material_for(&self, symbol: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|b| b.symbol == symbol)
            .map(|b| b.target.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: Option<String>,
    pub name: Option<String>,
    /// Local transform, already converted to column-major.
    pub local: Mat4,
    pub geometries: Vec<InstanceGeometry>,
    pub cameras: Vec<String>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisualScene {
    pub id: String,
    pub name: Option<String>,
    pub nodes: Vec<Node>,
}

pub fn parse_cameras(library: &Element) -> DaeResult<Vec<Camera>> {
    let mut cameras = Vec::new();
    for camera in find_all_children(library, "camera") {
        let Some(id) = attr(camera, "id") else {
            continue;
        };
        let Some(common) = find_child(camera, "optics").and_then(|o| find_child(o, "technique_common"))
        else {
            log::warn!("Camera '{}' has no <optics><technique_common>", id);
            continue;
        };
        let float = |parent: &Element, name: &str| -> DaeResult<Option<f32>> {
            match find_child(parent, name) {
                Some(e) => parse_single(e),
                None => Ok(None),
            }
        };
        let (projection, element) = if let Some(p) = find_child(common, "perspective") {
            (
                Projection::Perspective {
                    xfov: float(p, "xfov")?,
                    yfov: float(p, "yfov")?,
                    aspect_ratio: float(p, "aspect_ratio")?,
                },
                p,
            )
        } else if let Some(o) = find_child(common, "orthographic") {
            (
                Projection::Orthographic {
                    xmag: float(o, "xmag")?,
                    ymag: float(o, "ymag")?,
                    aspect_ratio: float(o, "aspect_ratio")?,
                },
                o,
            )
        } else {
            log::warn!("Camera '{}' is neither perspective nor orthographic", id);
            continue;
        };
        cameras.push(Camera {
            id: id.to_string(),
            name: attr(camera, "name").map(str::to_string),
            projection,
            znear: float(element, "znear")?,
            zfar: float(element, "zfar")?,
        });
    }
    Ok(cameras)
}

pub fn parse_visual_scenes(
    library: &Element,
    library_nodes: &HashMap<String, &Element>,
) -> DaeResult<Vec<VisualScene>> {
    let mut scenes = Vec::new();
    for scene in find_all_children(library, "visual_scene") {
        let mut expansion = Expansion::default();
        let mut nodes = Vec::new();
        for node in find_all_children(scene, "node") {
            nodes.push(parse_node(node, library_nodes, &mut expansion)?);
        }
        scenes.push(VisualScene {
            id: attr(scene, "id").unwrap_or_default().to_string(),
            name: attr(scene, "name").map(str::to_string),
            nodes,
        });
    }
    Ok(scenes)
}

fn parse_node(
    element: &Element,
    library_nodes: &HashMap<String, &Element>,
    expansion: &mut Expansion,
) -> DaeResult<Node> {
    let mut node = Node {
        id: attr(element, "id").map(str::to_string),
        name: attr(element, "name").map(str::to_string),
        local: Mat4::IDENTITY,
        geometries: Vec::new(),
        cameras: Vec::new(),
        children: Vec::new(),
    };

    for child in children(element) {
        match child.name.as_str() {
            "matrix" | "translate" | "rotate" | "scale" => {
                node.local *= parse_transform(child)?;
            }
            "lookat" | "skew" => {
                log::warn!("Node {:?}: <{}> transforms are not supported", node.id, child.name);
            }
            "node" => node
                .children
                .push(parse_node(child, library_nodes, expansion)?),
            "instance_node" => {
                let Some(url) = attr(child, "url").map(url_fragment) else {
                    continue;
                };
                let Some(target) = library_nodes.get(url).copied() else {
                    log::warn!("<instance_node> references unknown node '{}'", url);
                    continue;
                };
                if expansion.path.iter().any(|id| id == url) {
                    log::warn!("<instance_node> '{}' instances itself, skipping", url);
                    continue;
                }
                if expansion.expanded >= MAX_INSTANCED_NODES {
                    log::warn!(
                        "More than {} <instance_node> expansions, skipping '{}'",
                        MAX_INSTANCED_NODES,
                        url
                    );
                    continue;
                }
                expansion.expanded += 1;
                expansion.path.push(url.to_string());
                let instanced = parse_node(target, library_nodes, expansion);
                expansion.path.pop();
                node.children.push(instanced?);
            }
            "instance_geometry" => {
                if let Some(url) = attr(child, "url") {
                    node.geometries.push(InstanceGeometry {
                        geometry: url_fragment(url).to_string(),
                        bindings: parse_bindings(child),
                    });
                }
            }
            "instance_camera" => {
                if let Some(url) = attr(child, "url") {
                    node.cameras.push(url_fragment(url).to_string());
                }
            }
            "instance_controller" => {
                log::debug!("Node {:?}: controllers (skinning) are not imported", node.id);
            }
            _ => (),
        }
    }
    Ok(node)
}

fn parse_bindings(instance: &Element) -> Vec<MaterialBinding> {
    find_child(instance, "bind_material")
        .and_then(|b| find_child(b, "technique_common"))
        .map(|t| {
            find_all_children(t, "instance_material")
                .into_iter()
                .filter_map(|m| {
                    Some(MaterialBinding {
                        symbol: attr(m, "symbol")?.to_string(),
                        target: url_fragment(attr(m, "target")?).to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// COLLADA writes matrices row-major, glam stores them column-major.
fn parse_transform(element: &Element) -> DaeResult<Mat4> {
    let v: Vec<f32> = parse_list(element)?;
    let transform = match (element.name.as_str(), v.as_slice()) {
        ("matrix", [..]) if v.len() >= 16 => {
            let mut m = [0.0; 16];
            m.copy_from_slice(&v[..16]);
            Mat4::from_cols_array(&m).transpose()
        }
        ("translate", [x, y, z, ..]) => Mat4::from_translation(Vec3::new(*x, *y, *z)),
        ("scale", [x, y, z, ..]) => Mat4::from_scale(Vec3::new(*x, *y, *z)),
        ("rotate", [x, y, z, angle, ..]) => {
            let axis = Vec3::new(*x, *y, *z).normalize_or_zero();
            if axis == Vec3::ZERO {
                Mat4::IDENTITY
            } else {
                Mat4::from_axis_angle(axis, angle.to_radians())
            }
        }
        _ => {
            log::warn!("Ignoring malformed <{}> with {} values", element.name, v.len());
            Mat4::IDENTITY
        }
    };
    Ok(transform)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec4;

    fn parse(xml: &str) -> Element {
        Element::parse(xml.as_bytes()).unwrap()
    }

    #[test]
    fn matrix_is_transposed() {
        let m = parse_transform(&parse("<matrix>1 0 0 5 0 1 0 6 0 0 1 7 0 0 0 1</matrix>")).unwrap();
        assert_eq!(Vec4::new(5.0, 6.0, 7.0, 1.0), m.w_axis);
    }

    #[test]
    fn transforms_compose_in_order() {
        let library = parse(
            r##"<library_visual_scenes>
                 <visual_scene id="s">
                   <node id="n">
                     <translate>1 0 0</translate>
                     <rotate>0 0 1 90</rotate>
                     <scale>2 2 2</scale>
                     <instance_geometry url="#g">
                       <bind_material><technique_common>
                         <instance_material symbol="mat0" target="#red"/>
                       </technique_common></bind_material>
                     </instance_geometry>
                   </node>
                 </visual_scene>
               </library_visual_scenes>"##,
        );
        let scenes = parse_visual_scenes(&library, &HashMap::new()).unwrap();
        let node = &scenes[0].nodes[0];
        let p = node.local.transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(1.0, p.x, epsilon = 1e-5);
        assert_relative_eq!(2.0, p.y, epsilon = 1e-5);
        assert_eq!("g", node.geometries[0].geometry);
        assert_eq!(Some("red"), node.geometries[0].material_for("mat0"));
        assert_eq!(None, node.geometries[0].material_for("mat1"));
    }

    fn expand(library: &str, scene: &str) -> Vec<VisualScene> {
        let nodes = parse(library);
        let library_nodes: HashMap<String, &Element> = find_all_children(&nodes, "node")
            .into_iter()
            .map(|n| (attr(n, "id").unwrap().to_string(), n))
            .collect();
        parse_visual_scenes(&parse(scene), &library_nodes).unwrap()
    }

    fn count(node: &Node) -> usize {
        1 + node.children.iter().map(count).sum::<usize>()
    }

    const INSTANCE_A: &str = r##"<library_visual_scenes><visual_scene id="s">
          <node id="root"><instance_node url="#a"/></node>
        </visual_scene></library_visual_scenes>"##;

    #[test]
    fn self_instancing_node_is_expanded_once() {
        let scenes = expand(
            r##"<library_nodes>
                  <node id="a"><instance_node url="#a"/><instance_node url="#a"/></node>
                </library_nodes>"##,
            INSTANCE_A,
        );
        let root = &scenes[0].nodes[0];
        assert_eq!(2, count(root));
        assert_eq!(Some("a"), root.children[0].id.as_deref());
        assert!(root.children[0].children.is_empty());
    }

    #[test]
    fn mutual_instancing_stops_at_the_cycle() {
        let scenes = expand(
            r##"<library_nodes>
                  <node id="a"><instance_node url="#b"/><node id="inner"><instance_node url="#a"/></node></node>
                  <node id="b"><instance_node url="#a"/><instance_node url="#b"/></node>
                </library_nodes>"##,
            INSTANCE_A,
        );
        // root -> a -> (b, inner); both back references are dropped.
        let root = &scenes[0].nodes[0];
        assert_eq!(4, count(root));
        let a = &root.children[0];
        assert_eq!(Some("b"), a.children[0].id.as_deref());
        assert!(a.children[0].children.is_empty());
        assert_eq!(Some("inner"), a.children[1].id.as_deref());
        assert!(a.children[1].children.is_empty());
    }

    #[test]
    fn shared_library_node_is_instanced_each_time() {
        let scenes = expand(
            r##"<library_nodes>
                  <node id="leaf"/>
                  <node id="a"><instance_node url="#leaf"/><instance_node url="#leaf"/></node>
                </library_nodes>"##,
            r##"<library_visual_scenes><visual_scene id="s">
                  <node id="root"><instance_node url="#a"/><instance_node url="#a"/></node>
                </visual_scene></library_visual_scenes>"##,
        );
        assert_eq!(7, count(&scenes[0].nodes[0]));
    }

    #[test]
    fn perspective_camera() {
        let cameras = parse_cameras(&parse(
            r#"<library_cameras>
                 <camera id="cam" name="Camera">
                   <optics><technique_common><perspective>
                     <xfov>45</xfov><aspect_ratio>1.5</aspect_ratio><znear>0.5</znear>
                   </perspective></technique_common></optics>
                 </camera>
               </library_cameras>"#,
        ))
        .unwrap();
        assert_eq!(
            Projection::Perspective {
                xfov: Some(45.0),
                yfov: None,
                aspect_ratio: Some(1.5)
            },
            cameras[0].projection
        );
        assert_eq!(Some(0.5), cameras[0].znear);
        assert_eq!(None, cameras[0].zfar);
    }
}
