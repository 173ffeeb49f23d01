//! `<library_materials>`, `<library_effects>` and `<library_images>`.
use std::collections::HashMap;

use xmltree::Element;

use super::xml::{
    attr, children, descendants, find_all_children, find_child, get_element_text, parse_list,
    parse_single, url_fragment,
};
use crate::error::DaeResult;

/// A `<texture>` reference after sampler and surface params have been followed.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureRef {
    /// Raw `texture` attribute.
    pub texture: String,
    pub texcoord: Option<String>,
    /// Id of the `<image>` the sampler chain ends at, if it could be followed.
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColorOrTexture {
    Color([f32; 4]),
    Texture(TextureRef),
}

/// A `profile_COMMON` effect. The shading tag is kept verbatim so unknown models
/// survive parsing and can be reported per material.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Effect {
    pub id: String,
    pub shading: String,
    pub emission: Option<ColorOrTexture>,
    pub diffuse: Option<ColorOrTexture>,
    pub specular: Option<ColorOrTexture>,
    pub shininess: Option<f32>,
    pub reflective: Option<ColorOrTexture>,
    pub reflectivity: Option<f32>,
    pub transparency: Option<f32>,
    pub index_of_refraction: Option<f32>,
    /// `profile` attributes of every `<extra><technique>` inside the effect.
    pub extra_profiles: Vec<String>,
}

impl Effect {
    pub fn has_extra_profile(&self, profile: &str) -> bool {
        self.extra_profiles.iter().any(|p| p == profile)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub id: String,
    pub name: Option<String>,
    pub effect: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub id: String,
    pub name: Option<String>,
    pub init_from: Option<String>,
}

pub fn parse_materials(library: &Element) -> Vec<Material> {
    find_all_children(library, "material")
        .into_iter()
        .filter_map(|material| {
            let id = attr(material, "id")?;
            Some(Material {
                id: id.to_string(),
                name: attr(material, "name").map(str::to_string),
                effect: find_child(material, "instance_effect")
                    .and_then(|e| attr(e, "url"))
                    .map(|url| url_fragment(url).to_string()),
            })
        })
        .collect()
}

pub fn parse_images(library: &Element) -> Vec<Image> {
    find_all_children(library, "image")
        .into_iter()
        .filter_map(|image| {
            let id = attr(image, "id")?;
            Some(Image {
                id: id.to_string(),
                name: attr(image, "name").map(str::to_string),
                init_from: find_child(image, "init_from").and_then(init_from_text),
            })
        })
        .collect()
}

/// `<init_from>` holds the path directly in 1.4 and inside `<ref>` in 1.5.
fn init_from_text(init_from: &Element) -> Option<String> {
    find_child(init_from, "ref")
        .and_then(get_element_text)
        .or_else(|| get_element_text(init_from))
        .map(|s| s.trim().to_string())
}

pub fn parse_effects(library: &Element) -> DaeResult<Vec<Effect>> {
    let mut effects = Vec::new();
    for effect in find_all_children(library, "effect") {
        let Some(id) = attr(effect, "id") else {
            continue;
        };
        let Some(profile) = find_child(effect, "profile_COMMON") else {
            log::warn!("Effect '{}' has no profile_COMMON, only common profiles are imported", id);
            continue;
        };
        effects.push(parse_profile_common(id, effect, profile)?);
    }
    Ok(effects)
}

fn parse_profile_common(id: &str, effect: &Element, profile: &Element) -> DaeResult<Effect> {
    let params: HashMap<&str, &Element> = find_all_children(profile, "newparam")
        .into_iter()
        .filter_map(|p| Some((attr(p, "sid")?, p)))
        .collect();

    let mut extras = Vec::new();
    descendants(effect, "extra", &mut extras);
    let extra_profiles = extras
        .iter()
        .flat_map(|extra| find_all_children(extra, "technique"))
        .filter_map(|t| attr(t, "profile").map(str::to_string))
        .collect();

    let mut result = Effect {
        id: id.to_string(),
        extra_profiles,
        ..Default::default()
    };

    let Some(shader) = find_child(profile, "technique").and_then(|t| {
        children(t).find(|c| c.name != "extra" && c.name != "asset" && c.name != "image")
    }) else {
        log::warn!("Effect '{}' has no shading technique", id);
        return Ok(result);
    };
    result.shading = shader.name.clone();

    let channel = |name: &str| -> DaeResult<Option<ColorOrTexture>> {
        match find_child(shader, name) {
            Some(element) => parse_color_or_texture(element, &params),
            None => Ok(None),
        }
    };
    let float = |name: &str| -> DaeResult<Option<f32>> {
        match find_child(shader, name).and_then(|e| find_child(e, "float")) {
            Some(element) => parse_single(element),
            None => Ok(None),
        }
    };

    result.emission = channel("emission")?;
    result.diffuse = channel("diffuse")?;
    result.specular = channel("specular")?;
    result.shininess = float("shininess")?;
    result.reflective = channel("reflective")?;
    result.reflectivity = float("reflectivity")?;
    result.transparency = float("transparency")?;
    result.index_of_refraction = float("index_of_refraction")?;
    Ok(result)
}

fn parse_color_or_texture(
    element: &Element,
    params: &HashMap<&str, &Element>,
) -> DaeResult<Option<ColorOrTexture>> {
    if let Some(color) = find_child(element, "color") {
        let values: Vec<f32> = parse_list(color)?;
        let mut rgba = [0.0, 0.0, 0.0, 1.0];
        for (c, v) in rgba.iter_mut().zip(values) {
            *c = v;
        }
        return Ok(Some(ColorOrTexture::Color(rgba)));
    }
    if let Some(texture) = find_child(element, "texture") {
        let Some(name) = attr(texture, "texture") else {
            return Ok(None);
        };
        return Ok(Some(ColorOrTexture::Texture(TextureRef {
            texture: name.to_string(),
            texcoord: attr(texture, "texcoord").map(str::to_string),
            image: follow_sampler(name, params),
        })));
    }
    Ok(None)
}

/// Follows sampler2D -> surface -> init_from. A texture naming no param is taken
/// to be an image id, which some exporters write directly.
fn follow_sampler(texture: &str, params: &HashMap<&str, &Element>) -> Option<String> {
    let Some(sampler_param) = params.get(texture) else {
        return Some(texture.to_string());
    };
    let sampler = find_child(sampler_param, "sampler2D")?;
    if let Some(instance) = find_child(sampler, "instance_image") {
        return attr(instance, "url").map(|u| url_fragment(u).to_string());
    }
    let surface_sid = find_child(sampler, "source").and_then(get_element_text)?;
    let surface = params
        .get(surface_sid.trim())
        .and_then(|p| find_child(p, "surface"))?;
    find_child(surface, "init_from")
        .and_then(get_element_text)
        .map(|s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> Element {
        Element::parse(xml.as_bytes()).unwrap()
    }

    const EFFECTS: &str = r#"
        <library_effects>
          <effect id="brick-fx">
            <profile_COMMON>
              <newparam sid="brick-surface"><surface type="2D"><init_from>brick-img</init_from></surface></newparam>
              <newparam sid="brick-sampler"><sampler2D><source>brick-surface</source></sampler2D></newparam>
              <technique sid="common">
                <phong>
                  <emission><color>0.3 0.6 0.9 1</color></emission>
                  <diffuse><texture texture="brick-sampler" texcoord="UVSET0"/></diffuse>
                  <specular><color>1 1 1 1</color></specular>
                  <shininess><float sid="shininess">20</float></shininess>
                  <transparency><float>0.5</float></transparency>
                </phong>
              </technique>
              <extra><technique profile="GOOGLEEARTH"><double_sided>1</double_sided></technique></extra>
            </profile_COMMON>
          </effect>
          <effect id="toon-fx">
            <profile_COMMON><technique sid="common"><toon/></technique></profile_COMMON>
          </effect>
        </library_effects>"#;

    #[test]
    fn sampler_chain_resolves_to_image() {
        let effects = parse_effects(&parse(EFFECTS)).unwrap();
        let effect = &effects[0];
        assert_eq!("phong", effect.shading);
        match &effect.diffuse {
            Some(ColorOrTexture::Texture(t)) => {
                assert_eq!("brick-sampler", t.texture);
                assert_eq!(Some("UVSET0".to_string()), t.texcoord);
                assert_eq!(Some("brick-img".to_string()), t.image);
            }
            other => panic!("unexpected diffuse {other:?}"),
        }
        assert_eq!(Some(20.0), effect.shininess);
        assert_eq!(Some(0.5), effect.transparency);
        assert_eq!(None, effect.reflectivity);
        assert!(effect.has_extra_profile("GOOGLEEARTH"));
    }

    #[test]
    fn unknown_shading_tag_is_kept() {
        let effects = parse_effects(&parse(EFFECTS)).unwrap();
        assert_eq!("toon", effects[1].shading);
    }

    #[test]
    fn ambient_and_transparent_are_not_read() {
        let effects = parse_effects(&parse(
            r#"<library_effects><effect id="fx"><profile_COMMON><technique sid="common">
                 <blinn>
                   <ambient><color>not a colour</color></ambient>
                   <diffuse><color>0.1 0.2 0.3 1</color></diffuse>
                   <transparent><color>x</color></transparent>
                 </blinn>
               </technique></profile_COMMON></effect></library_effects>"#,
        ))
        .unwrap();
        assert_eq!("blinn", effects[0].shading);
        assert_eq!(
            Some(ColorOrTexture::Color([0.1, 0.2, 0.3, 1.0])),
            effects[0].diffuse
        );
    }

    #[test]
    fn bare_texture_is_image_id() {
        let element = parse(r#"<diffuse><texture texture="img0" texcoord="t"/></diffuse>"#);
        let channel = parse_color_or_texture(&element, &HashMap::new()).unwrap();
        assert!(matches!(
            channel,
            Some(ColorOrTexture::Texture(TextureRef { image: Some(ref id), .. })) if id == "img0"
        ));
    }

    #[test]
    fn image_init_from_ref() {
        let images = parse_images(&parse(
            r#"<library_images>
                 <image id="a"><init_from>tex/a.png</init_from></image>
                 <image id="b"><init_from><ref>tex/b.png</ref></init_from></image>
               </library_images>"#,
        ));
        assert_eq!(Some("tex/a.png".to_string()), images[0].init_from);
        assert_eq!(Some("tex/b.png".to_string()), images[1].init_from);
    }

    #[test]
    fn material_effect_url() {
        let materials = parse_materials(&parse(
            r##"<library_materials><material id="m" name="Brick"><instance_effect url="#brick-fx"/></material></library_materials>"##,
        ));
        assert_eq!(Some("brick-fx".to_string()), materials[0].effect);
    }
}
