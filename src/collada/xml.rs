//! Small helpers over `xmltree` used by the document model.
use std::str::FromStr;

use xmltree::{Element, XMLNode};

use crate::error::{DaeError, DaeResult};

pub fn find_child<'a>(element: &'a Element, name: &str) -> Option<&'a Element> {
    children(element).find(|child| child.name == name)
}

pub fn find_all_children<'a>(element: &'a Element, name: &str) -> Vec<&'a Element> {
    children(element).filter(|child| child.name == name).collect()
}

/// All element children in document order, skipping text and comments.
pub fn children(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(|node| match node {
        XMLNode::Element(child) => Some(child),
        _ => None,
    })
}

/// Concatenated text and CDATA content of an element.
pub fn get_element_text(element: &Element) -> Option<String> {
    let mut text = String::new();
    for node in &element.children {
        match node {
            XMLNode::Text(t) | XMLNode::CData(t) => {
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(t);
            }
            _ => (),
        }
    }
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

pub fn attr<'a>(element: &'a Element, name: &str) -> Option<&'a str> {
    element.attributes.get(name).map(String::as_str)
}

/// Strips the leading `#` of a local URI fragment.
pub fn url_fragment(url: &str) -> &str {
    url.trim().trim_start_matches('#')
}

/// Parses the whitespace separated contents of a list element such as `<float_array>` or `<p>`.
pub fn parse_list<T: FromStr>(element: &Element) -> DaeResult<Vec<T>> {
    let Some(text) = get_element_text(element) else {
        return Ok(Vec::new());
    };
    text.split_whitespace()
        .map(|s| {
            s.parse().map_err(|_| DaeError::InvalidNumber {
                element: element.name.clone(),
                value: s.to_string(),
            })
        })
        .collect()
}

/// Parses the first value of a single-valued element such as `<float>` or `<znear>`.
pub fn parse_single<T: FromStr>(element: &Element) -> DaeResult<Option<T>> {
    Ok(parse_list(element)?.into_iter().next())
}

/// Depth first search for every element with the given name.
pub fn descendants<'a>(element: &'a Element, name: &str, out: &mut Vec<&'a Element>) {
    for child in children(element) {
        if child.name == name {
            out.push(child);
        }
        descendants(child, name, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(xml: &str) -> Element {
        Element::parse(xml.as_bytes()).unwrap()
    }

    #[test]
    fn parse_float_list() {
        let e = element("<float_array count=\"4\">1 2.5\n -3 4e1</float_array>");
        assert_eq!(vec![1.0f32, 2.5, -3.0, 40.0], parse_list::<f32>(&e).unwrap());
    }

    #[test]
    fn parse_empty_list() {
        let e = element("<p/>");
        assert!(parse_list::<u32>(&e).unwrap().is_empty());
    }

    #[test]
    fn parse_invalid_number() {
        let e = element("<p>1 two 3</p>");
        assert!(matches!(
            parse_list::<u32>(&e),
            Err(DaeError::InvalidNumber { value, .. }) if value == "two"
        ));
    }

    #[test]
    fn find_descendants() {
        let e = element("<a><extra><b/></extra><c><extra/></c></a>");
        let mut found = Vec::new();
        descendants(&e, "extra", &mut found);
        assert_eq!(2, found.len());
    }

    #[test]
    fn strip_url_fragment() {
        assert_eq!("geom-1", url_fragment("#geom-1"));
        assert_eq!("geom-1", url_fragment("geom-1"));
    }
}
