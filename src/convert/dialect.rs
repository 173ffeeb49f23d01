//! Recognises the tool that wrote a document and selects its decoding overrides.
//!
//! Profiles are tried in registration order and the first match wins. A document
//! matching no profile is decoded with the standard rules.
use crate::collada::Document;

/// One piece of evidence that a document was written by a given tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Any `<contributor><authoring_tool>` contains the marker.
    AuthoringToolContains(String),
    /// An `<extra><technique profile="...">` with this profile exists anywhere.
    ExtraTechnique(String),
}

impl Signal {
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Signal::AuthoringToolContains(marker) => document
                .asset
                .authoring_tools
                .iter()
                .any(|tool| tool.contains(marker.as_str())),
            Signal::ExtraTechnique(profile) => document.has_extra_profile(profile),
        }
    }
}

/// Behaviour that replaces the standard material rules for a dialect.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DialectOverrides {
    /// A diffuse texture whose image has an alpha channel turns on premultiplied alpha
    /// blending and drives the material alpha from the texture.
    pub premultiplied_texture_alpha: bool,
    /// Reflectivity is ignored on effects carrying an extra technique with this profile.
    pub suppress_reflectivity_profile: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialectProfile {
    pub name: String,
    /// Any matching signal selects the profile.
    pub signals: Vec<Signal>,
    pub overrides: DialectOverrides,
}

impl DialectProfile {
    pub fn matches(&self, document: &Document) -> bool {
        self.signals.iter().any(|s| s.matches(document))
    }
}

/// The decoding rules chosen for one document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dialect {
    /// Name of the matched profile, `None` for standard COLLADA.
    pub profile: Option<String>,
    pub overrides: DialectOverrides,
}

impl Dialect {
    pub fn standard() -> Self {
        Self::default()
    }

    pub fn name(&self) -> &str {
        self.profile.as_deref().unwrap_or("standard")
    }
}

/// Ordered list of known dialect profiles.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DialectRegistry {
    profiles: Vec<DialectProfile>,
}

impl DialectRegistry {
    pub fn new(profiles: Vec<DialectProfile>) -> Self {
        Self { profiles }
    }

    /// Profiles for the exporters known to need special handling.
    pub fn builtin() -> Self {
        Self::new(vec![sketchup()])
    }

    pub fn profiles(&self) -> &[DialectProfile] {
        &self.profiles
    }

    pub fn detect(&self, document: &Document) -> Dialect {
        match self.profiles.iter().find(|p| p.matches(document)) {
            Some(profile) => {
                log::info!("Detected {} COLLADA dialect", profile.name);
                Dialect {
                    profile: Some(profile.name.clone()),
                    overrides: profile.overrides.clone(),
                }
            }
            None => Dialect::standard(),
        }
    }
}

/// SketchUp and Google Earth exports. PNG textures rely on their alpha channel and
/// the reflectivity they write is not meant to be rendered.
fn sketchup() -> DialectProfile {
    DialectProfile {
        name: "SketchUp".to_string(),
        signals: vec![
            Signal::AuthoringToolContains("SketchUp".to_string()),
            Signal::AuthoringToolContains("Google".to_string()),
            Signal::ExtraTechnique("GOOGLEEARTH".to_string()),
        ],
        overrides: DialectOverrides {
            premultiplied_texture_alpha: true,
            suppress_reflectivity_profile: Some("GOOGLEEARTH".to_string()),
        },
    }
}
