use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading, converting or writing COLLADA documents.
///
/// Only [DaeError::Io] and [DaeError::Xml] escape a document import. Everything
/// else is handled at primitive, material or texture granularity by the importer.
#[derive(Debug, Error)]
pub enum DaeError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse COLLADA XML: {0}")]
    Xml(#[from] xmltree::ParseError),

    #[error("root element is <{0}>, expected <COLLADA>")]
    NotCollada(String),

    #[error("<{parent}> is missing required <{child}>")]
    MissingElement { parent: String, child: String },

    #[error("invalid number {value:?} in <{element}>")]
    InvalidNumber { element: String, value: String },

    #[error("unknown shading model <{0}>")]
    UnknownShadingModel(String),

    #[error("primitive has no usable triangles: {0}")]
    DegeneratePrimitive(String),

    #[error("reference {0:?} does not resolve to any element")]
    BrokenReference(String),

    #[error("failed to load image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to write COLLADA XML: {0}")]
    Write(#[from] xmltree::Error),
}

impl DaeError {
    pub(crate) fn missing(parent: &str, child: &str) -> Self {
        Self::MissingElement {
            parent: parent.to_string(),
            child: child.to_string(),
        }
    }
}

pub type DaeResult<T> = std::result::Result<T, DaeError>;
