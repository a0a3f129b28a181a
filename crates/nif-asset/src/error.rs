use std::{fmt, path::PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImportError>;

/// Coarse classification of a failed run, for callers that present errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Format,
    UnsupportedVersion,
    FieldNotFound,
    FieldType,
    MissingData,
    NonUniformScale,
    InvalidParams,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Format => "format error",
            ErrorKind::UnsupportedVersion => "unsupported version",
            ErrorKind::FieldNotFound => "field not found",
            ErrorKind::FieldType => "field type mismatch",
            ErrorKind::MissingData => "missing data",
            ErrorKind::NonUniformScale => "non-uniform scale",
            ErrorKind::InvalidParams => "invalid import parameters",
            ErrorKind::Io => "i/o error",
        };
        f.write_str(name)
    }
}

/// Fatal failure of an import run.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("not a NIF file: {0}")]
    Format(String),
    #[error("unsupported NIF version {0}")]
    UnsupportedVersion(String),
    #[error("block {block} ({block_type}) has no field {field:?}")]
    FieldNotFound {
        block: usize,
        block_type: &'static str,
        field: String,
    },
    #[error("field {field:?} is not a {expected}")]
    FieldType {
        field: String,
        expected: &'static str,
    },
    #[error("{message} (node {node:?})")]
    MissingData { node: String, message: String },
    #[error("non-uniform scale {scale:?} on node {node:?}")]
    NonUniformScale { node: String, scale: [f32; 3] },
    #[error("invalid import parameters: {0}")]
    InvalidParams(String),
    #[error("malformed block stream: {0}")]
    Decode(#[from] binrw::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ImportError {
    pub(crate) fn missing_data(node: impl Into<String>, message: impl Into<String>) -> Self {
        ImportError::MissingData {
            node: node.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ImportError::Format(_) | ImportError::Decode(_) => ErrorKind::Format,
            ImportError::UnsupportedVersion(_) => ErrorKind::UnsupportedVersion,
            ImportError::FieldNotFound { .. } => ErrorKind::FieldNotFound,
            ImportError::FieldType { .. } => ErrorKind::FieldType,
            ImportError::MissingData { .. } => ErrorKind::MissingData,
            ImportError::NonUniformScale { .. } => ErrorKind::NonUniformScale,
            ImportError::InvalidParams(_) => ErrorKind::InvalidParams,
            ImportError::Io(_) => ErrorKind::Io,
        }
    }

    /// Resolved name of the node the failure is attached to, if any.
    pub fn node(&self) -> Option<&str> {
        match self {
            ImportError::MissingData { node, .. } | ImportError::NonUniformScale { node, .. } => {
                Some(node)
            }
            _ => None,
        }
    }
}

/// Texture failures. These never abort a run: the importer logs them and
/// substitutes a placeholder image.
#[derive(Debug, Error)]
pub enum TextureError {
    #[error("unsupported pixel format {0}")]
    UnsupportedPixelFormat(u32),
    #[error("pixel data holds {actual} bytes, {expected} needed")]
    Truncated { expected: usize, actual: usize },
    #[error("texture {0:?} not found and no alternate available")]
    NotFound(String),
    #[error("cannot read image {path:?}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
}
