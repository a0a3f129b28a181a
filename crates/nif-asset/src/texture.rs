use std::path::PathBuf;

use crate::index::AssetIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureAssetFormat {
    Rgbu8,
    Rgbau8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureSource {
    File(PathBuf),
    /// Pixels decoded from a pixel data block.
    Embedded { block: usize },
    /// Stand-in for an image that could not be loaded.
    Placeholder { intended_path: Option<PathBuf> },
}

/// Top-down pixel rows.
#[derive(Debug, Clone)]
pub struct TextureAsset {
    pub id: AssetIndex,
    pub source: TextureSource,
    pub size: (u32, u32),
    pub format: TextureAssetFormat,
    pub data: Vec<u8>,
}

impl TextureAsset {
    pub fn placeholder(id: AssetIndex, intended_path: Option<PathBuf>) -> Self {
        Self {
            id,
            source: TextureSource::Placeholder { intended_path },
            size: (1, 1),
            format: TextureAssetFormat::Rgbu8,
            data: vec![0; 3],
        }
    }

    pub fn has_alpha(&self) -> bool {
        self.format == TextureAssetFormat::Rgbau8
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.source, TextureSource::Placeholder { .. })
    }
}
