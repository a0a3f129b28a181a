use std::sync::Arc;

use modular_bitfield::prelude::*;

use crate::{index::AssetIndex, texture::TextureAsset};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MaterialAlphaMode {
    #[default]
    Opaque,
    Blend,
}

/// Material channels a texture slot feeds.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureMapTo {
    pub color: bool,
    pub emit: bool,
    pub alpha: bool,
    #[skip]
    __: B5,
}

#[derive(Debug, Clone)]
pub struct TextureInfo {
    pub texture: Arc<TextureAsset>,
    pub map_to: TextureMapTo,
    /// Read transparency from the image's alpha channel.
    pub use_alpha: bool,
    /// Derive alpha from colour intensity.
    pub calc_alpha: bool,
    pub blend_factor: f32,
}

impl TextureInfo {
    pub(crate) fn from_texture(texture: Arc<TextureAsset>, map_to: TextureMapTo) -> Self {
        Self {
            texture,
            map_to,
            use_alpha: false,
            calc_alpha: false,
            blend_factor: 1.0,
        }
    }
}

/// Simplified lighting model: ambient and emission are scalar fractions of
/// the diffuse colour.
#[derive(Debug, Clone)]
pub struct MaterialAsset {
    pub id: AssetIndex,
    pub name: String,
    pub diffuse_color: [f32; 3],
    pub specular_color: [f32; 3],
    pub specular_intensity: f32,
    pub ambient: f32,
    pub emit: f32,
    pub hardness: u16,
    pub alpha: f32,
    pub alpha_mode: MaterialAlphaMode,
    pub base_texture: Option<TextureInfo>,
    pub glow_texture: Option<TextureInfo>,
}

impl MaterialAsset {
    pub fn has_textures(&self) -> bool {
        self.base_texture.is_some() || self.glow_texture.is_some()
    }
}
