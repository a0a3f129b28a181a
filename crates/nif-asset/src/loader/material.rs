use std::sync::Arc;

use log::{debug, warn};

use crate::{
    error::{ImportError, Result},
    format::block::{Block, BlockData},
    index::SourceAssetType,
    material::{MaterialAlphaMode, MaterialAsset, TextureInfo, TextureMapTo},
    texture::TextureAsset,
    EPSILON,
};

use super::{
    dedup::{
        texture_slot, MaterialFingerprint, MaterialProperties, TextureFingerprint, BASE_MAP,
        GLOW_MAP,
    },
    names::OBJECT_NAME_LENGTH,
    session::ConversionSession,
};

const MAX_HARDNESS: i32 = 511;

/// Average ratio of `color` to the diffuse colour over the channels where
/// the diffuse colour is not black.
fn diffuse_ratio(color: [f32; 3], diffuse: [f32; 3]) -> f32 {
    let mut sum = 0.0;
    let mut count = 0;
    for (channel, base) in color.iter().zip(diffuse) {
        if base > EPSILON {
            sum += channel / base;
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    (sum / count as f32).clamp(0.0, 1.0)
}

fn hardness(glossiness: f32) -> u16 {
    ((glossiness * 4.0) as i32).clamp(1, MAX_HARDNESS) as u16
}

impl<'a> ConversionSession<'a> {
    /// Material for a set of properties, shared with every earlier geometry
    /// whose properties look the same.
    pub(super) fn convert_material(
        &mut self,
        properties: &MaterialProperties<'a>,
    ) -> Result<Arc<MaterialAsset>> {
        let graph = self.graph;
        let fingerprint = MaterialFingerprint::new(graph, properties)?;
        if let Some(material) = self.dedup.material(&fingerprint) {
            debug!("Reusing material {:?}", material.name);
            return Ok(material);
        }

        let block = properties.material;
        let name = self.names.resolve(block.name(), OBJECT_NAME_LENGTH);
        let BlockData::Material(record) = &block.data else {
            return Err(ImportError::missing_data(name, "material property has no material"));
        };
        let id = self.asset_id(SourceAssetType::Material, block);
        debug!("Creating material {:?} as {}", name, id);

        let mut material = MaterialAsset {
            id,
            name,
            diffuse_color: record.diffuse,
            specular_color: record.specular,
            specular_intensity: if properties.specular.is_some() { 1.0 } else { 0.0 },
            ambient: diffuse_ratio(record.ambient, record.diffuse),
            emit: diffuse_ratio(record.emissive, record.diffuse),
            hardness: hardness(record.glossiness),
            alpha: 1.0,
            alpha_mode: MaterialAlphaMode::Opaque,
            base_texture: None,
            glow_texture: None,
        };

        if let Some(texturing) = properties.texturing {
            if let Some(texture) = self.slot_texture(texturing, BASE_MAP)? {
                material.base_texture = Some(TextureInfo::from_texture(
                    texture,
                    TextureMapTo::new().with_color(true),
                ));
            }
            if let Some(texture) = self.slot_texture(texturing, GLOW_MAP)? {
                let mut glow = TextureInfo::from_texture(
                    texture,
                    TextureMapTo::new().with_color(true).with_emit(true),
                );
                glow.calc_alpha = true;
                material.glow_texture = Some(glow);
            }
        }

        if properties.alpha.is_some() {
            material.alpha_mode = MaterialAlphaMode::Blend;
            material.alpha = record.alpha;
            if let Some(base) = &mut material.base_texture {
                if base.texture.has_alpha() {
                    // Transparency comes from the image instead.
                    base.use_alpha = true;
                    base.map_to.set_alpha(true);
                    base.blend_factor = record.alpha;
                    material.alpha = 0.0;
                }
            }
        }

        Ok(self.dedup.insert_material(fingerprint, material))
    }

    /// Texture of a texturing slot, loaded once per distinct source texture.
    fn slot_texture(
        &mut self,
        texturing: &Block,
        slot: usize,
    ) -> Result<Option<Arc<TextureAsset>>> {
        let graph = self.graph;
        let Some(desc) = texture_slot(texturing, slot) else {
            return Ok(None);
        };
        let Some(source) = graph.resolve(desc.source) else {
            warn!("Texture slot {} of {:?} has no source", slot, texturing.name());
            return Ok(None);
        };
        let fingerprint = TextureFingerprint::new(source)?;
        if let Some(texture) = self.dedup.texture(&fingerprint) {
            return Ok(Some(texture));
        }
        let id = self.asset_id(SourceAssetType::Texture, source);
        let texture = self.textures.load(graph, source, id, &mut *self.progress);
        Ok(Some(self.dedup.insert_texture(fingerprint, texture)))
    }
}
