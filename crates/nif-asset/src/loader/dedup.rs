use std::{collections::HashMap, sync::Arc};

use glam::Vec3;

use crate::{
    error::Result,
    format::{
        block::{Block, BlockData, BlockType},
        graph::BlockGraph,
        record::TexDescRecord,
    },
    material::MaterialAsset,
    texture::TextureAsset,
};

pub const BASE_MAP: usize = 0;
pub const GLOW_MAP: usize = 4;

/// Quantize a float to steps of 1/200.
pub fn float_hash(x: f32) -> i64 {
    (x * 200.0) as i64
}

fn float3_hash(x: Vec3) -> [i64; 3] {
    [float_hash(x.x), float_hash(x.y), float_hash(x.z)]
}

fn link_hash(block: &Block, field: &str) -> Result<Option<usize>> {
    Ok(block.field(field)?.as_link(field)?.index())
}

fn int_field(block: &Block, field: &str) -> Result<i64> {
    block.field(field)?.as_int(field)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureFingerprint {
    controller: Option<usize>,
    file_name: Option<String>,
    pixel_data: Option<usize>,
    pixel_layout: i64,
    use_mipmaps: i64,
    alpha_format: i64,
}

impl TextureFingerprint {
    pub fn new(source: &Block) -> Result<Self> {
        let file_name = match source.field("File Name") {
            Ok(value) => Some(value.as_str("File Name")?.to_string()),
            Err(_) => None,
        };
        let pixel_data = match source.field("Pixel Data") {
            Ok(value) => value.as_link("Pixel Data")?.index(),
            Err(_) => None,
        };
        Ok(Self {
            controller: link_hash(source, "Controller")?,
            file_name,
            pixel_data,
            pixel_layout: int_field(source, "Pixel Layout")?,
            use_mipmaps: int_field(source, "Use Mipmaps")?,
            alpha_format: int_field(source, "Alpha Format")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TexDescFingerprint {
    clamp_mode: u32,
    filter_mode: u32,
    source: Option<TextureFingerprint>,
}

impl TexDescFingerprint {
    fn new(graph: &BlockGraph, desc: &TexDescRecord) -> Result<Self> {
        let source = match graph.resolve(desc.source) {
            Some(source) => Some(TextureFingerprint::new(source)?),
            None => None,
        };
        Ok(Self {
            clamp_mode: desc.clamp_mode,
            filter_mode: desc.filter_mode,
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MaterialPropertyFingerprint {
    controller: Option<usize>,
    flags: i64,
    ambient: [i64; 3],
    diffuse: [i64; 3],
    specular: [i64; 3],
    emissive: [i64; 3],
    glossiness: i64,
    alpha: i64,
}

impl MaterialPropertyFingerprint {
    fn new(material: &Block) -> Result<Self> {
        let color = |name: &str| -> Result<[i64; 3]> {
            Ok(float3_hash(material.field(name)?.as_vec3(name)?))
        };
        let scalar = |name: &str| -> Result<i64> {
            Ok(float_hash(material.field(name)?.as_float(name)?))
        };
        Ok(Self {
            controller: link_hash(material, "Controller")?,
            flags: int_field(material, "Flags")?,
            ambient: color("Ambient Color")?,
            diffuse: color("Diffuse Color")?,
            specular: color("Specular Color")?,
            emissive: color("Emissive Color")?,
            glossiness: scalar("Glossiness")?,
            alpha: scalar("Alpha")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TexturingFingerprint {
    controller: Option<usize>,
    flags: i64,
    apply_mode: i64,
    base: Option<TexDescFingerprint>,
    glow: Option<TexDescFingerprint>,
}

impl TexturingFingerprint {
    fn new(graph: &BlockGraph, texturing: &Block) -> Result<Self> {
        let slot = |index: usize| -> Result<Option<TexDescFingerprint>> {
            match texture_slot(texturing, index) {
                Some(desc) => Ok(Some(TexDescFingerprint::new(graph, desc)?)),
                None => Ok(None),
            }
        };
        Ok(Self {
            controller: link_hash(texturing, "Controller")?,
            flags: int_field(texturing, "Flags")?,
            apply_mode: int_field(texturing, "Apply Mode")?,
            base: slot(BASE_MAP)?,
            glow: slot(GLOW_MAP)?,
        })
    }
}

/// Used texture slot of a texturing property.
pub fn texture_slot(texturing: &Block, index: usize) -> Option<&TexDescRecord> {
    match &texturing.data {
        BlockData::Texturing(record) => record.slots.get(index)?.desc.as_ref(),
        _ => None,
    }
}

/// Property blocks that together define one output material.
#[derive(Debug, Clone, Copy)]
pub struct MaterialProperties<'a> {
    pub material: &'a Block,
    pub texturing: Option<&'a Block>,
    pub alpha: Option<&'a Block>,
    pub specular: Option<&'a Block>,
}

impl<'a> MaterialProperties<'a> {
    /// Properties of a geometry block; `None` without a material property.
    pub fn find(graph: &'a BlockGraph, geometry: &Block) -> Option<Self> {
        Some(Self {
            material: graph.find_property(geometry, BlockType::NiMaterialProperty)?,
            texturing: graph.find_property(geometry, BlockType::NiTexturingProperty),
            alpha: graph.find_property(geometry, BlockType::NiAlphaProperty),
            specular: graph.find_property(geometry, BlockType::NiSpecularProperty),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MaterialFingerprint {
    material: MaterialPropertyFingerprint,
    texturing: Option<TexturingFingerprint>,
    alpha: Option<Option<usize>>,
    specular: Option<Option<usize>>,
}

impl MaterialFingerprint {
    pub fn new(graph: &BlockGraph, properties: &MaterialProperties) -> Result<Self> {
        let controller = |block: Option<&Block>| -> Result<Option<Option<usize>>> {
            match block {
                Some(block) => Ok(Some(link_hash(block, "Controller")?)),
                None => Ok(None),
            }
        };
        let texturing = match properties.texturing {
            Some(texturing) => Some(TexturingFingerprint::new(graph, texturing)?),
            None => None,
        };
        Ok(Self {
            material: MaterialPropertyFingerprint::new(properties.material)?,
            texturing,
            alpha: controller(properties.alpha)?,
            specular: controller(properties.specular)?,
        })
    }
}

/// Output objects of one run, keyed by the fingerprint of their source blocks.
#[derive(Debug, Default)]
pub struct DedupIndex {
    materials: HashMap<MaterialFingerprint, Arc<MaterialAsset>>,
    textures: HashMap<TextureFingerprint, Arc<TextureAsset>>,
}

impl DedupIndex {
    pub fn material(&self, fingerprint: &MaterialFingerprint) -> Option<Arc<MaterialAsset>> {
        self.materials.get(fingerprint).cloned()
    }

    pub fn insert_material(
        &mut self,
        fingerprint: MaterialFingerprint,
        material: MaterialAsset,
    ) -> Arc<MaterialAsset> {
        let material = Arc::new(material);
        self.materials.insert(fingerprint, material.clone());
        material
    }

    pub fn texture(&self, fingerprint: &TextureFingerprint) -> Option<Arc<TextureAsset>> {
        self.textures.get(fingerprint).cloned()
    }

    pub fn insert_texture(
        &mut self,
        fingerprint: TextureFingerprint,
        texture: TextureAsset,
    ) -> Arc<TextureAsset> {
        let texture = Arc::new(texture);
        self.textures.insert(fingerprint, texture.clone());
        texture
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}

#[cfg(test)]
mod test {
    use crate::{
        format::{
            block::{BlockData, BlockType},
            record::{MaterialRecord, NifString, SourceTextureRecord, TextureSourceRecord},
        },
        testing::GraphBuilder,
    };

    use super::{float_hash, MaterialFingerprint, MaterialProperties, TextureFingerprint};

    fn material(diffuse: f32) -> BlockData {
        BlockData::Material(MaterialRecord {
            diffuse: [diffuse, 0.25, 0.125],
            glossiness: 10.0,
            alpha: 1.0,
            ..Default::default()
        })
    }

    #[test]
    fn quantization_steps() {
        assert_eq!(float_hash(0.5), float_hash(0.500001));
        assert_ne!(float_hash(0.5), float_hash(0.51));
        assert_eq!(float_hash(-0.004), 0);
    }

    #[test]
    fn material_fingerprint_ignores_tiny_differences() {
        let mut builder = GraphBuilder::default();
        let a = builder.push(BlockType::NiMaterialProperty, material(0.5));
        let b = builder.push(BlockType::NiMaterialProperty, material(0.500001));
        let c = builder.push(BlockType::NiMaterialProperty, material(0.51));
        let root = builder.node("Root", [0.0; 3], &[]);
        let graph = builder.finish(root);

        let fingerprint = |index: usize| {
            let properties = MaterialProperties {
                material: graph.get(index).unwrap(),
                texturing: None,
                alpha: None,
                specular: None,
            };
            MaterialFingerprint::new(&graph, &properties).unwrap()
        };
        assert_eq!(fingerprint(a), fingerprint(b));
        assert_ne!(fingerprint(a), fingerprint(c));

        let with_alpha = MaterialProperties {
            material: graph.get(a).unwrap(),
            texturing: None,
            alpha: graph.get(b),
            specular: None,
        };
        assert_ne!(
            MaterialFingerprint::new(&graph, &with_alpha).unwrap(),
            fingerprint(a)
        );
    }

    #[test]
    fn texture_fingerprint_uses_file_name() {
        let mut builder = GraphBuilder::default();
        let texture = |name: &str| {
            BlockData::SourceTexture(SourceTextureRecord {
                source: TextureSourceRecord::External {
                    file_name: NifString::from(name),
                },
                ..Default::default()
            })
        };
        let a = builder.push(BlockType::NiSourceTexture, texture("textures\\a.dds"));
        let b = builder.push(BlockType::NiSourceTexture, texture("textures\\a.dds"));
        let c = builder.push(BlockType::NiSourceTexture, texture("textures\\c.dds"));
        let root = builder.node("Root", [0.0; 3], &[]);
        let graph = builder.finish(root);

        let fingerprint = |index: usize| TextureFingerprint::new(graph.get(index).unwrap()).unwrap();
        assert_eq!(fingerprint(a), fingerprint(b));
        assert_ne!(fingerprint(a), fingerprint(c));
    }
}
