use std::io::{Read, Seek, Write};

use binrw::{BinRead, BinResult, BinWrite, Endian};
use glam::{Mat3, Vec3};

use crate::error::{ImportError, Result};

use super::record::*;

macro_rules! block_types {
    ($($kind:ident => $parent:expr,)*) => {
        /// Declared block types, in a single-inheritance hierarchy rooted at `NiObject`.
        #[allow(clippy::upper_case_acronyms)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum BlockType {
            $($kind,)*
        }

        impl BlockType {
            pub const ALL: &'static [BlockType] = &[$(BlockType::$kind,)*];

            pub fn name(self) -> &'static str {
                match self {
                    $(BlockType::$kind => stringify!($kind),)*
                }
            }

            pub fn parent(self) -> Option<BlockType> {
                match self {
                    $(BlockType::$kind => $parent,)*
                }
            }
        }
    };
}

block_types! {
    NiObject => None,
    NiObjectNET => Some(BlockType::NiObject),
    NiAVObject => Some(BlockType::NiObjectNET),
    NiNode => Some(BlockType::NiAVObject),
    NiBSAnimationNode => Some(BlockType::NiNode),
    RootCollisionNode => Some(BlockType::NiNode),
    NiGeometry => Some(BlockType::NiAVObject),
    NiTriBasedGeom => Some(BlockType::NiGeometry),
    NiTriShape => Some(BlockType::NiTriBasedGeom),
    NiTriStrips => Some(BlockType::NiTriBasedGeom),
    NiProperty => Some(BlockType::NiObjectNET),
    NiMaterialProperty => Some(BlockType::NiProperty),
    NiTexturingProperty => Some(BlockType::NiProperty),
    NiAlphaProperty => Some(BlockType::NiProperty),
    NiSpecularProperty => Some(BlockType::NiProperty),
    NiTexture => Some(BlockType::NiObjectNET),
    NiSourceTexture => Some(BlockType::NiTexture),
    NiTimeController => Some(BlockType::NiObject),
    NiKeyframeController => Some(BlockType::NiTimeController),
    NiGeomMorpherController => Some(BlockType::NiTimeController),
    NiGeometryData => Some(BlockType::NiObject),
    NiTriBasedGeomData => Some(BlockType::NiGeometryData),
    NiTriShapeData => Some(BlockType::NiTriBasedGeomData),
    NiTriStripsData => Some(BlockType::NiTriBasedGeomData),
    NiExtraData => Some(BlockType::NiObject),
    NiTextKeyExtraData => Some(BlockType::NiExtraData),
    NiStringExtraData => Some(BlockType::NiExtraData),
    NiSkinInstance => Some(BlockType::NiObject),
    NiSkinData => Some(BlockType::NiObject),
    NiKeyframeData => Some(BlockType::NiObject),
    NiMorphData => Some(BlockType::NiObject),
    NiPixelData => Some(BlockType::NiObject),
}

impl BlockType {
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }

    /// Whether this type is `ancestor` or one of its descendants.
    pub fn is_derived_from(self, ancestor: BlockType) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == ancestor {
                return true;
            }
            current = kind.parent();
        }
        false
    }
}

/// Decoded payload, one variant per concrete record layout.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockData {
    Node(NodeRecord),
    Geometry(GeometryRecord),
    TriShapeData(TriShapeDataRecord),
    TriStripsData(TriStripsDataRecord),
    SkinInstance(SkinInstanceRecord),
    SkinData(SkinDataRecord),
    Material(MaterialRecord),
    Texturing(TexturingRecord),
    Alpha(AlphaRecord),
    Specular(SpecularRecord),
    SourceTexture(SourceTextureRecord),
    PixelData(PixelDataRecord),
    Controller(ControllerRecord),
    KeyframeData(KeyframeDataRecord),
    MorphData(MorphDataRecord),
    TextKeyExtra(TextKeyExtraRecord),
    StringExtra(StringExtraRecord),
}

impl BlockData {
    pub(crate) fn read<R: Read + Seek>(
        kind: BlockType,
        reader: &mut R,
        endian: Endian,
    ) -> BinResult<Option<Self>> {
        use BlockType::*;

        let data = match kind {
            NiNode | NiBSAnimationNode | RootCollisionNode => {
                BlockData::Node(NodeRecord::read_options(reader, endian, ())?)
            }
            NiTriShape | NiTriStrips => {
                BlockData::Geometry(GeometryRecord::read_options(reader, endian, ())?)
            }
            NiTriShapeData => {
                BlockData::TriShapeData(TriShapeDataRecord::read_options(reader, endian, ())?)
            }
            NiTriStripsData => {
                BlockData::TriStripsData(TriStripsDataRecord::read_options(reader, endian, ())?)
            }
            NiSkinInstance => {
                BlockData::SkinInstance(SkinInstanceRecord::read_options(reader, endian, ())?)
            }
            NiSkinData => BlockData::SkinData(SkinDataRecord::read_options(reader, endian, ())?),
            NiMaterialProperty => {
                BlockData::Material(MaterialRecord::read_options(reader, endian, ())?)
            }
            NiTexturingProperty => {
                BlockData::Texturing(TexturingRecord::read_options(reader, endian, ())?)
            }
            NiAlphaProperty => BlockData::Alpha(AlphaRecord::read_options(reader, endian, ())?),
            NiSpecularProperty => {
                BlockData::Specular(SpecularRecord::read_options(reader, endian, ())?)
            }
            NiSourceTexture => {
                BlockData::SourceTexture(SourceTextureRecord::read_options(reader, endian, ())?)
            }
            NiPixelData => {
                BlockData::PixelData(PixelDataRecord::read_options(reader, endian, ())?)
            }
            NiKeyframeController | NiGeomMorpherController => {
                BlockData::Controller(ControllerRecord::read_options(reader, endian, ())?)
            }
            NiKeyframeData => {
                BlockData::KeyframeData(KeyframeDataRecord::read_options(reader, endian, ())?)
            }
            NiMorphData => BlockData::MorphData(MorphDataRecord::read_options(reader, endian, ())?),
            NiTextKeyExtraData => {
                BlockData::TextKeyExtra(TextKeyExtraRecord::read_options(reader, endian, ())?)
            }
            NiStringExtraData => {
                BlockData::StringExtra(StringExtraRecord::read_options(reader, endian, ())?)
            }
            // Abstract types never appear in a stream.
            NiObject | NiObjectNET | NiAVObject | NiGeometry | NiTriBasedGeom | NiProperty
            | NiTexture | NiTimeController | NiGeometryData | NiTriBasedGeomData | NiExtraData => {
                return Ok(None)
            }
        };
        Ok(Some(data))
    }

    pub(crate) fn write<W: Write + Seek>(&self, writer: &mut W, endian: Endian) -> BinResult<()> {
        match self {
            BlockData::Node(record) => record.write_options(writer, endian, ()),
            BlockData::Geometry(record) => record.write_options(writer, endian, ()),
            BlockData::TriShapeData(record) => record.write_options(writer, endian, ()),
            BlockData::TriStripsData(record) => record.write_options(writer, endian, ()),
            BlockData::SkinInstance(record) => record.write_options(writer, endian, ()),
            BlockData::SkinData(record) => record.write_options(writer, endian, ()),
            BlockData::Material(record) => record.write_options(writer, endian, ()),
            BlockData::Texturing(record) => record.write_options(writer, endian, ()),
            BlockData::Alpha(record) => record.write_options(writer, endian, ()),
            BlockData::Specular(record) => record.write_options(writer, endian, ()),
            BlockData::SourceTexture(record) => record.write_options(writer, endian, ()),
            BlockData::PixelData(record) => record.write_options(writer, endian, ()),
            BlockData::Controller(record) => record.write_options(writer, endian, ()),
            BlockData::KeyframeData(record) => record.write_options(writer, endian, ()),
            BlockData::MorphData(record) => record.write_options(writer, endian, ()),
            BlockData::TextKeyExtra(record) => record.write_options(writer, endian, ()),
            BlockData::StringExtra(record) => record.write_options(writer, endian, ()),
        }
    }
}

/// Typed value of a named field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    Int(i64),
    Float(f32),
    Vector3(Vec3),
    Matrix3(Mat3),
    Text(&'a str),
    Link(Link),
    LinkList(&'a [Link]),
}

impl<'a> FieldValue<'a> {
    fn mismatch(name: &str, expected: &'static str) -> ImportError {
        ImportError::FieldType {
            field: name.to_string(),
            expected,
        }
    }

    pub fn as_link(&self, name: &str) -> Result<Link> {
        match self {
            FieldValue::Link(link) => Ok(*link),
            _ => Err(Self::mismatch(name, "link")),
        }
    }

    pub fn as_link_list(&self, name: &str) -> Result<&'a [Link]> {
        match self {
            FieldValue::LinkList(links) => Ok(links),
            _ => Err(Self::mismatch(name, "link list")),
        }
    }

    pub fn as_str(&self, name: &str) -> Result<&'a str> {
        match self {
            FieldValue::Text(text) => Ok(text),
            _ => Err(Self::mismatch(name, "string")),
        }
    }

    pub fn as_int(&self, name: &str) -> Result<i64> {
        match self {
            FieldValue::Int(value) => Ok(*value),
            _ => Err(Self::mismatch(name, "integer")),
        }
    }

    pub fn as_float(&self, name: &str) -> Result<f32> {
        match self {
            FieldValue::Float(value) => Ok(*value),
            _ => Err(Self::mismatch(name, "float")),
        }
    }

    pub fn as_vec3(&self, name: &str) -> Result<Vec3> {
        match self {
            FieldValue::Vector3(value) => Ok(*value),
            _ => Err(Self::mismatch(name, "vector")),
        }
    }
}

/// One decoded unit of the stream, addressed by its position.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub index: usize,
    pub kind: BlockType,
    pub data: BlockData,
}

impl Block {
    pub fn is_derived_from(&self, ancestor: BlockType) -> bool {
        self.kind.is_derived_from(ancestor)
    }

    pub fn net(&self) -> Option<&ObjectNetRecord> {
        match &self.data {
            BlockData::Node(record) => Some(&record.net),
            BlockData::Geometry(record) => Some(&record.net),
            BlockData::Material(record) => Some(&record.net),
            BlockData::Texturing(record) => Some(&record.net),
            BlockData::Alpha(record) => Some(&record.net),
            BlockData::Specular(record) => Some(&record.net),
            BlockData::SourceTexture(record) => Some(&record.net),
            _ => None,
        }
    }

    pub fn av(&self) -> Option<&AvObjectRecord> {
        match &self.data {
            BlockData::Node(record) => Some(&record.av),
            BlockData::Geometry(record) => Some(&record.av),
            _ => None,
        }
    }

    pub(crate) fn av_mut(&mut self) -> Option<&mut AvObjectRecord> {
        match &mut self.data {
            BlockData::Node(record) => Some(&mut record.av),
            BlockData::Geometry(record) => Some(&mut record.av),
            _ => None,
        }
    }

    /// Native name, empty for unnamed blocks.
    pub fn name(&self) -> &str {
        match &self.data {
            BlockData::TextKeyExtra(record) => record.name.as_str(),
            BlockData::StringExtra(record) => record.name.as_str(),
            _ => self.net().map(|net| net.name.as_str()).unwrap_or_default(),
        }
    }

    pub fn children(&self) -> &[Link] {
        match &self.data {
            BlockData::Node(record) => &record.children,
            _ => &[],
        }
    }

    /// Every outgoing link, in field order.
    pub fn links(&self) -> Vec<Link> {
        let mut links = Vec::new();
        if let Some(net) = self.net() {
            links.push(net.extra_data);
            links.extend_from_slice(&net.extra_data_list);
            links.push(net.controller);
        }
        if let Some(av) = self.av() {
            links.extend_from_slice(&av.properties);
        }
        match &self.data {
            BlockData::Node(record) => links.extend_from_slice(&record.children),
            BlockData::Geometry(record) => {
                links.push(record.data);
                links.push(record.skin_instance);
            }
            BlockData::SkinInstance(record) => {
                links.push(record.data);
                links.push(record.skeleton_root);
                links.extend_from_slice(&record.bones);
            }
            BlockData::Texturing(record) => links.extend(
                record
                    .slots
                    .iter()
                    .filter_map(|slot| slot.desc.as_ref().map(|desc| desc.source)),
            ),
            BlockData::SourceTexture(SourceTextureRecord {
                source: TextureSourceRecord::Internal { pixel_data },
                ..
            }) => links.push(*pixel_data),
            BlockData::Controller(record) => {
                links.push(record.next_controller);
                links.push(record.target);
                links.push(record.data);
            }
            BlockData::TextKeyExtra(record) => links.push(record.next_extra_data),
            BlockData::StringExtra(record) => links.push(record.next_extra_data),
            _ => {}
        }
        links
    }

    /// Look up a field by its format name.
    pub fn field(&self, name: &str) -> Result<FieldValue<'_>> {
        if let Some(value) = self.lookup(name) {
            return Ok(value);
        }
        Err(ImportError::FieldNotFound {
            block: self.index,
            block_type: self.kind.name(),
            field: name.to_string(),
        })
    }

    fn lookup(&self, name: &str) -> Option<FieldValue<'_>> {
        if let Some(net) = self.net() {
            match name {
                "Name" => return Some(FieldValue::Text(net.name.as_str())),
                "Extra Data" => return Some(FieldValue::Link(net.extra_data)),
                "Extra Data List" => return Some(FieldValue::LinkList(&net.extra_data_list)),
                "Controller" => return Some(FieldValue::Link(net.controller)),
                _ => {}
            }
        }
        if let Some(av) = self.av() {
            match name {
                "Flags" => {
                    let flags = u16::from_le_bytes(av.flags.into_bytes());
                    return Some(FieldValue::Int(flags as i64));
                }
                "Translation" => return Some(FieldValue::Vector3(Vec3::from(av.translation))),
                "Rotation" => {
                    return Some(FieldValue::Matrix3(Mat3::from_cols_array_2d(&av.rotation)))
                }
                "Scale" => return Some(FieldValue::Float(av.scale)),
                "Properties" => return Some(FieldValue::LinkList(&av.properties)),
                _ => {}
            }
        }
        match (&self.data, name) {
            (BlockData::Node(record), "Children") => Some(FieldValue::LinkList(&record.children)),
            (BlockData::Geometry(record), "Data") => Some(FieldValue::Link(record.data)),
            (BlockData::Geometry(record), "Skin Instance") => {
                Some(FieldValue::Link(record.skin_instance))
            }
            (BlockData::SkinInstance(record), "Data") => Some(FieldValue::Link(record.data)),
            (BlockData::SkinInstance(record), "Skeleton Root") => {
                Some(FieldValue::Link(record.skeleton_root))
            }
            (BlockData::SkinInstance(record), "Bones") => {
                Some(FieldValue::LinkList(&record.bones))
            }
            (BlockData::Material(record), _) => match name {
                "Flags" => Some(FieldValue::Int(record.flags as i64)),
                "Ambient Color" => Some(FieldValue::Vector3(Vec3::from(record.ambient))),
                "Diffuse Color" => Some(FieldValue::Vector3(Vec3::from(record.diffuse))),
                "Specular Color" => Some(FieldValue::Vector3(Vec3::from(record.specular))),
                "Emissive Color" => Some(FieldValue::Vector3(Vec3::from(record.emissive))),
                "Glossiness" => Some(FieldValue::Float(record.glossiness)),
                "Alpha" => Some(FieldValue::Float(record.alpha)),
                _ => None,
            },
            (BlockData::Texturing(record), "Flags") => Some(FieldValue::Int(record.flags as i64)),
            (BlockData::Texturing(record), "Apply Mode") => {
                Some(FieldValue::Int(record.apply_mode as i64))
            }
            (BlockData::Alpha(record), "Flags") => Some(FieldValue::Int(record.flags as i64)),
            (BlockData::Alpha(record), "Threshold") => {
                Some(FieldValue::Int(record.threshold as i64))
            }
            (BlockData::Specular(record), "Flags") => Some(FieldValue::Int(record.flags as i64)),
            (BlockData::SourceTexture(record), _) => match (name, &record.source) {
                ("File Name", TextureSourceRecord::External { file_name }) => {
                    Some(FieldValue::Text(file_name.as_str()))
                }
                ("Pixel Data", TextureSourceRecord::Internal { pixel_data }) => {
                    Some(FieldValue::Link(*pixel_data))
                }
                ("Pixel Layout", _) => Some(FieldValue::Int(record.pixel_layout as i64)),
                ("Use Mipmaps", _) => Some(FieldValue::Int(record.use_mipmaps as i64)),
                ("Alpha Format", _) => Some(FieldValue::Int(record.alpha_format as i64)),
                _ => None,
            },
            (BlockData::Controller(record), _) => match name {
                "Next Controller" => Some(FieldValue::Link(record.next_controller)),
                "Flags" => Some(FieldValue::Int(record.flags as i64)),
                "Frequency" => Some(FieldValue::Float(record.frequency)),
                "Phase" => Some(FieldValue::Float(record.phase)),
                "Start Time" => Some(FieldValue::Float(record.start_time)),
                "Stop Time" => Some(FieldValue::Float(record.stop_time)),
                "Target" => Some(FieldValue::Link(record.target)),
                "Data" => Some(FieldValue::Link(record.data)),
                _ => None,
            },
            (BlockData::TextKeyExtra(record), "Next Extra Data") => {
                Some(FieldValue::Link(record.next_extra_data))
            }
            (BlockData::StringExtra(record), "Next Extra Data") => {
                Some(FieldValue::Link(record.next_extra_data))
            }
            (BlockData::TextKeyExtra(record), "Name") => {
                Some(FieldValue::Text(record.name.as_str()))
            }
            (BlockData::StringExtra(record), "Name") => {
                Some(FieldValue::Text(record.name.as_str()))
            }
            (BlockData::StringExtra(record), "String Data") => {
                Some(FieldValue::Text(record.value.as_str()))
            }
            (BlockData::MorphData(record), "Num Vertices") => {
                Some(FieldValue::Int(record.vertex_count as i64))
            }
            (BlockData::PixelData(record), _) => match name {
                "Pixel Format" => Some(FieldValue::Int(record.pixel_format as i64)),
                "Width" => Some(FieldValue::Int(record.width as i64)),
                "Height" => Some(FieldValue::Int(record.height as i64)),
                _ => None,
            },
            _ => None,
        }
    }
}
