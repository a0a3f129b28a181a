use std::io::{Read, Seek, Write};

use binrw::{binrw, prelude::*, Endian};
use modular_bitfield::prelude::*;

/// Link to another block by index. `None` is the null link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Link(pub Option<usize>);

impl Link {
    pub const NULL: Link = Link(None);

    pub fn to(index: usize) -> Self {
        Self(Some(index))
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    pub fn index(&self) -> Option<usize> {
        self.0
    }
}

impl BinRead for Link {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let index = i32::read_options(reader, endian, args)?;
        if index == -1 {
            Ok(Self(None))
        } else if index < 0 {
            let pos = reader.stream_position()?;
            Err(binrw::Error::AssertFail {
                pos,
                message: format!("Bad block link: {}", index),
            })
        } else {
            Ok(Self(Some(index as usize)))
        }
    }
}

impl BinWrite for Link {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        args: Self::Args<'_>,
    ) -> BinResult<()> {
        let index = match self.0 {
            Some(index) => index as i32,
            None => -1,
        };
        index.write_options(writer, endian, args)
    }
}

/// Length-prefixed string. Invalid UTF-8 is replaced rather than rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NifString(pub String);

impl NifString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NifString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl BinRead for NifString {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let length = u32::read_options(reader, endian, args)?;
        let mut bytes = Vec::new();
        reader.by_ref().take(length as u64).read_to_end(&mut bytes)?;
        if bytes.len() != length as usize {
            let pos = reader.stream_position()?;
            return Err(binrw::Error::AssertFail {
                pos,
                message: format!("String of {} bytes cut short", length),
            });
        }
        Ok(Self(String::from_utf8_lossy(&bytes).into_owned()))
    }
}

impl BinWrite for NifString {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        args: Self::Args<'_>,
    ) -> BinResult<()> {
        (self.0.len() as u32).write_options(writer, endian, args)?;
        writer.write_all(self.0.as_bytes())?;
        Ok(())
    }
}

#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[br(map = Self::from_bytes)]
#[bw(map = |flags: &Self| flags.into_bytes())]
pub struct AvObjectFlags {
    pub hidden: bool,
    #[skip]
    __: B15,
}

impl Default for AvObjectFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// Fields shared by every named block.
#[binrw]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectNetRecord {
    pub name: NifString,
    pub extra_data: Link,
    #[br(temp)]
    #[bw(calc = extra_data_list.len() as u32)]
    extra_data_count: u32,
    #[br(count = extra_data_count)]
    pub extra_data_list: Vec<Link>,
    pub controller: Link,
}

/// Transform and property links of a scene object.
#[binrw]
#[derive(Debug, Clone, PartialEq)]
pub struct AvObjectRecord {
    pub flags: AvObjectFlags,
    pub translation: [f32; 3],
    /// Row-major rotation, row-vector convention.
    pub rotation: [[f32; 3]; 3],
    pub scale: f32,
    #[br(temp)]
    #[bw(calc = properties.len() as u32)]
    property_count: u32,
    #[br(count = property_count)]
    pub properties: Vec<Link>,
}

impl Default for AvObjectRecord {
    fn default() -> Self {
        Self {
            flags: AvObjectFlags::new(),
            translation: [0.0; 3],
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            scale: 1.0,
            properties: Vec::new(),
        }
    }
}

#[binrw]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeRecord {
    pub net: ObjectNetRecord,
    pub av: AvObjectRecord,
    #[br(temp)]
    #[bw(calc = children.len() as u32)]
    child_count: u32,
    #[br(count = child_count)]
    pub children: Vec<Link>,
}

#[binrw]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryRecord {
    pub net: ObjectNetRecord,
    pub av: AvObjectRecord,
    pub data: Link,
    pub skin_instance: Link,
}

/// Vertex attributes common to triangle lists and strips.
#[binrw]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryDataRecord {
    #[br(temp)]
    #[bw(calc = vertices.len() as u32)]
    vertex_count: u32,
    #[br(count = vertex_count)]
    pub vertices: Vec<[f32; 3]>,
    #[br(temp)]
    #[bw(calc = u8::from(!normals.is_empty()))]
    has_normals: u8,
    #[br(if(has_normals != 0), count = vertex_count)]
    pub normals: Vec<[f32; 3]>,
    #[br(temp)]
    #[bw(calc = u8::from(!colors.is_empty()))]
    has_colors: u8,
    #[br(if(has_colors != 0), count = vertex_count)]
    pub colors: Vec<[f32; 4]>,
    #[br(temp)]
    #[bw(calc = uv_sets.len() as u16)]
    uv_set_count: u16,
    #[br(args { count: uv_set_count as usize, inner: (vertex_count,) })]
    pub uv_sets: Vec<UvSetRecord>,
}

#[binrw]
#[br(import(vertex_count: u32))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UvSetRecord {
    #[br(count = vertex_count)]
    pub uvs: Vec<[f32; 2]>,
}

#[binrw]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriShapeDataRecord {
    pub geometry: GeometryDataRecord,
    #[br(temp)]
    #[bw(calc = triangles.len() as u32)]
    triangle_count: u32,
    #[br(count = triangle_count)]
    pub triangles: Vec<[u16; 3]>,
}

#[binrw]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StripRecord {
    #[br(temp)]
    #[bw(calc = points.len() as u16)]
    point_count: u16,
    #[br(count = point_count)]
    pub points: Vec<u16>,
}

#[binrw]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriStripsDataRecord {
    pub geometry: GeometryDataRecord,
    #[br(temp)]
    #[bw(calc = strips.len() as u16)]
    strip_count: u16,
    #[br(count = strip_count)]
    pub strips: Vec<StripRecord>,
}

#[binrw]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkinInstanceRecord {
    pub data: Link,
    pub skeleton_root: Link,
    #[br(temp)]
    #[bw(calc = bones.len() as u32)]
    bone_count: u32,
    #[br(count = bone_count)]
    pub bones: Vec<Link>,
}

#[binrw]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VertexWeightRecord {
    pub vertex: u16,
    pub weight: f32,
}

#[binrw]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoneWeightsRecord {
    #[br(temp)]
    #[bw(calc = weights.len() as u16)]
    weight_count: u16,
    #[br(count = weight_count)]
    pub weights: Vec<VertexWeightRecord>,
}

/// Per-bone vertex weights, in the order of the owning skin instance's bones.
#[binrw]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkinDataRecord {
    #[br(temp)]
    #[bw(calc = bones.len() as u32)]
    bone_count: u32,
    #[br(count = bone_count)]
    pub bones: Vec<BoneWeightsRecord>,
}

#[binrw]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialRecord {
    pub net: ObjectNetRecord,
    pub flags: u16,
    pub ambient: [f32; 3],
    pub diffuse: [f32; 3],
    pub specular: [f32; 3],
    pub emissive: [f32; 3],
    pub glossiness: f32,
    pub alpha: f32,
}

#[binrw]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TexDescRecord {
    pub source: Link,
    pub clamp_mode: u32,
    pub filter_mode: u32,
    pub uv_set: u32,
}

#[binrw]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextureSlotRecord {
    #[br(temp)]
    #[bw(calc = u8::from(desc.is_some()))]
    is_used: u8,
    #[br(if(is_used != 0))]
    pub desc: Option<TexDescRecord>,
}

#[binrw]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TexturingRecord {
    pub net: ObjectNetRecord,
    pub flags: u16,
    pub apply_mode: u32,
    #[br(temp)]
    #[bw(calc = slots.len() as u32)]
    slot_count: u32,
    #[br(count = slot_count)]
    pub slots: Vec<TextureSlotRecord>,
}

#[binrw]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlphaRecord {
    pub net: ObjectNetRecord,
    pub flags: u16,
    pub threshold: u8,
}

#[binrw]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecularRecord {
    pub net: ObjectNetRecord,
    pub flags: u16,
}

#[binrw]
#[derive(Debug, Clone, PartialEq)]
pub enum TextureSourceRecord {
    #[brw(magic = 1u8)]
    External { file_name: NifString },
    #[brw(magic = 0u8)]
    Internal { pixel_data: Link },
}

impl Default for TextureSourceRecord {
    fn default() -> Self {
        Self::Internal {
            pixel_data: Link::NULL,
        }
    }
}

#[binrw]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceTextureRecord {
    pub net: ObjectNetRecord,
    pub source: TextureSourceRecord,
    pub pixel_layout: u32,
    pub use_mipmaps: u32,
    pub alpha_format: u32,
}

pub const PIXEL_FORMAT_RGB8: u32 = 0;
pub const PIXEL_FORMAT_RGBA8: u32 = 1;

/// Embedded image, rows stored bottom-up.
#[binrw]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PixelDataRecord {
    pub pixel_format: u32,
    pub width: u32,
    pub height: u32,
    #[br(temp)]
    #[bw(calc = pixels.len() as u32)]
    byte_count: u32,
    #[br(count = byte_count)]
    pub pixels: Vec<u8>,
}

#[binrw]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerRecord {
    pub next_controller: Link,
    pub flags: u16,
    pub frequency: f32,
    pub phase: f32,
    pub start_time: f32,
    pub stop_time: f32,
    pub target: Link,
    pub data: Link,
}

#[binrw]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QuatKeyRecord {
    pub time: f32,
    /// `(w, x, y, z)`
    pub value: [f32; 4],
}

#[binrw]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec3KeyRecord {
    pub time: f32,
    pub value: [f32; 3],
}

#[binrw]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FloatKeyRecord {
    pub time: f32,
    pub value: f32,
}

#[binrw]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyframeDataRecord {
    #[br(temp)]
    #[bw(calc = rotation_keys.len() as u32)]
    rotation_count: u32,
    #[br(count = rotation_count)]
    pub rotation_keys: Vec<QuatKeyRecord>,
    #[br(temp)]
    #[bw(calc = translation_keys.len() as u32)]
    translation_count: u32,
    #[br(count = translation_count)]
    pub translation_keys: Vec<Vec3KeyRecord>,
    #[br(temp)]
    #[bw(calc = scale_keys.len() as u32)]
    scale_count: u32,
    #[br(count = scale_count)]
    pub scale_keys: Vec<FloatKeyRecord>,
}

#[binrw]
#[br(import(vertex_count: u32))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MorphRecord {
    #[br(temp)]
    #[bw(calc = keys.len() as u32)]
    key_count: u32,
    #[br(count = key_count)]
    pub keys: Vec<FloatKeyRecord>,
    #[br(count = vertex_count)]
    pub vectors: Vec<[f32; 3]>,
}

/// Morph targets. The first morph holds base positions, the others deltas.
#[binrw]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MorphDataRecord {
    pub vertex_count: u32,
    #[br(temp)]
    #[bw(calc = morphs.len() as u32)]
    morph_count: u32,
    #[br(args { count: morph_count as usize, inner: (vertex_count,) })]
    pub morphs: Vec<MorphRecord>,
}

#[binrw]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextKeyRecord {
    pub time: f32,
    pub value: NifString,
}

#[binrw]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextKeyExtraRecord {
    pub name: NifString,
    pub next_extra_data: Link,
    #[br(temp)]
    #[bw(calc = keys.len() as u32)]
    key_count: u32,
    #[br(count = key_count)]
    pub keys: Vec<TextKeyRecord>,
}

#[binrw]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringExtraRecord {
    pub name: NifString,
    pub next_extra_data: Link,
    pub value: NifString,
}
