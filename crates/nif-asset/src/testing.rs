//! In-memory block graphs for tests.
use std::collections::HashMap;

use glam::{Mat3, Quat};

use crate::format::{
    block::{Block, BlockData, BlockType},
    graph::BlockGraph,
    record::*,
};

#[derive(Debug, Default)]
pub struct GraphBuilder {
    blocks: Vec<Block>,
    /// Data block of every shape made by `triangle_mesh`.
    shape_data: HashMap<usize, usize>,
}

impl GraphBuilder {
    pub fn push(&mut self, kind: BlockType, data: BlockData) -> usize {
        let index = self.blocks.len();
        self.blocks.push(Block { index, kind, data });
        index
    }

    pub fn node(&mut self, name: &str, translation: [f32; 3], children: &[usize]) -> usize {
        self.push(
            BlockType::NiNode,
            BlockData::Node(NodeRecord {
                net: named(name),
                av: AvObjectRecord {
                    translation,
                    ..Default::default()
                },
                children: children.iter().copied().map(Link::to).collect(),
            }),
        )
    }

    pub fn tri_shape_data(&mut self, vertices: &[[f32; 3]], triangles: &[[u16; 3]]) -> usize {
        self.push(
            BlockType::NiTriShapeData,
            BlockData::TriShapeData(TriShapeDataRecord {
                geometry: GeometryDataRecord {
                    vertices: vertices.to_vec(),
                    ..Default::default()
                },
                triangles: triangles.to_vec(),
            }),
        )
    }

    pub fn shape(&mut self, name: &str, data: usize) -> usize {
        self.geometry(BlockType::NiTriShape, name, data)
    }

    pub fn strips(&mut self, name: &str, data: usize) -> usize {
        self.geometry(BlockType::NiTriStrips, name, data)
    }

    fn geometry(&mut self, kind: BlockType, name: &str, data: usize) -> usize {
        let shape = self.push(
            kind,
            BlockData::Geometry(GeometryRecord {
                net: named(name),
                av: AvObjectRecord::default(),
                data: Link::to(data),
                skin_instance: Link::NULL,
            }),
        );
        self.shape_data.insert(shape, data);
        shape
    }

    /// Shape with its own triangle data.
    pub fn triangle_mesh(
        &mut self,
        name: &str,
        vertices: &[[f32; 3]],
        triangles: &[[u16; 3]],
    ) -> usize {
        let data = self.tri_shape_data(vertices, triangles);
        self.shape(name, data)
    }

    fn geometry_data_mut(&mut self, shape: usize) -> &mut GeometryDataRecord {
        let data = self.shape_data[&shape];
        match &mut self.blocks[data].data {
            BlockData::TriShapeData(record) => &mut record.geometry,
            BlockData::TriStripsData(record) => &mut record.geometry,
            other => panic!("block {} is not geometry data: {:?}", data, other),
        }
    }

    pub fn uvs(&mut self, shape: usize, uvs: &[[f32; 2]]) {
        self.geometry_data_mut(shape).uv_sets = vec![UvSetRecord { uvs: uvs.to_vec() }];
    }

    pub fn vertex_colors(&mut self, shape: usize, colors: &[[f32; 4]]) {
        self.geometry_data_mut(shape).colors = colors.to_vec();
    }

    fn net_mut(&mut self, block: usize) -> &mut ObjectNetRecord {
        match &mut self.blocks[block].data {
            BlockData::Node(record) => &mut record.net,
            BlockData::Geometry(record) => &mut record.net,
            other => panic!("block {} has no name: {:?}", block, other),
        }
    }

    fn av_mut(&mut self, block: usize) -> &mut AvObjectRecord {
        match &mut self.blocks[block].data {
            BlockData::Node(record) => &mut record.av,
            BlockData::Geometry(record) => &mut record.av,
            other => panic!("block {} has no transform: {:?}", block, other),
        }
    }

    pub fn set_rotation(&mut self, block: usize, rotation: Quat) {
        self.av_mut(block).rotation = Mat3::from_quat(rotation).to_cols_array_2d();
    }

    /// Raw rotation field, which the format does not force to be orthonormal.
    pub fn set_rotation_rows(&mut self, block: usize, rows: [[f32; 3]; 3]) {
        self.av_mut(block).rotation = rows;
    }

    pub fn set_scale(&mut self, block: usize, scale: f32) {
        self.av_mut(block).scale = scale;
    }

    pub fn add_property(&mut self, block: usize, property: usize) {
        self.av_mut(block).properties.push(Link::to(property));
    }

    /// Put `controller` in front of the block's controller chain.
    pub fn set_controller(&mut self, block: usize, controller: usize) {
        let previous = self.net_mut(block).controller;
        if let BlockData::Controller(record) = &mut self.blocks[controller].data {
            if record.next_controller.is_null() && previous != Link::to(controller) {
                record.next_controller = previous;
            }
        }
        self.net_mut(block).controller = Link::to(controller);
    }

    /// Keyframe controller with `(time, [w, x, y, z])` rotation keys,
    /// `(time, translation)` and `(time, scale)` keys.
    pub fn keyframes(
        &mut self,
        block: usize,
        rotations: &[(f32, [f32; 4])],
        translations: &[(f32, [f32; 3])],
        scales: &[(f32, f32)],
    ) -> usize {
        let data = self.push(
            BlockType::NiKeyframeData,
            BlockData::KeyframeData(KeyframeDataRecord {
                rotation_keys: rotations
                    .iter()
                    .map(|&(time, value)| QuatKeyRecord { time, value })
                    .collect(),
                translation_keys: translations
                    .iter()
                    .map(|&(time, value)| Vec3KeyRecord { time, value })
                    .collect(),
                scale_keys: scales
                    .iter()
                    .map(|&(time, value)| FloatKeyRecord { time, value })
                    .collect(),
            }),
        );
        let controller = self.push(
            BlockType::NiKeyframeController,
            BlockData::Controller(ControllerRecord {
                flags: 0x000c,
                frequency: 1.0,
                target: Link::to(block),
                data: Link::to(data),
                ..Default::default()
            }),
        );
        self.set_controller(block, controller);
        controller
    }

    /// Skin `shape` to `skeleton_root` with `(bone, [(vertex, weight)])` lists.
    pub fn skin(&mut self, shape: usize, skeleton_root: usize, bones: &[(usize, &[(u16, f32)])]) {
        let data = self.push(
            BlockType::NiSkinData,
            BlockData::SkinData(SkinDataRecord {
                bones: bones
                    .iter()
                    .map(|(_, weights)| BoneWeightsRecord {
                        weights: weights
                            .iter()
                            .map(|&(vertex, weight)| VertexWeightRecord { vertex, weight })
                            .collect(),
                    })
                    .collect(),
            }),
        );
        let instance = self.push(
            BlockType::NiSkinInstance,
            BlockData::SkinInstance(SkinInstanceRecord {
                data: Link::to(data),
                skeleton_root: Link::to(skeleton_root),
                bones: bones.iter().map(|(bone, _)| Link::to(*bone)).collect(),
            }),
        );
        match &mut self.blocks[shape].data {
            BlockData::Geometry(record) => record.skin_instance = Link::to(instance),
            other => panic!("block {} is not geometry: {:?}", shape, other),
        }
    }

    pub fn text_keys(&mut self, block: usize, keys: &[(f32, &str)]) -> usize {
        let next_extra_data = self.net_mut(block).extra_data;
        let extra = self.push(
            BlockType::NiTextKeyExtraData,
            BlockData::TextKeyExtra(TextKeyExtraRecord {
                name: NifString::default(),
                next_extra_data,
                keys: keys
                    .iter()
                    .map(|&(time, value)| TextKeyRecord {
                        time,
                        value: NifString::from(value),
                    })
                    .collect(),
            }),
        );
        self.net_mut(block).extra_data = Link::to(extra);
        extra
    }

    pub fn finish(self, root: usize) -> BlockGraph {
        BlockGraph::new(self.blocks, vec![Link::to(root)])
    }
}

fn named(name: &str) -> ObjectNetRecord {
    ObjectNetRecord {
        name: NifString::from(name),
        ..Default::default()
    }
}
