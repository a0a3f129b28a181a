use std::{collections::BTreeSet, sync::Arc};

use glam::{Vec2, Vec3};

use crate::{
    animation::{AnimationKeyFrame, Extrapolation},
    material::MaterialAsset,
    skin::VertexGroup,
    texture::TextureAsset,
};

/// How vertex colours combine with the material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexColorMode {
    /// Colours modulate lighting of a textured material.
    Light,
    /// Colours replace the material colour.
    Paint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeKey {
    pub name: String,
    /// Absolute position of every output vertex with this key fully applied.
    pub positions: Vec<Vec3>,
    pub influence: Vec<AnimationKeyFrame<f32>>,
    pub extrapolation: Extrapolation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeKeys {
    pub basis: Vec<Vec3>,
    pub keys: Vec<ShapeKey>,
}

#[derive(Debug, Clone, Default)]
pub struct MeshAsset {
    pub vertices: Vec<Vec3>,
    pub faces: Vec<[usize; 3]>,
    /// Output face for every source triangle, `None` where it was dropped.
    pub face_map: Vec<Option<usize>>,
    /// Per output face corner.
    pub uvs: Option<Vec<[Vec2; 3]>>,
    /// Per output face corner, RGBA.
    pub colors: Option<Vec<[[u8; 4]; 3]>>,
    pub smooth: bool,
    pub hidden: bool,
    pub groups: Vec<VertexGroup>,
    pub shape_keys: Option<ShapeKeys>,
    pub material: Option<Arc<MaterialAsset>>,
    pub vertex_color_mode: Option<VertexColorMode>,
    /// Image shown on faces in textured viewport modes.
    pub face_image: Option<Arc<TextureAsset>>,
}

impl MeshAsset {
    pub fn group(&self, name: &str) -> Option<&VertexGroup> {
        self.groups.iter().find(|group| group.name == name)
    }

    pub fn group_mut(&mut self, name: &str) -> &mut VertexGroup {
        let position = match self.groups.iter().position(|group| group.name == name) {
            Some(position) => position,
            None => {
                self.groups.push(VertexGroup::new(name.to_string()));
                self.groups.len() - 1
            }
        };
        &mut self.groups[position]
    }

    pub fn weighted_vertices(&self) -> BTreeSet<usize> {
        self.groups
            .iter()
            .flat_map(|group| group.weights.keys().copied())
            .collect()
    }
}
