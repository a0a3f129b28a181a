use std::collections::BTreeMap;

use glam::{Mat3, Mat4, Vec3};

/// Named set of vertex weights. Assigning a vertex twice keeps the last weight.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexGroup {
    pub name: String,
    pub weights: BTreeMap<usize, f32>,
}

impl VertexGroup {
    pub fn new(name: String) -> Self {
        Self {
            name,
            weights: BTreeMap::new(),
        }
    }

    pub fn assign(&mut self, vertex: usize, weight: f32) {
        self.weights.insert(vertex, weight);
    }
}

/// Rest pose of a poseable joint, in armature space.
#[derive(Debug, Clone, PartialEq)]
pub struct JointAsset {
    pub head: Vec3,
    pub tail: Vec3,
    pub orientation: Mat3,
    /// `X` with `aligned = stored * X`, kept for re-export and key correction.
    pub extra_alignment: Mat4,
}
