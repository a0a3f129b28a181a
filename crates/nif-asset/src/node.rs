use glam::{Mat3, Mat4, Quat, Vec3};

use crate::{
    animation::TransformAnimation, index::AssetIndex, mesh::MeshAsset, skin::JointAsset, EPSILON,
};

/// Translation, rotation and a single uniform scale factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecomposedTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: f32,
}

impl Default for DecomposedTransform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: 1.0,
        }
    }
}

impl From<DecomposedTransform> for Mat4 {
    fn from(value: DecomposedTransform) -> Self {
        Mat4::from_translation(value.translation)
            * Mat4::from_quat(value.rotation)
            * Mat4::from_scale(Vec3::splat(value.scale))
    }
}

impl DecomposedTransform {
    /// Split `T * R * S` apart. Fails with the per-axis scale when the axes
    /// are not scaled alike.
    pub fn from_uniform_matrix(matrix: Mat4) -> Result<Self, [f32; 3]> {
        let scale_rotation = Mat3::from_mat4(matrix);
        let mut scale = Vec3::new(
            scale_rotation.x_axis.length(),
            scale_rotation.y_axis.length(),
            scale_rotation.z_axis.length(),
        );
        if scale_rotation.determinant() < 0.0 {
            scale = -scale;
        }
        if (scale.x - scale.y).abs() >= EPSILON || (scale.y - scale.z).abs() >= EPSILON {
            return Err(scale.to_array());
        }
        let rotation = scale_rotation * (1.0 / scale.x);
        Ok(Self {
            translation: matrix.w_axis.truncate(),
            rotation: Quat::from_mat3(&rotation).normalize(),
            scale: scale.x,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Empty,
    Mesh,
    Joint,
    ArmatureRoot,
}

/// How a node follows its parent: rigidly, or deformed by the parent armature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParentMode {
    #[default]
    Object,
    Deform,
}

#[derive(Debug, Clone)]
pub struct NodeAsset {
    pub id: AssetIndex,
    pub name: String,
    pub role: NodeRole,
    /// Local transform for objects, armature-space rest matrix for joints.
    pub transform: Mat4,
    pub parent_mode: ParentMode,
    pub children: Vec<NodeAsset>,
    pub mesh: Option<MeshAsset>,
    pub joint: Option<JointAsset>,
    pub animation: Option<TransformAnimation>,
}

impl NodeAsset {
    pub fn new(id: AssetIndex, name: String, role: NodeRole) -> Self {
        Self {
            id,
            name,
            role,
            transform: Mat4::IDENTITY,
            parent_mode: ParentMode::Object,
            children: Vec::new(),
            mesh: None,
            joint: None,
            animation: None,
        }
    }

    /// Depth-first search by resolved name.
    pub fn find(&self, name: &str) -> Option<&NodeAsset> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }
}
