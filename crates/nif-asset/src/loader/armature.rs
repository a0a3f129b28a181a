use glam::{Mat3, Mat4, Quat, Vec3};
use log::{debug, trace};

use crate::{
    animation::{frame_for_time, insert_key, key_at_or_before, TransformAnimation},
    error::{ImportError, Result},
    format::block::{Block, BlockType},
    index::SourceAssetType,
    node::{DecomposedTransform, NodeAsset, NodeRole},
    scene::AlignmentRecord,
    skin::JointAsset,
};

use super::{
    dedup::float_hash,
    names::{BONE_NAME_LENGTH, OBJECT_NAME_LENGTH},
    session::ConversionSession,
    tree::key_rotation,
};

/// Axis-aligned orientation corrections, in row form, for a joint whose
/// children lie along +X, +Y, +Z, -X, -Y and -Z respectively.
const CORRECTIONS: [[[f32; 3]; 3]; 6] = [
    [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
    [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    [[1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, -1.0, 0.0]],
    [[0.0, 1.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
    [[-1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, 1.0]],
    [[1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]],
];

/// Largest off-axis to on-axis ratio for which a correction is applied.
const MAX_ALIGNMENT_OFFSET: f32 = 0.25;

/// Tail offset given to joints whose tail would coincide with the head.
const ZERO_LENGTH_OFFSET: f32 = 0.5;

/// Index into [`CORRECTIONS`] for a joint whose child offsets sum to
/// `offset`, or `None` when the offset is not close enough to an axis.
fn choose_correction(offset: Vec3) -> Option<usize> {
    let candidates = [
        offset.x, offset.y, offset.z, -offset.x, -offset.y, -offset.z,
    ]
    .map(float_hash);
    let mut index = 0;
    for (candidate, value) in candidates.iter().enumerate() {
        if *value > candidates[index] {
            index = candidate;
        }
    }
    let axis = index % 3;
    let main = offset[axis].abs();
    if main == 0.0 {
        return None;
    }
    let other = offset[(axis + 1) % 3].abs() + offset[(axis + 2) % 3].abs();
    (other / main < MAX_ALIGNMENT_OFFSET).then_some(index)
}

fn decompose(name: &str, matrix: Mat4) -> Result<DecomposedTransform> {
    DecomposedTransform::from_uniform_matrix(matrix).map_err(|scale| {
        ImportError::NonUniformScale {
            node: name.to_string(),
            scale,
        }
    })
}

impl<'a> ConversionSession<'a> {
    /// Build the armature node of a skeleton root with all its joints.
    pub(super) fn convert_armature(&mut self, block: &'a Block) -> Result<NodeAsset> {
        let graph = self.graph;
        let name = self.names.resolve(block.name(), OBJECT_NAME_LENGTH);
        debug!("Building armature {:?}", name);
        let armature_inverse = graph.world_transform(block).inverse();
        let mut armature = NodeAsset::new(
            self.asset_id(SourceAssetType::Node, block),
            name,
            NodeRole::ArmatureRoot,
        );
        for child in graph.children(block).flatten() {
            if child.is_derived_from(BlockType::NiNode) && self.skeletons.is_bone(child) {
                let joint = self.convert_joint(child, armature_inverse)?;
                armature.children.push(joint);
            }
        }
        Ok(armature)
    }

    fn convert_joint(&mut self, block: &'a Block, armature_inverse: Mat4) -> Result<NodeAsset> {
        let graph = self.graph;
        let name = self.names.resolve(block.name(), BONE_NAME_LENGTH);
        let child_nodes: Vec<&Block> = graph
            .children(block)
            .flatten()
            .filter(|child| child.kind == BlockType::NiNode)
            .collect();

        let old_matrix = armature_inverse * graph.world_transform(block);
        let head = old_matrix.w_axis.truncate();
        let mut tail = if child_nodes.is_empty() {
            // Continue in the direction of the parent with the same length.
            let parent_head = graph
                .parent(block)
                .map(|parent| (armature_inverse * graph.world_transform(parent)).w_axis.truncate())
                .unwrap_or(head);
            2.0 * head - parent_head
        } else {
            child_nodes
                .iter()
                .map(|child| (armature_inverse * graph.world_transform(child)).w_axis.truncate())
                .sum::<Vec3>()
                / child_nodes.len() as f32
        };
        let zero_length = head == tail;
        if zero_length {
            tail.x += ZERO_LENGTH_OFFSET;
        }

        let raw = Mat3::from_quat(decompose(&name, old_matrix)?.rotation);
        let orientation = if zero_length {
            raw
        } else {
            let offset = if child_nodes.is_empty() {
                graph.local_transform(block).w_axis.truncate()
            } else {
                child_nodes
                    .iter()
                    .map(|child| graph.local_transform(child).w_axis.truncate())
                    .sum::<Vec3>()
            };
            match choose_correction(offset) {
                Some(index) => {
                    trace!("Joint {:?} uses correction {}", name, index);
                    raw * Mat3::from_cols_array_2d(&CORRECTIONS[index])
                }
                None => raw,
            }
        };

        let new_matrix = Mat4::from_cols(
            orientation.x_axis.extend(0.0),
            orientation.y_axis.extend(0.0),
            orientation.z_axis.extend(0.0),
            head.extend(1.0),
        );
        let extra_alignment = old_matrix.inverse() * new_matrix;
        self.alignments.push(AlignmentRecord {
            joint: name.clone(),
            matrix: extra_alignment,
        });

        let mut joint = NodeAsset::new(
            self.asset_id(SourceAssetType::Joint, block),
            name,
            NodeRole::Joint,
        );
        joint.transform = new_matrix;
        joint.animation = self.joint_animation(block, &joint.name, extra_alignment)?;
        joint.joint = Some(JointAsset {
            head,
            tail,
            orientation,
            extra_alignment,
        });
        for child in child_nodes {
            if self.skeletons.is_bone(child) {
                let child = self.convert_joint(child, armature_inverse)?;
                joint.children.push(child);
            }
        }
        Ok(joint)
    }

    /// Convert absolute keys into channels relative to the bind pose, then
    /// express them in the corrected joint frame.
    fn joint_animation(
        &mut self,
        block: &Block,
        name: &str,
        extra_alignment: Mat4,
    ) -> Result<Option<TransformAnimation>> {
        let Some(data) = self.keyframe_data(block)? else {
            return Ok(None);
        };
        let graph = self.graph;
        let bind = decompose(name, graph.local_transform(block))?;
        let bind_rotation_inverse = bind.rotation.inverse();
        let extra = decompose(name, extra_alignment)?;
        let extra_rotation_inverse = extra.rotation.inverse();
        let fps = self.params.frames_per_second;
        debug!("Importing animation for joint {:?}", name);

        let mut animation = TransformAnimation::default();
        for key in &data.scale_keys {
            let frame = frame_for_time(key.time, fps);
            let scale = key.value / bind.scale;
            trace!("{:?} scale {} at frame {}", name, scale, frame);
            insert_key(&mut animation.scale, frame, scale);
        }
        for key in &data.rotation_keys {
            let frame = frame_for_time(key.time, fps);
            let channel = bind_rotation_inverse * key_rotation(key.value);
            let rotation = (extra_rotation_inverse * channel * extra.rotation).normalize();
            trace!("{:?} rotation {} at frame {}", name, rotation, frame);
            insert_key(&mut animation.rotation, frame, rotation);
        }
        for key in &data.translation_keys {
            let frame = frame_for_time(key.time, fps);
            let channel =
                bind_rotation_inverse * (Vec3::from(key.value) - bind.translation) / bind.scale;
            // Rotation and scale at this frame come from the keys converted
            // above, not from the source curves.
            let rotation = key_at_or_before(&animation.rotation, frame).unwrap_or(Quat::IDENTITY);
            let scale = key_at_or_before(&animation.scale, frame).unwrap_or(1.0);
            let translation = extra_rotation_inverse
                * (scale * (rotation * extra.translation) + channel - extra.translation)
                / extra.scale;
            trace!("{:?} translation {} at frame {}", name, translation, frame);
            insert_key(&mut animation.translation, frame, translation);
        }
        Ok((!animation.is_empty()).then_some(animation))
    }
}

#[cfg(test)]
mod test {
    use glam::{Mat3, Mat4, Quat, Vec3};

    use crate::{
        error::ErrorKind,
        format::{encode, Version},
        import_nif,
        node::NodeAsset,
        testing::GraphBuilder,
        ImportParams, EPSILON,
    };

    use super::{choose_correction, CORRECTIONS};

    #[test]
    fn correction_follows_dominant_axis() {
        assert_eq!(choose_correction(Vec3::new(0.0, 2.0, 0.1)), Some(1));
        assert_eq!(choose_correction(Vec3::new(-3.0, 0.2, 0.2)), Some(3));
        assert_eq!(choose_correction(Vec3::new(0.0, 0.0, -1.0)), Some(5));
        assert_eq!(choose_correction(Vec3::new(1.0, 1.0, 0.0)), None);
        assert_eq!(choose_correction(Vec3::ZERO), None);
    }

    #[test]
    fn corrections_point_the_bone_along_the_children() {
        // The joint's Y axis is the bone direction.
        let directions = [Vec3::X, Vec3::Y, Vec3::Z, -Vec3::X, -Vec3::Y, -Vec3::Z];
        for (correction, direction) in CORRECTIONS.iter().zip(directions) {
            let matrix = Mat3::from_cols_array_2d(correction);
            assert!(matrix.y_axis.abs_diff_eq(direction, 1e-6));
            assert!((matrix.determinant() - 1.0).abs() < 1e-6);
        }
    }

    fn find<'a>(nodes: &'a [NodeAsset], name: &str) -> &'a NodeAsset {
        nodes.iter().find_map(|node| node.find(name)).unwrap()
    }

    #[test]
    fn joint_rotation_keys_are_relative_to_bind_pose() {
        let bind = [
            Quat::from_rotation_z(0.3),
            Quat::from_rotation_x(-0.6),
            Quat::from_rotation_y(1.1),
        ];
        let keys = [
            Quat::from_rotation_z(0.9),
            Quat::from_rotation_x(0.4) * Quat::from_rotation_y(0.2),
            Quat::from_rotation_y(-0.5),
        ];

        let mut builder = GraphBuilder::default();
        let leaf = builder.node("Leaf", [0.0, 0.0, 1.0], &[]);
        let mid = builder.node("Mid", [0.0, 1.0, 0.0], &[leaf]);
        let joint_root = builder.node("Joint Root", [1.0, 0.0, 0.0], &[mid]);
        let skeleton = builder.node("Skeleton", [0.0, 0.0, 0.0], &[joint_root]);
        for (index, block) in [joint_root, mid, leaf].into_iter().enumerate() {
            builder.set_rotation(block, bind[index]);
            let [x, y, z, w] = keys[index].to_array();
            builder.keyframes(block, &[(0.5, [w, x, y, z])], &[], &[]);
        }
        let skin = builder.triangle_mesh(
            "Skin",
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[[0, 1, 2]],
        );
        builder.skin(skin, skeleton, &[(leaf, &[(0, 1.0)])]);
        let root = builder.node("Root", [0.0, 0.0, 0.0], &[skeleton, skin]);
        let bytes = encode(Version::new(4, 0, 0, 2), &builder.finish(root)).unwrap();

        let params = ImportParams {
            scale_correction: 1.0,
            frames_per_second: 30.0,
            ..Default::default()
        };
        let scene = import_nif(&bytes, &params).unwrap();
        assert_eq!(scene.alignments.len(), 3);
        for (index, name) in ["Joint Root", "Mid", "Leaf"].into_iter().enumerate() {
            let joint = find(&scene.nodes, name);
            let animation = joint.animation.as_ref().unwrap();
            assert_eq!(animation.rotation.len(), 1);
            assert_eq!(animation.rotation[0].frame, 16);

            let extra = joint.joint.as_ref().unwrap().extra_alignment;
            let extra = Quat::from_mat4(&extra).normalize();
            let channel = extra * animation.rotation[0].value * extra.inverse();
            let absolute = bind[index] * channel;
            assert!(absolute.angle_between(keys[index]) < EPSILON);
        }
    }

    #[test]
    fn joint_head_and_tail_in_armature_space() {
        let mut builder = GraphBuilder::default();
        let leaf = builder.node("Bip01 Leaf", [0.0, 2.0, 0.0], &[]);
        let base = builder.node("Bip01 Base", [0.0, 0.0, 1.0], &[leaf]);
        let skeleton = builder.node("Skeleton", [5.0, 0.0, 0.0], &[base]);
        let skin = builder.triangle_mesh(
            "Skin",
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[[0, 1, 2]],
        );
        builder.skin(skin, skeleton, &[(leaf, &[(0, 1.0)])]);
        let root = builder.node("Root", [0.0, 0.0, 0.0], &[skeleton, skin]);
        let bytes = encode(Version::new(4, 0, 0, 2), &builder.finish(root)).unwrap();
        let params = ImportParams {
            scale_correction: 1.0,
            ..Default::default()
        };
        let scene = import_nif(&bytes, &params).unwrap();

        let base = find(&scene.nodes, "Bip01 Base").joint.clone().unwrap();
        assert!(base.head.abs_diff_eq(Vec3::new(0.0, 0.0, 1.0), 1e-6));
        assert!(base.tail.abs_diff_eq(Vec3::new(0.0, 2.0, 1.0), 1e-6));
        // Child along +Y: no correction needed.
        assert!(base.orientation.abs_diff_eq(Mat3::IDENTITY, 1e-6));

        let leaf = find(&scene.nodes, "Bip01 Leaf").joint.clone().unwrap();
        assert!(leaf.head.abs_diff_eq(Vec3::new(0.0, 2.0, 1.0), 1e-6));
        assert!(leaf.tail.abs_diff_eq(Vec3::new(0.0, 4.0, 1.0), 1e-6));
        assert_eq!(scene.alignments[0].joint, "Bip01 Base");
        assert!(scene.alignments[0].matrix.abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn stretched_bone_fails_the_import_with_its_name() {
        let mut builder = GraphBuilder::default();
        let leaf = builder.node("Leaf", [0.0, 1.0, 0.0], &[]);
        let mid = builder.node("Mid", [0.0, 1.0, 0.0], &[leaf]);
        builder.set_rotation_rows(mid, [[1.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 1.0]]);
        let joint_root = builder.node("Joint Root", [1.0, 0.0, 0.0], &[mid]);
        let skeleton = builder.node("Skeleton", [0.0, 0.0, 0.0], &[joint_root]);
        let skin = builder.triangle_mesh(
            "Skin",
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[[0, 1, 2]],
        );
        builder.skin(skin, skeleton, &[(leaf, &[(0, 1.0)])]);
        let root = builder.node("Root", [0.0, 0.0, 0.0], &[skeleton, skin]);
        let bytes = encode(Version::new(4, 0, 0, 2), &builder.finish(root)).unwrap();
        let params = ImportParams {
            scale_correction: 1.0,
            ..Default::default()
        };

        let error = import_nif(&bytes, &params).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NonUniformScale);
        assert_eq!(error.node(), Some("Mid"));
    }
}
