use std::collections::HashSet;

use glam::{Quat, Vec3};
use log::{debug, warn};

use crate::{
    animation::{frame_for_time, insert_key, TransformAnimation},
    error::{ImportError, Result},
    format::{
        block::{Block, BlockData, BlockType},
        record::KeyframeDataRecord,
    },
    index::SourceAssetType,
    node::{NodeAsset, NodeRole, ParentMode},
    scene::TextKey,
};

use super::{
    names::{BONE_NAME_LENGTH, OBJECT_NAME_LENGTH},
    session::ConversionSession,
};

/// Quaternion of a `(w, x, y, z)` key.
pub(super) fn key_rotation(value: [f32; 4]) -> Quat {
    let [w, x, y, z] = value;
    Quat::from_xyzw(x, y, z, w).normalize()
}

impl<'a> ConversionSession<'a> {
    /// Convert one branch. Null links and blocks that are neither geometry
    /// nor nodes produce nothing.
    pub(super) fn read_branch(&mut self, block: Option<&'a Block>) -> Result<Option<NodeAsset>> {
        self.tick();
        let Some(block) = block else {
            return Ok(None);
        };
        if block.is_derived_from(BlockType::NiTriBasedGeom) {
            return Ok(Some(self.convert_mesh(block)?));
        }
        if !block.is_derived_from(BlockType::NiNode) {
            return Ok(None);
        }

        let graph = self.graph;
        let mut node = if self.skeletons.is_skeleton_root(block) {
            // Joints are built in one pass; meshes below them follow.
            let mut armature = self.convert_armature(block)?;
            let mut visited = HashSet::from([block.index]);
            self.read_armature_branch(&mut armature, block, block, &mut visited)?;
            armature
        } else {
            let name = self.names.resolve(block.name(), OBJECT_NAME_LENGTH);
            let mut empty =
                NodeAsset::new(self.asset_id(SourceAssetType::Node, block), name, NodeRole::Empty);
            for child in graph.children(block) {
                if let Some(child) = self.read_branch(child)? {
                    empty.children.push(child);
                }
            }
            empty
        };
        node.transform = graph.local_transform(block);
        node.animation = self.object_animation(block)?;
        if let Some(text_keys) = graph.find_extra(block, BlockType::NiTextKeyExtraData) {
            self.import_text_keys(text_keys)?;
        }
        Ok(Some(node))
    }

    /// Attach every mesh below `block` to the armature, deformed by it.
    fn read_armature_branch(
        &mut self,
        armature: &mut NodeAsset,
        armature_block: &Block,
        block: &'a Block,
        visited: &mut HashSet<usize>,
    ) -> Result<()> {
        let graph = self.graph;
        for child in graph.children(block).flatten() {
            if child.is_derived_from(BlockType::NiNode) {
                if visited.insert(child.index) {
                    self.read_armature_branch(armature, armature_block, child, visited)?;
                }
                continue;
            }
            if !matches!(child.kind, BlockType::NiTriShape | BlockType::NiTriStrips) {
                continue;
            }
            let mut mesh = self.convert_mesh(child)?;
            mesh.transform =
                graph.world_transform(armature_block).inverse() * graph.world_transform(child);
            mesh.parent_mode = ParentMode::Deform;
            if let Some(bone) = self.skeletons.closest_bone(graph, child) {
                let group = self.names.resolve(bone.name(), BONE_NAME_LENGTH);
                if let Some(data) = &mut mesh.mesh {
                    let weighted = data.weighted_vertices();
                    let unweighted: Vec<usize> = (0..data.vertices.len())
                        .filter(|vertex| !weighted.contains(vertex))
                        .collect();
                    if !unweighted.is_empty() {
                        debug!(
                            "Mesh {:?} follows bone {:?} with {} vertices",
                            mesh.name,
                            group,
                            unweighted.len()
                        );
                        let group = data.group_mut(&group);
                        for vertex in unweighted {
                            group.assign(vertex, 1.0);
                        }
                    }
                }
            }
            armature.children.push(mesh);
        }
        Ok(())
    }

    /// Keyframe data of a block's keyframe controller, if it has one.
    pub(super) fn keyframe_data(&mut self, block: &Block) -> Result<Option<&'a KeyframeDataRecord>> {
        let graph = self.graph;
        let Some(controller) = graph.find_controller(block, BlockType::NiKeyframeController) else {
            return Ok(None);
        };
        let data = controller.field("Data")?.as_link("Data")?;
        match graph.resolve(data).map(|data| &data.data) {
            Some(BlockData::KeyframeData(data)) => Ok(Some(data)),
            Some(_) => {
                let name = self.names.resolve(block.name(), OBJECT_NAME_LENGTH);
                Err(ImportError::missing_data(
                    name,
                    "keyframe controller data is not keyframe data",
                ))
            }
            None => {
                warn!("Keyframe controller of {:?} has no data", block.name());
                Ok(None)
            }
        }
    }

    /// Object keys are absolute local transforms, taken over unchanged.
    fn object_animation(&mut self, block: &Block) -> Result<Option<TransformAnimation>> {
        let Some(data) = self.keyframe_data(block)? else {
            return Ok(None);
        };
        let fps = self.params.frames_per_second;
        let mut animation = TransformAnimation::default();
        for key in &data.scale_keys {
            insert_key(&mut animation.scale, frame_for_time(key.time, fps), key.value);
        }
        for key in &data.rotation_keys {
            let frame = frame_for_time(key.time, fps);
            insert_key(&mut animation.rotation, frame, key_rotation(key.value));
        }
        for key in &data.translation_keys {
            let frame = frame_for_time(key.time, fps);
            insert_key(&mut animation.translation, frame, Vec3::from(key.value));
        }
        Ok((!animation.is_empty()).then_some(animation))
    }

    /// Replace the run's text keys with those of `block`.
    pub(super) fn import_text_keys(&mut self, block: &Block) -> Result<()> {
        let BlockData::TextKeyExtra(record) = &block.data else {
            return Err(ImportError::missing_data(
                block.name(),
                "text key extra data has no keys",
            ));
        };
        let fps = self.params.frames_per_second;
        let mut frame = 1;
        self.text_keys.clear();
        for key in &record.keys {
            frame = frame_for_time(key.time, fps);
            let text = key.value.as_str().replace("\r\n", "/");
            self.text_keys.push(TextKey {
                frame,
                text: text.trim_end_matches('/').to_string(),
            });
        }
        self.frame_end = Some(frame);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use glam::{Mat4, Vec3};

    use crate::{
        format::{encode, Version},
        import_nif,
        node::{NodeRole, ParentMode},
        testing::GraphBuilder,
        ImportParams,
    };

    fn params() -> ImportParams {
        ImportParams {
            scale_correction: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn root_node_is_unwrapped() {
        let mut builder = GraphBuilder::default();
        let a = builder.triangle_mesh(
            "Tri A",
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[[0, 1, 2]],
        );
        let group = builder.node("Group", [1.0, 2.0, 3.0], &[a]);
        let root = builder.node("Scene Root", [0.0, 0.0, 0.0], &[group]);
        builder.text_keys(root, &[(0.0, "start\r\n"), (2.0, "end")]);
        let bytes = encode(Version::new(4, 0, 0, 2), &builder.finish(root)).unwrap();

        let scene = import_nif(&bytes, &params()).unwrap();
        assert_eq!(scene.nodes.len(), 1);
        let group = &scene.nodes[0];
        assert_eq!(group.role, NodeRole::Empty);
        assert_eq!(group.name, "Group");
        assert!(group
            .transform
            .abs_diff_eq(Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)), 1e-6));
        assert_eq!(group.children[0].name, "A");
        assert_eq!(scene.text_keys_text(), "1/start\n51/end\n");
        assert_eq!(scene.frame_end, Some(51));
    }

    #[test]
    fn bare_mesh_root_is_imported() {
        let mut builder = GraphBuilder::default();
        let shape = builder.triangle_mesh(
            "Lonely",
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[[0, 1, 2]],
        );
        let bytes = encode(Version::new(4, 0, 0, 2), &builder.finish(shape)).unwrap();
        let scene = import_nif(&bytes, &params()).unwrap();
        assert_eq!(scene.nodes.len(), 1);
        assert_eq!(scene.nodes[0].role, NodeRole::Mesh);
    }

    #[test]
    fn object_keys_are_kept_absolute() {
        let mut builder = GraphBuilder::default();
        let door = builder.node("Door", [0.0, 0.0, 0.0], &[]);
        builder.keyframes(
            door,
            &[(0.0, [1.0, 0.0, 0.0, 0.0])],
            &[(0.0, [0.0, 0.0, 0.0]), (1.0, [0.0, 0.0, 2.0])],
            &[],
        );
        let root = builder.node("Root", [0.0, 0.0, 0.0], &[door]);
        let bytes = encode(Version::new(4, 0, 0, 2), &builder.finish(root)).unwrap();

        let scene = import_nif(&bytes, &params()).unwrap();
        let animation = scene.nodes[0].animation.as_ref().unwrap();
        assert_eq!(animation.translation.len(), 2);
        assert_eq!(animation.translation[1].frame, 26);
        assert_eq!(animation.translation[1].value, Vec3::new(0.0, 0.0, 2.0));
        assert!(animation.scale.is_empty());
    }

    #[test]
    fn meshes_below_bones_follow_the_armature() {
        let mut builder = GraphBuilder::default();
        let sword = builder.triangle_mesh(
            "Sword",
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[[0, 1, 2]],
        );
        builder.vertex_colors(sword, &[[1.0, 0.0, 0.0, 1.0]; 3]);
        let hand = builder.node("Bip01 R Hand", [0.0, 0.0, 1.0], &[sword]);
        let pelvis = builder.node("Bip01 Pelvis", [0.0, 0.0, 1.0], &[hand]);
        let skeleton = builder.node("Skeleton", [0.0, 0.0, 0.0], &[pelvis]);
        let body = builder.triangle_mesh(
            "Body",
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[[0, 1, 2]],
        );
        builder.skin(body, skeleton, &[(pelvis, &[(0, 0.5), (1, 1.0)])]);
        let root = builder.node("Root", [0.0, 0.0, 0.0], &[skeleton, body]);
        let bytes = encode(Version::new(4, 0, 0, 2), &builder.finish(root)).unwrap();

        let scene = import_nif(&bytes, &params()).unwrap();
        let armature = scene.find("Skeleton").unwrap();
        assert_eq!(armature.role, NodeRole::ArmatureRoot);
        let sword = armature
            .children
            .iter()
            .find(|child| child.name == "Sword")
            .unwrap();
        assert_eq!(sword.parent_mode, ParentMode::Deform);
        assert!(sword
            .transform
            .abs_diff_eq(Mat4::from_translation(Vec3::new(0.0, 0.0, 2.0)), 1e-6));
        let mesh = sword.mesh.as_ref().unwrap();
        let group = mesh.group("Bip01 R Hand").unwrap();
        assert_eq!(group.weights.len(), 3);
        assert!(mesh.material.is_none());
        assert!(mesh.colors.is_some());
        assert_eq!(mesh.vertex_color_mode, None);

        let body = scene.find("Body").unwrap().mesh.as_ref().unwrap();
        assert_eq!(body.group("Bip01 Pelvis").unwrap().weights[&0], 0.5);
        assert_eq!(scene.find("Bip01 R Hand").unwrap().role, NodeRole::Joint);
    }
}
