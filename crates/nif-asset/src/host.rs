//! Replaying an imported scene into a host application.
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use glam::{Mat3, Mat4, Quat, Vec3};
use log::info;

use crate::{
    animation::TransformAnimation,
    mesh::MeshAsset,
    node::{NodeAsset, NodeRole, ParentMode},
    scene::SceneAsset,
    texture::TextureAsset,
};

pub trait ProgressSink {
    /// `fraction` grows monotonically while `message` stays the same.
    fn report_progress(&mut self, fraction: f32, message: &str);
}

/// Progress sink that writes to the log.
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report_progress(&mut self, fraction: f32, message: &str) {
        info!("{} ({:.0}%)", message, fraction * 100.0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureSlot {
    Base,
    Glow,
}

#[derive(Debug, Clone)]
pub struct MeshTexture<T> {
    pub slot: TextureSlot,
    pub texture: T,
}

/// Object model of the application receiving the scene.
pub trait SceneHost: ProgressSink {
    type Node: Clone;
    type Texture: Clone;

    fn create_scene_node(&mut self, role: NodeRole, name: &str) -> Self::Node;

    fn set_local_transform(&mut self, node: &Self::Node, matrix: Mat4);

    fn set_parent(&mut self, child: &Self::Node, parent: &Self::Node, mode: ParentMode);

    fn create_mesh(
        &mut self,
        name: &str,
        mesh: &MeshAsset,
        textures: &[MeshTexture<Self::Texture>],
    ) -> Self::Node;

    /// Add a joint to an armature; `parent` is the parent joint, if any.
    fn create_joint(
        &mut self,
        armature: &Self::Node,
        parent: Option<&Self::Node>,
        name: &str,
        head: Vec3,
        tail: Vec3,
        orientation: Mat3,
    ) -> Self::Node;

    fn insert_transform_keyframe(
        &mut self,
        node: &Self::Node,
        frame: u32,
        translation: Option<Vec3>,
        rotation: Option<Quat>,
        scale: Option<f32>,
    );

    fn create_or_reuse_texture(&mut self, texture: &TextureAsset) -> Self::Texture;
}

struct Publisher<'a, H: SceneHost> {
    host: &'a mut H,
    textures: HashMap<*const TextureAsset, H::Texture>,
}

impl<H: SceneHost> Publisher<'_, H> {
    fn texture(&mut self, texture: &Arc<TextureAsset>) -> H::Texture {
        if let Some(handle) = self.textures.get(&Arc::as_ptr(texture)) {
            return handle.clone();
        }
        let handle = self.host.create_or_reuse_texture(texture);
        self.textures.insert(Arc::as_ptr(texture), handle.clone());
        handle
    }

    fn mesh_textures(&mut self, mesh: &MeshAsset) -> Vec<MeshTexture<H::Texture>> {
        let Some(material) = &mesh.material else {
            return Vec::new();
        };
        let mut textures = Vec::new();
        if let Some(base) = &material.base_texture {
            textures.push(MeshTexture {
                slot: TextureSlot::Base,
                texture: self.texture(&base.texture),
            });
        }
        if let Some(glow) = &material.glow_texture {
            textures.push(MeshTexture {
                slot: TextureSlot::Glow,
                texture: self.texture(&glow.texture),
            });
        }
        textures
    }

    fn keyframes(&mut self, handle: &H::Node, animation: &TransformAnimation) {
        type FrameKeys = (Option<Vec3>, Option<Quat>, Option<f32>);
        let mut frames: BTreeMap<u32, FrameKeys> = BTreeMap::new();
        for key in &animation.translation {
            frames.entry(key.frame).or_default().0 = Some(key.value);
        }
        for key in &animation.rotation {
            frames.entry(key.frame).or_default().1 = Some(key.value);
        }
        for key in &animation.scale {
            frames.entry(key.frame).or_default().2 = Some(key.value);
        }
        for (frame, (translation, rotation, scale)) in frames {
            self.host
                .insert_transform_keyframe(handle, frame, translation, rotation, scale);
        }
    }

    fn joint(&mut self, armature: &H::Node, parent: Option<&H::Node>, node: &NodeAsset) {
        let Some(joint) = &node.joint else {
            return;
        };
        let handle = self.host.create_joint(
            armature,
            parent,
            &node.name,
            joint.head,
            joint.tail,
            joint.orientation,
        );
        if let Some(animation) = &node.animation {
            self.keyframes(&handle, animation);
        }
        for child in &node.children {
            if child.role == NodeRole::Joint {
                self.joint(armature, Some(&handle), child);
            }
        }
    }

    fn node(&mut self, node: &NodeAsset) -> H::Node {
        let handle = match &node.mesh {
            Some(mesh) => {
                let textures = self.mesh_textures(mesh);
                self.host.create_mesh(&node.name, mesh, &textures)
            }
            None => self.host.create_scene_node(node.role, &node.name),
        };
        self.host.set_local_transform(&handle, node.transform);
        if let Some(animation) = &node.animation {
            self.keyframes(&handle, animation);
        }
        for child in &node.children {
            if child.role == NodeRole::Joint {
                self.joint(&handle, None, child);
            } else {
                let child_handle = self.node(child);
                self.host.set_parent(&child_handle, &handle, child.parent_mode);
            }
        }
        handle
    }
}

/// Create every node of `scene` in `host`, sharing one host texture per
/// distinct texture asset. Returns the top-level handles.
pub fn publish<H: SceneHost>(scene: &SceneAsset, host: &mut H) -> Vec<H::Node> {
    host.report_progress(0.0, "Creating scene");
    let mut publisher = Publisher {
        host,
        textures: HashMap::new(),
    };
    let handles = scene
        .nodes
        .iter()
        .map(|node| publisher.node(node))
        .collect();
    publisher.host.report_progress(1.0, "Finished");
    handles
}
