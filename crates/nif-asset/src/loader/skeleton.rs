use std::collections::{BTreeMap, BTreeSet, HashSet};

use log::{debug, warn};

use crate::{
    error::{ImportError, Result},
    format::{
        block::{Block, BlockType},
        graph::BlockGraph,
    },
};

/// Name prefix that marks a joint even without a skin referencing it.
const BONE_PREFIX: &str = "Bip01 ";

/// Skeletons discovered from skin instances, keyed by skeleton root name.
#[derive(Debug, Default)]
pub struct SkeletonRegistry {
    skeletons: BTreeMap<String, BTreeSet<String>>,
}

impl SkeletonRegistry {
    /// Register every skeleton referenced by skinned geometry below `root`.
    pub fn mark_skeletons(&mut self, graph: &BlockGraph, root: &Block) -> Result<()> {
        let mut visited = HashSet::new();
        self.mark_branch(graph, root, &mut visited)
    }

    fn mark_branch(
        &mut self,
        graph: &BlockGraph,
        block: &Block,
        visited: &mut HashSet<usize>,
    ) -> Result<()> {
        if !visited.insert(block.index) {
            return Ok(());
        }
        if block.is_derived_from(BlockType::NiTriBasedGeom) {
            let skin = block.field("Skin Instance")?.as_link("Skin Instance")?;
            if let Some(skin) = graph.resolve(skin) {
                self.mark_skin(graph, block, skin)?;
            }
            return Ok(());
        }
        for child in graph.children(block).flatten() {
            self.mark_branch(graph, child, visited)?;
        }
        Ok(())
    }

    fn mark_skin(&mut self, graph: &BlockGraph, geometry: &Block, skin: &Block) -> Result<()> {
        debug!("Skin instance found on block {:?}", geometry.name());
        let root = skin.field("Skeleton Root")?.as_link("Skeleton Root")?;
        let Some(root) = graph.resolve(root) else {
            return Err(ImportError::missing_data(
                geometry.name(),
                "skin instance has no skeleton root",
            ));
        };
        let root_name = root.name().to_string();
        if !self.skeletons.contains_key(&root_name) {
            debug!("{:?} is an armature", root_name);
        }
        let bones = self.skeletons.entry(root_name.clone()).or_default();

        let links = skin.field("Bones")?.as_link_list("Bones")?;
        for bone in links.iter().filter_map(|link| graph.resolve(*link)) {
            if bones.insert(bone.name().to_string()) {
                debug!("{:?} is a bone of armature {:?}", bone.name(), root_name);
            }
            // Ancestors up to the skeleton root are joints too, so that the
            // bone set forms a connected tree.
            let mut seen = HashSet::from([bone.index]);
            let mut current = bone;
            loop {
                let Some(parent) = graph.parent(current) else {
                    warn!(
                        "Bone {:?} is not below skeleton root {:?}",
                        bone.name(),
                        root_name
                    );
                    break;
                };
                if parent.name() == root_name || !seen.insert(parent.index) {
                    break;
                }
                if bones.insert(parent.name().to_string()) {
                    debug!("{:?} is a bone of armature {:?}", parent.name(), root_name);
                }
                current = parent;
            }
        }
        Ok(())
    }

    /// Fold every skeleton whose root is a bone of another skeleton into that
    /// skeleton, until no root is listed as a bone elsewhere.
    pub fn merge_skeletons(&mut self) {
        loop {
            let pair = self.skeletons.iter().find_map(|(name, bones)| {
                self.skeletons
                    .keys()
                    .find(|other| *other != name && bones.contains(*other))
                    .map(|other| (name.clone(), other.clone()))
            });
            let Some((into, from)) = pair else {
                break;
            };
            debug!("Merging armature {:?} into armature {:?}", from, into);
            let merged = self.skeletons.remove(&from).unwrap_or_default();
            if let Some(bones) = self.skeletons.get_mut(&into) {
                bones.extend(merged);
            }
        }
    }

    pub fn is_bone(&self, block: &Block) -> bool {
        let name = block.name();
        name.starts_with(BONE_PREFIX) || self.skeletons.values().any(|bones| bones.contains(name))
    }

    pub fn is_skeleton_root(&self, block: &Block) -> bool {
        self.skeletons.contains_key(block.name())
    }

    /// Nearest ancestor classified as a bone.
    pub fn closest_bone<'a>(&self, graph: &'a BlockGraph, block: &Block) -> Option<&'a Block> {
        let mut visited = HashSet::from([block.index]);
        let mut current = graph.parent(block);
        while let Some(parent) = current {
            if self.is_bone(parent) {
                return Some(parent);
            }
            if !visited.insert(parent.index) {
                break;
            }
            current = graph.parent(parent);
        }
        None
    }

    pub fn skeletons(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.skeletons
    }

    pub fn is_empty(&self) -> bool {
        self.skeletons.is_empty()
    }
}
