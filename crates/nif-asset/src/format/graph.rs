use std::collections::HashSet;

use glam::{Mat3, Mat4, Vec3};
use log::warn;

use crate::error::{ImportError, Result};

use super::{
    block::{Block, BlockData, BlockType},
    record::{AvObjectRecord, Link},
};

/// Arena of decoded blocks. Links are plain indices into the arena, so shared
/// blocks and back links need no ownership.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockGraph {
    blocks: Vec<Block>,
    roots: Vec<Link>,
    parents: Vec<Option<usize>>,
}

impl BlockGraph {
    pub fn new(blocks: Vec<Block>, roots: Vec<Link>) -> Self {
        let mut parents = vec![None; blocks.len()];
        for block in &blocks {
            for child in block.children().iter().filter_map(Link::index) {
                if let Some(parent) = parents.get_mut(child) {
                    // First parent in stream order wins for shared children.
                    if parent.is_none() && child != block.index {
                        *parent = Some(block.index);
                    }
                }
            }
        }
        Self {
            blocks,
            roots,
            parents,
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub(crate) fn blocks_mut(&mut self) -> &mut [Block] {
        &mut self.blocks
    }

    pub fn roots(&self) -> &[Link] {
        &self.roots
    }

    /// The effective root: the first non-null root link.
    pub fn root(&self) -> Option<&Block> {
        self.roots.iter().find_map(|link| self.resolve(*link))
    }

    pub fn get(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    /// Follow a link. The null link resolves to `None`.
    pub fn resolve(&self, link: Link) -> Option<&Block> {
        link.index().and_then(|index| self.blocks.get(index))
    }

    pub fn parent(&self, block: &Block) -> Option<&Block> {
        self.parents
            .get(block.index)
            .copied()
            .flatten()
            .and_then(|index| self.blocks.get(index))
    }

    pub fn children<'a>(&'a self, block: &'a Block) -> impl Iterator<Item = Option<&'a Block>> {
        block.children().iter().map(|link| self.resolve(*link))
    }

    /// Walk a singly linked list threaded through `next`, stopping at the
    /// null link or at the first block seen twice.
    pub fn chain(&self, start: Link, next: fn(&Block) -> Link) -> Chain<'_> {
        Chain {
            graph: self,
            current: start,
            next,
            visited: HashSet::new(),
        }
    }

    pub fn find_controller(&self, block: &Block, kind: BlockType) -> Option<&Block> {
        let start = block.net()?.controller;
        self.chain(start, next_controller)
            .find(|controller| controller.kind == kind)
    }

    /// Search the linked extra data chain first, then the extra data list.
    pub fn find_extra(&self, block: &Block, kind: BlockType) -> Option<&Block> {
        let net = block.net()?;
        if let Some(extra) = self
            .chain(net.extra_data, next_extra_data)
            .find(|extra| extra.kind == kind)
        {
            return Some(extra);
        }
        net.extra_data_list
            .iter()
            .filter_map(|link| self.resolve(*link))
            .find(|extra| extra.kind == kind)
    }

    /// First property of the given type attached to a scene object.
    pub fn find_property(&self, block: &Block, kind: BlockType) -> Option<&Block> {
        block
            .av()?
            .properties
            .iter()
            .filter_map(|link| self.resolve(*link))
            .find(|property| property.kind == kind)
    }

    pub fn local_transform(&self, block: &Block) -> Mat4 {
        block.av().map(av_matrix).unwrap_or(Mat4::IDENTITY)
    }

    /// Bind pose in scene space, composed from the chain of parents.
    pub fn world_transform(&self, block: &Block) -> Mat4 {
        let mut matrix = self.local_transform(block);
        let mut visited = HashSet::from([block.index]);
        let mut current = self.parent(block);
        while let Some(parent) = current {
            if !visited.insert(parent.index) {
                warn!("Parent cycle through block {}", parent.index);
                break;
            }
            matrix = self.local_transform(parent) * matrix;
            current = self.parent(parent);
        }
        matrix
    }

    pub(crate) fn validate_links(&self) -> Result<()> {
        let dangling = |link: &Link| link.index().filter(|index| *index >= self.blocks.len());
        for block in &self.blocks {
            if let Some(index) = block.links().iter().find_map(dangling) {
                return Err(ImportError::Format(format!(
                    "block {} links to missing block {}",
                    block.index, index
                )));
            }
        }
        if let Some(index) = self.roots.iter().find_map(dangling) {
            return Err(ImportError::Format(format!(
                "root links to missing block {}",
                index
            )));
        }
        Ok(())
    }
}

/// `T * R * S` of a scene object, in column-vector form.
pub fn av_matrix(av: &AvObjectRecord) -> Mat4 {
    Mat4::from_translation(Vec3::from(av.translation))
        * Mat4::from_mat3(Mat3::from_cols_array_2d(&av.rotation))
        * Mat4::from_scale(Vec3::splat(av.scale))
}

fn next_controller(block: &Block) -> Link {
    match &block.data {
        BlockData::Controller(controller) => controller.next_controller,
        _ => Link::NULL,
    }
}

fn next_extra_data(block: &Block) -> Link {
    match &block.data {
        BlockData::TextKeyExtra(extra) => extra.next_extra_data,
        BlockData::StringExtra(extra) => extra.next_extra_data,
        _ => Link::NULL,
    }
}

pub struct Chain<'a> {
    graph: &'a BlockGraph,
    current: Link,
    next: fn(&Block) -> Link,
    visited: HashSet<usize>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a Block;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.graph.resolve(self.current)?;
        if !self.visited.insert(block.index) {
            return None;
        }
        self.current = (self.next)(block);
        Some(block)
    }
}
