use log::{debug, info, log_enabled, Level};

use crate::{
    error::{ImportError, Result},
    format::{
        block::{Block, BlockType},
        graph::BlockGraph,
        Version,
    },
    host::ProgressSink,
    index::{AssetIndex, SourceAssetType, SourceIndex},
    scene::{AlignmentRecord, SceneAsset, TextKey},
};

use super::{
    dedup::DedupIndex, names::NameResolver, skeleton::SkeletonRegistry, texture::TextureLoader,
    ImportParams,
};

/// All mutable state of one import run. Nothing outlives the run, so two
/// sessions never share names, materials or skeletons.
pub(crate) struct ConversionSession<'a> {
    pub(super) params: &'a ImportParams,
    pub(super) graph: &'a BlockGraph,
    pub(super) source: SourceIndex,
    pub(super) progress: &'a mut dyn ProgressSink,
    pub(super) names: NameResolver,
    pub(super) dedup: DedupIndex,
    pub(super) skeletons: SkeletonRegistry,
    pub(super) textures: TextureLoader,
    pub(super) alignments: Vec<AlignmentRecord>,
    pub(super) text_keys: Vec<TextKey>,
    pub(super) frame_end: Option<u32>,
    blocks_read: usize,
    read_progress: f32,
}

impl<'a> ConversionSession<'a> {
    pub fn new(
        params: &'a ImportParams,
        graph: &'a BlockGraph,
        source: SourceIndex,
        progress: &'a mut dyn ProgressSink,
    ) -> Self {
        Self {
            params,
            graph,
            source,
            progress,
            names: NameResolver::default(),
            dedup: DedupIndex::default(),
            skeletons: SkeletonRegistry::default(),
            textures: TextureLoader::new(params.texture_dirs()),
            alignments: Vec::new(),
            text_keys: Vec::new(),
            frame_end: None,
            blocks_read: 0,
            read_progress: 0.0,
        }
    }

    pub fn run(mut self, version: Version) -> Result<SceneAsset> {
        let graph = self.graph;
        let Some(root) = graph.root() else {
            return Err(ImportError::Format(String::from("stream has no root block")));
        };

        self.skeletons.mark_skeletons(graph, root)?;
        self.skeletons.merge_skeletons();
        if log_enabled!(Level::Debug) {
            for (armature, bones) in self.skeletons.skeletons() {
                debug!("Armature {:?}: {:?}", armature, bones);
            }
        }

        let mut nodes = Vec::new();
        if !self.skeletons.is_skeleton_root(root) && root.is_derived_from(BlockType::NiNode) {
            // Import the children of the root node directly instead of
            // wrapping everything in one more empty.
            if let Some(text_keys) = graph.find_extra(root, BlockType::NiTextKeyExtraData) {
                self.import_text_keys(text_keys)?;
            }
            for child in graph.children(root) {
                nodes.extend(self.read_branch(child)?);
            }
        } else {
            nodes.extend(self.read_branch(Some(root))?);
        }

        info!(
            "Imported {} top-level nodes, {} materials, {} textures",
            nodes.len(),
            self.dedup.material_count(),
            self.dedup.texture_count()
        );
        Ok(SceneAsset {
            id: AssetIndex::Source(self.source.clone()),
            version,
            nodes,
            text_keys: self.text_keys,
            frame_end: self.frame_end,
            names: self.names.records(),
            alignments: self.alignments,
        })
    }

    pub(super) fn asset_id(&self, asset_type: SourceAssetType, block: &Block) -> AssetIndex {
        AssetIndex::SourceBlock(self.source.clone(), asset_type, block.index)
    }

    /// Count a visited block and report progress in steps of at least 10%.
    pub(super) fn tick(&mut self) {
        self.blocks_read += 1;
        let fraction = self.blocks_read as f32 / (self.graph.len() + 1) as f32;
        if fraction >= self.read_progress + 0.1 {
            self.read_progress = fraction;
            self.progress.report_progress(fraction, "Importing data");
        }
    }
}
