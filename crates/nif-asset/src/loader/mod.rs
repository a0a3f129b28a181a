use std::{
    ops::RangeInclusive,
    path::{Path, PathBuf},
};

use log::{info, LevelFilter};

use crate::{
    error::{ImportError, Result},
    format,
    host::{LogProgress, ProgressSink},
    index::SourceIndex,
    scene::SceneAsset,
};

mod armature;
mod dedup;
mod geometry;
mod material;
mod names;
mod session;
mod skeleton;
mod texture;
mod tree;

pub use dedup::float_hash;

/// Accepted range of `ImportParams::scale_correction`.
pub const SCALE_CORRECTION_RANGE: RangeInclusive<f32> = 0.01..=100.0;
pub use names::NameResolver;
pub use skeleton::SkeletonRegistry;

/// How source vertices map to output vertices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum VertexDedup {
    /// One output vertex per source vertex.
    Fast,
    /// Merge vertices with equal quantized position and normal.
    #[default]
    SeamPreserving,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ImportParams {
    /// Semicolon-separated texture directories.
    pub texture_search_path: String,
    /// Source units per output unit.
    pub scale_correction: f32,
    pub vertex_dedup: VertexDedup,
    /// 0 is silent, 4 traces every key.
    pub verbosity: u8,
    pub frames_per_second: f32,
    /// Directory of the imported file, searched for textures.
    pub source_dir: Option<PathBuf>,
}

impl Default for ImportParams {
    fn default() -> Self {
        Self {
            texture_search_path: String::new(),
            scale_correction: 10.0,
            vertex_dedup: VertexDedup::SeamPreserving,
            verbosity: 2,
            frames_per_second: 25.0,
            source_dir: None,
        }
    }
}

impl ImportParams {
    pub fn level_filter(&self) -> LevelFilter {
        match self.verbosity {
            0 => LevelFilter::Error,
            1 => LevelFilter::Warn,
            2 => LevelFilter::Info,
            3 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    /// Reject parameters that would turn every transform into NaN or put
    /// all keys on one frame.
    pub fn validate(&self) -> Result<()> {
        if !SCALE_CORRECTION_RANGE.contains(&self.scale_correction) {
            return Err(ImportError::InvalidParams(format!(
                "scale correction {} is outside {}..={}",
                self.scale_correction,
                SCALE_CORRECTION_RANGE.start(),
                SCALE_CORRECTION_RANGE.end()
            )));
        }
        if !(self.frames_per_second.is_finite() && self.frames_per_second > 0.0) {
            return Err(ImportError::InvalidParams(format!(
                "frames per second must be positive, got {}",
                self.frames_per_second
            )));
        }
        Ok(())
    }

    /// Directories searched for external textures, in order: the configured
    /// path, the model's directory, then the `textures` directory that
    /// replaces the `meshes` part of the model's path.
    pub(crate) fn texture_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self
            .texture_search_path
            .split(';')
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
            .map(|dir| PathBuf::from(dir.replace('\\', "/")))
            .collect();
        if let Some(source_dir) = &self.source_dir {
            dirs.push(source_dir.clone());
            if let Some(textures) = sibling_textures_dir(source_dir) {
                dirs.push(textures);
            }
        }
        dirs
    }
}

fn sibling_textures_dir(source_dir: &Path) -> Option<PathBuf> {
    let text = source_dir.to_string_lossy();
    let position = text.to_ascii_lowercase().find("meshes")?;
    Some(PathBuf::from(format!("{}textures", &text[..position])))
}

/// Import a block stream held in memory.
pub fn import_nif(bytes: &[u8], params: &ImportParams) -> Result<SceneAsset> {
    import_nif_with_progress(bytes, params, &mut LogProgress)
}

pub fn import_nif_with_progress(
    bytes: &[u8],
    params: &ImportParams,
    progress: &mut dyn ProgressSink,
) -> Result<SceneAsset> {
    params.validate()?;
    progress.report_progress(0.0, "Reading file");
    let source = SourceIndex::digest_from_buffer(bytes);
    let (version, mut graph) = format::decode(bytes)?;
    info!("Importing {} ({} blocks, version {})", source, graph.len(), version);
    graph.scale_tree(1.0 / params.scale_correction);
    let scene = session::ConversionSession::new(params, &graph, source, progress).run(version)?;
    progress.report_progress(1.0, "Finished");
    Ok(scene)
}

/// Import a file, searching its directory for textures unless
/// `params.source_dir` is already set.
pub fn import_nif_file<P: AsRef<Path>>(path: P, params: &ImportParams) -> Result<SceneAsset> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let mut params = params.clone();
    if params.source_dir.is_none() {
        params.source_dir = path.parent().map(Path::to_path_buf);
    }
    import_nif(&bytes, &params)
}
