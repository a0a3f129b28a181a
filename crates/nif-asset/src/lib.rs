//! Import NetImmerse/Gamebryo block streams as hierarchical scenes.
//!
//! The block stream is decoded into an arena of typed blocks, then a
//! conversion session walks it and produces an owned scene tree made of
//! empties, meshes and armatures with joint animation expressed relative
//! to the bind pose. Materials and textures that are structurally equal are
//! shared. Applications receive the result either as plain data or through
//! the [`host::SceneHost`] interface.
//!
pub mod animation;
pub mod error;
/// Block stream decoder and encoder with `binrw`.
pub mod format;
pub mod host;
pub mod index;
pub mod loader;
pub mod material;
pub mod mesh;
pub mod node;
pub mod scene;
pub mod skin;
pub mod texture;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ErrorKind, ImportError, Result};
pub use loader::{
    import_nif, import_nif_file, import_nif_with_progress, ImportParams, VertexDedup,
    SCALE_CORRECTION_RANGE,
};

/// Tolerance for comparing scales, colours and other quantized values.
pub const EPSILON: f32 = 0.005;
