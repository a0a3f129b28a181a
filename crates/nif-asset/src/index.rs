use std::fmt::{self, Display, Formatter, LowerHex};

use sha2::{Digest, Sha256};

/// SHA-256 of the block stream an import read.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceIndex(pub [u8; 32]);

impl SourceIndex {
    pub fn digest_from_buffer(buffer: &[u8]) -> Self {
        Self(Sha256::digest(buffer).into())
    }
}

impl LowerHex for SourceIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // `{:.N}` limits the output to the first N bytes.
        let bytes = f.precision().unwrap_or(self.0.len()).min(self.0.len());
        for byte in &self.0[..bytes] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl Display for SourceIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self)
    }
}

/// What an output asset was built as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceAssetType {
    Node,
    Joint,
    Material,
    Texture,
}

impl SourceAssetType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceAssetType::Node => "node",
            SourceAssetType::Joint => "joint",
            SourceAssetType::Material => "material",
            SourceAssetType::Texture => "texture",
        }
    }
}

impl Display for SourceAssetType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an output asset. Assets deduplicated during one import keep
/// the id of the first block that produced them, so equal ids mean shared
/// output. Ids sort by source stream, then kind, then block order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssetIndex {
    /// The whole imported scene.
    Source(SourceIndex),
    SourceBlock(SourceIndex, SourceAssetType, usize),
}

impl AssetIndex {
    /// Index of the block the asset was converted from.
    pub fn block(&self) -> Option<usize> {
        match self {
            AssetIndex::Source(_) => None,
            AssetIndex::SourceBlock(_, _, block) => Some(*block),
        }
    }
}

/// `<digest prefix>` for a scene, `<digest prefix>/<kind>#<block>` for an
/// asset converted from one block.
impl Display for AssetIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AssetIndex::Source(source) => write!(f, "{:.4x}", source),
            AssetIndex::SourceBlock(source, asset_type, block) => {
                write!(f, "{:.4x}/{}#{}", source, asset_type, block)
            }
        }
    }
}
