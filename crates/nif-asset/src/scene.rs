use glam::Mat4;

use crate::{format::Version, index::AssetIndex, node::NodeAsset};

/// Named animation marker, e.g. the start or end of a clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextKey {
    pub frame: u32,
    pub text: String,
}

/// Maps a resolved identifier back to the native name it was shortened from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRecord {
    pub identifier: String,
    pub native: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentRecord {
    pub joint: String,
    pub matrix: Mat4,
}

#[derive(Debug, Clone)]
pub struct SceneAsset {
    pub id: AssetIndex,
    pub version: Version,
    pub nodes: Vec<NodeAsset>,
    pub text_keys: Vec<TextKey>,
    /// Last frame of the animation, taken from the text keys.
    pub frame_end: Option<u32>,
    pub names: Vec<NameRecord>,
    pub alignments: Vec<AlignmentRecord>,
}

impl SceneAsset {
    pub fn find(&self, name: &str) -> Option<&NodeAsset> {
        self.nodes.iter().find_map(|node| node.find(name))
    }

    /// One `identifier;native` line per resolved name.
    pub fn names_text(&self) -> String {
        self.names
            .iter()
            .map(|record| format!("{};{}\n", record.identifier, record.native))
            .collect()
    }

    /// One `joint/r0;r1;r2;r3` line per joint, rows in row-vector form.
    pub fn alignments_text(&self) -> String {
        self.alignments
            .iter()
            .map(|record| {
                let rows = record
                    .matrix
                    .to_cols_array_2d()
                    .map(|row| format!("{},{},{},{}", row[0], row[1], row[2], row[3]));
                format!("{}/{}\n", record.joint, rows.join(";"))
            })
            .collect()
    }

    /// One `frame/text` line per text key.
    pub fn text_keys_text(&self) -> String {
        self.text_keys
            .iter()
            .map(|key| format!("{}/{}\n", key.frame, key.text))
            .collect()
    }
}
