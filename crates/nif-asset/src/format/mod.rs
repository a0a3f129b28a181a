//! Block stream codec.
//!
//! A stream starts with a text line naming the format family and its dotted
//! version, followed by a binary body: the block type table, the blocks in
//! index order and finally the root links. All numbers are little-endian.
use std::{
    fmt::{self, Display, Formatter},
    io::{Cursor, Write},
};

use binrw::{BinRead, BinWrite, Endian};
use log::debug;

use crate::error::{ImportError, Result};

pub mod block;
pub mod graph;
pub mod record;
mod scale;

use block::{Block, BlockData, BlockType};
use graph::BlockGraph;
use record::{Link, NifString};

const SIGNATURES: &[&str] = &["NetImmerse File Format", "Gamebryo File Format"];
const MAX_HEADER_LENGTH: usize = 128;

/// Packed `a.b.c.d` version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(pub u32);

impl Version {
    pub const MIN_SUPPORTED: Version = Version::new(4, 0, 0, 2);
    pub const MAX_SUPPORTED: Version = Version::new(20, 0, 0, 5);

    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self((a as u32) << 24 | (b as u32) << 16 | (c as u32) << 8 | d as u32)
    }

    pub fn is_supported(self) -> bool {
        (Self::MIN_SUPPORTED..=Self::MAX_SUPPORTED).contains(&self)
    }

    /// The format family whose signature line carries this version.
    fn signature(self) -> &'static str {
        if self < Version::new(10, 0, 0, 0) {
            SIGNATURES[0]
        } else {
            SIGNATURES[1]
        }
    }

    fn parse(text: &str) -> Option<Self> {
        let mut parts = [0u8; 4];
        let mut count = 0;
        for part in text.split('.') {
            *parts.get_mut(count)? = part.parse().ok()?;
            count += 1;
        }
        if count != 4 {
            return None;
        }
        Some(Self::new(parts[0], parts[1], parts[2], parts[3]))
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0.to_be_bytes();
        write!(f, "{}.{}.{}.{}", a, b, c, d)
    }
}

/// Read the signature line and return the version and header length.
fn read_header(bytes: &[u8]) -> Result<(Version, usize)> {
    let window = &bytes[..bytes.len().min(MAX_HEADER_LENGTH)];
    let Some(end) = window.iter().position(|byte| *byte == b'\n') else {
        return Err(ImportError::Format(String::from("missing signature line")));
    };
    let line = String::from_utf8_lossy(&window[..end]);
    let Some((family, version)) = line.split_once(", Version ") else {
        return Err(ImportError::Format(format!("unknown signature {:?}", line)));
    };
    if !SIGNATURES.contains(&family) {
        return Err(ImportError::Format(format!("unknown signature {:?}", line)));
    }
    let Some(version) = Version::parse(version.trim()) else {
        return Err(ImportError::Format(format!("bad version in {:?}", line)));
    };
    if !version.is_supported() {
        return Err(ImportError::UnsupportedVersion(version.to_string()));
    }
    Ok((version, end + 1))
}

/// Decode a whole block stream.
pub fn decode(bytes: &[u8]) -> Result<(Version, BlockGraph)> {
    let (version, header_length) = read_header(bytes)?;
    let endian = Endian::Little;
    let mut reader = Cursor::new(&bytes[header_length..]);

    let stored_version = u32::read_options(&mut reader, endian, ())?;
    if stored_version != version.0 {
        return Err(ImportError::Format(format!(
            "header says {} but body says {}",
            version,
            Version(stored_version)
        )));
    }

    let block_count = u32::read_options(&mut reader, endian, ())? as usize;
    let type_count = u16::read_options(&mut reader, endian, ())?;
    let mut types = Vec::with_capacity(type_count as usize);
    for _ in 0..type_count {
        let name = NifString::read_options(&mut reader, endian, ())?;
        match BlockType::from_name(name.as_str()) {
            Some(kind) => types.push(kind),
            None => {
                return Err(ImportError::Format(format!(
                    "unknown block type {:?}",
                    name.as_str()
                )))
            }
        }
    }

    let mut kinds = Vec::with_capacity(block_count.min(bytes.len()));
    for index in 0..block_count {
        let type_index = u16::read_options(&mut reader, endian, ())? as usize;
        let Some(kind) = types.get(type_index) else {
            return Err(ImportError::Format(format!(
                "block {} has type index {} of {}",
                index,
                type_index,
                types.len()
            )));
        };
        kinds.push(*kind);
    }

    let mut blocks = Vec::with_capacity(kinds.len());
    for (index, kind) in kinds.into_iter().enumerate() {
        let Some(data) = BlockData::read(kind, &mut reader, endian)? else {
            return Err(ImportError::Format(format!(
                "block {} has abstract type {}",
                index,
                kind.name()
            )));
        };
        blocks.push(Block { index, kind, data });
    }

    let root_count = u32::read_options(&mut reader, endian, ())?;
    let mut roots = Vec::new();
    for _ in 0..root_count {
        roots.push(Link::read_options(&mut reader, endian, ())?);
    }

    let graph = BlockGraph::new(blocks, roots);
    graph.validate_links()?;
    debug!("Decoded {} blocks, version {}", graph.len(), version);
    Ok((version, graph))
}

/// Encode a graph into a block stream that [`decode`] reads back unchanged.
pub fn encode(version: Version, graph: &BlockGraph) -> Result<Vec<u8>> {
    let endian = Endian::Little;
    let mut writer = Cursor::new(Vec::new());
    writeln!(writer, "{}, Version {}", version.signature(), version)?;
    version.0.write_options(&mut writer, endian, ())?;
    (graph.len() as u32).write_options(&mut writer, endian, ())?;

    let mut types: Vec<BlockType> = Vec::new();
    for block in graph.blocks() {
        if !types.contains(&block.kind) {
            types.push(block.kind);
        }
    }
    (types.len() as u16).write_options(&mut writer, endian, ())?;
    for kind in &types {
        NifString::from(kind.name()).write_options(&mut writer, endian, ())?;
    }
    for block in graph.blocks() {
        let type_index = types.iter().position(|kind| *kind == block.kind).unwrap_or(0);
        (type_index as u16).write_options(&mut writer, endian, ())?;
    }
    for block in graph.blocks() {
        block.data.write(&mut writer, endian)?;
    }

    (graph.roots().len() as u32).write_options(&mut writer, endian, ())?;
    for root in graph.roots() {
        root.write_options(&mut writer, endian, ())?;
    }
    Ok(writer.into_inner())
}
