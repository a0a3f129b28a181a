use std::path::{Path, PathBuf};

use image::{DynamicImage, GenericImageView};
use log::{debug, warn};

use crate::{
    error::TextureError,
    format::{
        block::{Block, BlockData},
        graph::BlockGraph,
        record::{PixelDataRecord, TextureSourceRecord, PIXEL_FORMAT_RGB8, PIXEL_FORMAT_RGBA8},
    },
    host::ProgressSink,
    index::AssetIndex,
    texture::{TextureAsset, TextureAssetFormat, TextureSource},
};

/// Tried in order when a texture file is missing or cannot be decoded.
const ALTERNATE_EXTENSIONS: &[&str] = &["PNG", "png", "TGA", "tga", "BMP", "bmp", "JPG", "jpg"];

const TEXTURES_PREFIX: &str = "textures/";

/// Turns source texture blocks into pixel data.
#[derive(Debug, Default)]
pub struct TextureLoader {
    search_dirs: Vec<PathBuf>,
}

impl TextureLoader {
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self { search_dirs }
    }

    /// Load the image of a source texture block. Never fails: anything that
    /// cannot be loaded becomes a 1x1 placeholder.
    pub fn load(
        &self,
        graph: &BlockGraph,
        source: &Block,
        id: AssetIndex,
        progress: &mut dyn ProgressSink,
    ) -> TextureAsset {
        let BlockData::SourceTexture(record) = &source.data else {
            warn!("Block {} is not a source texture", source.index);
            return TextureAsset::placeholder(id, None);
        };
        match &record.source {
            TextureSourceRecord::External { file_name } => {
                self.load_external(id, file_name.as_str())
            }
            TextureSourceRecord::Internal { pixel_data } => {
                let pixels = graph.resolve(*pixel_data).and_then(|block| match &block.data {
                    BlockData::PixelData(pixels) => Some((block.index, pixels)),
                    _ => None,
                });
                let Some((block, pixels)) = pixels else {
                    warn!("Texture {} has no pixel data", source.index);
                    return TextureAsset::placeholder(id, None);
                };
                match decode_pixels(pixels, progress) {
                    Ok((format, data)) => TextureAsset {
                        id,
                        source: TextureSource::Embedded { block },
                        size: (pixels.width, pixels.height),
                        format,
                        data,
                    },
                    Err(err) => {
                        warn!("Cannot extract embedded texture {}: {}", block, err);
                        TextureAsset::placeholder(id, None)
                    }
                }
            }
        }
    }

    fn candidates(&self, file_name: &str) -> Vec<PathBuf> {
        let file_name = file_name.replace('\\', "/");
        let stripped = file_name
            .get(..TEXTURES_PREFIX.len())
            .filter(|prefix| prefix.eq_ignore_ascii_case(TEXTURES_PREFIX))
            .map(|_| &file_name[TEXTURES_PREFIX.len()..]);
        self.search_dirs
            .iter()
            .map(|dir| {
                let in_textures_dir = dir
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().eq_ignore_ascii_case("textures"));
                match stripped {
                    // Avoid `textures/textures/...` for paths relative to the data directory.
                    Some(stripped) if in_textures_dir => dir.join(stripped),
                    _ => dir.join(&file_name),
                }
            })
            .collect()
    }

    fn load_external(&self, id: AssetIndex, file_name: &str) -> TextureAsset {
        let candidates = self.candidates(file_name);
        for candidate in &candidates {
            debug!("Searching {}", candidate.display());
            if candidate.is_file() {
                match load_image_file(candidate) {
                    Ok((size, format, data)) => {
                        debug!("Found {}", candidate.display());
                        return external_texture(id, candidate, size, format, data);
                    }
                    Err(err) => debug!("{}", err),
                }
            }
            for extension in ALTERNATE_EXTENSIONS {
                let alternate = candidate.with_extension(extension);
                if !alternate.is_file() {
                    continue;
                }
                match load_image_file(&alternate) {
                    Ok((size, format, data)) => {
                        debug!("Found alternate {}", alternate.display());
                        return external_texture(id, &alternate, size, format, data);
                    }
                    Err(err) => debug!("{}", err),
                }
            }
        }
        warn!("{}", TextureError::NotFound(file_name.to_string()));
        let intended = candidates
            .last()
            .cloned()
            .unwrap_or_else(|| PathBuf::from(file_name.replace('\\', "/")));
        TextureAsset::placeholder(id, Some(intended))
    }
}

fn external_texture(
    id: AssetIndex,
    path: &Path,
    size: (u32, u32),
    format: TextureAssetFormat,
    data: Vec<u8>,
) -> TextureAsset {
    TextureAsset {
        id,
        source: TextureSource::File(path.to_path_buf()),
        size,
        format,
        data,
    }
}

type DecodedImage = ((u32, u32), TextureAssetFormat, Vec<u8>);

fn load_image_file(path: &Path) -> Result<DecodedImage, TextureError> {
    let image = image::open(path).map_err(|source| TextureError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(convert_image(image))
}

fn convert_image(image: DynamicImage) -> DecodedImage {
    match image {
        DynamicImage::ImageRgb8(image) => (
            image.dimensions(),
            TextureAssetFormat::Rgbu8,
            image.into_vec(),
        ),
        DynamicImage::ImageRgba8(image) => (
            image.dimensions(),
            TextureAssetFormat::Rgbau8,
            image.into_vec(),
        ),
        image if image.color().has_alpha() => (
            image.dimensions(),
            TextureAssetFormat::Rgbau8,
            image.into_rgba8().into_vec(),
        ),
        image => (
            image.dimensions(),
            TextureAssetFormat::Rgbu8,
            image.into_rgb8().into_vec(),
        ),
    }
}

/// Decode embedded pixels into top-down rows.
fn decode_pixels(
    pixels: &PixelDataRecord,
    progress: &mut dyn ProgressSink,
) -> Result<(TextureAssetFormat, Vec<u8>), TextureError> {
    let (format, channels) = match pixels.pixel_format {
        PIXEL_FORMAT_RGB8 => (TextureAssetFormat::Rgbu8, 3),
        PIXEL_FORMAT_RGBA8 => (TextureAssetFormat::Rgbau8, 4),
        other => return Err(TextureError::UnsupportedPixelFormat(other)),
    };
    let height = pixels.height as usize;
    let row_length = (pixels.width as usize).checked_mul(channels);
    // A size that does not fit in memory can never be satisfied.
    let expected = row_length
        .and_then(|row_length| row_length.checked_mul(height))
        .unwrap_or(usize::MAX);
    if pixels.pixels.len() < expected {
        return Err(TextureError::Truncated {
            expected,
            actual: pixels.pixels.len(),
        });
    }
    let row_length = expected / height.max(1);

    let mut data = Vec::with_capacity(expected);
    let mut reported = 0.0;
    for row in (0..height).rev() {
        let start = row * row_length;
        data.extend_from_slice(&pixels.pixels[start..start + row_length]);
        let fraction = (height - row) as f32 / height as f32;
        if fraction >= reported + 0.1 {
            reported = fraction;
            progress.report_progress(fraction, "Image Extraction");
        }
    }
    Ok((format, data))
}
