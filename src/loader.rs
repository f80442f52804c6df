use std::io::Cursor;
use std::path::Path;

use image::{ImageReader, RgbImage};
use tracing::debug;

use crate::errors::{RipenessError, Result};

/// Read and decode an image file into RGB8.
///
/// The format is guessed from the content, so an upload saved as `.jpg` that is actually a
/// PNG still decodes. Any failure, including an empty file, is an `ImageDecode` error naming
/// the path.
pub fn load_image(path: &Path) -> Result<RgbImage> {
    let identifier = path.display().to_string();
    let bytes =
        std::fs::read(path).map_err(|e| RipenessError::image_decode(identifier.clone(), e))?;
    decode_image(&bytes, &identifier)
}

/// Decode an in-memory image. `identifier` is reported in errors in place of a path.
pub fn decode_image(bytes: &[u8], identifier: &str) -> Result<RgbImage> {
    if bytes.is_empty() {
        return Err(RipenessError::image_decode(identifier, "zero-byte input"));
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| RipenessError::image_decode(identifier, e))?;

    let Some(format) = reader.format() else {
        return Err(RipenessError::image_decode(
            identifier,
            "unrecognized image format",
        ));
    };

    let image = reader
        .decode()
        .map_err(|e| RipenessError::image_decode(identifier, e))?
        .into_rgb8();

    debug!(
        identifier,
        ?format,
        width = image.width(),
        height = image.height(),
        "decoded image"
    );
    Ok(image)
}
