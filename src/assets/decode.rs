use anyhow::Context;

use crate::foundation::core::RasterImage;
use crate::foundation::error::ScrubResult;

/// Decode PNG/WebP (or anything else `image` recognizes) into premultiplied RGBA8.
pub fn decode_image(bytes: &[u8]) -> ScrubResult<RasterImage> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();
    RasterImage::from_straight(width, height, rgba.into_raw())
}
