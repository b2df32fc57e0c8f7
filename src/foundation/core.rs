use std::sync::Arc;

use crate::foundation::error::{ScrubError, ScrubResult};

pub use kurbo::{Affine, Rect, Vec2};

/// Fixed working resolution every layer is composited at.
pub const WORKING_CANVAS: Canvas = Canvas {
    width: 1600,
    height: 900,
};

/// Raster dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Canvas {
    /// Number of pixels covered by the canvas.
    pub fn pixel_count(self) -> usize {
        (self.width as usize).saturating_mul(self.height as usize)
    }

    /// Byte length of a tightly packed RGBA8 buffer of this size.
    pub fn rgba8_len(self) -> ScrubResult<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(4))
            .ok_or_else(|| ScrubError::evaluation("rgba8 buffer size overflow"))
    }

    /// Full-canvas rectangle anchored at the origin.
    pub fn rect(self) -> Rect {
        Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height))
    }
}

/// Decoded raster in premultiplied RGBA8, shared cheaply between owners.
#[derive(Clone, Debug)]
pub struct RasterImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel bytes in row-major premultiplied RGBA8.
    pub rgba8_premul: Arc<Vec<u8>>,
}

impl RasterImage {
    /// Wrap premultiplied bytes, checking that the length matches `width * height * 4`.
    pub fn from_premul(width: u32, height: u32, rgba8_premul: Vec<u8>) -> ScrubResult<Self> {
        let expected = Canvas { width, height }.rgba8_len()?;
        if rgba8_premul.len() != expected {
            return Err(ScrubError::evaluation(format!(
                "raster byte len mismatch: got {}, expected {expected}",
                rgba8_premul.len()
            )));
        }
        Ok(Self {
            width,
            height,
            rgba8_premul: Arc::new(rgba8_premul),
        })
    }

    /// Wrap straight-alpha bytes, premultiplying them.
    pub fn from_straight(width: u32, height: u32, mut rgba8: Vec<u8>) -> ScrubResult<Self> {
        premultiply_rgba8_in_place(&mut rgba8);
        Self::from_premul(width, height, rgba8)
    }

    /// Fully transparent raster of the given size.
    ///
    /// Used as the blank placeholder for masks that failed to load.
    pub fn blank(canvas: Canvas) -> Self {
        Self {
            width: canvas.width,
            height: canvas.height,
            rgba8_premul: Arc::new(vec![0u8; canvas.pixel_count().saturating_mul(4)]),
        }
    }

    /// Dimensions as a [`Canvas`].
    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }

    /// Return `true` when every pixel is fully transparent.
    pub fn is_blank(&self) -> bool {
        self.rgba8_premul.chunks_exact(4).all(|px| px[3] == 0)
    }
}

pub(crate) fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

/// Undo premultiplication, producing straight-alpha RGBA8 as a browser texture upload would.
pub(crate) fn unpremultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = u32::from(px[3]);
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        if a == 255 {
            continue;
        }
        for c in &mut px[..3] {
            *c = ((u32::from(*c) * 255 + a / 2) / a).min(255) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_matches_working_canvas() {
        let blank = RasterImage::blank(WORKING_CANVAS);
        assert_eq!(blank.width, 1600);
        assert_eq!(blank.height, 900);
        assert_eq!(blank.rgba8_premul.len(), 1600 * 900 * 4);
        assert!(blank.is_blank());
    }

    #[test]
    fn from_premul_rejects_wrong_len() {
        assert!(RasterImage::from_premul(2, 2, vec![0u8; 15]).is_err());
        assert!(RasterImage::from_premul(2, 2, vec![0u8; 16]).is_ok());
    }

    #[test]
    fn premultiply_then_unpremultiply_is_close() {
        let mut px = vec![200u8, 100, 50, 128];
        premultiply_rgba8_in_place(&mut px);
        assert_eq!(px, vec![100, 50, 25, 128]);
        unpremultiply_rgba8_in_place(&mut px);
        for (got, want) in px.iter().zip([200u8, 100, 50, 128]) {
            assert!((i32::from(*got) - i32::from(want)).abs() <= 1);
        }
    }

    #[test]
    fn unpremultiply_zero_alpha_clears_color() {
        let mut px = vec![9u8, 9, 9, 0];
        unpremultiply_rgba8_in_place(&mut px);
        assert_eq!(px, vec![0, 0, 0, 0]);
    }
}
