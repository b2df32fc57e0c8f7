//! CPU-side staging rasters. Each layer is drawn into a viewport-sized surface with `vello_cpu`
//! and handed to the backend as straight-alpha texels.

use std::sync::Arc;

use crate::foundation::core::{
    Affine, Canvas, RasterImage, Rect, Vec2, unpremultiply_rgba8_in_place,
};
use crate::foundation::error::{ScrubError, ScrubResult};
use crate::render::backend::{Texels, TextureSlot};
use crate::render::blur;

/// Destination rectangle of a layer of `size` scaled by `scale` and centered in `canvas`.
pub fn centered_placement(canvas: Canvas, size: Canvas, scale: f64) -> Rect {
    let w = f64::from(size.width) * scale;
    let h = f64::from(size.height) * scale;
    let x = (f64::from(canvas.width) - w) / 2.0;
    let y = (f64::from(canvas.height) - h) / 2.0;
    Rect::new(x, y, x + w, y + h)
}

/// Transform mapping image pixel space of `image` onto `dest`.
fn image_to_rect(image: Canvas, dest: Rect) -> Affine {
    let sx = dest.width() / f64::from(image.width.max(1));
    let sy = dest.height() / f64::from(image.height.max(1));
    Affine::translate(Vec2::new(dest.x0, dest.y0)) * Affine::scale_non_uniform(sx, sy)
}

struct CachedPaint {
    source: Arc<Vec<u8>>,
    paint: vello_cpu::Image,
}

/// Reusable rasterizer for the three staging layers.
pub struct StagingRasterizer {
    canvas: Canvas,
    ctx: vello_cpu::RenderContext,
    pixmap: vello_cpu::Pixmap,
    paints: [Option<CachedPaint>; 3],
}

impl StagingRasterizer {
    pub fn new(canvas: Canvas) -> ScrubResult<Self> {
        let (w, h) = canvas_u16(canvas)?;
        Ok(Self {
            canvas,
            ctx: vello_cpu::RenderContext::new(w, h),
            pixmap: vello_cpu::Pixmap::new(w, h),
            paints: [None, None, None],
        })
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    /// Video frame centered at `scale`, with an optional raster blur of `blur_px` (CSS units).
    ///
    /// `intrinsic` is the media's reported size; when unknown the working canvas size is used.
    pub fn video_layer(
        &mut self,
        frame: Option<&RasterImage>,
        intrinsic: Option<Canvas>,
        scale: f64,
        blur_px: f64,
    ) -> ScrubResult<Texels> {
        let Some(frame) = frame else {
            return Ok(Texels::transparent(self.canvas));
        };
        let size = intrinsic
            .filter(|c| c.width > 0 && c.height > 0)
            .unwrap_or(self.canvas);
        let dest = centered_placement(self.canvas, size, scale);
        self.rasterize(TextureSlot::Video, frame, dest, vello_cpu::peniko::ImageQuality::Medium)?;

        let mut bytes = self.pixmap.data_as_u8_slice().to_vec();
        if blur::radius_for_sigma(blur_px) > 0 {
            bytes = blur::blur_rgba8_premul(&bytes, self.canvas, blur_px)?;
        }
        Ok(self.finish(bytes))
    }

    /// Mask stretched to the full viewport with high-quality filtering.
    pub fn mask_layer(&mut self, mask: &RasterImage) -> ScrubResult<Texels> {
        let dest = self.canvas.rect();
        self.rasterize(TextureSlot::Mask, mask, dest, vello_cpu::peniko::ImageQuality::High)?;
        let bytes = self.pixmap.data_as_u8_slice().to_vec();
        Ok(self.finish(bytes))
    }

    /// Overlay centered at `scale`, or an empty layer when there is no overlay.
    pub fn overlay_layer(&mut self, overlay: Option<&RasterImage>, scale: f64) -> ScrubResult<Texels> {
        let Some(overlay) = overlay else {
            return Ok(Texels::transparent(self.canvas));
        };
        let dest = centered_placement(self.canvas, overlay.canvas(), scale);
        self.rasterize(
            TextureSlot::Overlay,
            overlay,
            dest,
            vello_cpu::peniko::ImageQuality::Medium,
        )?;
        let bytes = self.pixmap.data_as_u8_slice().to_vec();
        Ok(self.finish(bytes))
    }

    fn rasterize(
        &mut self,
        slot: TextureSlot,
        image: &RasterImage,
        dest: Rect,
        quality: vello_cpu::peniko::ImageQuality,
    ) -> ScrubResult<()> {
        let paint = self.paint_for(slot, image, quality)?;
        let transform = image_to_rect(image.canvas(), dest);

        self.pixmap.data_as_u8_slice_mut().fill(0);
        self.ctx.reset();
        self.ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
        self.ctx.set_transform(affine_to_cpu(transform));
        self.ctx.set_paint(paint);
        self.ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            0.0,
            0.0,
            f64::from(image.width),
            f64::from(image.height),
        ));
        self.ctx.flush();
        self.ctx.render_to_pixmap(&mut self.pixmap);
        Ok(())
    }

    fn paint_for(
        &mut self,
        slot: TextureSlot,
        image: &RasterImage,
        quality: vello_cpu::peniko::ImageQuality,
    ) -> ScrubResult<vello_cpu::Image> {
        let cached = &mut self.paints[slot.unit()];
        if let Some(c) = cached
            && Arc::ptr_eq(&c.source, &image.rgba8_premul)
        {
            return Ok(c.paint.clone());
        }
        let pixmap = raster_to_pixmap(image)?;
        let paint = vello_cpu::Image {
            image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
            sampler: vello_cpu::peniko::ImageSampler {
                quality,
                ..Default::default()
            },
        };
        *cached = Some(CachedPaint {
            source: Arc::clone(&image.rgba8_premul),
            paint: paint.clone(),
        });
        Ok(paint)
    }

    fn finish(&self, mut premul: Vec<u8>) -> Texels {
        unpremultiply_rgba8_in_place(&mut premul);
        Texels {
            width: self.canvas.width,
            height: self.canvas.height,
            rgba8: premul,
        }
    }
}

fn canvas_u16(canvas: Canvas) -> ScrubResult<(u16, u16)> {
    let w: u16 = canvas
        .width
        .try_into()
        .map_err(|_| ScrubError::evaluation("staging width exceeds u16"))?;
    let h: u16 = canvas
        .height
        .try_into()
        .map_err(|_| ScrubError::evaluation("staging height exceeds u16"))?;
    if w == 0 || h == 0 {
        return Err(ScrubError::evaluation("staging surface must be non-empty"));
    }
    Ok((w, h))
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn raster_to_pixmap(image: &RasterImage) -> ScrubResult<vello_cpu::Pixmap> {
    let (w, h) = canvas_u16(image.canvas())?;
    let mut may_have_opacities = false;
    let pixels = image
        .rgba8_premul
        .chunks_exact(4)
        .map(|px| {
            may_have_opacities |= px[3] != 255;
            vello_cpu::peniko::color::PremulRgba8 {
                r: px[0],
                g: px[1],
                b: px[2],
                a: px[3],
            }
        })
        .collect();
    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels,
        w,
        h,
        may_have_opacities,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Canvas {
        Canvas {
            width: 16,
            height: 8,
        }
    }

    fn solid(size: Canvas, px: [u8; 4]) -> RasterImage {
        RasterImage::from_premul(size.width, size.height, px.repeat(size.pixel_count())).unwrap()
    }

    fn alpha_at(t: &Texels, x: u32, y: u32) -> u8 {
        t.rgba8[((y * t.width + x) * 4 + 3) as usize]
    }

    #[test]
    fn placement_centers_scaled_layer() {
        let r = centered_placement(
            Canvas {
                width: 1600,
                height: 900,
            },
            Canvas {
                width: 1600,
                height: 900,
            },
            0.5,
        );
        assert_eq!(r, Rect::new(400.0, 225.0, 1200.0, 675.0));
    }

    #[test]
    fn mask_is_stretched_over_viewport() {
        let mut s = StagingRasterizer::new(small()).unwrap();
        let mask = solid(
            Canvas {
                width: 4,
                height: 4,
            },
            [255, 255, 255, 255],
        );
        let t = s.mask_layer(&mask).unwrap();
        assert_eq!((t.width, t.height), (16, 8));
        assert!(alpha_at(&t, 0, 0) > 200);
        assert!(alpha_at(&t, 15, 7) > 200);
        assert!(alpha_at(&t, 8, 4) == 255);
    }

    #[test]
    fn half_scale_video_leaves_border_transparent() {
        let mut s = StagingRasterizer::new(small()).unwrap();
        let frame = solid(small(), [255, 0, 0, 255]);
        let t = s.video_layer(Some(&frame), None, 0.5, 0.0).unwrap();
        assert_eq!(alpha_at(&t, 0, 0), 0);
        assert_eq!(alpha_at(&t, 8, 4), 255);
        assert_eq!(t.rgba8[((4 * 16 + 8) * 4) as usize], 255);
    }

    #[test]
    fn absent_layers_are_transparent() {
        let mut s = StagingRasterizer::new(small()).unwrap();
        let t = s.overlay_layer(None, 1.0).unwrap();
        assert!(t.rgba8.iter().all(|&v| v == 0));
        let v = s.video_layer(None, None, 1.0, 10.0).unwrap();
        assert!(v.rgba8.iter().all(|&v| v == 0));
    }

    #[test]
    fn blur_softens_video_edges() {
        let mut s = StagingRasterizer::new(small()).unwrap();
        let frame = solid(small(), [255, 255, 255, 255]);
        let sharp = s.video_layer(Some(&frame), None, 0.5, 0.0).unwrap();
        let soft = s.video_layer(Some(&frame), None, 0.5, 2.0).unwrap();
        assert_eq!(alpha_at(&sharp, 2, 4), 0);
        assert!(alpha_at(&soft, 2, 4) > 0);
    }
}
