use rayon::prelude::*;

use crate::foundation::core::Canvas;
use crate::foundation::error::{ScrubError, ScrubResult};

/// Kernel half-width for a Gaussian of standard deviation `sigma_px`.
pub fn radius_for_sigma(sigma_px: f64) -> u32 {
    if !sigma_px.is_finite() || sigma_px <= 0.0 {
        return 0;
    }
    (sigma_px * 3.0).ceil().min(f64::from(u16::MAX)) as u32
}

/// Separable Gaussian blur of a premultiplied RGBA8 raster, with `sigma_px` as the standard
/// deviation in pixels (the CSS `blur()` radius). Edges clamp.
pub fn blur_rgba8_premul(src: &[u8], size: Canvas, sigma_px: f64) -> ScrubResult<Vec<u8>> {
    let expected_len = size.rgba8_len()?;
    if src.len() != expected_len {
        return Err(ScrubError::evaluation(
            "blur_rgba8_premul expects src matching width*height*4",
        ));
    }
    let radius = radius_for_sigma(sigma_px);
    if radius == 0 || expected_len == 0 {
        return Ok(src.to_vec());
    }

    let kernel = gaussian_kernel_q16(radius, sigma_px)?;
    let mut tmp = vec![0u8; expected_len];
    let mut out = vec![0u8; expected_len];
    horizontal_pass(src, &mut tmp, size, &kernel);
    vertical_pass(&tmp, &mut out, size, &kernel);
    Ok(out)
}

fn gaussian_kernel_q16(radius: u32, sigma: f64) -> ScrubResult<Vec<u32>> {
    let r = radius as i64;
    let denom = 2.0 * sigma * sigma;
    let weights_f: Vec<f64> = (-r..=r)
        .map(|i| {
            let x = i as f64;
            (-x * x / denom).exp()
        })
        .collect();
    let sum: f64 = weights_f.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return Err(ScrubError::evaluation("gaussian kernel sum is zero"));
    }

    let mut weights: Vec<u32> = weights_f
        .iter()
        .map(|wf| ((wf / sum) * 65536.0).round().clamp(0.0, 65536.0) as u32)
        .collect();
    let acc: i64 = weights.iter().map(|&w| i64::from(w)).sum();
    let mid = weights.len() / 2;
    weights[mid] = (i64::from(weights[mid]) + 65536 - acc).clamp(0, 65536) as u32;
    Ok(weights)
}

fn horizontal_pass(src: &[u8], dst: &mut [u8], size: Canvas, k: &[u32]) {
    let w = size.width as usize;
    let radius = (k.len() / 2) as isize;
    dst.par_chunks_mut(w * 4)
        .zip(src.par_chunks(w * 4))
        .for_each(|(out_row, in_row)| {
            for x in 0..w {
                let mut acc = [0u64; 4];
                for (ki, &kw) in k.iter().enumerate() {
                    let sx = (x as isize + ki as isize - radius).clamp(0, w as isize - 1) as usize;
                    let px = &in_row[sx * 4..sx * 4 + 4];
                    for c in 0..4 {
                        acc[c] += u64::from(kw) * u64::from(px[c]);
                    }
                }
                for c in 0..4 {
                    out_row[x * 4 + c] = q16_to_u8(acc[c]);
                }
            }
        });
}

fn vertical_pass(src: &[u8], dst: &mut [u8], size: Canvas, k: &[u32]) {
    let w = size.width as usize;
    let h = size.height as isize;
    let radius = (k.len() / 2) as isize;
    dst.par_chunks_mut(w * 4)
        .enumerate()
        .for_each(|(y, out_row)| {
            let mut acc = vec![0u64; w * 4];
            for (ki, &kw) in k.iter().enumerate() {
                let sy = (y as isize + ki as isize - radius).clamp(0, h - 1) as usize;
                let in_row = &src[sy * w * 4..(sy + 1) * w * 4];
                for (a, &v) in acc.iter_mut().zip(in_row) {
                    *a += u64::from(kw) * u64::from(v);
                }
            }
            for (o, a) in out_row.iter_mut().zip(acc) {
                *o = q16_to_u8(a);
            }
        });
}

fn q16_to_u8(acc: u64) -> u8 {
    ((acc + 32768) >> 16).min(255) as u8
}
