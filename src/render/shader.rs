//! The blend program, once as WGSL for the GPU backend and once as plain Rust for the CPU backend
//! and for tests. Both evaluate the same per-pixel function on straight-alpha inputs.

use crate::config::BlendParams;
use crate::foundation::math::{mix, smoothstep};

/// Vertex pass-through plus the video/mask/overlay blend.
///
/// The overlay stage is weighted by the overlay layer's alpha, so an absent (transparent) overlay
/// leaves the lighten result untouched.
pub const BLEND_WGSL: &str = r#"
struct BlendUniforms {
  lighten_opacity: f32,
  overlay_opacity: f32,
  alpha_edge0: f32,
  alpha_edge1: f32,
};

struct VsOut {
  @builtin(position) pos: vec4<f32>,
  @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) a_position: vec2<f32>, @location(1) a_tex_coord: vec2<f32>) -> VsOut {
  var o: VsOut;
  o.pos = vec4<f32>(a_position, 0.0, 1.0);
  o.uv = a_tex_coord;
  return o;
}

@group(0) @binding(0) var u_video: texture_2d<f32>;
@group(0) @binding(1) var u_mask: texture_2d<f32>;
@group(0) @binding(2) var u_overlay: texture_2d<f32>;
@group(0) @binding(3) var u_sampler: sampler;
@group(0) @binding(4) var<uniform> u_blend: BlendUniforms;

fn lighten_blend(base: vec3<f32>, blend: vec3<f32>, opacity: f32) -> vec3<f32> {
  return mix(base, max(base, blend), opacity);
}

fn overlay_blend(base: vec3<f32>, blend: vec3<f32>, opacity: f32) -> vec3<f32> {
  let one = vec3<f32>(1.0);
  let low = 2.0 * base * blend;
  let high = one - 2.0 * (one - base) * (one - blend);
  let result = select(high, low, base < vec3<f32>(0.5));
  return mix(base, result, opacity);
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
  let mask_color = textureSample(u_mask, u_sampler, in.uv);
  let video_color = textureSample(u_video, u_sampler, in.uv);
  let overlay_color = textureSample(u_overlay, u_sampler, in.uv);
  let lighten_result = lighten_blend(video_color.rgb, mask_color.rgb, u_blend.lighten_opacity);
  let overlay_result = overlay_blend(
    lighten_result,
    overlay_color.rgb,
    u_blend.overlay_opacity * overlay_color.a,
  );
  let a = smoothstep(u_blend.alpha_edge0, u_blend.alpha_edge1, mask_color.a);
  return vec4<f32>(overlay_result, a);
}
"#;

/// Full-viewport quad as a 4-vertex triangle strip, in clip space.
pub const QUAD_POSITIONS: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]];

/// Texture coordinates matching [`QUAD_POSITIONS`]; `v = 0` is the first uploaded row.
pub const QUAD_TEX_COORDS: [[f32; 2]; 4] = [[0.0, 1.0], [1.0, 1.0], [0.0, 0.0], [1.0, 0.0]];

pub fn lighten(base: [f32; 3], blend: [f32; 3], opacity: f32) -> [f32; 3] {
    std::array::from_fn(|i| mix(base[i], base[i].max(blend[i]), opacity))
}

pub fn overlay(base: [f32; 3], blend: [f32; 3], opacity: f32) -> [f32; 3] {
    std::array::from_fn(|i| {
        let b = base[i];
        let result = if b < 0.5 {
            2.0 * b * blend[i]
        } else {
            1.0 - 2.0 * (1.0 - b) * (1.0 - blend[i])
        };
        mix(b, result, opacity)
    })
}

/// Fragment output for one pixel: straight-alpha RGBA in `[0, 1]`.
pub fn shade(video: [f32; 4], mask: [f32; 4], over: [f32; 4], params: &BlendParams) -> [f32; 4] {
    let rgb = |c: [f32; 4]| [c[0], c[1], c[2]];
    let lit = lighten(rgb(video), rgb(mask), params.lighten_opacity);
    let out = overlay(lit, rgb(over), params.overlay_opacity * over[3]);
    let a = smoothstep(params.alpha_edge0, params.alpha_edge1, mask[3]);
    [out[0], out[1], out[2], a]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn lighten_takes_max_at_full_opacity() {
        let out = lighten([0.2, 0.8, 0.5], [0.6, 0.1, 0.5], 1.0);
        assert_eq!(out, [0.6, 0.8, 0.5]);
        let quarter = lighten([0.2, 0.8, 0.5], [0.6, 0.1, 0.5], 0.25);
        assert!(close(quarter[0], 0.3));
        assert!(close(quarter[1], 0.8));
    }

    #[test]
    fn overlay_branches_on_half() {
        let out = overlay([0.25, 0.75, 0.5], [0.5, 0.5, 1.0], 1.0);
        assert!(close(out[0], 0.25));
        assert!(close(out[1], 0.75));
        assert!(close(out[2], 1.0));
    }

    #[test]
    fn transparent_overlay_leaves_lighten_result() {
        let p = BlendParams::default();
        let video = [0.7, 0.3, 0.9, 1.0];
        let mask = [0.5, 0.5, 0.5, 0.6];
        let out = shade(video, mask, [0.0; 4], &p);
        let lit = lighten([0.7, 0.3, 0.9], [0.5, 0.5, 0.5], 0.25);
        assert!(close(out[0], lit[0]));
        assert!(close(out[1], lit[1]));
        assert!(close(out[2], lit[2]));
        assert!(close(out[3], smoothstep(0.0, 0.9, 0.6)));
    }

    #[test]
    fn opaque_overlay_mixes_ten_percent() {
        let p = BlendParams::default();
        let video = [0.25, 0.25, 0.25, 1.0];
        let mask = [0.0, 0.0, 0.0, 1.0];
        let out = shade(video, mask, [1.0, 1.0, 1.0, 1.0], &p);
        // lighten leaves 0.25; overlay result is 2 * 0.25 * 1.0 = 0.5, mixed at 0.10.
        assert!(close(out[0], 0.275));
        assert_eq!(out[3], 1.0);
    }

    #[test]
    fn low_mask_alpha_is_suppressed() {
        let p = BlendParams::default();
        let out = shade([1.0; 4], [1.0, 1.0, 1.0, 0.05], [0.0; 4], &p);
        assert!(out[3] < 0.01);
        let full = shade([1.0; 4], [1.0, 1.0, 1.0, 0.95], [0.0; 4], &p);
        assert_eq!(full[3], 1.0);
    }
}
