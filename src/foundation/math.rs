/// Cubic Hermite easing of `x` between `edge0` and `edge1`, matching GLSL/WGSL `smoothstep`.
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// GLSL `mix`.
pub fn mix(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

/// One step of exponential smoothing: `v += (target - v) * k`.
pub fn exp_smooth(value: f64, target: f64, k: f64) -> f64 {
    value + (target - value) * k
}

/// Linearly map `x` from `[in_lo, in_hi]` onto `[0, out_hi]`, floored at zero.
///
/// Not clamped above: callers clamp the input range instead.
pub fn ramp(x: f64, in_lo: f64, in_hi: f64, out_hi: f64) -> f64 {
    let span = in_hi - in_lo;
    if span <= 0.0 {
        return 0.0;
    }
    (out_hi * (x - in_lo) / span).max(0.0)
}

pub(crate) fn unorm8(v: u8) -> f32 {
    f32::from(v) / 255.0
}

pub(crate) fn to_unorm8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}
