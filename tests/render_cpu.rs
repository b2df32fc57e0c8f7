use logoscrub::render::backend::{Texels, TextureSlot};
use logoscrub::{BackendKind, BlendParams, Canvas, ScrubError, create_backend};

const VP: Canvas = Canvas {
    width: 8,
    height: 4,
};

fn solid(px: [u8; 4]) -> Texels {
    Texels {
        width: VP.width,
        height: VP.height,
        rgba8: px.repeat(VP.pixel_count()),
    }
}

fn px(data: &[u8], x: u32, y: u32) -> [u8; 4] {
    let i = ((y * VP.width + x) * 4) as usize;
    [data[i], data[i + 1], data[i + 2], data[i + 3]]
}

#[test]
fn lighten_then_alpha_from_mask() {
    let mut b = create_backend(BackendKind::Cpu, VP, BlendParams::default()).unwrap();
    b.upload(TextureSlot::Video, &solid([51, 204, 102, 255]))
        .unwrap();
    b.upload(TextureSlot::Mask, &solid([255, 0, 0, 255])).unwrap();
    b.upload(TextureSlot::Overlay, &Texels::transparent(VP))
        .unwrap();
    b.draw().unwrap();

    let frame = b.readback_rgba8().unwrap();
    assert!(frame.premultiplied);
    assert_eq!((frame.width, frame.height), (8, 4));
    // red: mix(0.2, 1.0, 0.25) = 0.4; green and blue keep the video value.
    let p = px(&frame.data, 3, 2);
    assert!((i32::from(p[0]) - 102).abs() <= 1, "{p:?}");
    assert_eq!(p[1], 204);
    assert_eq!(p[2], 102);
    assert_eq!(p[3], 255);
}

#[test]
fn transparent_mask_clears_the_pixel() {
    let mut b = create_backend(BackendKind::Cpu, VP, BlendParams::default()).unwrap();
    b.upload(TextureSlot::Video, &solid([255, 255, 255, 255]))
        .unwrap();
    b.upload(TextureSlot::Mask, &solid([255, 255, 255, 0]))
        .unwrap();
    b.draw().unwrap();
    let frame = b.readback_rgba8().unwrap();
    assert!(frame.data.iter().all(|&v| v == 0));
}

#[test]
fn readback_converts_to_straight_alpha() {
    let mut b = create_backend(BackendKind::Cpu, VP, BlendParams::default()).unwrap();
    b.upload(TextureSlot::Video, &solid([200, 100, 50, 255]))
        .unwrap();
    // smoothstep(0, 0.9, 0.45) = 0.5
    b.upload(TextureSlot::Mask, &solid([0, 0, 0, 115])).unwrap();
    b.draw().unwrap();
    let frame = b.readback_rgba8().unwrap().into_straight();
    assert!(!frame.premultiplied);
    let p = px(&frame.data, 0, 0);
    assert!((i32::from(p[0]) - 200).abs() <= 3, "{p:?}");
    assert!((i32::from(p[1]) - 100).abs() <= 3, "{p:?}");
    assert!((i32::from(p[3]) - 128).abs() <= 3, "{p:?}");
}

#[test]
fn mismatched_upload_is_rejected() {
    let mut b = create_backend(BackendKind::Cpu, VP, BlendParams::default()).unwrap();
    let wrong = Texels::transparent(Canvas {
        width: 4,
        height: 4,
    });
    assert!(matches!(
        b.upload(TextureSlot::Mask, &wrong),
        Err(ScrubError::Evaluation(_))
    ));
}

#[test]
fn released_backend_refuses_work() {
    let mut b = create_backend(BackendKind::Cpu, VP, BlendParams::default()).unwrap();
    b.release();
    b.release();
    assert!(b.draw().is_err());
    assert!(b.upload(TextureSlot::Video, &solid([0; 4])).is_err());
    assert!(b.readback_rgba8().is_err());
}

#[test]
fn bad_blend_params_fail_as_shader_errors() {
    let params = BlendParams {
        alpha_edge0: 0.9,
        alpha_edge1: 0.1,
        ..BlendParams::default()
    };
    assert!(matches!(
        create_backend(BackendKind::Cpu, VP, params),
        Err(ScrubError::Shader(_))
    ));
}
