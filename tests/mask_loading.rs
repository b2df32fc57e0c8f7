use std::io::Cursor;
use std::sync::Arc;

use logoscrub::{
    Canvas, CompositorConfig, FsFetcher, MaskCacheService, MaskOrigin, normalize_rel_path,
};

fn temp_dir(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "logoscrub_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

fn write_image(path: &std::path::Path, rgba: [u8; 4], format: image::ImageFormat) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let img = image::RgbaImage::from_pixel(6, 3, image::Rgba(rgba));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), format)
        .unwrap();
    std::fs::write(path, &buf).unwrap();
}

#[test]
fn default_layout_loads_primary_fallback_and_placeholders() {
    let root = temp_dir("mask_layout");
    // Primary encoding for 0 and 1, fallback only for 2, nothing for 3. Index 1 also has a
    // corrupt fallback, which must never be consulted.
    for i in 0..2 {
        write_image(
            &root.join(format!("SOURCE/ELEMENT_3D/ELEMENT 3D_{i:05}.webp")),
            [255, 255, 255, 200],
            image::ImageFormat::WebP,
        );
    }
    std::fs::create_dir_all(root.join("SOURCE/ELEMENT 3D")).unwrap();
    std::fs::write(root.join("SOURCE/ELEMENT 3D/ELEMENT 3D_00001.png"), b"not a png").unwrap();
    write_image(
        &root.join("SOURCE/ELEMENT 3D/ELEMENT 3D_00002.png"),
        [0, 0, 0, 255],
        image::ImageFormat::Png,
    );

    let cfg = CompositorConfig {
        frame_count: 4,
        canvas: Canvas {
            width: 20,
            height: 10,
        },
        ..CompositorConfig::default()
    };
    let svc = MaskCacheService::new(Arc::new(FsFetcher::new(&root)), &cfg);
    let set = svc.ensure_masks_loaded().wait();

    assert_eq!(set.len(), 4);
    assert_eq!(set.origin(0), Some(MaskOrigin::Primary));
    assert_eq!(set.origin(1), Some(MaskOrigin::Primary));
    assert_eq!(set.origin(2), Some(MaskOrigin::Fallback));
    assert_eq!(set.origin(3), Some(MaskOrigin::Placeholder));
    assert_eq!(set.placeholder_count(), 1);

    let primary = set.get(0).unwrap();
    assert_eq!((primary.width, primary.height), (6, 3));
    let placeholder = set.get(3).unwrap();
    assert_eq!((placeholder.width, placeholder.height), (20, 10));
    assert!(placeholder.is_blank());

    assert!(Arc::ptr_eq(&svc.loaded().unwrap(), &set));
    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn missing_directory_still_resolves() {
    let cfg = CompositorConfig {
        frame_count: 3,
        ..CompositorConfig::default()
    };
    let svc = MaskCacheService::new(
        Arc::new(FsFetcher::new(temp_dir("mask_missing_root"))),
        &cfg,
    );
    let set = svc.ensure_masks_loaded().wait();
    assert_eq!(set.len(), 3);
    assert_eq!(set.placeholder_count(), 3);
    assert!(set.select(2).unwrap().is_blank());
}

#[test]
fn fetcher_rejects_escaping_paths() {
    assert_eq!(
        normalize_rel_path("./SOURCE//ELEMENT 3D/a.png").unwrap(),
        "SOURCE/ELEMENT 3D/a.png"
    );
    assert!(normalize_rel_path("../secret.png").is_err());
    assert!(normalize_rel_path("/etc/passwd").is_err());
}
