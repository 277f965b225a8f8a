//! Raster operations on RGBA buffers: normalization, fitting, safe-zone
//! padding and PNG encoding.

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};

use super::{Background, FitMode, IconSpec};

/// Edge length of the canonical buffer every icon is derived from.
pub const CANONICAL_SIZE: u32 = 1024;

/// Decode any supported raster format into RGBA.
pub fn decode(bytes: &[u8]) -> Result<RgbaImage, String> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgba8())
        .map_err(|e| format!("unsupported or corrupt source image: {e}"))
}

/// Fit `src` into a `size`×`size` square.
///
/// `Contain` scales the whole image inside the square and pads with
/// transparency; `Cover` fills the square and crops the overflow evenly.
pub fn fit_square(src: &RgbaImage, size: u32, fit: FitMode) -> RgbaImage {
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 {
        return RgbaImage::new(size, size);
    }
    if w == size && h == size {
        return src.clone();
    }
    let sx = size as f64 / w as f64;
    let sy = size as f64 / h as f64;
    let scale = match fit {
        FitMode::Contain => sx.min(sy),
        FitMode::Cover => sx.max(sy),
    };
    let nw = ((w as f64 * scale).round() as u32).max(1);
    let nh = ((h as f64 * scale).round() as u32).max(1);
    let resized = imageops::resize(src, nw, nh, FilterType::Lanczos3);

    match fit {
        FitMode::Contain => {
            let mut canvas = RgbaImage::new(size, size);
            let x = (size.saturating_sub(nw)) / 2;
            let y = (size.saturating_sub(nh)) / 2;
            imageops::replace(&mut canvas, &resized, x as i64, y as i64);
            canvas
        }
        FitMode::Cover => {
            let x = nw.saturating_sub(size) / 2;
            let y = nh.saturating_sub(size) / 2;
            imageops::crop_imm(&resized, x, y, size.min(nw), size.min(nh)).to_image()
        }
    }
}

/// The canonical 1024×1024 buffer: `contain` fit with transparent padding.
pub fn normalize(src: &RgbaImage) -> RgbaImage {
    fit_square(src, CANONICAL_SIZE, FitMode::Contain)
}

/// Edge length of the visible region of a safe-zone icon.
pub fn safe_zone_inner(size: u32, ratio: f64) -> u32 {
    ((size as f64 * ratio).round() as u32).clamp(1, size)
}

/// Shrink the canonical buffer to the safe zone and center it on a
/// transparent canvas of the full size.
pub fn pad_to_safe_zone(canonical: &RgbaImage, size: u32, ratio: f64) -> RgbaImage {
    let inner = safe_zone_inner(size, ratio);
    let scaled = resize(canonical, inner);
    let mut canvas = RgbaImage::new(size, size);
    let offset = (size - inner) / 2;
    imageops::replace(&mut canvas, &scaled, offset as i64, offset as i64);
    canvas
}

/// Square resize, skipping the work when the size already matches.
pub fn resize(src: &RgbaImage, size: u32) -> RgbaImage {
    if src.dimensions() == (size, size) {
        return src.clone();
    }
    imageops::resize(src, size, size, FilterType::Lanczos3)
}

/// Composite onto opaque white.
pub fn flatten(src: &RgbaImage) -> RgbaImage {
    let (w, h) = src.dimensions();
    let mut canvas = RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]));
    imageops::overlay(&mut canvas, src, 0, 0);
    canvas
}

/// Render one icon from the canonical buffer.
pub fn render(canonical: &RgbaImage, spec: &IconSpec) -> RgbaImage {
    let sized = match spec.safe_zone {
        Some(ratio) => pad_to_safe_zone(canonical, spec.size, ratio),
        None => fit_square(canonical, spec.size, spec.fit),
    };
    match spec.background {
        Background::Transparent => sized,
        Background::Opaque => flatten(&sized),
    }
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, String> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| format!("failed to encode PNG: {e}"))?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([200, 30, 30, 255]))
    }

    /// Bounding box (x0, y0, x1, y1) of pixels with any alpha.
    fn visible_box(img: &RgbaImage) -> (u32, u32, u32, u32) {
        let (mut x0, mut y0, mut x1, mut y1) = (u32::MAX, u32::MAX, 0, 0);
        for (x, y, px) in img.enumerate_pixels() {
            if px.0[3] > 0 {
                x0 = x0.min(x);
                y0 = y0.min(y);
                x1 = x1.max(x + 1);
                y1 = y1.max(y + 1);
            }
        }
        (x0, y0, x1, y1)
    }

    #[test]
    fn normalize_always_yields_canonical_square() {
        for (w, h) in [(300, 200), (64, 64), (2000, 1500), (1, 3000), (1024, 1024)] {
            let out = normalize(&solid(w, h));
            assert_eq!(out.dimensions(), (CANONICAL_SIZE, CANONICAL_SIZE), "{w}x{h}");
        }
    }

    #[test]
    fn contain_pads_wide_images_vertically() {
        let out = normalize(&solid(400, 200));
        let (x0, y0, x1, y1) = visible_box(&out);
        assert_eq!((x0, x1), (0, 1024));
        assert_eq!(y0, 256);
        assert_eq!(y1, 768);
        assert_eq!(out.get_pixel(512, 10).0[3], 0);
    }

    #[test]
    fn cover_fills_the_square() {
        let out = fit_square(&solid(400, 200), 128, FitMode::Cover);
        assert_eq!(out.dimensions(), (128, 128));
        assert!(out.pixels().all(|p| p.0[3] == 255));
    }

    #[test]
    fn safe_zone_region_is_centered() {
        let canonical = normalize(&solid(1024, 1024));
        for size in [108u32, 432] {
            let out = pad_to_safe_zone(&canonical, size, 0.61);
            let inner = (size as f64 * 0.61).round() as u32;
            let pad = (size - inner) / 2;
            assert_eq!(out.dimensions(), (size, size));
            let (x0, y0, x1, y1) = visible_box(&out);
            assert_eq!((x1 - x0, y1 - y0), (inner, inner), "size {size}");
            assert_eq!((x0, y0), (pad, pad));
            assert_eq!((size - x1, size - y1), (pad, pad));
        }
    }

    #[test]
    fn opaque_background_removes_transparency() {
        let canonical = normalize(&solid(400, 200));
        let spec = IconSpec::flat("x.png", 64).opaque();
        let out = render(&canonical, &spec);
        assert!(out.pixels().all(|p| p.0[3] == 255));
        assert_eq!(out.get_pixel(32, 0).0, [255, 255, 255, 255]);
    }

    #[test]
    fn png_roundtrip_keeps_dimensions() {
        let png = encode_png(&solid(20, 20)).unwrap();
        assert_eq!(&png[1..4], b"PNG");
        assert_eq!(decode(&png).unwrap().dimensions(), (20, 20));
        assert!(decode(b"not an image").is_err());
    }
}
