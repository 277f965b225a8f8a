//! Apple ICNS container synthesis.
//!
//! Layout: `"icns"` | BE u32 file length | chunks of
//! `type (4) | BE u32 (8 + payload) | PNG payload`.

use image::RgbaImage;

use super::raster::{encode_png, resize};

/// Sizes rendered into an app bundle icon, with their chunk type codes.
pub const ICNS_TYPES: [(u32, [u8; 4]); 7] = [
    (16, *b"icp4"),
    (32, *b"icp5"),
    (64, *b"icp6"),
    (128, *b"ic07"),
    (256, *b"ic08"),
    (512, *b"ic09"),
    (1024, *b"ic10"),
];

/// Assemble chunks that are already PNG encoded.
pub fn build_icns(chunks: &[([u8; 4], Vec<u8>)]) -> Vec<u8> {
    let total = 8 + chunks.iter().map(|(_, png)| 8 + png.len()).sum::<usize>();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(b"icns");
    out.extend_from_slice(&(total as u32).to_be_bytes());
    for (code, png) in chunks {
        out.extend_from_slice(code);
        out.extend_from_slice(&((8 + png.len()) as u32).to_be_bytes());
        out.extend_from_slice(png);
    }
    out
}

/// Render every size in [`ICNS_TYPES`] from the canonical buffer.
///
/// A size that fails to encode is left out; the rest still ship.
pub fn render_icns(canonical: &RgbaImage) -> Vec<u8> {
    let mut chunks = Vec::with_capacity(ICNS_TYPES.len());
    for (size, code) in ICNS_TYPES {
        match encode_png(&resize(canonical, size)) {
            Ok(png) => chunks.push((code, png)),
            Err(e) => tracing::warn!(size, error = %e, "skipping ICNS size"),
        }
    }
    build_icns(&chunks)
}
