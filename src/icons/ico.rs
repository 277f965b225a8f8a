//! Windows ICO container synthesis and parsing.
//!
//! Layout: `ICONDIR` (6 bytes) | N × `ICONDIRENTRY` (16 bytes) | payloads.

use image::RgbaImage;

use super::raster::encode_png;

const HEADER_LEN: usize = 6;
const ENTRY_LEN: usize = 16;
const BITMAPINFOHEADER_LEN: usize = 40;

/// How each image is stored inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcoPayload {
    /// PNG stream per entry. Understood by every loader since Windows Vista.
    Png,
    /// Bottom-up 32-bit BGRA DIB with an AND mask, readable by legacy loaders.
    Bmp,
}

/// One image of a parsed ICO file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcoEntry {
    pub width: u8,
    pub height: u8,
    pub color_count: u8,
    pub planes: u16,
    pub bit_count: u16,
    pub data: Vec<u8>,
}

impl IcoEntry {
    /// Pixel width, with the 0 = 256 convention resolved.
    pub fn pixel_width(&self) -> u32 {
        if self.width == 0 { 256 } else { self.width as u32 }
    }
}

fn dimension_byte(px: u32) -> u8 {
    if px >= 256 { 0 } else { px as u8 }
}

/// Build an ICO holding `images` in order, all encoded with `payload`.
pub fn build_ico(images: &[RgbaImage], payload: IcoPayload) -> Result<Vec<u8>, String> {
    let payloads: Vec<Vec<u8>> = images
        .iter()
        .map(|img| match payload {
            IcoPayload::Png => encode_png(img),
            IcoPayload::Bmp => Ok(encode_dib(img)),
        })
        .collect::<Result<_, _>>()?;

    let count = u16::try_from(images.len()).map_err(|_| "too many icon images".to_string())?;
    let table_len = HEADER_LEN + ENTRY_LEN * images.len();
    let total = table_len + payloads.iter().map(Vec::len).sum::<usize>();
    let mut out = Vec::with_capacity(total);

    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());

    let mut offset = table_len;
    for (img, data) in images.iter().zip(&payloads) {
        let (w, h) = img.dimensions();
        out.push(dimension_byte(w));
        out.push(dimension_byte(h));
        out.push(0); // color count
        out.push(0); // reserved
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&32u16.to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(offset as u32).to_le_bytes());
        offset += data.len();
    }
    for data in payloads {
        out.extend_from_slice(&data);
    }
    Ok(out)
}

/// 32-bit DIB as stored in ICO/RT_ICON: header height is doubled to cover
/// the XOR image plus the 1-bit AND mask that follows it.
fn encode_dib(img: &RgbaImage) -> Vec<u8> {
    let (w, h) = img.dimensions();
    let mask_stride = w.div_ceil(32) as usize * 4;
    let pixel_bytes = (w * h * 4) as usize;
    let mask_bytes = mask_stride * h as usize;
    let mut out = Vec::with_capacity(BITMAPINFOHEADER_LEN + pixel_bytes + mask_bytes);

    out.extend_from_slice(&(BITMAPINFOHEADER_LEN as u32).to_le_bytes());
    out.extend_from_slice(&(w as i32).to_le_bytes());
    out.extend_from_slice(&((h * 2) as i32).to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // planes
    out.extend_from_slice(&32u16.to_le_bytes()); // bit count
    out.extend_from_slice(&0u32.to_le_bytes()); // BI_RGB
    out.extend_from_slice(&((pixel_bytes + mask_bytes) as u32).to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());

    for y in (0..h).rev() {
        for x in 0..w {
            let [r, g, b, a] = img.get_pixel(x, y).0;
            out.extend_from_slice(&[b, g, r, a]);
        }
    }
    // Alpha carries transparency; an all-zero mask keeps every pixel.
    out.resize(out.len() + mask_bytes, 0);
    out
}

/// Split an ICO container into its entries.
pub fn parse_ico(bytes: &[u8]) -> Result<Vec<IcoEntry>, String> {
    let read_u16 = |at: usize| -> Result<u16, String> {
        bytes
            .get(at..at + 2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .ok_or_else(|| "truncated ICO header".to_string())
    };
    let read_u32 = |at: usize| -> Result<u32, String> {
        bytes
            .get(at..at + 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .ok_or_else(|| "truncated ICO directory".to_string())
    };

    if read_u16(0)? != 0 || read_u16(2)? != 1 {
        return Err("not an ICO file".into());
    }
    let count = read_u16(4)? as usize;
    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let at = HEADER_LEN + i * ENTRY_LEN;
        let len = read_u32(at + 8)? as usize;
        let offset = read_u32(at + 12)? as usize;
        let data = bytes
            .get(offset..offset.saturating_add(len))
            .ok_or_else(|| format!("ICO entry {i} points outside the file"))?;
        entries.push(IcoEntry {
            width: bytes[at],
            height: bytes[at + 1],
            color_count: bytes[at + 2],
            planes: read_u16(at + 4)?,
            bit_count: read_u16(at + 6)?,
            data: data.to_vec(),
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn images(sizes: &[u32]) -> Vec<RgbaImage> {
        sizes
            .iter()
            .map(|&s| RgbaImage::from_pixel(s, s, Rgba([10, 20, 30, 255])))
            .collect()
    }

    fn u32_at(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
    }

    fn check_layout(ico: &[u8], count: usize) {
        assert_eq!(u16::from_le_bytes([ico[4], ico[5]]) as usize, count);
        let mut payload_total = 0;
        let mut expected_offset = HEADER_LEN + ENTRY_LEN * count;
        for i in 0..count {
            let at = HEADER_LEN + i * ENTRY_LEN;
            let len = u32_at(ico, at + 8) as usize;
            assert_eq!(u32_at(ico, at + 12) as usize, expected_offset);
            expected_offset += len;
            payload_total += len;
        }
        assert_eq!(HEADER_LEN + ENTRY_LEN * count + payload_total, ico.len());
    }

    #[test]
    fn png_layout_is_consistent() {
        let sizes = [16, 32, 48, 256];
        let ico = build_ico(&images(&sizes), IcoPayload::Png).unwrap();
        assert_eq!(&ico[0..4], &[0, 0, 1, 0]);
        check_layout(&ico, sizes.len());
        // 256 is stored as 0.
        let last = HEADER_LEN + 3 * ENTRY_LEN;
        assert_eq!((ico[last], ico[last + 1]), (0, 0));
        assert_eq!(ico[HEADER_LEN], 16);
    }

    #[test]
    fn bmp_payload_has_flipped_bgra_rows_and_mask() {
        let mut img = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0]));
        img.put_pixel(0, 0, Rgba([1, 2, 3, 4])); // top-left
        let ico = build_ico(&[img], IcoPayload::Bmp).unwrap();
        check_layout(&ico, 1);

        let dib = &ico[HEADER_LEN + ENTRY_LEN..];
        assert_eq!(u32_at(dib, 0), 40);
        assert_eq!(u32_at(dib, 8), 4); // doubled height
        // top-left pixel lands in the last row, BGRA order.
        let last_row = 40 + 2 * 4;
        assert_eq!(&dib[last_row..last_row + 4], &[3, 2, 1, 4]);
        // 2 rows of a 4-byte padded mask.
        assert_eq!(dib.len(), 40 + 16 + 8);
    }

    #[test]
    fn parse_returns_what_was_built() {
        let ico = build_ico(&images(&[16, 256]), IcoPayload::Bmp).unwrap();
        let entries = parse_ico(&ico).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].pixel_width(), 16);
        assert_eq!(entries[1].pixel_width(), 256);
        assert_eq!(entries[1].bit_count, 32);
        assert_eq!(entries[1].data.len(), 40 + 256 * 256 * 4 + 32 * 256);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_ico(b"\x00\x00\x02\x00\x01\x00").is_err());
        assert!(parse_ico(b"\x00\x00").is_err());
        let mut ico = build_ico(&images(&[16]), IcoPayload::Png).unwrap();
        ico.truncate(30);
        assert!(parse_ico(&ico).is_err());
    }
}
