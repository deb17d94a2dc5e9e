//! Raster encoding - PNG writing and flip transforms.
//!
//! Writes in-memory pixel buffers (1-bit packed or 24-bit RGB) as PNG
//! files. The container is assembled by hand on top of flate2, which
//! supplies both the zlib stream for IDAT and the CRC-32 for chunk
//! trailers.
//!
//! Sources may arrive flipped on either axis relative to how they must
//! appear; the arrange functions re-order the buffer accordingly. For
//! 1-bit data an x flip cannot be done byte by byte alone: after the
//! byte order is reversed, every byte is bit-reversed and the whole bit
//! stream is shifted by `8 - (width % 8)` bits to realign rows to byte
//! boundaries, carrying remainder bits backward across bytes.

use byteorder::{BigEndian, WriteBytesExt};
use flate2::write::ZlibEncoder;
use flate2::{Compression, Crc};
use std::io::Write;

use crate::event::Flip;
use crate::{ConvertError, Result};

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Fixed resolution metadata, 3780 dots per meter (96 dpi).
const DOTS_PER_METER: u32 = 3780;

const COLOR_TYPE_RGB: u8 = 2;
const COLOR_TYPE_PALETTE: u8 = 3;

/// Packed row stride of a 1-bit image.
pub const fn mono_stride(width: i32) -> usize {
    ((width + 7) >> 3) as usize
}

fn write_chunk<W: Write>(w: &mut W, kind: &[u8; 4], data: &[u8]) -> Result<()> {
    w.write_u32::<BigEndian>(data.len() as u32)?;
    w.write_all(kind)?;
    w.write_all(data)?;
    let mut crc = Crc::new();
    crc.update(kind);
    crc.update(data);
    w.write_u32::<BigEndian>(crc.sum())?;
    Ok(())
}

fn write_header<W: Write>(
    w: &mut W,
    width: i32,
    height: i32,
    bit_depth: u8,
    color_type: u8,
) -> Result<()> {
    w.write_all(&PNG_SIGNATURE)?;

    let mut ihdr = Vec::with_capacity(13);
    ihdr.write_u32::<BigEndian>(width as u32)?;
    ihdr.write_u32::<BigEndian>(height as u32)?;
    ihdr.push(bit_depth);
    ihdr.push(color_type);
    ihdr.push(0); // compression
    ihdr.push(0); // filter
    ihdr.push(0); // interlace
    write_chunk(w, b"IHDR", &ihdr)
}

fn write_phys<W: Write>(w: &mut W) -> Result<()> {
    let mut phys = Vec::with_capacity(9);
    phys.write_u32::<BigEndian>(DOTS_PER_METER)?;
    phys.write_u32::<BigEndian>(DOTS_PER_METER)?;
    phys.push(1); // unit: meter
    write_chunk(w, b"pHYs", &phys)
}

fn write_image_data<W: Write>(w: &mut W, data: &[u8], row_bytes: usize, height: i32) -> Result<()> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    for y in 0..height as usize {
        encoder.write_all(&[0])?; // filter: none
        encoder.write_all(&data[y * row_bytes..(y + 1) * row_bytes])?;
    }
    let compressed = encoder
        .finish()
        .map_err(|e| ConvertError::ImageEncode(format!("zlib: {}", e)))?;
    write_chunk(w, b"IDAT", &compressed)?;
    write_chunk(w, b"IEND", &[])
}

fn check_dimensions(width: i32, height: i32, row_bytes: usize, len: usize) -> Result<()> {
    if width <= 0 || height <= 0 {
        return Err(ConvertError::ImageEncode(format!(
            "degenerate image {}x{}",
            width, height
        )));
    }
    let needed = row_bytes * height as usize;
    if len < needed {
        return Err(ConvertError::ImageEncode(format!(
            "pixel buffer too short: {} < {}",
            len, needed
        )));
    }
    Ok(())
}

/// Writes a 24-bit truecolor PNG from row-major RGB triples.
pub fn write_rgb_png<W: Write>(w: &mut W, width: i32, height: i32, data: &[u8]) -> Result<()> {
    let row_bytes = width.max(0) as usize * 3;
    check_dimensions(width, height, row_bytes, data.len())?;

    write_header(w, width, height, 8, COLOR_TYPE_RGB)?;
    // White background hint, 16 bits per sample.
    let mut bkgd = Vec::with_capacity(6);
    for _ in 0..3 {
        bkgd.write_u16::<BigEndian>(255)?;
    }
    write_chunk(w, b"bKGD", &bkgd)?;
    write_phys(w)?;
    write_image_data(w, data, row_bytes, height)
}

/// Writes a 1-bit palette PNG ({black, white}) from row-major packed
/// bits, MSB first.
pub fn write_mono_png<W: Write>(w: &mut W, width: i32, height: i32, data: &[u8]) -> Result<()> {
    let row_bytes = mono_stride(width);
    check_dimensions(width, height, row_bytes, data.len())?;

    write_header(w, width, height, 1, COLOR_TYPE_PALETTE)?;
    write_chunk(w, b"PLTE", &[0, 0, 0, 255, 255, 255])?;
    // Background hint: palette index 1 (white).
    write_chunk(w, b"bKGD", &[1])?;
    write_phys(w)?;
    write_image_data(w, data, row_bytes, height)
}

/// Re-orders a packed 1-bit buffer byte by byte for the given flip
/// state: reversed row order for a y flip, reversed byte order within
/// each row for an x flip. An x flip additionally needs
/// [`mirror_mono_bits`] to fix bit order inside the bytes.
pub fn arrange_mono(data: &[u8], stride: usize, height: usize, flip: Flip) -> Vec<u8> {
    let total = stride * height;
    let mut out = vec![0u8; total];

    // Destination walk while reading the source sequentially.
    let (mut k, x_inc, y_inc): (isize, isize, isize) = match (flip.x, flip.y) {
        (true, true) => (total as isize - 1, -1, 0),
        (true, false) => (stride as isize - 1, -1, 2 * stride as isize),
        (false, true) => (((height - 1) * stride) as isize, 1, -2 * (stride as isize)),
        (false, false) => (0, 1, 0),
    };

    let mut src = 0usize;
    for _y in 0..height {
        for _x in 0..stride {
            out[k as usize] = data[src];
            src += 1;
            k += x_inc;
        }
        k += y_inc;
    }
    out
}

/// Completes an x flip of a packed 1-bit buffer whose bytes have
/// already been placed in reversed order: every byte is bit-reversed,
/// then, when the width is not a multiple of 8, the whole bit stream is
/// shifted by `8 - (width % 8)` bits in one backward pass, carrying
/// remainder bits from each byte into the next.
pub fn mirror_mono_bits(data: &mut [u8], width: i32) {
    for b in data.iter_mut() {
        let mut a = *b;
        a = (a >> 4) | (a << 4);
        a = ((a & 0xCC) >> 2) | ((a & 0x33) << 2);
        *b = ((a & 0xAA) >> 1) | ((a & 0x55) << 1);
    }

    let complementary_shift = (width & 7) as u32;
    if complementary_shift != 0 {
        let shift = 8 - complementary_shift;
        let mask = (0xFFu8).wrapping_shl(complementary_shift);
        let mut remainder = 0u8;

        for k in (0..data.len()).rev() {
            let a = data[k];
            let carry = (a & mask) >> complementary_shift;
            data[k] = (a << shift) | remainder;
            remainder = carry;
        }
    }
}

/// Applies the full flip transform to a packed 1-bit buffer.
pub fn flip_mono(data: &[u8], width: i32, height: i32, flip: Flip) -> Vec<u8> {
    let mut out = arrange_mono(data, mono_stride(width), height.max(0) as usize, flip);
    if flip.x {
        mirror_mono_bits(&mut out, width);
    }
    out
}

/// Re-orders an RGB buffer for the given flip state.
pub fn flip_rgb(data: &[u8], width: i32, height: i32, flip: Flip) -> Vec<u8> {
    let (w, h) = (width.max(0) as usize, height.max(0) as usize);
    let mut out = vec![0u8; w * h * 3];

    for y in 0..h {
        let dst_y = if flip.y { h - 1 - y } else { y };
        for x in 0..w {
            let dst_x = if flip.x { w - 1 - x } else { x };
            let src = (y * w + x) * 3;
            let dst = (dst_y * w + dst_x) * 3;
            out[dst..dst + 3].copy_from_slice(&data[src..src + 3]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Per-pixel reference for a horizontal mirror of packed 1-bit rows.
    fn mirror_reference(data: &[u8], width: usize, height: usize) -> Vec<u8> {
        let stride = mono_stride(width as i32);
        let mut out = vec![0u8; stride * height];
        for y in 0..height {
            for x in 0..width {
                let sx = width - 1 - x;
                let bit = (data[y * stride + sx / 8] >> (7 - (sx % 8))) & 1;
                out[y * stride + x / 8] |= bit << (7 - (x % 8));
            }
        }
        out
    }

    fn assert_x_flip_matches_reference(width: usize, height: usize, data: &[u8]) {
        let flipped = flip_mono(
            data,
            width as i32,
            height as i32,
            Flip { x: true, y: false },
        );
        assert_eq!(flipped, mirror_reference(data, width, height));
    }

    #[test]
    fn test_mono_x_flip_width_multiple_of_8() {
        let data = vec![0b1011_0010, 0b0100_1101, 0b1110_0001, 0b0001_1110];
        assert_x_flip_matches_reference(16, 2, &data);
    }

    #[test]
    fn test_mono_x_flip_width_not_multiple_of_8() {
        // 13 pixels per row, 3 low padding bits in each second byte.
        let data = vec![0b1011_0010, 0b0100_1000, 0b1110_0001, 0b0001_1000];
        assert_x_flip_matches_reference(13, 2, &data);
    }

    #[test]
    fn test_mono_x_flip_single_narrow_row() {
        assert_x_flip_matches_reference(4, 1, &[0b1010_0000]);
    }

    #[test]
    fn test_mono_y_flip_reverses_rows() {
        let data = vec![0x11, 0x22, 0x33, 0x44, 0x55, 0x66];
        let flipped = flip_mono(&data, 16, 3, Flip { x: false, y: true });
        assert_eq!(flipped, vec![0x55, 0x66, 0x33, 0x44, 0x11, 0x22]);
    }

    #[test]
    fn test_mono_double_x_flip_is_identity() {
        let data = vec![0b1011_0010, 0b0100_1000, 0b1110_0001, 0b0001_1000];
        let flip = Flip { x: true, y: false };
        let twice = flip_mono(&flip_mono(&data, 13, 2, flip), 13, 2, flip);
        assert_eq!(twice, data);
    }

    #[test]
    fn test_rgb_flip_both() {
        // 2x2 image: pixels numbered 0..4 row-major.
        let data: Vec<u8> = (0..4).flat_map(|p| [p, p, p]).collect();
        let flipped = flip_rgb(&data, 2, 2, Flip { x: true, y: true });
        let expected: Vec<u8> = [3u8, 2, 1, 0].iter().flat_map(|&p| [p, p, p]).collect();
        assert_eq!(flipped, expected);
    }

    #[test]
    fn test_png_signature_and_ihdr() {
        let mut out = Vec::new();
        write_rgb_png(&mut out, 2, 1, &[255, 0, 0, 0, 255, 0]).unwrap();

        assert_eq!(&out[0..8], &PNG_SIGNATURE);
        // IHDR: length 13, then type, then width/height big-endian.
        assert_eq!(&out[8..12], &[0, 0, 0, 13]);
        assert_eq!(&out[12..16], b"IHDR");
        assert_eq!(&out[16..20], &[0, 0, 0, 2]);
        assert_eq!(&out[20..24], &[0, 0, 0, 1]);
        assert_eq!(out[24], 8); // bit depth
        assert_eq!(out[25], COLOR_TYPE_RGB);
    }

    #[test]
    fn test_mono_png_has_two_entry_palette() {
        let mut out = Vec::new();
        write_mono_png(&mut out, 8, 1, &[0b1010_1010]).unwrap();

        let plte = out
            .windows(4)
            .position(|w| w == b"PLTE")
            .expect("PLTE chunk present");
        assert_eq!(&out[plte + 4..plte + 10], &[0, 0, 0, 255, 255, 255]);
        assert_eq!(out[25], COLOR_TYPE_PALETTE);
        assert_eq!(out[24], 1); // bit depth
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let mut out = Vec::new();
        assert!(write_rgb_png(&mut out, 4, 4, &[0u8; 3]).is_err());
        assert!(write_mono_png(&mut out, 64, 2, &[0u8; 4]).is_err());
    }
}
