//! Round-trip tests for the PNG writer: the emitted chunks are parsed
//! back by hand and the IDAT payload is inflated with flate2, so the
//! decoded scanlines can be compared against independently computed
//! pixel buffers.

use flate2::read::ZlibDecoder;
use marquez_core::event::Flip;
use marquez_core::raster::{flip_mono, flip_rgb, mono_stride, write_mono_png, write_rgb_png};
use std::io::Read;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];

struct Chunk<'a> {
    kind: &'a [u8],
    data: &'a [u8],
}

fn parse_chunks(png: &[u8]) -> Vec<Chunk<'_>> {
    assert_eq!(&png[..8], &PNG_SIGNATURE);
    let mut chunks = Vec::new();
    let mut at = 8;
    while at < png.len() {
        let len = u32::from_be_bytes(png[at..at + 4].try_into().unwrap()) as usize;
        chunks.push(Chunk {
            kind: &png[at + 4..at + 8],
            data: &png[at + 8..at + 8 + len],
        });
        // Skip the CRC trailer.
        at += 12 + len;
    }
    chunks
}

fn find<'a>(chunks: &'a [Chunk<'a>], kind: &str) -> &'a Chunk<'a> {
    chunks
        .iter()
        .find(|c| c.kind == kind.as_bytes())
        .unwrap_or_else(|| panic!("missing {kind} chunk"))
}

/// Inflates the concatenated IDAT payload and strips the per-row
/// filter bytes, asserting every row uses filter type 0.
fn scanlines(png: &[u8], row_bytes: usize, height: usize) -> Vec<u8> {
    let chunks = parse_chunks(png);
    let compressed: Vec<u8> = chunks
        .iter()
        .filter(|c| c.kind == b"IDAT")
        .flat_map(|c| c.data.iter().copied())
        .collect();
    let mut raw = Vec::new();
    ZlibDecoder::new(&compressed[..])
        .read_to_end(&mut raw)
        .unwrap();
    assert_eq!(raw.len(), (row_bytes + 1) * height);

    let mut rows = Vec::with_capacity(row_bytes * height);
    for row in raw.chunks_exact(row_bytes + 1) {
        assert_eq!(row[0], 0, "unexpected PNG filter type");
        rows.extend_from_slice(&row[1..]);
    }
    rows
}

fn bit(data: &[u8], stride: usize, x: usize, y: usize) -> u8 {
    (data[y * stride + x / 8] >> (7 - (x % 8))) & 1
}

/// Per-pixel reference mirror of a packed 1-bit image.
fn mirror_mono_reference(data: &[u8], width: usize, height: usize) -> Vec<u8> {
    let stride = mono_stride(width as i32);
    let mut out = vec![0u8; stride * height];
    for y in 0..height {
        for x in 0..width {
            if bit(data, stride, width - 1 - x, y) != 0 {
                out[y * stride + x / 8] |= 0x80 >> (x % 8);
            }
        }
    }
    out
}

fn patterned_mono(width: usize, height: usize) -> Vec<u8> {
    let stride = mono_stride(width as i32);
    let mut data = vec![0u8; stride * height];
    for y in 0..height {
        for x in 0..width {
            if (x * 7 + y * 3) % 5 < 2 {
                data[y * stride + x / 8] |= 0x80 >> (x % 8);
            }
        }
    }
    data
}

#[test]
fn test_rgb_png_roundtrip_preserves_pixels() {
    let (w, h) = (5usize, 3usize);
    let data: Vec<u8> = (0..w * h * 3).map(|i| (i * 11 % 256) as u8).collect();
    let mut png = Vec::new();
    write_rgb_png(&mut png, w as i32, h as i32, &data).unwrap();

    let chunks = parse_chunks(&png);
    let ihdr = find(&chunks, "IHDR").data;
    assert_eq!(&ihdr[..8], &[0, 0, 0, 5, 0, 0, 0, 3]);
    assert_eq!(ihdr[8], 8); // bit depth
    assert_eq!(ihdr[9], 2); // truecolor
    find(&chunks, "pHYs");
    find(&chunks, "IEND");

    assert_eq!(scanlines(&png, w * 3, h), data);
}

#[test]
fn test_mono_png_roundtrip_preserves_bits() {
    let (w, h) = (13usize, 4usize);
    let data = patterned_mono(w, h);
    let mut png = Vec::new();
    write_mono_png(&mut png, w as i32, h as i32, &data).unwrap();

    let chunks = parse_chunks(&png);
    let ihdr = find(&chunks, "IHDR").data;
    assert_eq!(ihdr[8], 1); // bit depth
    assert_eq!(ihdr[9], 3); // indexed
    assert_eq!(find(&chunks, "PLTE").data, &[0, 0, 0, 255, 255, 255]);

    assert_eq!(scanlines(&png, mono_stride(w as i32), h), data);
}

#[test]
fn test_mono_x_flip_roundtrip_at_odd_width() {
    // Width 13 exercises the cross-byte bit carry of the packed flip.
    let (w, h) = (13usize, 4usize);
    let data = patterned_mono(w, h);
    let flipped = flip_mono(&data, w as i32, h as i32, Flip { x: true, y: false });

    let mut png = Vec::new();
    write_mono_png(&mut png, w as i32, h as i32, &flipped).unwrap();
    let rows = scanlines(&png, mono_stride(w as i32), h);

    let stride = mono_stride(w as i32);
    let reference = mirror_mono_reference(&data, w, h);
    for y in 0..h {
        for x in 0..w {
            assert_eq!(
                bit(&rows, stride, x, y),
                bit(&reference, stride, x, y),
                "pixel ({x},{y})"
            );
        }
    }
}

#[test]
fn test_mono_xy_flip_roundtrip_at_byte_width() {
    let (w, h) = (16usize, 3usize);
    let data = patterned_mono(w, h);
    let flipped = flip_mono(&data, w as i32, h as i32, Flip { x: true, y: true });

    let mut png = Vec::new();
    write_mono_png(&mut png, w as i32, h as i32, &flipped).unwrap();
    let rows = scanlines(&png, mono_stride(w as i32), h);

    let stride = mono_stride(w as i32);
    for y in 0..h {
        for x in 0..w {
            assert_eq!(
                bit(&rows, stride, x, y),
                bit(&data, stride, w - 1 - x, h - 1 - y),
                "pixel ({x},{y})"
            );
        }
    }
}

#[test]
fn test_rgb_y_flip_roundtrip_reverses_rows() {
    let (w, h) = (4usize, 3usize);
    let data: Vec<u8> = (0..w * h * 3).map(|i| i as u8).collect();
    let flipped = flip_rgb(&data, w as i32, h as i32, Flip { x: false, y: true });

    let mut png = Vec::new();
    write_rgb_png(&mut png, w as i32, h as i32, &flipped).unwrap();
    let rows = scanlines(&png, w * 3, h);

    for y in 0..h {
        assert_eq!(
            &rows[y * w * 3..(y + 1) * w * 3],
            &data[(h - 1 - y) * w * 3..(h - y) * w * 3]
        );
    }
}
