//! Timestamp overlay.
//!
//! Renders a strftime-formatted capture time into the top-left corner of a
//! frame with a built-in 5x7 bitmap font, then re-encodes the frame in the
//! format it arrived in.

use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDateTime;
use image::{DynamicImage, GenericImage, GenericImageView, Rgba};
use std::fmt::Write as _;
use std::io::Cursor;

use crate::error::OverlayError;

/// Top-left corner of the rendered text.
pub const TEXT_ORIGIN: (u32, u32) = (5, 5);

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const GLYPH_SPACING: u32 = 1;
const SCALE: u32 = 2;

const INK: Rgba<u8> = Rgba([255, 255, 255, 255]);
const SHADOW: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Returns true when `format` is a usable strftime pattern.
pub fn is_valid_format(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

/// Formats `stamp` without panicking on a bad pattern.
pub fn format_timestamp(stamp: NaiveDateTime, format: &str) -> Result<String, OverlayError> {
    if !is_valid_format(format) {
        return Err(OverlayError::TimestampFormat(format.to_string()));
    }
    let mut text = String::new();
    write!(text, "{}", stamp.format(format))
        .map_err(|_| OverlayError::TimestampFormat(format.to_string()))?;
    Ok(text)
}

/// Burns the formatted timestamp into `frame`, returning the re-encoded bytes.
pub fn stamp_frame(
    frame: &[u8],
    stamp: NaiveDateTime,
    format: &str,
) -> Result<Vec<u8>, OverlayError> {
    let text = format_timestamp(stamp, format)?;
    let image_format = image::guess_format(frame).map_err(OverlayError::Format)?;
    let mut image =
        image::load_from_memory_with_format(frame, image_format).map_err(OverlayError::Decode)?;

    draw_text(&mut image, TEXT_ORIGIN, &text);

    let mut out = Cursor::new(Vec::with_capacity(frame.len()));
    image
        .write_to(&mut out, image_format)
        .map_err(OverlayError::Encode)?;
    Ok(out.into_inner())
}

fn draw_text(image: &mut DynamicImage, origin: (u32, u32), text: &str) {
    let advance = (GLYPH_WIDTH + GLYPH_SPACING) * SCALE;
    let mut x = origin.0;
    for ch in text.chars() {
        if let Some(rows) = glyph(ch) {
            // Shadow under ink.
            draw_glyph(image, x + 1, origin.1 + 1, &rows, SHADOW);
            draw_glyph(image, x, origin.1, &rows, INK);
        }
        x = x.saturating_add(advance);
        if x >= image.width() {
            break;
        }
    }
}

fn draw_glyph(image: &mut DynamicImage, x: u32, y: u32, rows: &[u8; 7], color: Rgba<u8>) {
    let (width, height) = image.dimensions();
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..GLYPH_WIDTH {
            if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                continue;
            }
            for dy in 0..SCALE {
                for dx in 0..SCALE {
                    let px = x + col * SCALE + dx;
                    let py = y + row as u32 * SCALE + dy;
                    if px < width && py < height {
                        image.put_pixel(px, py, color);
                    }
                }
            }
        }
    }
}

/// Rendered height of one line of text, shadow included.
pub fn text_height() -> u32 {
    GLYPH_HEIGHT * SCALE + 1
}

fn glyph(ch: char) -> Option<[u8; 7]> {
    let rows = match ch.to_ascii_uppercase() {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ',' => [0x00, 0x00, 0x00, 0x00, 0x0C, 0x04, 0x08],
        '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        '+' => [0x00, 0x04, 0x04, 0x1F, 0x04, 0x04, 0x00],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        _ => return None,
    };
    Some(rows)
}
