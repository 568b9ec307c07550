use std::path::Path;

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;
use crate::video::domain::image_writer::ImageWriter;

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BAND_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

const BOX_THICKNESS: i32 = 2;
const GLYPH_SIZE: u32 = 8;
/// Frame height per unit of caption scale.
const CAPTION_SCALE_STEP: u32 = 180;
const MAX_CAPTION_SCALE: u32 = 4;

/// Renders the three sampled frames side by side with the dominant face
/// outlined and a caption band underneath.
pub struct DebugRenderer {
    writer: Box<dyn ImageWriter>,
}

impl DebugRenderer {
    pub fn new(writer: Box<dyn ImageWriter>) -> Self {
        Self { writer }
    }

    pub fn render(
        &self,
        path: &Path,
        frames: [&Frame; 3],
        boxes: [Option<BoundingBox>; 3],
        caption: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let composite = compose(frames, boxes, caption);
        self.writer.write(path, &Frame::new(composite, 0))
    }
}

/// Builds the composite image.
pub fn compose(
    frames: [&Frame; 3],
    boxes: [Option<BoundingBox>; 3],
    caption: &str,
) -> RgbImage {
    let width: u32 = frames.iter().map(|f| f.width()).sum();
    let height = frames.iter().map(|f| f.height()).max().unwrap_or(0);
    let scale = (height / CAPTION_SCALE_STEP).clamp(1, MAX_CAPTION_SCALE);
    let margin = 2 * scale;
    let band = GLYPH_SIZE * scale + 2 * margin;

    let mut canvas = RgbImage::from_pixel(width, height + band, BAND_COLOR);
    let mut x_offset = 0u32;
    for (frame, bbox) in frames.iter().zip(boxes) {
        let mut tile = frame.image().clone();
        if let Some(bbox) = bbox {
            outline(&mut tile, &bbox);
        }
        imageops::replace(&mut canvas, &tile, x_offset as i64, 0);
        x_offset += frame.width();
    }

    draw_caption(&mut canvas, caption, margin, height + margin, scale);
    canvas
}

fn outline(tile: &mut RgbImage, bbox: &BoundingBox) {
    let Some((x0, y0, x1, y1)) = bbox.clamped(tile.width(), tile.height()) else {
        return;
    };
    for inset in 0..BOX_THICKNESS {
        let w = (x1 - x0) as i32 - 2 * inset;
        let h = (y1 - y0) as i32 - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at(x0 as i32 + inset, y0 as i32 + inset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(tile, rect, BOX_COLOR);
    }
}

/// Draws `text` with the 8x8 bitmap font, each glyph pixel blown up to a
/// `scale` x `scale` block. Text that does not fit is cut off.
fn draw_caption(canvas: &mut RgbImage, text: &str, x: u32, y: u32, scale: u32) {
    let advance = GLYPH_SIZE * scale;
    let mut cursor = x;
    for ch in text.chars() {
        if cursor + advance > canvas.width() {
            break;
        }
        let glyph = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?'));
        if let Some(rows) = glyph {
            for (gy, row) in rows.iter().enumerate() {
                for gx in 0..GLYPH_SIZE {
                    if row & (1 << gx) == 0 {
                        continue;
                    }
                    for dy in 0..scale {
                        for dx in 0..scale {
                            let px = cursor + gx * scale + dx;
                            let py = y + gy as u32 * scale + dy;
                            if px < canvas.width() && py < canvas.height() {
                                canvas.put_pixel(px, py, TEXT_COLOR);
                            }
                        }
                    }
                }
            }
        }
        cursor += advance;
    }
}
