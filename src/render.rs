use std::io::Cursor;

use ab_glyph::{FontArc, PxScale};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detection::DetectionBox;
use crate::errors::{RipenessError, Result};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: i32 = 2;
const LABEL_FONT_SIZE: f32 = 14.0;
/// Gap between the bottom of the label and the top edge of its box.
const LABEL_OFFSET: i32 = 10;

static DEFAULT_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// Draws detection boxes and `class:score` labels onto images.
#[derive(Clone)]
pub struct Annotator {
    font: FontArc,
    scale: PxScale,
    color: Rgb<u8>,
}

impl Annotator {
    pub fn new() -> Result<Self> {
        let font = FontArc::try_from_slice(DEFAULT_FONT).map_err(|e| RipenessError::Encode {
            operation: "embedded font load".to_string(),
            source: Box::new(e),
        })?;
        Ok(Self::with_font(font))
    }

    pub fn with_font(font: FontArc) -> Self {
        Self {
            font,
            scale: PxScale::from(LABEL_FONT_SIZE),
            color: BOX_COLOR,
        }
    }

    /// Copy `image` and draw every detection onto the copy. Boxes must already be in the
    /// image's pixel space; parts outside the canvas are clipped.
    pub fn annotate(&self, image: &RgbImage, detections: &[DetectionBox]) -> RgbImage {
        let mut canvas = image.clone();
        for detection in detections {
            self.draw_detection(&mut canvas, detection);
        }
        canvas
    }

    fn draw_detection(&self, canvas: &mut RgbImage, detection: &DetectionBox) {
        let (w, h) = (canvas.width() as i32, canvas.height() as i32);
        let [x1, y1, x2, y2] = detection.coordinates().corners();

        let x_min = (x1.floor() as i32).clamp(0, w - 1);
        let y_min = (y1.floor() as i32).clamp(0, h - 1);
        let x_max = (x2.ceil() as i32).clamp(0, w - 1);
        let y_max = (y2.ceil() as i32).clamp(0, h - 1);

        for inset in 0..BOX_THICKNESS {
            let width = x_max - x_min + 1 - 2 * inset;
            let height = y_max - y_min + 1 - 2 * inset;
            if width <= 0 || height <= 0 {
                break;
            }
            let rect = Rect::at(x_min + inset, y_min + inset).of_size(width as u32, height as u32);
            draw_hollow_rect_mut(canvas, rect, self.color);
        }

        let label = format!(
            "{}:{:.2}",
            detection.class_index(),
            detection.confidence()
        );
        let text_y = (y_min - LABEL_OFFSET - LABEL_FONT_SIZE as i32).max(0);
        draw_text_mut(canvas, self.color, x_min, text_y, self.scale, &self.font, &label);
    }
}

/// Lossless PNG encoding.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| RipenessError::Encode {
            operation: "PNG encoding".to_string(),
            source: Box::new(e),
        })?;
    Ok(bytes)
}

/// Standard padded base64, for embedding image bytes in JSON.
pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
