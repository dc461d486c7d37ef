//! Bounding-box annotation and JPEG encoding.

use crate::error::VisionError;
use argus_core::Detection;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

/// JPEG quality used for published frames and annotated outputs.
pub const JPEG_QUALITY: u8 = 80;

const BOX_THICKNESS: u32 = 2;

// Fixed palette; class id picks a stable color.
const PALETTE: [[u8; 3]; 6] = [
    [230, 57, 70],
    [46, 196, 182],
    [255, 183, 3],
    [131, 56, 236],
    [58, 134, 255],
    [251, 86, 7],
];

fn class_color(class_id: usize) -> Rgb<u8> {
    Rgb(PALETTE[class_id % PALETTE.len()])
}

/// Draw detection boxes onto a frame in place.
pub fn draw_detections(frame: &mut RgbImage, detections: &[Detection]) {
    let (width, height) = frame.dimensions();
    for det in detections {
        let color = class_color(det.class_id);
        let (bx, by, bw, bh) = det.bbox;

        let x0 = bx.max(0.0) as u32;
        let y0 = by.max(0.0) as u32;
        let x1 = ((bx + bw).max(0.0) as u32).min(width.saturating_sub(1));
        let y1 = ((by + bh).max(0.0) as u32).min(height.saturating_sub(1));
        if x0 >= x1 || y0 >= y1 {
            continue;
        }

        for t in 0..BOX_THICKNESS {
            // Horizontal edges.
            for x in x0..=x1 {
                if y0 + t <= y1 {
                    frame.put_pixel(x, y0 + t, color);
                }
                if y1 >= t && y1 - t >= y0 {
                    frame.put_pixel(x, y1 - t, color);
                }
            }
            // Vertical edges.
            for y in y0..=y1 {
                if x0 + t <= x1 {
                    frame.put_pixel(x0 + t, y, color);
                }
                if x1 >= t && x1 - t >= x0 {
                    frame.put_pixel(x1 - t, y, color);
                }
            }
        }
    }
}

/// Encode a frame as JPEG.
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>, VisionError> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder
        .encode_image(frame)
        .map_err(|e| VisionError::Encoding(format!("JPEG encoding failed: {}", e)))?;
    Ok(buf)
}
