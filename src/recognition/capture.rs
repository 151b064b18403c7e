use anyhow::{anyhow, Context, Result};
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;

use crate::camera::VideoFrame;

const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// A frame prepared for upload.
#[derive(Clone, Debug)]
pub struct EncodedFrame {
    /// `data:image/jpeg;base64,…`
    pub data_url: String,
    /// Submitted width over original width; returned geometry is divided by it.
    pub scale: f32,
    pub width: u32,
    pub height: u32,
}

/// Size to submit a `width`x`height` frame at, and the scale factor applied.
///
/// Frames wider than `max_width` shrink proportionally to exactly `max_width`;
/// narrower frames pass through at scale 1.
pub fn target_size(width: u32, height: u32, max_width: u32) -> (u32, u32, f32) {
    if width <= max_width || width == 0 {
        return (width, height, 1.0);
    }
    let scale = max_width as f32 / width as f32;
    let scaled_height = ((height as f32 * scale).floor() as u32).max(1);
    (max_width, scaled_height, scale)
}

/// Downscale and JPEG-encode a frame for the recognizer.
pub fn encode_frame(frame: &VideoFrame, max_width: u32, quality: u8) -> Result<EncodedFrame> {
    if !frame.is_ready() {
        return Err(anyhow!("frame has no pixels"));
    }
    let source = RgbImage::from_raw(frame.width(), frame.height(), frame.pixels().to_vec())
        .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", frame.width(), frame.height()))?;

    let (width, height, scale) = target_size(frame.width(), frame.height(), max_width);
    let scaled = if scale < 1.0 {
        image::imageops::resize(&source, width, height, FilterType::Triangle)
    } else {
        source
    };

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality)
        .encode_image(&scaled)
        .context("encode frame as jpeg")?;

    let mut data_url = String::with_capacity(DATA_URL_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
    data_url.push_str(DATA_URL_PREFIX);
    base64::engine::general_purpose::STANDARD.encode_string(&jpeg, &mut data_url);

    Ok(EncodedFrame {
        data_url,
        scale,
        width,
        height,
    })
}
