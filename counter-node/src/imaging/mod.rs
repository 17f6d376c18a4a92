//! Frame conversion, annotation and recording for the diagnostic surface.

use image::{codecs::jpeg::JpegEncoder, ColorType, RgbImage};
use rusttype::Font;
use std::path::Path;
use trafficount_common::CameraFrame;

use crate::error::{CounterError, Result};

pub mod annotate;
pub mod recorder;

pub use annotate::{annotate, draw_totals, totals_lines};
pub use recorder::VideoRecorder;

pub fn frame_to_image(frame: &CameraFrame) -> Result<RgbImage> {
    RgbImage::from_raw(frame.width, frame.height, frame.data.clone()).ok_or_else(|| {
        CounterError::Image(format!(
            "frame {} has {} bytes, expected {}x{}x3",
            frame.sequence_num,
            frame.data.len(),
            frame.width,
            frame.height
        ))
    })
}

/// Reads the TrueType font used for the totals overlay.
pub async fn load_font(path: &Path) -> Result<Font<'static>> {
    let data = tokio::fs::read(path).await?;
    Font::try_from_vec(data)
        .ok_or_else(|| CounterError::Image(format!("{} is not a TrueType font", path.display())))
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut jpeg = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100));
    encoder.encode(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)?;
    Ok(jpeg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32, len: usize) -> CameraFrame {
        CameraFrame {
            data: vec![128; len],
            width,
            height,
            timestamp: 0,
            sequence_num: 3,
        }
    }

    #[test]
    fn encodes_a_frame_as_jpeg() {
        let image = frame_to_image(&frame(16, 8, 16 * 8 * 3)).unwrap();

        let jpeg = encode_jpeg(&image, 80).unwrap();

        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn short_buffer_is_rejected() {
        assert!(matches!(
            frame_to_image(&frame(16, 8, 10)),
            Err(CounterError::Image(_))
        ));
    }

    #[tokio::test]
    async fn invalid_font_file_is_an_image_error() {
        let path = std::env::temp_dir().join(format!("trafficount-font-{}.ttf", std::process::id()));
        std::fs::write(&path, b"not a font").unwrap();

        assert!(matches!(load_font(&path).await, Err(CounterError::Image(_))));
        assert!(matches!(load_font(Path::new("/nonexistent/font.ttf")).await, Err(CounterError::Io(_))));
        let _ = std::fs::remove_file(&path);
    }
}
