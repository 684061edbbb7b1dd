//! Decoded image data as the rest of the crate consumes it: RGBA frames plus
//! per-frame delays, so animated gifs keep animating on the wall.

use std::io::Cursor;
use std::time::Duration;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, ImageFormat};
use thiserror::Error;

/// Delay substituted for frames that declare none. Mirrors what browsers do
/// with zero-delay gifs, which are common in old archives.
const FALLBACK_FRAME_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("image data could not be decoded: {0}")]
    Malformed(#[from] image::ImageError),
    #[error("image has zero extent ({width}x{height})")]
    ZeroExtent { width: u32, height: u32 },
    #[error("animation contains no frames")]
    Empty,
}

/// One frame of a decoded animation: tightly packed RGBA8 pixels and the
/// delay before the next frame is shown.
#[derive(Clone)]
pub struct GifFrame {
    pub delay: Duration,
    pub rgba: Vec<u8>,
}

/// A fully decoded image. Still images are a single frame with zero delay.
pub struct GifImage {
    width: u32,
    height: u32,
    frames: Vec<GifFrame>,
    loop_duration: Duration,
}

impl GifImage {
    pub fn from_frames(width: u32, height: u32, frames: Vec<GifFrame>) -> Result<Self, DecodeError> {
        if width == 0 || height == 0 {
            return Err(DecodeError::ZeroExtent { width, height });
        }
        if frames.is_empty() {
            return Err(DecodeError::Empty);
        }
        let loop_duration = frames.iter().map(|frame| frame.delay).sum();
        Ok(Self {
            width,
            height,
            frames,
            loop_duration,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn frames(&self) -> &[GifFrame] {
        &self.frames
    }

    /// Index of the frame to show after `elapsed` time on screen, looping over
    /// the total animation duration. Still images always return 0.
    pub fn frame_at(&self, elapsed: Duration) -> usize {
        if self.frames.len() <= 1 || self.loop_duration.is_zero() {
            return 0;
        }
        let looped = elapsed.as_nanos() % self.loop_duration.as_nanos();
        let mut remaining = Duration::from_nanos(looped as u64);
        for (idx, frame) in self.frames.iter().enumerate() {
            if remaining < frame.delay {
                return idx;
            }
            remaining -= frame.delay;
        }
        self.frames.len() - 1
    }
}

/// Decodes raw image bytes, keeping every frame for gifs and falling back to
/// a single-frame decode for everything else.
pub fn decode_image(bytes: &[u8]) -> Result<GifImage, DecodeError> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Gif) => decode_gif(bytes),
        _ => decode_still(bytes),
    }
}

fn decode_gif(bytes: &[u8]) -> Result<GifImage, DecodeError> {
    let decoder = GifDecoder::new(Cursor::new(bytes))?;
    let frames = decoder.into_frames().collect_frames()?;
    if frames.is_empty() {
        return decode_still(bytes);
    }

    let mut decoded = Vec::with_capacity(frames.len());
    let mut size = (0, 0);
    for frame in frames {
        let mut delay = Duration::from(frame.delay());
        if delay.is_zero() {
            delay = FALLBACK_FRAME_DELAY;
        }
        let buffer = frame.into_buffer();
        size = (buffer.width(), buffer.height());
        decoded.push(GifFrame {
            delay,
            rgba: buffer.into_raw(),
        });
    }
    GifImage::from_frames(size.0, size.1, decoded)
}

fn decode_still(bytes: &[u8]) -> Result<GifImage, DecodeError> {
    let buffer = image::load_from_memory(bytes)?.to_rgba8();
    let (width, height) = (buffer.width(), buffer.height());
    GifImage::from_frames(
        width,
        height,
        vec![GifFrame {
            delay: Duration::ZERO,
            rgba: buffer.into_raw(),
        }],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(delay_ms: u64) -> GifFrame {
        GifFrame {
            delay: Duration::from_millis(delay_ms),
            rgba: vec![0; 4],
        }
    }

    #[test]
    fn frame_selection_loops_over_delays() {
        let image =
            GifImage::from_frames(1, 1, vec![frame(100), frame(50), frame(100)]).unwrap();
        assert_eq!(image.frame_at(Duration::ZERO), 0);
        assert_eq!(image.frame_at(Duration::from_millis(99)), 0);
        assert_eq!(image.frame_at(Duration::from_millis(120)), 1);
        assert_eq!(image.frame_at(Duration::from_millis(200)), 2);
        // 250ms loop: 260ms lands 10ms into the second pass
        assert_eq!(image.frame_at(Duration::from_millis(260)), 0);
    }

    #[test]
    fn still_images_stay_on_frame_zero() {
        let image = GifImage::from_frames(4, 2, vec![frame(0)]).unwrap();
        assert_eq!(image.frame_at(Duration::from_secs(10)), 0);
        assert_eq!(image.aspect_ratio(), 2.0);
    }

    #[test]
    fn rejects_zero_extent_and_empty() {
        assert!(matches!(
            GifImage::from_frames(0, 10, vec![frame(10)]),
            Err(DecodeError::ZeroExtent { .. })
        ));
        assert!(matches!(
            GifImage::from_frames(1, 1, Vec::new()),
            Err(DecodeError::Empty)
        ));
    }

    #[test]
    fn decodes_png_bytes_as_single_frame() {
        let mut bytes = Vec::new();
        let buffer = image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        buffer
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let decoded = decode_image(&bytes).expect("valid png");
        assert_eq!(decoded.width(), 3);
        assert_eq!(decoded.height(), 2);
        assert_eq!(decoded.frames().len(), 1);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(decode_image(b"not an image").is_err());
    }
}
