//! Generic `Camera` trait and supporting types for image-capture hardware.

use std::path::Path;

use tilenav_types::NavError;
use tracing::info;

/// A greyscale image frame returned by a camera driver.
///
/// Pixels are stored row-major, one byte per pixel, top row first.  The
/// buffer always holds exactly `width * height` bytes; frames can only be
/// built through [`CameraFrame::new`] or [`CameraFrame::filled`].
#[derive(Debug, Clone, PartialEq)]
pub struct CameraFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl CameraFrame {
    /// Wrap a luminance buffer.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::InvalidFrame`] if `data` is not exactly
    /// `width * height` bytes long.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, NavError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(NavError::InvalidFrame(format!(
                "expected {expected} bytes for {width}x{height}, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A frame with every pixel set to `value`.
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw 8-bit luminance data, `width * height` bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Luminance at `(x, y)`; `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<u8> {
        if x < self.width && y < self.height {
            self.data.get(y as usize * self.width as usize + x as usize).copied()
        } else {
            None
        }
    }

    /// Set the luminance at `(x, y)`; ignored outside the frame.
    pub fn set_pixel(&mut self, x: u32, y: u32, value: u8) {
        if x < self.width && y < self.height {
            let idx = y as usize * self.width as usize + x as usize;
            if let Some(pixel) = self.data.get_mut(idx) {
                *pixel = value;
            }
        }
    }
}

/// A camera or image-capture device.
pub trait Camera: Send {
    /// Stable identifier for this camera, e.g. `"side_webcam"`.
    fn id(&self) -> &str;

    /// Resolution of captured frames as `(width, height)`.
    fn resolution(&self) -> (u32, u32);

    /// Capture and return the next available frame.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::HardwareFault`] if the frame cannot be captured
    /// (e.g. the device is disconnected or the buffer is unavailable).
    fn capture(&mut self) -> Result<CameraFrame, NavError>;
}

/// Write `frame` to `path` as a PNG.
///
/// # Errors
///
/// Returns [`NavError::InvalidFrame`] if the image buffer cannot be built
/// and [`NavError::Io`] if encoding or writing fails.
pub fn save_frame(frame: &CameraFrame, path: impl AsRef<Path>) -> Result<(), NavError> {
    let path = path.as_ref();
    let img = image::GrayImage::from_raw(frame.width, frame.height, frame.data.clone())
        .ok_or_else(|| NavError::InvalidFrame("buffer does not match frame size".to_string()))?;
    img.save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| NavError::Io(format!("failed to save frame to {}: {e}", path.display())))?;
    info!(path = %path.display(), width = frame.width, height = frame.height, "saved camera frame");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockCamera {
        id: String,
    }

    impl Camera for MockCamera {
        fn id(&self) -> &str {
            &self.id
        }

        fn resolution(&self) -> (u32, u32) {
            (2, 2)
        }

        fn capture(&mut self) -> Result<CameraFrame, NavError> {
            CameraFrame::new(2, 2, vec![0u8; 4])
        }
    }

    #[test]
    fn mock_camera_capture() {
        let mut cam = MockCamera {
            id: "side_webcam".to_string(),
        };
        assert_eq!(cam.id(), "side_webcam");
        let frame = cam.capture().unwrap();
        assert_eq!((frame.width(), frame.height()), (2, 2));
        assert_eq!(frame.data().len(), 4);
    }

    #[test]
    fn frame_rejects_wrong_buffer_length() {
        let err = CameraFrame::new(4, 4, vec![0u8; 15]).unwrap_err();
        assert!(matches!(err, NavError::InvalidFrame(_)));
        let short = CameraFrame::new(10, 10, vec![0u8; 50]);
        assert!(matches!(short, Err(NavError::InvalidFrame(_))));
        assert_eq!(CameraFrame::new(3, 2, vec![7u8; 6]).unwrap().data(), &[7u8; 6]);
    }

    #[test]
    fn pixel_access_is_bounds_checked() {
        let mut frame = CameraFrame::filled(3, 2, 10);
        frame.set_pixel(2, 1, 200);
        frame.set_pixel(5, 5, 99);
        assert_eq!(frame.pixel(2, 1), Some(200));
        assert_eq!(frame.pixel(0, 0), Some(10));
        assert_eq!(frame.pixel(3, 0), None);
    }

    #[test]
    fn save_frame_writes_png() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("frame.png");
        let frame = CameraFrame::filled(8, 6, 128);
        save_frame(&frame, &path).expect("save");
        let meta = std::fs::metadata(&path).expect("png exists");
        assert!(meta.len() > 0);
    }

    #[test]
    fn save_frame_rejects_inconsistent_frame() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let frame = CameraFrame {
            width: 8,
            height: 8,
            data: vec![0u8; 3],
        };
        let err = save_frame(&frame, dir.path().join("bad.png")).unwrap_err();
        assert!(matches!(err, NavError::InvalidFrame(_)));
    }
}
