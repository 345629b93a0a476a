use anyhow::{Context, Result};
use log::{info, warn};
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs, VideoCaptureTrait},
};

use crate::config::CameraConfig;
use crate::error::VisionError;
use crate::vision::FrameSource;

/// OpenCVを使用したカメラキャプチャ
///
/// Frames are handed out as 8-bit grayscale, which is what both detectors
/// consume.
pub struct OpenCvCamera {
    capture: VideoCapture,
    index: i32,
    requested: (Option<u32>, Option<u32>),
    width: u32,
    height: u32,
    reopen: bool,
}

impl OpenCvCamera {
    pub fn from_config(config: &CameraConfig) -> Result<Self> {
        let mut camera = Self::open_with_resolution(config.index, config.width, config.height)?;
        camera.reopen = config.reopen;
        Ok(camera)
    }

    /// 解像度を指定してカメラを開く
    pub fn open_with_resolution(index: i32, width: Option<u32>, height: Option<u32>) -> Result<Self> {
        let capture = open_capture(index, width, height)?;
        let actual_width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let actual_height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
        info!("[cam{}] opened {}x{}", index, actual_width, actual_height);

        Ok(Self {
            capture,
            index,
            requested: (width, height),
            width: actual_width,
            height: actual_height,
            reopen: true,
        })
    }

    /// フレームを読み込む（BGR形式）
    fn read_frame(&mut self) -> Result<Mat> {
        let mut frame = Mat::default();
        self.capture
            .read(&mut frame)
            .context("Failed to read frame")?;

        if frame.empty() {
            anyhow::bail!("Empty frame received");
        }

        Ok(frame)
    }

    // デバイスを開き直す。解像度は起動時のものを維持する
    fn reopen_device(&mut self) -> Result<()> {
        let _ = self.capture.release();
        let (w, h) = self.requested;
        self.capture = open_capture(self.index, w, h)?;
        Ok(())
    }
}

fn open_capture(index: i32, width: Option<u32>, height: Option<u32>) -> Result<VideoCapture> {
    let mut capture = VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32)
        .with_context(|| format!("failed to open camera {index}"))?;

    if !capture.is_opened()? {
        anyhow::bail!("Camera {} is not available", index);
    }

    if let Some(w) = width {
        capture.set(videoio::CAP_PROP_FRAME_WIDTH, w as f64)?;
    }
    if let Some(h) = height {
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, h as f64)?;
    }
    capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;
    Ok(capture)
}

impl FrameSource for OpenCvCamera {
    type Frame = Mat;

    fn video_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn next_frame(&mut self) -> Result<Mat, VisionError> {
        let frame = match self.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                if self.reopen {
                    warn!("[cam{}] {:#}; reopening", self.index, e);
                    self.reopen_device()
                        .map_err(|e| VisionError::CaptureUnavailable(format!("{:#}", e)))?;
                }
                return Err(VisionError::CaptureUnavailable(format!("{:#}", e)));
            }
        };

        let mut gray = Mat::default();
        imgproc::cvt_color_def(&frame, &mut gray, imgproc::COLOR_BGR2GRAY)
            .map_err(|e| VisionError::CaptureUnavailable(e.to_string()))?;
        Ok(gray)
    }
}
