//! Frame sources.
//!
//! The controller never talks to a sensor directly. It only starts and stops
//! capture through [`super::CaptureControl`]; the capture loop pulls frames
//! from whatever implements [`FrameSource`].

use super::{CaptureConfig, Frame};
use crate::config::ConfigError;
use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore, SeedableRng};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no sensor at device {0}")]
    Unavailable(u32),
    #[error("sensor rejected capture settings: {0}")]
    Settings(#[from] ConfigError),
    #[error("source read before open")]
    NotOpen,
    #[error("sensor read failed: {0}")]
    Read(String),
}

/// A source of raw sensor frames, driven by the capture loop.
pub trait FrameSource: Send {
    /// False when no sensor is present; the session then never captures.
    fn is_available(&self) -> bool;

    fn open(&mut self, config: &CaptureConfig) -> Result<(), SourceError>;

    /// Blocks until the next frame is read out.
    fn next_frame(&mut self) -> Result<Frame, SourceError>;

    fn close(&mut self);
}

/// Synthetic sensor producing a dim, noisy image.
///
/// Pixel values are a fixed base level plus ChaCha-generated noise, with an
/// occasional fully saturated pixel. The output is deterministic for a given
/// seed so sessions can be replayed in tests.
pub struct MockCamera {
    opened: Option<(u32, u32)>,
    rng: ChaCha20Rng,
    frames_read: u64,
    base_level: u8,
    noise_span: u8,
    available: bool,
}

impl MockCamera {
    pub fn new() -> Self {
        Self::with_seed(0x0E_B10C)
    }

    /// Noise stream derived from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            opened: None,
            rng: ChaCha20Rng::seed_from_u64(seed),
            frames_read: 0,
            base_level: 40,
            noise_span: 64,
            available: true,
        }
    }

    /// A camera that reports no sensor present.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Overrides the base brightness, e.g. to provoke frame rejection.
    pub fn with_base_level(mut self, base_level: u8) -> Self {
        self.base_level = base_level;
        self
    }

    fn noisy_pixel(&self, n: u8) -> u8 {
        // Roughly one hot pixel in 256.
        if n == u8::MAX {
            return u8::MAX;
        }
        let span = u16::from(self.noise_span.max(1));
        self.base_level.saturating_add((u16::from(n) % span) as u8)
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCamera")
            .field("opened", &self.opened)
            .field("frames_read", &self.frames_read)
            .field("base_level", &self.base_level)
            .finish_non_exhaustive()
    }
}

impl FrameSource for MockCamera {
    fn is_available(&self) -> bool {
        self.available
    }

    fn open(&mut self, config: &CaptureConfig) -> Result<(), SourceError> {
        if !self.available {
            return Err(SourceError::Unavailable(config.device_id));
        }
        config.validate()?;
        self.opened = Some((config.width, config.height));
        self.frames_read = 0;
        tracing::info!(
            device = config.device_id,
            width = config.width,
            height = config.height,
            fps = config.fps,
            "Mock sensor opened"
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        let (width, height) = self.opened.ok_or(SourceError::NotOpen)?;

        let mut noise = vec![0u8; width as usize * height as usize];
        self.rng.fill_bytes(&mut noise);
        let pixels = noise.into_iter().map(|n| self.noisy_pixel(n)).collect();

        self.frames_read += 1;
        Ok(Frame::new(pixels, width, height, self.frames_read))
    }

    fn close(&mut self) {
        if self.opened.take().is_some() {
            tracing::info!(frames = self.frames_read, "Mock sensor closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_numbered_from_open() {
        let mut camera = MockCamera::new();
        let config = CaptureConfig::with_dimensions(32, 24);
        camera.open(&config).unwrap();

        let first = camera.next_frame().unwrap();
        assert!(first.is_valid());
        assert_eq!(first.dimensions(), (32, 24));
        assert_eq!(first.sequence(), 1);
        assert_eq!(camera.next_frame().unwrap().sequence(), 2);

        camera.close();
        camera.open(&config).unwrap();
        assert_eq!(camera.next_frame().unwrap().sequence(), 1);
    }

    #[test]
    fn test_read_after_close_fails() {
        let mut camera = MockCamera::new();
        assert!(matches!(camera.next_frame(), Err(SourceError::NotOpen)));
        camera.open(&CaptureConfig::with_dimensions(4, 4)).unwrap();
        camera.close();
        assert!(matches!(camera.next_frame(), Err(SourceError::NotOpen)));
    }

    #[test]
    fn test_open_checks_settings() {
        let mut camera = MockCamera::new();
        let bad = CaptureConfig {
            fps: 0,
            ..CaptureConfig::default()
        };
        assert!(matches!(
            camera.open(&bad),
            Err(SourceError::Settings(ConfigError::InvalidFrameRate))
        ));
    }

    #[test]
    fn test_unavailable_camera_refuses_open() {
        let mut camera = MockCamera::unavailable();
        assert!(!camera.is_available());
        assert!(matches!(
            camera.open(&CaptureConfig::default()),
            Err(SourceError::Unavailable(0))
        ));
    }

    #[test]
    fn test_same_seed_same_frames() {
        let config = CaptureConfig::with_dimensions(16, 16);
        let mut a = MockCamera::with_seed(7);
        let mut b = MockCamera::with_seed(7);
        a.open(&config).unwrap();
        b.open(&config).unwrap();

        assert_eq!(a.next_frame().unwrap().pixels(), b.next_frame().unwrap().pixels());
    }

    #[test]
    fn test_base_level_shifts_mean() {
        let config = CaptureConfig::with_dimensions(64, 64);
        let mut dim = MockCamera::with_seed(1);
        let mut bright = MockCamera::with_seed(1).with_base_level(200);
        dim.open(&config).unwrap();
        bright.open(&config).unwrap();

        assert!(bright.next_frame().unwrap().mean() > dim.next_frame().unwrap().mean() + 100.0);
    }
}
