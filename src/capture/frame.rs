//! Grayscale sensor frames.

/// One frame of 8-bit luminance samples, row-major.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    /// Assigned by the source; restarts at 1 after each `open`.
    sequence: u64,
}

impl Frame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            pixels,
            width,
            height,
            sequence,
        }
    }

    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// `(width, height)` in pixels.
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// True when the buffer holds exactly `width * height` samples.
    pub fn is_valid(&self) -> bool {
        self.pixels.len() == (self.width as usize) * (self.height as usize)
    }

    /// Mean brightness; a sudden jump means the camera moved or light leaked in.
    pub fn mean(&self) -> f64 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.pixels.iter().map(|&p| u64::from(p)).sum();
        sum as f64 / self.pixels.len() as f64
    }

    /// Percentage (0-100) of pixels at or above `level`.
    pub fn saturated_percent(&self, level: u8) -> f64 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        let saturated = self.pixels.iter().filter(|&&p| p >= level).count();
        saturated as f64 * 100.0 / self.pixels.len() as f64
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("dimensions", &self.dimensions())
            .field("sequence", &self.sequence)
            .field("pixel_bytes", &self.pixels.len())
            .finish()
    }
}
