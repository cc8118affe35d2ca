use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const BYTES_PER_PIXEL: usize = 4;

/// Immutable RGBA snapshot taken from the capture device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA pixel buffer.
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self::from_rgba_at(width, height, data, Utc::now())
    }

    pub fn from_rgba_at(width: u32, height: u32, data: Vec<u8>, captured_at: DateTime<Utc>) -> Self {
        Self {
            width,
            height,
            data,
            captured_at,
        }
    }

    /// Frame filled with a single colour.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixel = [rgb[0], rgb[1], rgb[2], 255];
        let data = pixel
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * BYTES_PER_PIXEL)
            .collect();
        Self::from_rgba(width, height, data)
    }

    pub fn with_timestamp(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = captured_at;
        self
    }

    /// Paints the rectangle `[x0, x1) x [y0, y1)`, clipped to the frame.
    pub fn fill_rect(mut self, x0: u32, y0: u32, x1: u32, y1: u32, rgb: [u8; 3]) -> Self {
        let x1 = x1.min(self.width);
        let y1 = y1.min(self.height);
        for y in y0..y1 {
            for x in x0..x1 {
                let idx = self.offset(x, y);
                self.data[idx..idx + 3].copy_from_slice(&rgb);
                self.data[idx + 3] = 255;
            }
        }
        self
    }

    /// Dimensions are known and the buffer matches them.
    pub fn is_ready(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.expected_len()
    }

    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    pub fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL
    }

    pub fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = self.offset(x, y);
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }
}
