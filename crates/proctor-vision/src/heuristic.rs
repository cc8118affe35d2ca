use proctor_types::{
    config::AnalysisConfig,
    presence::{FacePosition, PresenceReading},
    vision::Frame,
    Result,
};
use tracing::debug;

use crate::{vision_error, PresenceAnalyzer};

/// Rectangular area of the frame, as fractions of width and height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl Region {
    pub const PRIMARY: Region = Region::new(0.3, 0.7, 0.2, 0.5);
    pub const LEFT: Region = Region::new(0.1, 0.4, 0.2, 0.5);
    pub const RIGHT: Region = Region::new(0.6, 0.9, 0.2, 0.5);

    pub const fn new(left: f32, right: f32, top: f32, bottom: f32) -> Self {
        Self {
            left,
            right,
            top,
            bottom,
        }
    }

    fn pixel_bounds(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let x0 = (self.left * width as f32) as u32;
        let x1 = ((self.right * width as f32) as u32).min(width);
        let y0 = (self.top * height as f32) as u32;
        let y1 = ((self.bottom * height as f32) as u32).min(height);
        (x0, x1, y0, y1)
    }
}

/// Skin pixel statistics for one region.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RegionScan {
    pub sampled: u32,
    pub skin: u32,
    sum_x: u64,
    sum_y: u64,
}

impl RegionScan {
    pub fn skin_fraction(&self) -> f32 {
        if self.sampled == 0 {
            0.0
        } else {
            self.skin as f32 / self.sampled as f32
        }
    }

    /// Mean position of skin pixels, in pixels.
    pub fn centroid(&self) -> Option<(f32, f32)> {
        if self.skin == 0 {
            return None;
        }
        Some((
            self.sum_x as f32 / self.skin as f32,
            self.sum_y as f32 / self.skin as f32,
        ))
    }
}

/// Pixel-level presence estimate: skin-tone coverage in three fixed regions,
/// global edge density for people outside them, and sparse frame differencing.
pub struct HeuristicPresenceAnalyzer {
    config: AnalysisConfig,
}

impl HeuristicPresenceAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn is_skin(&self, rgb: [u8; 3]) -> bool {
        red_dominant(rgb) && self.config.skin_tones.iter().any(|tone| tone.contains(rgb))
    }

    pub fn scan_region(&self, frame: &Frame, region: Region) -> RegionScan {
        let (x0, x1, y0, y1) = region.pixel_bounds(frame.width, frame.height);
        let stride = self.config.region_stride.max(1) as usize;
        let mut scan = RegionScan::default();
        for y in (y0..y1).step_by(stride) {
            for x in (x0..x1).step_by(stride) {
                scan.sampled += 1;
                if self.is_skin(frame.rgb(x, y)) {
                    scan.skin += 1;
                    scan.sum_x += x as u64;
                    scan.sum_y += y as u64;
                }
            }
        }
        scan
    }

    /// Sampled pixels whose horizontal plus vertical intensity gradient
    /// exceeds the configured threshold.
    pub fn edge_count(&self, frame: &Frame) -> u32 {
        let stride = self.config.edge_stride.max(1) as usize;
        let threshold = self.config.edge_gradient_threshold as i32;
        let mut edges = 0;
        for y in (1..frame.height).step_by(stride) {
            for x in (1..frame.width).step_by(stride) {
                let here = intensity(frame.rgb(x, y));
                let gx = (here - intensity(frame.rgb(x - 1, y))).abs();
                let gy = (here - intensity(frame.rgb(x, y - 1))).abs();
                if gx + gy > threshold {
                    edges += 1;
                }
            }
        }
        edges
    }

    /// Mean absolute byte difference over a sparse subsample, in `[0, 1]`.
    pub fn motion_level(&self, frame: &Frame, previous: Option<&Frame>) -> Option<f32> {
        let previous = previous?;
        if previous.width != frame.width
            || previous.height != frame.height
            || previous.data.len() != frame.data.len()
        {
            return None;
        }
        let stride = self.config.motion_byte_stride.max(1);
        let mut total: u64 = 0;
        let mut samples: u64 = 0;
        for idx in (0..frame.data.len()).step_by(stride) {
            total += frame.data[idx].abs_diff(previous.data[idx]) as u64;
            samples += 1;
        }
        if samples == 0 {
            return None;
        }
        Some((total as f32 / samples as f32 / 255.0).clamp(0.0, 1.0))
    }
}

impl Default for HeuristicPresenceAnalyzer {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}

impl PresenceAnalyzer for HeuristicPresenceAnalyzer {
    fn analyze(&self, frame: &Frame, previous: Option<&Frame>) -> Result<PresenceReading> {
        if !frame.is_ready() {
            return Err(vision_error(format!(
                "frame not ready ({}x{}, {} bytes)",
                frame.width,
                frame.height,
                frame.data.len()
            )));
        }

        let threshold = self.config.skin_fraction_threshold;
        let primary = self.scan_region(frame, Region::PRIMARY);
        let left = self.scan_region(frame, Region::LEFT);
        let right = self.scan_region(frame, Region::RIGHT);

        let face_detected = primary.skin_fraction() > threshold;
        let face_regions = [primary, left, right]
            .iter()
            .filter(|scan| scan.skin_fraction() > threshold)
            .count();
        let mut person_count = ((face_regions as f32 / 1.5).floor() as u32).max(1);
        let edges = self.edge_count(frame);
        if edges > self.config.edge_count_threshold {
            person_count = person_count.max(2);
        }

        let centroid = if face_detected {
            primary.centroid()
        } else {
            None
        };
        let looking_at_screen = centroid
            .map(|(cx, cy)| {
                let dx = cx - frame.width as f32 / 2.0;
                let dy = cy - frame.height as f32 / 2.0;
                let limit = self.config.gaze_tolerance * frame.width.min(frame.height) as f32;
                (dx * dx + dy * dy).sqrt() <= limit
            })
            .unwrap_or(false);
        let face_position = centroid.map(|(cx, cy)| FacePosition {
            x: (cx / frame.width as f32).clamp(0.0, 1.0),
            y: (cy / frame.height as f32).clamp(0.0, 1.0),
        });

        let fraction = primary.skin_fraction();
        let confidence = if face_detected {
            (fraction / (2.0 * threshold)).min(1.0)
        } else if threshold > 0.0 {
            (1.0 - fraction / threshold).clamp(0.0, 1.0)
        } else {
            1.0
        };

        let reading = PresenceReading {
            face_detected,
            person_count,
            looking_at_screen,
            motion_level: self.motion_level(frame, previous),
            confidence,
            face_position,
        };
        debug!(
            "Presence: face={} persons={} looking={} motion={:?} skin={:.3} edges={}",
            reading.face_detected,
            reading.person_count,
            reading.looking_at_screen,
            reading.motion_level,
            fraction,
            edges
        );
        Ok(reading)
    }
}

fn red_dominant([r, g, b]: [u8; 3]) -> bool {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    r > g && r > b && r - g > 10 && max - min > 15
}

fn intensity([r, g, b]: [u8; 3]) -> i32 {
    (r as i32 + g as i32 + b as i32) / 3
}
