use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Pixel position in image coordinates.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Validate)]
pub struct Point {
    #[validate(range(min = 0))]
    pub x: i32,
    #[validate(range(min = 0))]
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct BBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl BBox {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Self {
        Self { xmin, ymin, xmax, ymax }
    }

    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }

    /// Center of the box, truncated to whole pixels.
    pub fn centroid(&self) -> Point {
        Point {
            x: ((self.xmin + self.xmax) / 2.0) as i32,
            y: ((self.ymin + self.ymax) / 2.0) as i32,
        }
    }
}

/// One box reported by the tracker for a single frame.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TrackedDetection {
    pub track_id: u64,
    pub bbox: BBox,
    pub confidence: f32,
}

/// The counting line. Orientation is derived from the point deltas.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Validate)]
pub struct Region {
    #[validate]
    pub p1: Point,
    #[validate]
    pub p2: Point,
}

impl Region {
    pub const fn new(p1: Point, p2: Point) -> Self {
        Self { p1, p2 }
    }

    pub fn is_vertical(&self) -> bool {
        (self.p1.x - self.p2.x).abs() < (self.p1.y - self.p2.y).abs()
    }
}

impl Default for Region {
    // Middle vertical line of a 640x480 image
    fn default() -> Self {
        Self::new(Point::new(320, 0), Point::new(320, 480))
    }
}

/// Packed RGB8 frame as delivered by a camera.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: u64,
    pub sequence_num: u64,
}

/// Aggregated counts over one window, ready to be persisted.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct DetectionRecord {
    pub people_image_count: u32,
    pub in_count: u32,
    pub out_count: u32,
    pub timestamp: DateTime<Utc>,
}

impl DetectionRecord {
    pub fn now(people_image_count: u32, in_count: u32, out_count: u32) -> Self {
        Self {
            people_image_count,
            in_count,
            out_count,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComponentStatus {
    Up,
    Down,
    #[default]
    Unknown,
}

impl ComponentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentStatus::Up => "UP",
            ComponentStatus::Down => "DOWN",
            ComponentStatus::Unknown => "UNKNOWN",
        }
    }
}
