//! Synthetic pedestrian scene.
//!
//! Stands in for a real camera and tracker: people enter from the left or right
//! border, walk across the frame and leave on the other side. Every pedestrian
//! keeps the same id for its whole walk, like a persistent tracker would report.

use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::debug;
use trafficount_common::{BBox, TrackedDetection};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SceneConfig {
    pub width: u32,
    pub height: u32,
    /// Chance per step that a new pedestrian enters the scene.
    pub spawn_probability: f64,
    /// Horizontal speed range in pixels per step.
    pub min_speed: f32,
    pub max_speed: f32,
    pub person_width: f32,
    pub person_height: f32,
    /// Chance per frame that the simulated camera drops out.
    pub disconnect_probability: f64,
    pub seed: Option<u64>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            spawn_probability: 0.08,
            min_speed: 4.0,
            max_speed: 14.0,
            person_width: 40.0,
            person_height: 110.0,
            disconnect_probability: 0.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pedestrian {
    pub id: u64,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

impl Pedestrian {
    pub fn bbox(&self, config: &SceneConfig) -> BBox {
        let half_w = config.person_width / 2.0;
        let half_h = config.person_height / 2.0;
        BBox::new(self.x - half_w, self.y - half_h, self.x + half_w, self.y + half_h)
    }
}

pub struct Scene {
    config: SceneConfig,
    pedestrians: Vec<Pedestrian>,
    next_id: u64,
    rng: StdRng,
    step_count: u64,
}

impl Scene {
    pub fn new(config: SceneConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            config,
            pedestrians: Vec::new(),
            next_id: 1,
            rng,
            step_count: 0,
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn pedestrians(&self) -> &[Pedestrian] {
        &self.pedestrians
    }

    /// Adds a pedestrian at an explicit position. Returns its id.
    pub fn spawn_at(&mut self, x: f32, y: f32, vx: f32, vy: f32) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.pedestrians.push(Pedestrian { id, x, y, vx, vy });
        id
    }

    /// Advances the scene by one frame.
    pub fn step(&mut self) {
        self.step_count += 1;

        for pedestrian in &mut self.pedestrians {
            pedestrian.x += pedestrian.vx;
            pedestrian.y += pedestrian.vy;
        }

        let width = self.config.width as f32;
        let height = self.config.height as f32;
        let margin = self.config.person_width;
        self.pedestrians.retain(|p| {
            p.x > -margin && p.x < width + margin && p.y > 0.0 && p.y < height
        });

        if self.rng.gen_bool(self.config.spawn_probability.clamp(0.0, 1.0)) {
            self.spawn_random();
        }
    }

    fn spawn_random(&mut self) {
        let width = self.config.width as f32;
        let height = self.config.height as f32;
        let half_h = self.config.person_height / 2.0;

        let speed = self.rng.gen_range(self.config.min_speed..=self.config.max_speed.max(self.config.min_speed));
        let from_left = self.rng.gen_bool(0.5);
        let (x, vx) = if from_left { (0.0, speed) } else { (width, -speed) };
        let y = self.rng.gen_range(half_h..(height - half_h).max(half_h + 1.0));
        let vy = self.rng.gen_range(-1.0..=1.0);

        let id = self.spawn_at(x, y, vx, vy);
        debug!("Pedestrian {} entered from the {}", id, if from_left { "left" } else { "right" });
    }

    /// Boxes a persistent tracker would report, filtered by confidence.
    pub fn detections(&mut self, confidence_threshold: f32) -> Vec<TrackedDetection> {
        let config = &self.config;
        let rng = &mut self.rng;
        self.pedestrians
            .iter()
            .map(|p| TrackedDetection {
                track_id: p.id,
                bbox: p.bbox(config),
                confidence: rng.gen_range(0.35..0.95),
            })
            .filter(|d| d.confidence >= confidence_threshold)
            .collect()
    }

    pub fn should_disconnect(&mut self) -> bool {
        self.rng.gen_bool(self.config.disconnect_probability.clamp(0.0, 1.0))
    }

    /// Draws the scene as packed RGB8.
    pub fn render(&self) -> Vec<u8> {
        let width = self.config.width as usize;
        let height = self.config.height as usize;
        let mut data = vec![0u8; width * height * 3];

        for (i, pixel) in data.chunks_exact_mut(3).enumerate() {
            let shade = 70 + ((i / width) * 40 / height.max(1)) as u8;
            pixel.copy_from_slice(&[shade, shade, shade]);
        }

        for pedestrian in &self.pedestrians {
            let bbox = pedestrian.bbox(&self.config);
            let color = person_color(pedestrian.id);
            let x0 = bbox.xmin.max(0.0) as usize;
            let y0 = bbox.ymin.max(0.0) as usize;
            let x1 = (bbox.xmax.max(0.0) as usize).min(width);
            let y1 = (bbox.ymax.max(0.0) as usize).min(height);
            for y in y0..y1 {
                for x in x0..x1 {
                    let offset = (y * width + x) * 3;
                    data[offset..offset + 3].copy_from_slice(&color);
                }
            }
        }

        data
    }
}

fn person_color(id: u64) -> [u8; 3] {
    let hash = id.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    [
        120 + (hash & 0x7F) as u8,
        120 + ((hash >> 8) & 0x7F) as u8,
        120 + ((hash >> 16) & 0x7F) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_scene() -> Scene {
        Scene::new(SceneConfig {
            spawn_probability: 0.0,
            seed: Some(7),
            ..SceneConfig::default()
        })
    }

    #[test]
    fn pedestrians_keep_their_id_while_walking() {
        let mut scene = quiet_scene();
        let id = scene.spawn_at(100.0, 200.0, 10.0, 0.0);

        scene.step();
        scene.step();

        let detections = scene.detections(0.0);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].track_id, id);
        assert_eq!(detections[0].bbox.centroid().x, 120);
    }

    #[test]
    fn pedestrians_leave_the_frame() {
        let mut scene = quiet_scene();
        scene.spawn_at(630.0, 200.0, 60.0, 0.0);

        scene.step();

        assert!(scene.pedestrians().is_empty());
    }

    #[test]
    fn threshold_filters_low_confidence() {
        let mut scene = quiet_scene();
        scene.spawn_at(100.0, 200.0, 0.0, 0.0);

        assert!(scene.detections(0.99).is_empty());
        assert_eq!(scene.detections(0.0).len(), 1);
    }

    #[test]
    fn render_fills_the_whole_frame() {
        let mut scene = quiet_scene();
        scene.spawn_at(100.0, 200.0, 0.0, 0.0);

        let data = scene.render();
        assert_eq!(data.len(), 640 * 480 * 3);
        let inside = (200 * 640 + 100) * 3;
        assert_eq!(&data[inside..inside + 3], &person_color(1));
    }
}
