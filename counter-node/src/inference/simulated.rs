use async_trait::async_trait;
use tracing::{debug, info};
use trafficount_common::{CameraFrame, TrackedDetection};

use super::{Detector, ModelLoader, TrackRequest};
use crate::camera::simulated::{lock_scene, SharedScene};
use crate::error::Result;

/// Reads ground-truth pedestrians from the scene the simulated camera renders.
pub struct SimulatedTrackerLoader {
    scene: SharedScene,
}

impl SimulatedTrackerLoader {
    pub fn new(scene: SharedScene) -> Self {
        Self { scene }
    }
}

#[async_trait]
impl ModelLoader for SimulatedTrackerLoader {
    async fn load(&self) -> Result<Box<dyn Detector>> {
        info!("Simulated tracker loaded");
        Ok(Box::new(SimulatedTracker {
            scene: self.scene.clone(),
        }))
    }

    fn model_name(&self) -> &str {
        "simulated"
    }
}

pub struct SimulatedTracker {
    scene: SharedScene,
}

#[async_trait]
impl Detector for SimulatedTracker {
    async fn track(
        &mut self,
        frame: &CameraFrame,
        request: &TrackRequest,
    ) -> Result<Vec<TrackedDetection>> {
        let detections = lock_scene(&self.scene)?.detections(request.confidence);
        debug!(
            "Frame {}: {} simulated detections",
            frame.sequence_num,
            detections.len()
        );
        Ok(detections)
    }
}
