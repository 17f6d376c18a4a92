use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};
use trafficount_common::{utils::current_timestamp_ms, CameraFrame};
use trafficount_simulator::Scene;

use super::{Camera, CameraSource};
use crate::error::{CounterError, Result};

/// Scene shared by the simulated camera and the simulated tracker.
pub type SharedScene = Arc<Mutex<Scene>>;

pub fn lock_scene(scene: &SharedScene) -> Result<MutexGuard<'_, Scene>> {
    scene
        .lock()
        .map_err(|_| CounterError::Unexpected("simulated scene lock poisoned".to_string()))
}

pub struct SimulatedCameraSource {
    scene: SharedScene,
}

impl SimulatedCameraSource {
    pub fn new(scene: SharedScene) -> Self {
        Self { scene }
    }
}

#[async_trait]
impl CameraSource for SimulatedCameraSource {
    async fn open(&self) -> Result<Box<dyn Camera>> {
        if lock_scene(&self.scene)?.should_disconnect() {
            return Err(CounterError::ResourceUnavailable(
                "simulated camera is offline".to_string(),
            ));
        }

        info!("Simulated camera opened");
        Ok(Box::new(SimulatedCamera {
            scene: self.scene.clone(),
            released: false,
        }))
    }
}

pub struct SimulatedCamera {
    scene: SharedScene,
    released: bool,
}

#[async_trait]
impl Camera for SimulatedCamera {
    async fn read(&mut self) -> Result<CameraFrame> {
        if self.released {
            return Err(CounterError::StreamEnded("camera released".to_string()));
        }

        let mut scene = lock_scene(&self.scene)?;
        if scene.should_disconnect() {
            warn!("Simulated camera dropped out");
            return Err(CounterError::StreamEnded(
                "simulated camera disconnected".to_string(),
            ));
        }

        scene.step();
        let config = scene.config();
        Ok(CameraFrame {
            data: scene.render(),
            width: config.width,
            height: config.height,
            timestamp: current_timestamp_ms(),
            sequence_num: scene.step_count(),
        })
    }

    async fn release(&mut self) {
        self.released = true;
        info!("Simulated camera released");
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trafficount_simulator::SceneConfig;

    fn scene(disconnect_probability: f64) -> SharedScene {
        Arc::new(Mutex::new(Scene::new(SceneConfig {
            spawn_probability: 0.0,
            disconnect_probability,
            seed: Some(1),
            ..SceneConfig::default()
        })))
    }

    #[tokio::test]
    async fn frames_advance_the_scene() {
        let source = SimulatedCameraSource::new(scene(0.0));
        let mut camera = source.open().await.unwrap();

        let first = camera.read().await.unwrap();
        let second = camera.read().await.unwrap();

        assert_eq!(first.sequence_num + 1, second.sequence_num);
        assert_eq!(first.data.len(), (first.width * first.height * 3) as usize);
    }

    #[tokio::test]
    async fn offline_camera_cannot_be_opened() {
        let source = SimulatedCameraSource::new(scene(1.0));

        let result = source.open().await;

        assert!(matches!(result, Err(CounterError::ResourceUnavailable(_))));
    }

    #[tokio::test]
    async fn released_camera_ends_the_stream() {
        let source = SimulatedCameraSource::new(scene(0.0));
        let mut camera = source.open().await.unwrap();

        camera.release().await;

        assert!(matches!(camera.read().await, Err(CounterError::StreamEnded(_))));
    }
}
