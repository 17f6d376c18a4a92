use async_trait::async_trait;
use serde::Serialize;
use trafficount_common::{CameraFrame, TrackedDetection};

use crate::error::Result;

/// Parameters of one tracking call.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrackRequest {
    pub confidence: f32,
    pub classes: Vec<u32>,
    /// Keep tracker state between calls so ids stay stable.
    pub persist: bool,
}

impl TrackRequest {
    pub fn persons(confidence: f32, person_class: u32) -> Self {
        Self {
            confidence,
            classes: vec![person_class],
            persist: true,
        }
    }
}

/// A loaded detection + tracking model.
#[async_trait]
pub trait Detector: Send {
    async fn track(
        &mut self,
        frame: &CameraFrame,
        request: &TrackRequest,
    ) -> Result<Vec<TrackedDetection>>;
}

/// Loads detectors. Failing to load is `ResourceUnavailable`.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<Box<dyn Detector>>;
    fn model_name(&self) -> &str;
}

pub mod remote;
pub mod simulated;

pub use remote::RemoteTrackerLoader;
pub use simulated::SimulatedTrackerLoader;
