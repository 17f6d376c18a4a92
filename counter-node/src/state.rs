//! State shared between the tracking loop, the flush loop and the web handlers.
//! Only the tracking loop writes the counting fields; handlers read them and
//! write settings.

use image::RgbImage;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use trafficount_common::ComponentStatus;

use crate::metrics::Metrics;
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    #[default]
    Uninitialized,
    ModelLoading,
    WaitingCamera,
    Tracking,
    CameraLost,
    Fatal,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ComponentStatuses {
    pub model: ComponentStatus,
    pub camera: ComponentStatus,
    pub database: ComponentStatus,
}

/// Counters of the tracking loop, as last published.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct LiveCounts {
    pub people_image_count: u32,
    pub in_count: u32,
    pub out_count: u32,
    pub total_in_count: u64,
    pub total_out_count: u64,
    pub greatest_id: u64,
    pub active_tracks: usize,
    pub frames_processed: u64,
    pub lag_events: u64,
    pub camera_losses: u64,
    /// Sleep left at the end of the last cycle, negative when lagging.
    pub remaining_ms: i64,
}

pub struct CounterState {
    pub settings: RwLock<Settings>,
    pub lifecycle: RwLock<LifecycleState>,
    pub statuses: RwLock<ComponentStatuses>,
    pub live: RwLock<LiveCounts>,
    /// Last frame read, annotated when annotation is on.
    pub last_frame: RwLock<Option<RgbImage>>,
    /// Text of the failure that ended the lifecycle.
    pub failure: RwLock<Option<String>>,
    pub metrics: Metrics,
}

impl CounterState {
    pub fn new(settings: Settings, metrics: Metrics) -> Arc<Self> {
        Arc::new(Self {
            settings: RwLock::new(settings),
            lifecycle: RwLock::new(LifecycleState::default()),
            statuses: RwLock::new(ComponentStatuses::default()),
            live: RwLock::new(LiveCounts::default()),
            last_frame: RwLock::new(None),
            failure: RwLock::new(None),
            metrics,
        })
    }

    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    pub async fn lifecycle(&self) -> LifecycleState {
        *self.lifecycle.read().await
    }

    pub async fn set_lifecycle(&self, state: LifecycleState) {
        *self.lifecycle.write().await = state;
    }

    pub async fn set_model_status(&self, status: ComponentStatus) {
        self.statuses.write().await.model = status;
    }

    pub async fn set_camera_status(&self, status: ComponentStatus) {
        self.statuses.write().await.camera = status;
    }

    pub async fn set_database_status(&self, status: ComponentStatus) {
        self.statuses.write().await.database = status;
    }

    pub async fn record_failure(&self, failure: String) {
        *self.failure.write().await = Some(failure);
    }

    pub async fn reset_totals(&self) {
        let mut live = self.live.write().await;
        live.total_in_count = 0;
        live.total_out_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reset_totals_keeps_other_counters() {
        let state = CounterState::new(Settings::default(), Metrics::new().unwrap());
        {
            let mut live = state.live.write().await;
            live.total_in_count = 12;
            live.total_out_count = 7;
            live.frames_processed = 40;
        }

        state.reset_totals().await;

        let live = state.live.read().await;
        assert_eq!((live.total_in_count, live.total_out_count), (0, 0));
        assert_eq!(live.frames_processed, 40);
    }

    #[test]
    fn lifecycle_state_serializes_like_the_dashboard_shows_it() {
        let json = serde_json::to_string(&LifecycleState::WaitingCamera).unwrap();
        assert_eq!(json, "\"WAITING_CAMERA\"");
    }
}
