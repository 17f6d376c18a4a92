use async_trait::async_trait;
use trafficount_common::CameraFrame;

use crate::error::Result;

/// An opened camera. `read` fails with `StreamEnded` once frames stop coming.
#[async_trait]
pub trait Camera: Send {
    async fn read(&mut self) -> Result<CameraFrame>;
    async fn release(&mut self);
    fn name(&self) -> &str;
}

/// Opens cameras. Failing to open is `ResourceUnavailable`.
#[async_trait]
pub trait CameraSource: Send + Sync {
    async fn open(&self) -> Result<Box<dyn Camera>>;
}

pub mod http_snapshot;
pub mod simulated;

pub use http_snapshot::HttpSnapshotSource;
pub use simulated::SimulatedCameraSource;
