use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, instrument};
use trafficount_common::{utils::current_timestamp_ms, CameraFrame};

use super::{Camera, CameraSource};
use crate::error::{CounterError, Result};

/// Camera exposing a still-image URL (JPEG or PNG), polled once per frame.
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSnapshotSource {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CounterError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, url })
    }
}

async fn fetch_frame(client: &reqwest::Client, url: &str, sequence_num: u64) -> std::result::Result<CameraFrame, String> {
    let response = client.get(url).send().await.map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("camera answered {}", response.status()));
    }
    let bytes = response.bytes().await.map_err(|e| e.to_string())?;
    let image = image::load_from_memory(&bytes)
        .map_err(|e| e.to_string())?
        .to_rgb8();

    Ok(CameraFrame {
        width: image.width(),
        height: image.height(),
        data: image.into_raw(),
        timestamp: current_timestamp_ms(),
        sequence_num,
    })
}

#[async_trait]
impl CameraSource for HttpSnapshotSource {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn open(&self) -> Result<Box<dyn Camera>> {
        let probe = fetch_frame(&self.client, &self.url, 0)
            .await
            .map_err(|e| CounterError::ResourceUnavailable(format!("camera {} not opened: {}", self.url, e)))?;

        info!("Camera {} opened ({}x{})", self.url, probe.width, probe.height);
        Ok(Box::new(HttpSnapshotCamera {
            client: self.client.clone(),
            url: self.url.clone(),
            sequence_num: 0,
        }))
    }
}

pub struct HttpSnapshotCamera {
    client: reqwest::Client,
    url: String,
    sequence_num: u64,
}

#[async_trait]
impl Camera for HttpSnapshotCamera {
    async fn read(&mut self) -> Result<CameraFrame> {
        self.sequence_num += 1;
        fetch_frame(&self.client, &self.url, self.sequence_num)
            .await
            .map_err(|e| CounterError::StreamEnded(format!("can't get next frame: {}", e)))
    }

    async fn release(&mut self) {
        info!("Camera {} released", self.url);
    }

    fn name(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_camera_is_unavailable() {
        // Port 9 (discard) is closed on test machines
        let source =
            HttpSnapshotSource::new("http://127.0.0.1:9/snapshot.jpg".to_string(), Duration::from_millis(500))
                .unwrap();

        let result = source.open().await;

        assert!(matches!(result, Err(CounterError::ResourceUnavailable(_))));
    }
}
