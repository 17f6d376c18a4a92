use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument};
use trafficount_common::{BBox, CameraFrame, TrackedDetection};

use super::{Detector, ModelLoader, TrackRequest};
use crate::error::{CounterError, Result};
use crate::imaging;

/// Tracker served over HTTP. Frames are posted as JPEG to `{url}/track`.
pub struct RemoteTrackerLoader {
    client: reqwest::Client,
    url: String,
    jpeg_quality: u8,
}

impl RemoteTrackerLoader {
    pub fn new(url: String, timeout: Duration, jpeg_quality: u8) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CounterError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            jpeg_quality,
        })
    }
}

#[async_trait]
impl ModelLoader for RemoteTrackerLoader {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn load(&self) -> Result<Box<dyn Detector>> {
        let health = format!("{}/health", self.url);
        let response = self
            .client
            .get(&health)
            .send()
            .await
            .map_err(|e| CounterError::ResourceUnavailable(format!("tracker unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(CounterError::ResourceUnavailable(format!(
                "tracker health check answered {}",
                response.status()
            )));
        }

        info!("Remote tracker {} ready", self.url);
        Ok(Box::new(RemoteTracker {
            client: self.client.clone(),
            url: self.url.clone(),
            jpeg_quality: self.jpeg_quality,
        }))
    }

    fn model_name(&self) -> &str {
        &self.url
    }
}

#[derive(Debug, Deserialize)]
struct TrackResponse {
    #[serde(default)]
    tracks: Vec<RemoteTrack>,
}

#[derive(Debug, Deserialize)]
struct RemoteTrack {
    id: u64,
    #[serde(rename = "box")]
    bbox: [f32; 4],
    confidence: f32,
}

impl From<RemoteTrack> for TrackedDetection {
    fn from(track: RemoteTrack) -> Self {
        let [xmin, ymin, xmax, ymax] = track.bbox;
        TrackedDetection {
            track_id: track.id,
            bbox: BBox::new(xmin, ymin, xmax, ymax),
            confidence: track.confidence,
        }
    }
}

fn parse_tracks(body: &str) -> Result<Vec<TrackedDetection>> {
    let response: TrackResponse = serde_json::from_str(body)
        .map_err(|e| CounterError::Inference(format!("malformed tracker answer: {}", e)))?;
    Ok(response.tracks.into_iter().map(TrackedDetection::from).collect())
}

pub struct RemoteTracker {
    client: reqwest::Client,
    url: String,
    jpeg_quality: u8,
}

#[async_trait]
impl Detector for RemoteTracker {
    async fn track(
        &mut self,
        frame: &CameraFrame,
        request: &TrackRequest,
    ) -> Result<Vec<TrackedDetection>> {
        let image = imaging::frame_to_image(frame)?;
        let jpeg = imaging::encode_jpeg(&image, self.jpeg_quality)?;

        let classes = request
            .classes
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let response = self
            .client
            .post(format!("{}/track", self.url))
            .query(&[
                ("conf", request.confidence.to_string()),
                ("classes", classes),
                ("persist", request.persist.to_string()),
            ])
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(jpeg)
            .send()
            .await
            .map_err(|e| CounterError::Inference(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CounterError::Inference(e.to_string()))?;
        if !status.is_success() {
            return Err(CounterError::Inference(format!(
                "tracker answered {}: {}",
                status, body
            )));
        }

        parse_tracks(&body)
    }
}
