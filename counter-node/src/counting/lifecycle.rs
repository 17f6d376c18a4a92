use rusttype::Font;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};
use trafficount_common::{utils::format_duration, CameraFrame, ComponentStatus, TrackedDetection};

use super::{Aggregator, FrameCounter, FrameCounts, FrameOutcome, Pace, PacedScheduler, TrackHistory};
use crate::camera::{Camera, CameraSource};
use crate::config::NodeConfig;
use crate::error::{CounterError, Result};
use crate::imaging::{self, VideoRecorder};
use crate::inference::{Detector, ModelLoader, TrackRequest};
use crate::settings::Settings;
use crate::state::{CounterState, LifecycleState};
use crate::storage::DetectionSink;

/// Owns the camera, the model and the counting state, and drives the frame
/// loop through model loading, camera (re)acquisition and tracking.
pub struct CounterLifecycle {
    state: Arc<CounterState>,
    cameras: Box<dyn CameraSource>,
    models: Box<dyn ModelLoader>,
    sink: Arc<dyn DetectionSink>,
    model_retry: Duration,
    camera_retry: Duration,
    camera_lost_backoff: Duration,
    person_class: u32,
    jpeg_quality: u8,
    counter: FrameCounter,
    aggregator: Aggregator,
    scheduler: PacedScheduler,
    recorder: VideoRecorder,
    font_path: PathBuf,
    font: Option<Font<'static>>,
}

impl CounterLifecycle {
    pub fn new(
        state: Arc<CounterState>,
        cameras: Box<dyn CameraSource>,
        models: Box<dyn ModelLoader>,
        sink: Arc<dyn DetectionSink>,
        config: &NodeConfig,
    ) -> Self {
        let lifecycle = &config.lifecycle;
        Self {
            state,
            cameras,
            models,
            sink,
            model_retry: lifecycle.model_retry(),
            camera_retry: lifecycle.camera_retry(),
            camera_lost_backoff: lifecycle.camera_lost_backoff(),
            person_class: config.source.person_class,
            jpeg_quality: config.source.jpeg_quality,
            counter: FrameCounter::new(TrackHistory::new(
                lifecycle.track_capacity,
                lifecycle.trajectory_capacity,
            )),
            aggregator: Aggregator::default(),
            scheduler: PacedScheduler::new(Duration::ZERO),
            recorder: VideoRecorder::new(&config.storage.recordings_dir),
            font_path: config.storage.font_path.clone(),
            font: None,
        }
    }

    /// Spawns [`CounterLifecycle::run`] under a supervisor task. A panic in the
    /// frame loop also ends in FATAL, with the panic message as the failure.
    pub fn spawn(self) -> JoinHandle<()> {
        let state = self.state.clone();
        let worker = tokio::spawn(self.run());

        tokio::spawn(async move {
            match worker.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Counting stopped, see /api/failure: {}", e),
                Err(e) => {
                    let failure = join_failure(e);
                    error!("Counter task died: {}", failure);
                    state.set_lifecycle(LifecycleState::Fatal).await;
                    state.record_failure(failure).await;
                }
            }
        })
    }

    /// Runs until an unrecoverable error, which is recorded for the
    /// diagnostic endpoint before being returned.
    pub async fn run(mut self) -> Result<()> {
        match imaging::load_font(&self.font_path).await {
            Ok(font) => self.font = Some(font),
            Err(e) => warn!("Totals overlay drawn without text: {}", e),
        }

        let error = self.run_until_fatal().await;

        error!("Counter stopped: {}", error);
        self.stop_recording().await;
        self.state.set_lifecycle(LifecycleState::Fatal).await;
        self.state.record_failure(error.to_string()).await;
        Err(error)
    }

    async fn run_until_fatal(&mut self) -> CounterError {
        let mut detector = match self.load_model().await {
            Ok(detector) => detector,
            Err(e) => return e,
        };

        loop {
            let mut camera = match self.acquire_camera().await {
                Ok(camera) => camera,
                Err(e) => return e,
            };

            self.state.set_lifecycle(LifecycleState::Tracking).await;
            info!("Tracking on {}", camera.name());
            self.scheduler.restart();
            let error = self.track(detector.as_mut(), camera.as_mut()).await;
            camera.release().await;

            let reason = match error {
                CounterError::StreamEnded(reason) => reason,
                other => return other,
            };

            warn!("Camera lost ({}), retrying in {}", reason, format_duration(self.camera_lost_backoff));
            self.state.set_lifecycle(LifecycleState::CameraLost).await;
            self.state.set_camera_status(ComponentStatus::Down).await;
            self.state.live.write().await.camera_losses += 1;
            self.state.metrics.increment_camera_losses();
            tokio::time::sleep(self.camera_lost_backoff).await;
        }
    }

    async fn load_model(&mut self) -> Result<Box<dyn Detector>> {
        self.state.set_lifecycle(LifecycleState::ModelLoading).await;
        loop {
            match self.models.load().await {
                Ok(detector) => {
                    info!("Model {} loaded", self.models.model_name());
                    self.state.set_model_status(ComponentStatus::Up).await;
                    return Ok(detector);
                }
                Err(e) if e.is_recoverable() => {
                    error!("Model not loaded, retrying in {}: {}", format_duration(self.model_retry), e);
                    self.state.set_model_status(ComponentStatus::Down).await;
                    tokio::time::sleep(self.model_retry).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn acquire_camera(&mut self) -> Result<Box<dyn Camera>> {
        self.state.set_lifecycle(LifecycleState::WaitingCamera).await;
        loop {
            match self.cameras.open().await {
                Ok(camera) => {
                    self.state.set_camera_status(ComponentStatus::Up).await;
                    return Ok(camera);
                }
                Err(e) if e.is_recoverable() => {
                    error!("Camera not opened, retrying in {}: {}", format_duration(self.camera_retry), e);
                    self.state.set_camera_status(ComponentStatus::Down).await;
                    tokio::time::sleep(self.camera_retry).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Frame loop. Only returns with the error that ended it.
    async fn track(&mut self, detector: &mut dyn Detector, camera: &mut dyn Camera) -> CounterError {
        loop {
            let settings = self.state.settings().await;
            self.scheduler.set_delay(settings.counting.delay());

            let pace = self.scheduler.next_cycle().await;
            if let Pace::Lagging { .. } = pace {
                self.state.metrics.increment_lag_events();
            }

            let frame = match camera.read().await {
                Ok(frame) => frame,
                Err(e) => return e,
            };

            let outcome = match self.count(detector, &frame, &settings).await {
                Ok(outcome) => outcome,
                Err(CounterError::Inference(reason)) => {
                    warn!("Frame {} skipped: {}", frame.sequence_num, reason);
                    self.state.metrics.increment_inference_failures();
                    continue;
                }
                Err(e) => return e,
            };

            self.publish(&outcome.counts, pace).await;
            if let Err(e) = self.store_frame(&frame, &outcome.detections, &settings).await {
                return e;
            }
        }
    }

    async fn count(
        &mut self,
        detector: &mut dyn Detector,
        frame: &CameraFrame,
        settings: &Settings,
    ) -> Result<FrameOutcome> {
        if !settings.toggles.counting {
            self.aggregator.reset();
            return Ok(FrameOutcome::default());
        }

        let counting = &settings.counting;
        self.aggregator.set_window(counting.aggregated_frames_number as usize);
        let request = TrackRequest::persons(counting.confidence, self.person_class);
        let outcome = self
            .counter
            .process(detector, frame, &request, &counting.region)
            .await?;

        if let Some(aggregated) = self.aggregator.accumulate(&outcome.counts) {
            self.sink.insert_detection(aggregated).await;
        }
        Ok(outcome)
    }

    async fn publish(&self, counts: &FrameCounts, pace: Pace) {
        self.state
            .metrics
            .record_frame(counts.people_image_count, counts.in_count, counts.out_count);

        let mut live = self.state.live.write().await;
        live.people_image_count = counts.people_image_count;
        live.in_count = counts.in_count;
        live.out_count = counts.out_count;
        live.total_in_count += u64::from(counts.in_count);
        live.total_out_count += u64::from(counts.out_count);
        live.greatest_id = self.counter.greatest_id();
        live.active_tracks = self.counter.history().len();
        live.frames_processed += 1;
        live.lag_events = self.scheduler.lag_events();
        live.remaining_ms = match pace {
            Pace::OnTime { slept } => slept.as_millis() as i64,
            Pace::Lagging { overrun } => -(overrun.as_millis() as i64),
        };
    }

    /// Keeps the frame for `/image.jpg`, annotated and recorded as toggled.
    async fn store_frame(
        &mut self,
        frame: &CameraFrame,
        detections: &[TrackedDetection],
        settings: &Settings,
    ) -> Result<()> {
        let mut image = imaging::frame_to_image(frame)?;
        if settings.toggles.image_annotation {
            imaging::annotate(&mut image, detections, self.counter.history(), &settings.counting.region);
            let (total_in, total_out) = {
                let live = self.state.live.read().await;
                (live.total_in_count, live.total_out_count)
            };
            let lines = imaging::totals_lines(chrono::Local::now(), total_in, total_out);
            imaging::draw_totals(&mut image, &lines, self.font.as_ref());
        }

        if settings.toggles.video_recording {
            if let Err(e) = self.record(&image).await {
                error!("Video recording stopped: {}", e);
                self.state.settings.write().await.toggles.video_recording = false;
                self.stop_recording().await;
            }
        } else if self.recorder.is_recording() {
            self.stop_recording().await;
        }

        *self.state.last_frame.write().await = Some(image);
        Ok(())
    }

    async fn record(&mut self, image: &image::RgbImage) -> Result<()> {
        let jpeg = imaging::encode_jpeg(image, self.jpeg_quality)?;
        self.recorder.write_frame(&jpeg).await
    }

    async fn stop_recording(&mut self) {
        if let Err(e) = self.recorder.stop().await {
            warn!("Failed to close the recording: {}", e);
        }
    }
}

fn join_failure(error: JoinError) -> String {
    if !error.is_panic() {
        return format!("Unexpected error: counter task cancelled: {}", error);
    }
    let payload = error.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    format!("Unexpected error: counter task panicked: {}", message)
}
