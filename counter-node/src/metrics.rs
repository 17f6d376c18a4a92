use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

use crate::error::Result;

/// Prometheus collectors of the node, exposed on `/metrics`.
pub struct Metrics {
    registry: Registry,
    frames_processed: IntCounter,
    lag_events: IntCounter,
    inference_failures: IntCounter,
    camera_losses: IntCounter,
    people_in_image: IntGauge,
    in_total: IntCounter,
    out_total: IntCounter,
    buffered_records: IntGauge,
    flush_successes: IntCounter,
    flush_failures: IntCounter,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge> {
    let gauge = IntGauge::new(name, help)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("trafficount".to_string()), None)?;
        #[cfg(target_os = "linux")]
        registry.register(Box::new(prometheus::process_collector::ProcessCollector::for_self()))?;

        Ok(Self {
            frames_processed: counter(&registry, "frames_processed_total", "Frames read from the camera")?,
            lag_events: counter(&registry, "lag_events_total", "Cycles that overran the counting delay")?,
            inference_failures: counter(&registry, "inference_failures_total", "Frames skipped after a tracker error")?,
            camera_losses: counter(&registry, "camera_losses_total", "Camera streams that ended while tracking")?,
            people_in_image: gauge(&registry, "people_in_image", "People detected on the last frame")?,
            in_total: counter(&registry, "in_total", "People counted crossing in")?,
            out_total: counter(&registry, "out_total", "People counted crossing out")?,
            buffered_records: gauge(&registry, "buffered_records", "Detection records waiting to be flushed")?,
            flush_successes: counter(&registry, "flush_successes_total", "Successful database flushes")?,
            flush_failures: counter(&registry, "flush_failures_total", "Failed database flushes")?,
            registry,
        })
    }

    pub fn record_frame(&self, people_in_image: u32, in_count: u32, out_count: u32) {
        self.frames_processed.inc();
        self.people_in_image.set(i64::from(people_in_image));
        self.in_total.inc_by(u64::from(in_count));
        self.out_total.inc_by(u64::from(out_count));
    }

    pub fn increment_lag_events(&self) {
        self.lag_events.inc();
    }

    pub fn increment_inference_failures(&self) {
        self.inference_failures.inc();
    }

    pub fn increment_camera_losses(&self) {
        self.camera_losses.inc();
    }

    pub fn set_buffered_records(&self, count: usize) {
        self.buffered_records.set(count as i64);
    }

    pub fn record_flush(&self, success: bool) {
        if success {
            self.flush_successes.inc();
        } else {
            self.flush_failures.inc();
        }
    }

    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::error::CounterError::Serialization(e.to_string()))
    }
}
