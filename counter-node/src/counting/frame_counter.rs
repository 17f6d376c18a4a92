use serde::Serialize;
use tracing::debug;
use trafficount_common::{CameraFrame, Region, TrackedDetection};

use super::region::{classify, Crossing};
use super::track_history::TrackHistory;
use crate::error::Result;
use crate::inference::{Detector, TrackRequest};

/// Counts derived from a single frame. Never carried over to the next frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameCounts {
    pub people_image_count: u32,
    pub in_count: u32,
    pub out_count: u32,
}

/// What one processed frame produced: its counts and the boxes behind them.
#[derive(Debug, Clone, Default)]
pub struct FrameOutcome {
    pub counts: FrameCounts,
    pub detections: Vec<TrackedDetection>,
}

pub struct FrameCounter {
    history: TrackHistory,
    greatest_id: u64,
}

impl FrameCounter {
    pub fn new(history: TrackHistory) -> Self {
        Self {
            history,
            greatest_id: 0,
        }
    }

    /// Runs the tracker on `frame` and counts the line crossings it implies.
    pub async fn process(
        &mut self,
        detector: &mut dyn Detector,
        frame: &CameraFrame,
        request: &TrackRequest,
        region: &Region,
    ) -> Result<FrameOutcome> {
        let detections = detector.track(frame, request).await?;
        let counts = self.count(&detections, region);
        Ok(FrameOutcome { counts, detections })
    }

    /// Folds one frame of tracker output into the track history.
    pub fn count(&mut self, detections: &[TrackedDetection], region: &Region) -> FrameCounts {
        let mut counts = FrameCounts {
            people_image_count: detections.len() as u32,
            ..FrameCounts::default()
        };

        let frame_max = detections.iter().map(|d| d.track_id).max().unwrap_or(0);
        self.greatest_id = self.greatest_id.max(frame_max);

        for detection in detections {
            let track = self.history.get_or_create(detection.track_id);
            track.push(detection.bbox.centroid());

            if track.counted() {
                continue;
            }
            let Some((previous, current)) = track.last_segment() else {
                continue;
            };

            match classify(region, previous, current) {
                Crossing::None => {}
                Crossing::In => {
                    counts.in_count += 1;
                    track.mark_counted();
                    debug!("Track {} crossed IN", detection.track_id);
                }
                Crossing::Out => {
                    counts.out_count += 1;
                    track.mark_counted();
                    debug!("Track {} crossed OUT", detection.track_id);
                }
            }
        }

        counts
    }

    /// Highest track id seen so far. Never decreases.
    pub fn greatest_id(&self) -> u64 {
        self.greatest_id
    }

    pub fn history(&self) -> &TrackHistory {
        &self.history
    }
}

impl Default for FrameCounter {
    fn default() -> Self {
        Self::new(TrackHistory::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trafficount_common::BBox;

    fn person(track_id: u64, cx: f32, cy: f32) -> TrackedDetection {
        TrackedDetection {
            track_id,
            bbox: BBox::new(cx - 10.0, cy - 20.0, cx + 10.0, cy + 20.0),
            confidence: 0.8,
        }
    }

    #[test]
    fn empty_frame_yields_zero_counts() {
        let mut counter = FrameCounter::default();

        let counts = counter.count(&[], &Region::default());

        assert_eq!(counts, FrameCounts::default());
        assert_eq!(counter.history().len(), 0);
        assert_eq!(counter.greatest_id(), 0);
    }

    #[test]
    fn first_sighting_is_never_counted() {
        let mut counter = FrameCounter::default();

        let counts = counter.count(&[person(1, 330.0, 100.0)], &Region::default());

        assert_eq!(counts.people_image_count, 1);
        assert_eq!(counts.in_count + counts.out_count, 0);
    }

    #[test]
    fn counts_in_and_out_crossings() {
        let mut counter = FrameCounter::default();
        let region = Region::default();
        counter.count(&[person(1, 300.0, 100.0), person(2, 350.0, 200.0)], &region);

        let counts = counter.count(&[person(1, 340.0, 100.0), person(2, 310.0, 200.0)], &region);

        assert_eq!(
            counts,
            FrameCounts {
                people_image_count: 2,
                in_count: 1,
                out_count: 1
            }
        );
    }

    #[test]
    fn a_track_is_counted_only_once() {
        let mut counter = FrameCounter::default();
        let region = Region::default();
        let path = [300.0, 340.0, 300.0, 340.0];

        let total: u32 = path
            .iter()
            .map(|x| {
                let counts = counter.count(&[person(7, *x, 100.0)], &region);
                counts.in_count + counts.out_count
            })
            .sum();

        assert_eq!(total, 1);
        assert!(counter.history().peek(7).map(|t| t.counted()).unwrap_or(false));
    }

    #[test]
    fn greatest_id_never_decreases() {
        let mut counter = FrameCounter::default();
        let region = Region::default();

        counter.count(&[person(12, 10.0, 10.0), person(3, 20.0, 20.0)], &region);
        assert_eq!(counter.greatest_id(), 12);
        counter.count(&[person(5, 10.0, 10.0)], &region);
        assert_eq!(counter.greatest_id(), 12);
        counter.count(&[], &region);
        assert_eq!(counter.greatest_id(), 12);
    }
}
