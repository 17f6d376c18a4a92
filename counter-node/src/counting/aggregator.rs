use super::frame_counter::FrameCounts;

/// Folds per-frame counts into windows of `window` frames.
///
/// When a window closes, the peak image count and the summed in/out counts are
/// handed out and the accumulators start again from zero.
#[derive(Debug)]
pub struct Aggregator {
    window: usize,
    frames_seen: usize,
    max_image_count: u32,
    sum_in: u32,
    sum_out: u32,
}

impl Aggregator {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            frames_seen: 0,
            max_image_count: 0,
            sum_in: 0,
            sum_out: 0,
        }
    }

    /// Changes the window size. A window already past the new size closes on
    /// the next frame.
    pub fn set_window(&mut self, window: usize) {
        self.window = window.max(1);
    }

    pub fn accumulate(&mut self, counts: &FrameCounts) -> Option<FrameCounts> {
        self.max_image_count = self.max_image_count.max(counts.people_image_count);
        self.sum_in += counts.in_count;
        self.sum_out += counts.out_count;
        self.frames_seen += 1;

        if self.frames_seen < self.window {
            return None;
        }

        let aggregated = FrameCounts {
            people_image_count: self.max_image_count,
            in_count: self.sum_in,
            out_count: self.sum_out,
        };
        self.reset();
        Some(aggregated)
    }

    /// Drops the partial window.
    pub fn reset(&mut self) {
        self.frames_seen = 0;
        self.max_image_count = 0;
        self.sum_in = 0;
        self.sum_out = 0;
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(people: u32, inc: u32, out: u32) -> FrameCounts {
        FrameCounts {
            people_image_count: people,
            in_count: inc,
            out_count: out,
        }
    }

    #[test]
    fn window_of_one_emits_every_frame() {
        let mut aggregator = Aggregator::default();

        assert_eq!(aggregator.accumulate(&counts(3, 1, 0)), Some(counts(3, 1, 0)));
        assert_eq!(aggregator.accumulate(&counts(0, 0, 2)), Some(counts(0, 0, 2)));
    }

    #[test]
    fn window_emits_max_and_sums_after_k_frames() {
        let mut aggregator = Aggregator::new(3);

        assert_eq!(aggregator.accumulate(&counts(2, 1, 0)), None);
        assert_eq!(aggregator.accumulate(&counts(5, 0, 1)), None);
        assert_eq!(aggregator.accumulate(&counts(1, 2, 2)), Some(counts(5, 3, 3)));
        assert_eq!(aggregator.frames_seen, 0);
    }

    #[test]
    fn accumulators_restart_after_emission() {
        let mut aggregator = Aggregator::new(2);
        aggregator.accumulate(&counts(9, 4, 4));
        aggregator.accumulate(&counts(1, 1, 1));

        aggregator.accumulate(&counts(1, 0, 0));
        assert_eq!(aggregator.accumulate(&counts(2, 1, 0)), Some(counts(2, 1, 0)));
    }

    #[test]
    fn shrinking_the_window_closes_it_on_next_frame() {
        let mut aggregator = Aggregator::new(5);
        aggregator.accumulate(&counts(1, 1, 0));
        aggregator.accumulate(&counts(1, 1, 0));

        aggregator.set_window(2);
        assert_eq!(aggregator.accumulate(&counts(4, 0, 1)), Some(counts(4, 2, 1)));
    }

    #[test]
    fn zero_window_is_treated_as_one() {
        let mut aggregator = Aggregator::new(0);
        assert_eq!(aggregator.window, 1);
        assert!(aggregator.accumulate(&counts(1, 0, 0)).is_some());
    }
}
