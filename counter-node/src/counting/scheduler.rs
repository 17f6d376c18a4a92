use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::warn;

/// How the wait before a cycle went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    /// The previous cycle finished early; we slept for the rest of the delay.
    OnTime { slept: Duration },
    /// The previous cycle overran the delay; the next one starts right away.
    Lagging { overrun: Duration },
}

/// Soft real-time pacing of the frame loop.
///
/// Every cycle should start `delay` after the previous one started. An overrun
/// is logged and not compensated: the next cycle simply starts now.
#[derive(Debug)]
pub struct PacedScheduler {
    delay: Duration,
    cycle_start: Instant,
    lag_events: u64,
}

impl PacedScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            cycle_start: Instant::now(),
            lag_events: 0,
        }
    }

    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    /// Starts a fresh cycle now, forgetting time spent outside the loop.
    pub fn restart(&mut self) {
        self.cycle_start = Instant::now();
    }

    pub fn lag_events(&self) -> u64 {
        self.lag_events
    }

    /// Waits until the next cycle is due and marks its start.
    ///
    /// Always yields to the runtime at least once, even when lagging.
    pub async fn next_cycle(&mut self) -> Pace {
        tokio::task::yield_now().await;

        let deadline = self.cycle_start + self.delay;
        let now = Instant::now();
        let pace = if deadline > now {
            let remaining = deadline - now;
            time::sleep_until(deadline).await;
            Pace::OnTime { slept: remaining }
        } else {
            let overrun = now - deadline;
            self.lag_events += 1;
            warn!("Image processing is lagging behind by {:?}", overrun);
            Pace::Lagging { overrun }
        };

        self.cycle_start = Instant::now();
        pace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleeps_for_the_rest_of_the_delay() {
        let mut scheduler = PacedScheduler::new(Duration::from_millis(500));

        time::advance(Duration::from_millis(100)).await;
        let pace = scheduler.next_cycle().await;

        assert_eq!(pace, Pace::OnTime { slept: Duration::from_millis(400) });
    }

    #[tokio::test(start_paused = true)]
    async fn overrun_is_reported_and_not_compensated() {
        let mut scheduler = PacedScheduler::new(Duration::from_millis(500));

        time::advance(Duration::from_millis(800)).await;
        let before = Instant::now();
        let pace = scheduler.next_cycle().await;

        assert_eq!(pace, Pace::Lagging { overrun: Duration::from_millis(300) });
        assert_eq!(Instant::now(), before);
        assert_eq!(scheduler.lag_events(), 1);

        // The next cycle is measured from now, not from the missed deadline
        time::advance(Duration::from_millis(100)).await;
        let pace = scheduler.next_cycle().await;
        assert_eq!(pace, Pace::OnTime { slept: Duration::from_millis(400) });
    }

    #[tokio::test(start_paused = true)]
    async fn delay_changes_apply_to_the_next_cycle() {
        let mut scheduler = PacedScheduler::new(Duration::from_secs(1));
        scheduler.set_delay(Duration::from_millis(200));

        let pace = scheduler.next_cycle().await;

        assert_eq!(pace, Pace::OnTime { slept: Duration::from_millis(200) });
    }
}
