//! Line-crossing counting engine.

pub mod aggregator;
pub mod frame_counter;
pub mod lifecycle;
pub mod region;
pub mod scheduler;
pub mod track_history;

pub use aggregator::Aggregator;
pub use frame_counter::{FrameCounter, FrameCounts, FrameOutcome};
pub use lifecycle::CounterLifecycle;
pub use scheduler::{Pace, PacedScheduler};
pub use track_history::TrackHistory;
