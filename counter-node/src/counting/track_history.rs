use std::collections::{BTreeMap, HashMap, VecDeque};

use trafficount_common::Point;

pub const DEFAULT_TRACK_CAPACITY: usize = 500;
pub const DEFAULT_TRAJECTORY_CAPACITY: usize = 50;

/// Recent centroids of one tracked person.
///
/// Only the last two points matter for crossing detection; the rest is kept to
/// draw the trail on annotated frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    trajectory: VecDeque<Point>,
    trajectory_capacity: usize,
    counted: bool,
}

impl Track {
    fn new(trajectory_capacity: usize) -> Self {
        Self {
            trajectory: VecDeque::with_capacity(trajectory_capacity),
            trajectory_capacity,
            counted: false,
        }
    }

    /// Appends a centroid, dropping the oldest one when full.
    pub fn push(&mut self, centroid: Point) {
        if self.trajectory.len() == self.trajectory_capacity {
            self.trajectory.pop_front();
        }
        self.trajectory.push_back(centroid);
    }

    /// The previous and current centroids, once at least two are known.
    pub fn last_segment(&self) -> Option<(Point, Point)> {
        let len = self.trajectory.len();
        if len < 2 {
            return None;
        }
        Some((self.trajectory[len - 2], self.trajectory[len - 1]))
    }

    pub fn trajectory(&self) -> impl Iterator<Item = &Point> {
        self.trajectory.iter()
    }

    pub fn counted(&self) -> bool {
        self.counted
    }

    /// Marks the track as counted. There is no way back.
    pub fn mark_counted(&mut self) {
        self.counted = true;
    }
}

/// Capacity-bounded map of tracks with least-recently-used eviction.
///
/// `get_or_create` never fails: a missing id materializes as an empty track,
/// and inserting beyond `capacity` evicts the entry that was accessed longest ago.
#[derive(Debug)]
pub struct TrackHistory {
    tracks: HashMap<u64, (Track, u64)>,
    recency: BTreeMap<u64, u64>,
    clock: u64,
    capacity: usize,
    trajectory_capacity: usize,
}

impl TrackHistory {
    pub fn new(capacity: usize, trajectory_capacity: usize) -> Self {
        Self {
            tracks: HashMap::with_capacity(capacity),
            recency: BTreeMap::new(),
            clock: 0,
            capacity: capacity.max(1),
            trajectory_capacity: trajectory_capacity.max(2),
        }
    }

    pub fn get_or_create(&mut self, track_id: u64) -> &mut Track {
        self.clock += 1;
        let stamp = self.clock;

        if !self.tracks.contains_key(&track_id) && self.tracks.len() >= self.capacity {
            self.evict_oldest();
        }

        let trajectory_capacity = self.trajectory_capacity;
        let entry = self
            .tracks
            .entry(track_id)
            .or_insert_with(|| (Track::new(trajectory_capacity), stamp));
        self.recency.remove(&entry.1);
        entry.1 = stamp;
        self.recency.insert(stamp, track_id);
        &mut entry.0
    }

    /// Looks a track up without touching its recency.
    pub fn peek(&self, track_id: u64) -> Option<&Track> {
        self.tracks.get(&track_id).map(|(track, _)| track)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    fn evict_oldest(&mut self) {
        if let Some((_, track_id)) = self.recency.pop_first() {
            self.tracks.remove(&track_id);
        }
    }
}

impl Default for TrackHistory {
    fn default() -> Self {
        Self::new(DEFAULT_TRACK_CAPACITY, DEFAULT_TRAJECTORY_CAPACITY)
    }
}
