//! Track types
//!
//! A [`Track`] is the lifecycle manager's record of one object: its filtered
//! state, lifecycle status and counters, a bounded history of past means and
//! the last observed attributes (class, shape, appearance).

use std::collections::VecDeque;
use std::fmt;

use nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};

use super::detection::BoxShape;
use super::output::TrackSnapshot;
use super::state::TrackState;

/// Track identifier, assigned in strictly increasing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    /// Newly spawned, not yet confirmed
    Tentative,
    /// Confirmed and recently observed
    Confirmed,
    /// Confirmed but currently unobserved
    Coasting,
    /// Terminal
    Deleted,
}

impl TrackStatus {
    /// True unless deleted
    #[inline]
    pub fn is_live(self) -> bool {
        self != TrackStatus::Deleted
    }

    /// True for Confirmed and Coasting
    #[inline]
    pub fn is_confirmed(self) -> bool {
        matches!(self, TrackStatus::Confirmed | TrackStatus::Coasting)
    }

    /// Whether `self → next` is an edge of the lifecycle graph
    pub fn can_transition_to(self, next: TrackStatus) -> bool {
        use TrackStatus::*;
        matches!(
            (self, next),
            (Tentative, Tentative)
                | (Tentative, Confirmed)
                | (Tentative, Deleted)
                | (Confirmed, Confirmed)
                | (Confirmed, Coasting)
                | (Confirmed, Deleted)
                | (Coasting, Coasting)
                | (Coasting, Confirmed)
                | (Coasting, Deleted)
                | (Deleted, Deleted)
        )
    }
}

impl fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrackStatus::Tentative => "tentative",
            TrackStatus::Confirmed => "confirmed",
            TrackStatus::Coasting => "coasting",
            TrackStatus::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// Past mean of a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Time of the mean
    pub timestamp: f64,
    /// State mean
    pub mean: DVector<f64>,
}

/// Bounded ring of past means, oldest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackHistory {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl TrackHistory {
    /// Empty history holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Append an entry, evicting the oldest when full
    pub fn push(&mut self, timestamp: f64, mean: DVector<f64>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry { timestamp, mean });
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate oldest first
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Most recent entry
    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }
}

/// A tracked object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Unique id
    pub id: TrackId,
    /// Filtered state
    pub state: TrackState,
    /// Lifecycle status
    pub status: TrackStatus,
    /// Total number of associated detections (spawn included)
    pub hits: u32,
    /// Associated detections since the last miss
    pub consecutive_hits: u32,
    /// Missed cycles since the last hit
    pub misses: u32,
    /// Past means
    pub history: TrackHistory,
    /// Spawn time
    pub created_at: f64,
    /// Time of the last associated detection
    pub last_update: f64,
    /// Negative log-likelihood ratio; lower is more confident
    pub score: f64,
    /// Object class from the spawning detection
    pub class_label: Option<String>,
    /// Box shape: filtered extent, last observed orientation
    pub shape: Option<BoxShape>,
    /// Variance of each filtered extent, zero without a shape
    pub extent_variance: Vector3<f64>,
    /// Smoothed appearance embedding
    pub embedding: Option<Vec<f64>>,
}

impl Track {
    /// True unless deleted
    #[inline]
    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }

    /// Time since the last associated detection, measured at the state time
    #[inline]
    pub fn coast_duration(&self) -> f64 {
        (self.state.timestamp - self.last_update).max(0.0)
    }

    /// Immutable snapshot for output
    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            track_id: self.id,
            status: self.status,
            mean: self.state.mean.clone(),
            covariance: self.state.covariance.clone(),
            motion: self.state.motion,
            frame_id: self.state.frame_id,
            timestamp: self.state.timestamp,
            position: self.state.position(),
            velocity: self.state.velocity(),
            created_at: self.created_at,
            last_update: self.last_update,
            hits: self.hits,
            misses: self.misses,
            score: self.score,
            class_label: self.class_label.clone(),
            shape: self.shape,
        }
    }
}
