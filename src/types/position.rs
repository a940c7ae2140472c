//! Position and trajectory data structures

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Minimum number of positions needed to derive a single movement segment.
pub const MIN_TRAJECTORY_LEN: usize = 2;

const MAX_LATITUDE: f64 = 90.0;
const MAX_LONGITUDE: f64 = 180.0;

/// A single timestamped geographic fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Latitude in degrees
    pub latitude: f64,

    /// Longitude in degrees
    pub longitude: f64,

    /// Seconds since the Unix epoch
    pub timestamp: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64, timestamp: f64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
        }
    }

    fn validate(&self, index: usize) -> Result<()> {
        let fields = [
            ("latitude", self.latitude),
            ("longitude", self.longitude),
            ("timestamp", self.timestamp),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(EngineError::InvalidPosition {
                    index,
                    reason: format!("{} is not finite", name),
                });
            }
        }
        if self.latitude.abs() > MAX_LATITUDE {
            return Err(EngineError::InvalidPosition {
                index,
                reason: format!("latitude {} is outside [-90, 90]", self.latitude),
            });
        }
        if self.longitude.abs() > MAX_LONGITUDE {
            return Err(EngineError::InvalidPosition {
                index,
                reason: format!("longitude {} is outside [-180, 180]", self.longitude),
            });
        }
        Ok(())
    }
}

/// An ordered sequence of at least two positions for one subject.
///
/// Order is the caller's order; positions are never re-sorted by timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    positions: Vec<Position>,
}

impl Trajectory {
    /// Validate a caller-supplied sequence.
    pub fn new(positions: Vec<Position>) -> Result<Self> {
        if positions.len() < MIN_TRAJECTORY_LEN {
            return Err(EngineError::InsufficientData {
                needed: MIN_TRAJECTORY_LEN,
                got: positions.len(),
            });
        }

        for (index, position) in positions.iter().enumerate() {
            position.validate(index)?;
        }

        Ok(Self { positions })
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Number of consecutive position pairs.
    pub fn segment_count(&self) -> usize {
        self.positions.len() - 1
    }
}
