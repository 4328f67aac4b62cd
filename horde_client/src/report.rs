//! Local player position reports.
//!
//! The local player moves every frame but the server only needs a report
//! when enough time has passed and the player actually moved.

use horde_shared::{config::HordeConfig, math::Vec3};

/// Time- and distance-gated throttle for outbound position reports.
#[derive(Debug, Clone)]
pub struct PositionReporter {
    interval: f64,
    min_distance_sq: f64,
    since_last: f64,
    last_sent: Vec3,
}

impl PositionReporter {
    pub fn new(interval: f64, min_distance_sq: f64) -> Self {
        Self {
            interval,
            min_distance_sq,
            since_last: 0.0,
            last_sent: Vec3::ZERO,
        }
    }

    pub fn from_config(cfg: &HordeConfig) -> Self {
        Self::new(cfg.report_interval_secs, cfg.report_min_distance_sq)
    }

    /// Accumulates `dt` and returns the position to send, if one is due.
    pub fn poll(&mut self, dt: f64, position: Vec3) -> Option<Vec3> {
        self.since_last += dt;
        if self.since_last >= self.interval
            && position.distance_sq(self.last_sent) > self.min_distance_sq
        {
            self.since_last = 0.0;
            self.last_sent = position;
            return Some(position);
        }
        None
    }

    pub fn last_sent(&self) -> Vec3 {
        self.last_sent
    }
}
