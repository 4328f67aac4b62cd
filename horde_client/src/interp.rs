//! Interpolation.
//!
//! The server publishes discrete row updates at its own cadence. The client
//! renders at its frame rate and glides each view from where it is drawn now
//! to the newest remote position over a fixed window.

use horde_shared::math::{smoothstep, Vec3};

/// Default glide window in seconds.
pub const DEFAULT_DURATION: f64 = 0.1;

/// Motion phase of a single view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    /// Holding at the target.
    Idle,
    /// Gliding towards the target.
    Interpolating,
}

/// Per-view interpolation bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpolationState {
    pub start_position: Vec3,
    pub target_position: Vec3,
    pub elapsed: f64,
}

/// Smooths discrete position updates into continuous motion.
#[derive(Debug, Clone)]
pub struct MotionInterpolator {
    duration: f64,
    state: MotionState,
    interp: InterpolationState,
    current: Vec3,
}

impl MotionInterpolator {
    /// Creates an idle interpolator resting at `position`.
    pub fn new(position: Vec3, duration: f64) -> Self {
        Self {
            duration,
            state: MotionState::Idle,
            interp: InterpolationState {
                start_position: position,
                target_position: position,
                elapsed: 0.0,
            },
            current: position,
        }
    }

    /// Starts a new glide towards `target` from the currently rendered
    /// position. Any glide in progress is abandoned, never blended.
    pub fn retarget(&mut self, target: Vec3) {
        self.interp = InterpolationState {
            start_position: self.current,
            target_position: target,
            elapsed: 0.0,
        };
        self.state = MotionState::Interpolating;
    }

    /// Advances by `dt` seconds and returns the new rendered position.
    pub fn advance(&mut self, dt: f64) -> Vec3 {
        if self.state == MotionState::Idle {
            return self.current;
        }

        self.interp.elapsed += dt.max(0.0);
        let t = if self.duration > 0.0 {
            (self.interp.elapsed / self.duration).clamp(0.0, 1.0)
        } else {
            1.0
        };

        if t >= 1.0 {
            // Land exactly on the target; lerp at 1.0 can be off by an ulp.
            self.current = self.interp.target_position;
            self.state = MotionState::Idle;
        } else {
            self.current = self
                .interp
                .start_position
                .lerp(self.interp.target_position, smoothstep(t));
        }
        self.current
    }

    /// Jumps straight to `position` and stops.
    pub fn snap_to(&mut self, position: Vec3) {
        *self = Self::new(position, self.duration);
    }

    pub fn current_position(&self) -> Vec3 {
        self.current
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    pub fn interpolation(&self) -> &InterpolationState {
        &self.interp
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn is_moving(&self) -> bool {
        self.state == MotionState::Interpolating
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const D: f64 = DEFAULT_DURATION;

    #[test]
    fn new_interpolator_is_idle_at_position() {
        let p = Vec3::new(1.0, 2.0, 3.0);
        let mut m = MotionInterpolator::new(p, D);
        assert_eq!(m.state(), MotionState::Idle);
        assert_eq!(m.advance(1.0), p);
        assert_eq!(m.interpolation().target_position, p);
    }

    #[test]
    fn retarget_then_full_duration_lands_exactly() {
        let p = Vec3::new(0.3, -1.7, 2.9);
        let q = Vec3::new(10.1, 0.7, -4.3);
        let mut m = MotionInterpolator::new(p, D);
        m.retarget(q);
        assert_eq!(m.state(), MotionState::Interpolating);
        assert_eq!(m.advance(D), q);
        assert_eq!(m.state(), MotionState::Idle);
    }

    #[test]
    fn halfway_uses_smoothstep() {
        let mut m = MotionInterpolator::new(Vec3::ZERO, D);
        m.retarget(Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(m.advance(0.05), Vec3::new(5.0, 0.0, 0.0));

        // A quarter in, smoothstep lags behind linear.
        let mut m = MotionInterpolator::new(Vec3::ZERO, D);
        m.retarget(Vec3::new(10.0, 0.0, 0.0));
        let quarter = m.advance(D / 4.0);
        assert!(quarter.x < 2.5);
        assert!((quarter.x - 1.5625).abs() < 1e-9);
    }

    #[test]
    fn retarget_mid_glide_starts_from_rendered_position() {
        let q1 = Vec3::new(10.0, 0.0, 0.0);
        let q2 = Vec3::new(10.0, 0.0, 10.0);
        let mut m = MotionInterpolator::new(Vec3::ZERO, D);
        m.retarget(q1);
        let mid = m.advance(D / 2.0);

        m.retarget(q2);
        let st = m.interpolation();
        assert_eq!(st.start_position, mid);
        assert_ne!(st.start_position, q1);
        assert_ne!(st.start_position, Vec3::ZERO);
        assert_eq!(st.target_position, q2);
        assert_eq!(st.elapsed, 0.0);

        // No jump on the first frame after the retarget.
        assert_eq!(m.advance(0.0), mid);
    }

    #[test]
    fn holds_at_target_without_extrapolating() {
        let q = Vec3::new(4.0, 0.0, 0.0);
        let mut m = MotionInterpolator::new(Vec3::ZERO, D);
        m.retarget(q);
        m.advance(D * 3.0);
        assert_eq!(m.advance(5.0), q);
    }

    #[test]
    fn zero_duration_snaps_on_next_advance() {
        let q = Vec3::new(1.0, 1.0, 1.0);
        let mut m = MotionInterpolator::new(Vec3::ZERO, 0.0);
        m.retarget(q);
        assert_eq!(m.advance(0.0), q);
        assert!(!m.is_moving());
    }

    #[test]
    fn snap_to_stops_motion() {
        let mut m = MotionInterpolator::new(Vec3::ZERO, D);
        m.retarget(Vec3::new(5.0, 0.0, 0.0));
        m.snap_to(Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(m.state(), MotionState::Idle);
        assert_eq!(m.current_position(), Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(m.duration(), D);
    }
}
