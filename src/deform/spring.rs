use bevy::math::Vec3;
use tracing::warn;

use crate::config::MOTION_EPSILON_SQ;
use crate::deform::surface::MeshSurface;

/// Per-tick summary of the spring pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SpringReport {
    /// Vertices whose live position changed by more than the motion epsilon.
    pub moved: usize,
    /// Vertices whose speed is below the settle epsilon.
    pub settled: usize,
}

impl SpringReport {
    pub fn merge(self, other: Self) -> Self {
        Self {
            moved: self.moved + other.moved,
            settled: self.settled + other.settled,
        }
    }
}

impl MeshSurface {
    /// Damped spring from each live vertex to its baseline, semi-implicit Euler:
    /// `a = k (baseline - live) - c v`, `v += a dt`, `live += v dt`.
    ///
    /// Settled vertices are still integrated, so the approach to the baseline
    /// stays observable. A non-positive or non-finite `dt` is a no-op.
    pub fn integrate_springs(&mut self, dt: f32) -> SpringReport {
        let mut report = SpringReport::default();
        if !(dt.is_finite() && dt > 0.0) {
            return report;
        }

        let k = self.config.spring_constant;
        let c = self.config.damping;
        let settle = self.config.settle_epsilon;
        let mut diverged = 0usize;

        for v in &mut self.vertices {
            let accel = (v.baseline - v.live) * k - v.velocity * c;
            let velocity = v.velocity + accel * dt;
            let live = v.live + velocity * dt;

            if !(velocity.is_finite() && live.is_finite()) {
                // blown up: drop the motion, keep the last good position
                v.velocity = Vec3::ZERO;
                diverged += 1;
                continue;
            }

            if (live - v.live).length_squared() > MOTION_EPSILON_SQ {
                report.moved += 1;
            }
            if velocity.length_squared() < settle {
                report.settled += 1;
            }
            v.velocity = velocity;
            v.live = live;
        }

        if diverged > 0 {
            warn!(
                diverged,
                spring_constant = k,
                damping = c,
                dt,
                "spring integration diverged; velocities reset"
            );
        }
        if report.moved > 0 {
            self.dirty = true;
        }
        report
    }
}
