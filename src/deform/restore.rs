use bevy::math::Vec3;

use crate::deform::surface::MeshSurface;

/// Step from `current` toward `target` by at most `max_delta`, landing exactly on
/// `target` when it is within reach.
#[inline]
pub fn move_towards(current: Vec3, target: Vec3, max_delta: f32) -> Vec3 {
    let delta = target - current;
    let dist_sq = delta.length_squared();
    if dist_sq == 0.0 || dist_sq <= max_delta * max_delta {
        return target;
    }
    current + delta * (max_delta / dist_sq.sqrt())
}

impl MeshSurface {
    /// Creep each baseline back toward its original position at `restore_rate`
    /// units per second. Returns how many baselines moved.
    pub fn restore_baseline(&mut self, dt: f32) -> usize {
        let step = self.config.restore_rate * dt;
        if !(step.is_finite() && step > 0.0) {
            return 0;
        }

        let mut moved = 0;
        for v in &mut self.vertices {
            if v.baseline == v.original {
                continue;
            }
            v.baseline = move_towards(v.baseline, v.original, step);
            moved += 1;
        }
        if moved > 0 {
            self.dirty = true;
        }
        moved
    }
}
