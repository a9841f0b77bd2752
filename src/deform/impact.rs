use bevy::math::Vec3;
use tracing::{debug, trace};

use crate::deform::surface::MeshSurface;

/// Collision layer of whatever hit the surface (0..32).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Layer(pub u8);

/// Set of layers, one bit per layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(u32::MAX);

    pub fn from_layers(layers: &[Layer]) -> Self {
        layers.iter().fold(Self::NONE, |mask, &layer| mask.with(layer))
    }

    /// Layers outside 0..32 are ignored.
    pub fn with(self, layer: Layer) -> Self {
        Self(self.0 | 1u32.checked_shl(layer.0 as u32).unwrap_or(0))
    }

    pub fn contains(self, layer: Layer) -> bool {
        1u32.checked_shl(layer.0 as u32)
            .is_some_and(|bit| self.0 & bit != 0)
    }
}

/// How an impact's strength decays with distance from the contact point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FalloffCurve {
    /// `(1 - d²/r²)²`: smooth at both the center and the edge.
    #[default]
    Biquadratic,
    /// `1 - d/r`: a cone, harsher edge.
    Linear,
}

impl FalloffCurve {
    /// Weight in [0, 1] for `t = d²/r²` in [0, 1].
    #[inline]
    pub fn weight(self, t: f32) -> f32 {
        match self {
            FalloffCurve::Biquadratic => {
                let n = 1.0 - t;
                n * n
            }
            FalloffCurve::Linear => 1.0 - t.sqrt(),
        }
    }
}

/// One collision as reported by the host's collision detection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImpactEvent {
    pub contact_point: Vec3,
    pub force: Vec3,
    pub layer: Layer,
    /// Seconds, on the same clock for every impact delivered to a surface.
    pub timestamp: f64,
    /// Speed compared against `min_impact_speed`.
    pub impact_speed: f32,
}

impl ImpactEvent {
    /// Impact from a world-space force; the force magnitude doubles as impact speed.
    pub fn new(contact_point: Vec3, force: Vec3, layer: Layer, timestamp: f64) -> Self {
        Self {
            contact_point,
            force,
            layer,
            timestamp,
            impact_speed: force.length(),
        }
    }

    /// Impact from the relative velocity of the two colliders: `force = relative_velocity * force_scale`.
    ///
    /// `force_scale` is typically the other body's mass, or
    /// [`DEFAULT_FORCE_SCALE`](crate::config::DEFAULT_FORCE_SCALE) when none is known.
    pub fn from_relative_velocity(
        contact_point: Vec3,
        relative_velocity: Vec3,
        force_scale: f32,
        layer: Layer,
        timestamp: f64,
    ) -> Self {
        Self {
            contact_point,
            force: relative_velocity * force_scale,
            layer,
            timestamp,
            impact_speed: relative_velocity.length(),
        }
    }

    pub fn with_impact_speed(mut self, impact_speed: f32) -> Self {
        self.impact_speed = impact_speed;
        self
    }

    fn is_degenerate(&self) -> bool {
        !self.contact_point.is_finite()
            || !self.force.is_finite()
            || !self.impact_speed.is_finite()
            || !self.timestamp.is_finite()
            || self.force == Vec3::ZERO
    }
}

/// What happened to an impact handed to a surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ImpactOutcome {
    /// Applied; `affected` vertices were inside the radius.
    Accepted { affected: usize },
    IgnoredLayer,
    CoolingDown { remaining: f32 },
    TooSlow { speed: f32 },
    /// Zero or non-finite force/point; dropped without touching the cooldown.
    Degenerate,
}

impl ImpactOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ImpactOutcome::Accepted { .. })
    }
}

/// Anything that can hand over pending impacts, in arrival order.
pub trait CollisionSource {
    /// Move every pending impact into `out`, leaving the source empty.
    fn drain_impacts(&mut self, out: &mut Vec<ImpactEvent>);
}

impl CollisionSource for Vec<ImpactEvent> {
    fn drain_impacts(&mut self, out: &mut Vec<ImpactEvent>) {
        out.append(self);
    }
}

impl MeshSurface {
    /// Push vertices near the contact point and shift their baseline.
    ///
    /// `dt` scales the permanent part of the impulse; pass the current tick's step.
    pub fn apply_impact(&mut self, event: &ImpactEvent, dt: f32) -> ImpactOutcome {
        if event.is_degenerate() {
            trace!(?event, "degenerate impact dropped");
            return ImpactOutcome::Degenerate;
        }
        let local_point = self.world_to_local_point(event.contact_point);
        let local_force = self.world_to_local_direction(event.force);
        if !(local_point.is_finite() && local_force.is_finite()) {
            trace!(?local_point, ?local_force, "impact does not map into local space");
            return ImpactOutcome::Degenerate;
        }

        let config = &self.config;
        if config.ignored_layers.contains(event.layer) {
            trace!(layer = event.layer.0, "impact from ignored layer");
            return ImpactOutcome::IgnoredLayer;
        }
        if let Some(last) = self.last_impact {
            let elapsed = event.timestamp - last;
            if elapsed < config.cooldown as f64 {
                let remaining = (config.cooldown as f64 - elapsed) as f32;
                trace!(remaining, "impact during cooldown");
                return ImpactOutcome::CoolingDown { remaining };
            }
        }
        if event.impact_speed < config.min_impact_speed {
            trace!(speed = event.impact_speed, "impact too slow");
            return ImpactOutcome::TooSlow {
                speed: event.impact_speed,
            };
        }

        self.last_impact = Some(event.timestamp);
        self.impacted_this_tick = true;

        let radius = config.radius;
        if radius <= 0.0 {
            return ImpactOutcome::Accepted { affected: 0 };
        }

        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        let r2 = radius * radius;
        let inv_r2 = 1.0 / r2;
        let damage = config.damage_scale;
        let plastic = config.permanence * dt;
        let max_deformation = config.max_deformation;
        let falloff = config.falloff;

        let mut affected = 0;
        for v in &mut self.vertices {
            let d2 = (v.live - local_point).length_squared();
            if d2 > r2 {
                continue;
            }
            let impulse = local_force * (falloff.weight(d2 * inv_r2) * damage);
            v.velocity += impulse;
            v.baseline += impulse * plastic;
            v.baseline = v.original + v.plastic_offset().clamp_length_max(max_deformation);
            affected += 1;
        }

        if affected > 0 {
            self.dirty = true;
        }
        debug!(
            affected,
            speed = event.impact_speed,
            force = ?local_force,
            "impact accepted"
        );
        ImpactOutcome::Accepted { affected }
    }
}
