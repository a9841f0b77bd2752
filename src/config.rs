use tracing::debug;

use crate::deform::impact::{FalloffCurve, LayerMask};
use crate::error::{DeformError, Result};

/// Physics timing
pub const PHYSICS_HZ: f64 = 60.0;

/// Impact defaults
pub const DEFAULT_RADIUS: f32 = 0.5;
pub const DEFAULT_DAMAGE_SCALE: f32 = 1.0;
pub const DEFAULT_MAX_DEFORMATION: f32 = 0.5;
pub const DEFAULT_MIN_IMPACT_SPEED: f32 = 2.0;
pub const DEFAULT_COOLDOWN: f32 = 0.1;
/// Relative velocity → force conversion used when the collider reports no mass.
pub const DEFAULT_FORCE_SCALE: f32 = 0.02;

/// Spring & permanence defaults
pub const DEFAULT_SPRING_CONSTANT: f32 = 20.0;
pub const DEFAULT_DAMPING: f32 = 4.0;
pub const DEFAULT_PERMANENCE: f32 = 0.5;
pub const DEFAULT_RESTORE_RATE: f32 = 0.2;

/// Squared speed under which a vertex counts as settled.
pub const SETTLE_EPSILON: f32 = 1e-6;

/// Squared per-tick displacement under which a live vertex move is not a material change.
pub const MOTION_EPSILON_SQ: f32 = 1e-12;

/// Transforms whose linear part has |determinant| at or below this are treated as singular.
pub const SINGULAR_DETERMINANT: f32 = 1e-12;

/// Per-surface deformation parameters.
///
/// Build with the `with_*` methods and finish with [`DeformConfig::validate`];
/// surfaces only ever hold validated configs.
///
/// ```
/// use crumple::config::DeformConfig;
///
/// let config = DeformConfig::new()
///     .with_radius(1.0)
///     .with_spring(20.0, 9.0)
///     .with_restore_rate(0.0)
///     .validate()
///     .unwrap();
/// assert!(config.is_critically_damped());
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DeformConfig {
    /// Local-space radius around the contact point that an impact reaches.
    pub radius: f32,
    /// Multiplier on the local force before it becomes a velocity impulse.
    pub damage_scale: f32,
    /// Upper bound on |baseline - original| per vertex.
    pub max_deformation: f32,
    /// Impacts slower than this are ignored.
    pub min_impact_speed: f32,
    /// Seconds after an accepted impact during which further impacts are ignored.
    pub cooldown: f32,
    pub spring_constant: f32,
    pub damping: f32,
    /// Share of each impulse (per second) that becomes permanent baseline shift, in [0, 1].
    pub permanence: f32,
    /// Distance per second the baseline travels back toward the original shape. 0 disables healing.
    pub restore_rate: f32,
    pub ignored_layers: LayerMask,
    pub settle_epsilon: f32,
    pub falloff: FalloffCurve,
}

impl DeformConfig {
    pub fn new() -> Self {
        Self {
            radius: DEFAULT_RADIUS,
            damage_scale: DEFAULT_DAMAGE_SCALE,
            max_deformation: DEFAULT_MAX_DEFORMATION,
            min_impact_speed: DEFAULT_MIN_IMPACT_SPEED,
            cooldown: DEFAULT_COOLDOWN,
            spring_constant: DEFAULT_SPRING_CONSTANT,
            damping: DEFAULT_DAMPING,
            permanence: DEFAULT_PERMANENCE,
            restore_rate: DEFAULT_RESTORE_RATE,
            ignored_layers: LayerMask::NONE,
            settle_epsilon: SETTLE_EPSILON,
            falloff: FalloffCurve::Biquadratic,
        }
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_damage_scale(mut self, damage_scale: f32) -> Self {
        self.damage_scale = damage_scale;
        self
    }

    pub fn with_max_deformation(mut self, max_deformation: f32) -> Self {
        self.max_deformation = max_deformation;
        self
    }

    pub fn with_min_impact_speed(mut self, min_impact_speed: f32) -> Self {
        self.min_impact_speed = min_impact_speed;
        self
    }

    pub fn with_cooldown(mut self, cooldown: f32) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Set spring constant and damping coefficient together.
    pub fn with_spring(mut self, spring_constant: f32, damping: f32) -> Self {
        self.spring_constant = spring_constant;
        self.damping = damping;
        self
    }

    pub fn with_permanence(mut self, permanence: f32) -> Self {
        self.permanence = permanence;
        self
    }

    pub fn with_restore_rate(mut self, restore_rate: f32) -> Self {
        self.restore_rate = restore_rate;
        self
    }

    pub fn with_ignored_layers(mut self, ignored_layers: LayerMask) -> Self {
        self.ignored_layers = ignored_layers;
        self
    }

    pub fn with_settle_epsilon(mut self, settle_epsilon: f32) -> Self {
        self.settle_epsilon = settle_epsilon;
        self
    }

    pub fn with_falloff(mut self, falloff: FalloffCurve) -> Self {
        self.falloff = falloff;
        self
    }

    /// Reject values the integrator cannot evaluate and clamp the ones that only
    /// have a meaningful range.
    pub fn validate(mut self) -> Result<Self> {
        let fields = [
            ("radius", self.radius),
            ("damage_scale", self.damage_scale),
            ("max_deformation", self.max_deformation),
            ("min_impact_speed", self.min_impact_speed),
            ("cooldown", self.cooldown),
            ("spring_constant", self.spring_constant),
            ("damping", self.damping),
            ("permanence", self.permanence),
            ("restore_rate", self.restore_rate),
            ("settle_epsilon", self.settle_epsilon),
        ];
        if let Some(&(field, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(DeformError::InvalidConfig { field, value });
        }

        let must_be_non_negative = [
            ("radius", self.radius),
            ("damage_scale", self.damage_scale),
            ("max_deformation", self.max_deformation),
            ("damping", self.damping),
        ];
        if let Some(&(field, value)) = must_be_non_negative.iter().find(|(_, v)| *v < 0.0) {
            return Err(DeformError::InvalidConfig { field, value });
        }
        if self.spring_constant <= 0.0 {
            return Err(DeformError::InvalidConfig {
                field: "spring_constant",
                value: self.spring_constant,
            });
        }

        self.permanence = self.permanence.clamp(0.0, 1.0);
        self.cooldown = self.cooldown.max(0.0);
        self.restore_rate = self.restore_rate.max(0.0);
        self.min_impact_speed = self.min_impact_speed.max(0.0);
        self.settle_epsilon = self.settle_epsilon.max(0.0);

        if !self.is_critically_damped() {
            debug!(
                spring_constant = self.spring_constant,
                damping = self.damping,
                "under-damped deformation spring; large time steps may oscillate"
            );
        }
        Ok(self)
    }

    /// `damping ≥ 2·sqrt(spring_constant)`
    pub fn is_critically_damped(&self) -> bool {
        self.damping >= 2.0 * self.spring_constant.sqrt()
    }
}

impl Default for DeformConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = DeformConfig::default().validate().unwrap();
        assert_eq!(config.radius, DEFAULT_RADIUS);
        assert_eq!(config.falloff, FalloffCurve::Biquadratic);
    }

    #[test]
    fn rejects_negative_radius() {
        let err = DeformConfig::new().with_radius(-1.0).validate().unwrap_err();
        assert!(matches!(err, DeformError::InvalidConfig { field: "radius", .. }));
    }

    #[test]
    fn rejects_non_positive_spring() {
        let err = DeformConfig::new().with_spring(0.0, 1.0).validate().unwrap_err();
        assert!(matches!(err, DeformError::InvalidConfig { field: "spring_constant", .. }));
    }

    #[test]
    fn rejects_nan() {
        let err = DeformConfig::new().with_damage_scale(f32::NAN).validate().unwrap_err();
        assert!(matches!(err, DeformError::InvalidConfig { field: "damage_scale", .. }));
    }

    #[test]
    fn clamps_ranges() {
        let config = DeformConfig::new()
            .with_permanence(3.0)
            .with_cooldown(-1.0)
            .with_restore_rate(-0.5)
            .validate()
            .unwrap();
        assert_eq!(config.permanence, 1.0);
        assert_eq!(config.cooldown, 0.0);
        assert_eq!(config.restore_rate, 0.0);
    }

    #[test]
    fn critical_damping_heuristic() {
        assert!(!DeformConfig::new().with_spring(20.0, 4.0).is_critically_damped());
        assert!(DeformConfig::new().with_spring(16.0, 8.0).is_critically_damped());
    }
}
