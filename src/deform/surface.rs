use bevy::math::{Affine3A, Quat, Vec3};

use crate::config::{DeformConfig, SINGULAR_DETERMINANT};
use crate::deform::commit::Bounds;
use crate::error::{DeformError, Result};

/// Everything the simulation knows about one vertex.
/// Kept together so index `i` always means the same vertex.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VertexState {
    /// Undeformed rest position (never changes).
    pub original: Vec3,
    /// Plastic rest position the spring pulls toward.
    pub baseline: Vec3,
    /// Rendered/collided position.
    pub live: Vec3,
    pub velocity: Vec3,
}

impl VertexState {
    pub fn at_rest(position: Vec3) -> Self {
        Self {
            original: position,
            baseline: position,
            live: position,
            velocity: Vec3::ZERO,
        }
    }

    /// Permanent offset of the baseline from the original shape.
    #[inline]
    pub fn plastic_offset(&self) -> Vec3 {
        self.baseline - self.original
    }
}

/// Coarse lifecycle of a surface, derived from its vertex state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceState {
    /// Nothing moving, no healing left to do.
    Resting,
    /// Took an impact during the current tick.
    Deforming,
    /// Some vertex is still moving toward its baseline.
    Settling,
    /// Baseline is creeping back toward the original shape.
    Healing,
}

/// One deformable mesh (a whole body or one piece of it).
#[derive(Clone, Debug)]
pub struct MeshSurface {
    pub(crate) vertices: Vec<VertexState>,
    pub(crate) indices: Option<Vec<u32>>,
    pub(crate) config: DeformConfig,
    pub(crate) world_to_local: Affine3A,
    pub(crate) world_to_local_rotation: Quat,
    pub(crate) last_impact: Option<f64>,
    pub(crate) impacted_this_tick: bool,
    pub(crate) dirty: bool,
    pub(crate) bounds: Bounds,
    // commit scratch, reused every write
    pub(crate) positions: Vec<Vec3>,
    pub(crate) normals: Vec<Vec3>,
}

impl MeshSurface {
    /// Build a surface from authoring geometry. The positions are copied; the
    /// source is never touched again.
    ///
    /// `indices` is an optional triangle list used for normal recomputation.
    pub fn new(positions: &[Vec3], indices: Option<Vec<u32>>, config: DeformConfig) -> Result<Self> {
        if positions.is_empty() {
            return Err(DeformError::MissingGeometry);
        }
        if let Some(index) = positions.iter().position(|p| !p.is_finite()) {
            return Err(DeformError::InvalidGeometry { index });
        }
        if let Some(&index) = indices
            .iter()
            .flatten()
            .find(|&&i| i as usize >= positions.len())
        {
            return Err(DeformError::IndexOutOfRange {
                index,
                count: positions.len(),
            });
        }
        let config = config.validate()?;

        Ok(Self {
            vertices: positions.iter().copied().map(VertexState::at_rest).collect(),
            indices,
            config,
            world_to_local: Affine3A::IDENTITY,
            world_to_local_rotation: Quat::IDENTITY,
            last_impact: None,
            impacted_this_tick: false,
            dirty: false,
            bounds: Bounds::from_points(positions.iter().copied()),
            positions: Vec::with_capacity(positions.len()),
            normals: Vec::with_capacity(positions.len()),
        })
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertices(&self) -> &[VertexState] {
        &self.vertices
    }

    pub fn vertex(&self, index: usize) -> Option<&VertexState> {
        self.vertices.get(index)
    }

    pub fn live_positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.vertices.iter().map(|v| v.live)
    }

    pub fn indices(&self) -> Option<&[u32]> {
        self.indices.as_deref()
    }

    pub fn config(&self) -> &DeformConfig {
        &self.config
    }

    /// Replace the config. Vertex state is kept as is.
    pub fn apply_config(&mut self, config: DeformConfig) -> Result<()> {
        self.config = config.validate()?;
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Bounds of the last committed buffer (the source geometry before the first commit).
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Time of the last accepted impact, if any.
    pub fn last_impact_time(&self) -> Option<f64> {
        self.last_impact
    }

    /// Set where this surface sits in the world.
    ///
    /// A transform that cannot be inverted (zero scale, NaN) is refused and the
    /// previous mapping stays in place.
    pub fn set_local_to_world(&mut self, local_to_world: Affine3A) -> Result<()> {
        if !local_to_world.is_finite()
            || local_to_world.matrix3.determinant().abs() <= SINGULAR_DETERMINANT
        {
            return Err(DeformError::SingularTransform);
        }
        let world_to_local = local_to_world.inverse();
        let (_, rotation, _) = local_to_world.to_scale_rotation_translation();
        if !world_to_local.is_finite() || !rotation.is_finite() {
            return Err(DeformError::SingularTransform);
        }
        self.world_to_local = world_to_local;
        self.world_to_local_rotation = rotation.inverse();
        Ok(())
    }

    pub fn world_to_local_point(&self, point: Vec3) -> Vec3 {
        self.world_to_local.transform_point3(point)
    }

    /// Rotates a world-space direction into local space. Scale is ignored so
    /// forces keep their magnitude.
    pub fn world_to_local_direction(&self, direction: Vec3) -> Vec3 {
        self.world_to_local_rotation * direction
    }

    pub fn state(&self) -> SurfaceState {
        let eps = self.config.settle_epsilon;
        if self.impacted_this_tick {
            SurfaceState::Deforming
        } else if self.vertices.iter().any(|v| v.velocity.length_squared() >= eps) {
            SurfaceState::Settling
        } else if self.config.restore_rate > 0.0
            && self.vertices.iter().any(|v| v.baseline != v.original)
        {
            SurfaceState::Healing
        } else {
            SurfaceState::Resting
        }
    }

    /// Largest permanent offset over all vertices.
    pub fn max_plastic_offset(&self) -> f32 {
        self.vertices
            .iter()
            .map(|v| v.plastic_offset().length())
            // NaN wins so a corrupted surface never reads as undented
            .fold(0.0, |max: f32, d| if d.is_nan() || d > max { d } else { max })
    }

    /// Sum of permanent offsets, a rough "how dented is it" figure.
    pub fn total_plastic_offset(&self) -> f32 {
        self.vertices.iter().map(|v| v.plastic_offset().length()).sum()
    }

    /// Snap everything back to the original shape and forget the cooldown.
    pub fn reset(&mut self) {
        for v in &mut self.vertices {
            *v = VertexState::at_rest(v.original);
        }
        self.last_impact = None;
        self.impacted_this_tick = false;
        self.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Vec<Vec3> {
        vec![Vec3::ZERO, Vec3::X, Vec3::Y]
    }

    #[test]
    fn starts_at_rest() {
        let surface = MeshSurface::new(&triangle(), Some(vec![0, 1, 2]), DeformConfig::new()).unwrap();
        assert_eq!(surface.vertex_count(), 3);
        assert!(!surface.is_dirty());
        assert_eq!(surface.state(), SurfaceState::Resting);
        for v in surface.vertices() {
            assert_eq!(v.original, v.baseline);
            assert_eq!(v.original, v.live);
            assert_eq!(v.velocity, Vec3::ZERO);
        }
    }

    #[test]
    fn empty_geometry_is_rejected() {
        let err = MeshSurface::new(&[], None, DeformConfig::new()).unwrap_err();
        assert_eq!(err, DeformError::MissingGeometry);
    }

    #[test]
    fn non_finite_vertex_is_rejected() {
        let err = MeshSurface::new(&[Vec3::ZERO, Vec3::NAN], None, DeformConfig::new()).unwrap_err();
        assert_eq!(err, DeformError::InvalidGeometry { index: 1 });
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let err = MeshSurface::new(&triangle(), Some(vec![0, 1, 3]), DeformConfig::new()).unwrap_err();
        assert_eq!(err, DeformError::IndexOutOfRange { index: 3, count: 3 });
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = DeformConfig::new().with_radius(-0.1);
        assert!(MeshSurface::new(&triangle(), None, config).is_err());
    }

    #[test]
    fn transform_round_trip() {
        let mut surface = MeshSurface::new(&triangle(), None, DeformConfig::new()).unwrap();
        let local_to_world = Affine3A::from_scale_rotation_translation(
            Vec3::splat(2.0),
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            Vec3::new(1.0, 2.0, 3.0),
        );
        surface.set_local_to_world(local_to_world).unwrap();

        let local = Vec3::new(0.5, -0.25, 1.0);
        let world = local_to_world.transform_point3(local);
        assert!(surface.world_to_local_point(world).abs_diff_eq(local, 1e-5));

        // directions ignore scale
        let dir = surface.world_to_local_direction(Vec3::X * 3.0);
        assert!((dir.length() - 3.0).abs() < 1e-5);
    }

    #[test]
    fn singular_transform_keeps_previous_mapping() {
        let mut surface = MeshSurface::new(&triangle(), None, DeformConfig::new()).unwrap();
        surface.set_local_to_world(Affine3A::from_translation(Vec3::Y)).unwrap();

        for bad in [
            Affine3A::from_scale(Vec3::ZERO),
            Affine3A::from_scale(Vec3::new(1.0, 0.0, 1.0)),
            Affine3A::from_translation(Vec3::NAN),
        ] {
            assert_eq!(surface.set_local_to_world(bad), Err(DeformError::SingularTransform));
        }
        assert_eq!(surface.world_to_local_point(Vec3::Y), Vec3::ZERO);
        assert_eq!(surface.world_to_local_direction(Vec3::X), Vec3::X);
    }

    #[test]
    fn mirrored_transform_is_accepted() {
        let mut surface = MeshSurface::new(&triangle(), None, DeformConfig::new()).unwrap();
        let mirror = Affine3A::from_scale(Vec3::new(-1.0, 1.0, 1.0));
        surface.set_local_to_world(mirror).unwrap();
        assert!(surface.world_to_local_point(Vec3::X).abs_diff_eq(Vec3::NEG_X, 1e-6));
    }

    #[test]
    fn max_plastic_offset_reports_nan() {
        let mut surface = MeshSurface::new(&triangle(), None, DeformConfig::new()).unwrap();
        surface.vertices[2].baseline = Vec3::NAN;
        assert!(surface.max_plastic_offset().is_nan());
    }

    #[test]
    fn reset_restores_original() {
        let mut surface = MeshSurface::new(&triangle(), None, DeformConfig::new()).unwrap();
        surface.vertices[1].baseline += Vec3::Y * 0.2;
        surface.vertices[1].live += Vec3::Y * 0.3;
        surface.vertices[1].velocity = Vec3::ONE;
        assert!(surface.max_plastic_offset() > 0.19);

        surface.reset();
        assert!(surface.is_dirty());
        assert_eq!(surface.max_plastic_offset(), 0.0);
        assert_eq!(surface.vertices()[1], VertexState::at_rest(Vec3::X));
    }
}
