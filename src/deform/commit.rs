// Mesh commit: push the live vertex buffer out to render and collision geometry.
//
//   MeshSurface (dirty) → normals + bounds → render sink → collision sink → clean
//
// A failed write leaves the surface dirty so the next tick retries it.

use bevy::math::Vec3;
use tracing::{trace, warn};

use crate::deform::surface::MeshSurface;
use crate::error::Result;

// ============================================================================
// BOUNDS
// ============================================================================

/// Axis-aligned bounding box in surface-local space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    /// Bounds of a point set; a single zero-sized box at the origin for an empty set.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut points = points.into_iter();
        let Some(first) = points.next() else {
            return Self { min: Vec3::ZERO, max: Vec3::ZERO };
        };
        points.fold(Self { min: first, max: first }, |b, p| Self {
            min: b.min.min(p),
            max: b.max.max(p),
        })
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}

// ============================================================================
// SINKS
// ============================================================================

/// Everything a sink receives on commit. `positions` and `normals` are index-aligned.
#[derive(Clone, Copy, Debug)]
pub struct GeometryBuffer<'a> {
    pub positions: &'a [Vec3],
    pub normals: &'a [Vec3],
    pub bounds: Bounds,
}

/// Something that displays or collides with deformed geometry.
pub trait GeometrySink {
    /// Replace the sink's vertex data with `buffer`.
    fn write(&mut self, buffer: &GeometryBuffer<'_>) -> Result<()>;
}

/// Keeps a copy of the last buffer it was given.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordingSink {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub bounds: Option<Bounds>,
    /// Number of successful writes.
    pub writes: usize,
}

impl GeometrySink for RecordingSink {
    fn write(&mut self, buffer: &GeometryBuffer<'_>) -> Result<()> {
        self.positions.clear();
        self.positions.extend_from_slice(buffer.positions);
        self.normals.clear();
        self.normals.extend_from_slice(buffer.normals);
        self.bounds = Some(buffer.bounds);
        self.writes += 1;
        Ok(())
    }
}

// ============================================================================
// SMOOTH NORMALS
// ============================================================================

/// Area-weighted smooth vertex normals.
///
/// Triangles come from `indices`, or from consecutive vertex triples when the
/// geometry is not indexed. Vertices not touched by any triangle (or geometry
/// that is neither) get a zero normal.
pub fn compute_normals(positions: &[Vec3], indices: Option<&[u32]>, out: &mut Vec<Vec3>) {
    out.clear();
    out.resize(positions.len(), Vec3::ZERO);

    let mut accumulate = |a: usize, b: usize, c: usize| {
        // un-normalized cross product: magnitude is 2×area, which gives the weighting
        let n = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
        out[a] += n;
        out[b] += n;
        out[c] += n;
    };

    match indices {
        Some(indices) => {
            for tri in indices.chunks_exact(3) {
                accumulate(tri[0] as usize, tri[1] as usize, tri[2] as usize);
            }
        }
        None if positions.len() % 3 == 0 => {
            for i in (0..positions.len()).step_by(3) {
                accumulate(i, i + 1, i + 2);
            }
        }
        None => {}
    }

    for n in out.iter_mut() {
        *n = n.normalize_or_zero();
    }
}

// ============================================================================
// COMMIT
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing changed since the last commit.
    Clean,
    Written,
}

impl MeshSurface {
    /// Write the live shape to `render` and, when attached, `collision`.
    ///
    /// Does nothing for a clean surface. On error the surface stays dirty and
    /// its vertex state is untouched.
    pub fn commit(
        &mut self,
        render: &mut dyn GeometrySink,
        collision: Option<&mut dyn GeometrySink>,
    ) -> Result<CommitOutcome> {
        if !self.dirty {
            return Ok(CommitOutcome::Clean);
        }

        self.positions.clear();
        self.positions.extend(self.vertices.iter().map(|v| v.live));
        compute_normals(&self.positions, self.indices.as_deref(), &mut self.normals);
        let bounds = Bounds::from_points(self.positions.iter().copied());

        let buffer = GeometryBuffer {
            positions: &self.positions,
            normals: &self.normals,
            bounds,
        };
        if let Err(err) = render.write(&buffer) {
            warn!(%err, "render sink rejected deformed mesh; will retry");
            return Err(err);
        }
        if let Some(collision) = collision {
            if let Err(err) = collision.write(&buffer) {
                warn!(%err, "collision sink rejected deformed mesh; will retry");
                return Err(err);
            }
        }

        self.bounds = bounds;
        self.dirty = false;
        trace!(vertices = self.positions.len(), "mesh committed");
        Ok(CommitOutcome::Written)
    }
}
