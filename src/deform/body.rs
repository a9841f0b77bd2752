use rayon::prelude::*;
use tracing::{trace, warn};

use crate::deform::commit::{CommitOutcome, GeometrySink};
use crate::deform::impact::{CollisionSource, ImpactEvent, ImpactOutcome};
use crate::deform::spring::SpringReport;
use crate::deform::surface::MeshSurface;
use crate::error::{DeformError, Result};

/// What one tick did to a surface (or, summed, to a body).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepReport {
    pub accepted: usize,
    pub rejected: usize,
    pub springs: SpringReport,
    pub restored: usize,
}

impl StepReport {
    pub fn merge(self, other: Self) -> Self {
        Self {
            accepted: self.accepted + other.accepted,
            rejected: self.rejected + other.rejected,
            springs: self.springs.merge(other.springs),
            restored: self.restored + other.restored,
        }
    }
}

/// A step only runs for a positive, finite `dt`.
pub fn is_steppable(dt: f32) -> bool {
    dt.is_finite() && dt > 0.0
}

impl MeshSurface {
    /// Advance one tick: apply `impacts` in order, then the spring pass, then
    /// baseline healing. Impacts are visible to the spring pass of the same tick.
    ///
    /// Deterministic for a given surface, `dt` and impact list. Commit is separate.
    /// With an unusable `dt` nothing moves and every impact is reported rejected.
    pub fn step(&mut self, dt: f32, impacts: &[ImpactEvent]) -> StepReport {
        self.impacted_this_tick = false;
        let mut report = StepReport::default();
        if !is_steppable(dt) {
            trace!(dt, dropped = impacts.len(), "skipping step with unusable dt");
            report.rejected = impacts.len();
            return report;
        }

        for event in impacts {
            match self.apply_impact(event, dt) {
                ImpactOutcome::Accepted { .. } => report.accepted += 1,
                _ => report.rejected += 1,
            }
        }
        report.springs = self.integrate_springs(dt);
        report.restored = self.restore_baseline(dt);
        report
    }
}

/// Render and (optional) collision target for one surface of a body.
pub struct SurfaceSinks<'a> {
    pub render: &'a mut dyn GeometrySink,
    pub collision: Option<&'a mut dyn GeometrySink>,
}

/// A body built from one or more independently deforming surfaces.
///
/// Every impact is offered to every surface; surfaces never affect each other,
/// so they are stepped in parallel.
#[derive(Clone, Debug, Default)]
pub struct DeformableBody {
    surfaces: Vec<MeshSurface>,
    pending: Vec<ImpactEvent>,
}

impl DeformableBody {
    pub fn new(surfaces: Vec<MeshSurface>) -> Self {
        Self {
            surfaces,
            pending: Vec::new(),
        }
    }

    pub fn add_surface(&mut self, surface: MeshSurface) -> usize {
        self.surfaces.push(surface);
        self.surfaces.len() - 1
    }

    pub fn surfaces(&self) -> &[MeshSurface] {
        &self.surfaces
    }

    pub fn surfaces_mut(&mut self) -> &mut [MeshSurface] {
        &mut self.surfaces
    }

    pub fn is_dirty(&self) -> bool {
        self.surfaces.iter().any(MeshSurface::is_dirty)
    }

    pub fn step(&mut self, dt: f32, impacts: &[ImpactEvent]) -> StepReport {
        self.surfaces
            .par_iter_mut()
            .map(|surface| surface.step(dt, impacts))
            .reduce(StepReport::default, StepReport::merge)
    }

    /// Drain `source` and step with whatever it held. With an unusable `dt`
    /// the source is left as it was for the next call.
    pub fn step_from(&mut self, dt: f32, source: &mut impl CollisionSource) -> StepReport {
        if !is_steppable(dt) {
            return self.step(dt, &[]);
        }
        let mut pending = std::mem::take(&mut self.pending);
        source.drain_impacts(&mut pending);
        let report = self.step(dt, &pending);
        pending.clear();
        self.pending = pending;
        report
    }

    /// Commit every dirty surface to its sinks. `sinks[i]` belongs to surface `i`.
    ///
    /// A failing surface does not stop the others; the first error is returned
    /// after all surfaces were tried. Returns the number of surfaces written.
    pub fn commit(&mut self, sinks: &mut [SurfaceSinks<'_>]) -> Result<usize> {
        if sinks.len() != self.surfaces.len() {
            return Err(DeformError::LengthMismatch {
                expected: self.surfaces.len(),
                got: sinks.len(),
            });
        }

        let mut written = 0;
        let mut first_err = None;
        for (index, (surface, target)) in self.surfaces.iter_mut().zip(sinks.iter_mut()).enumerate() {
            let collision = target
                .collision
                .as_mut()
                .map(|c| &mut **c as &mut dyn GeometrySink);
            match surface.commit(&mut *target.render, collision) {
                Ok(CommitOutcome::Written) => written += 1,
                Ok(CommitOutcome::Clean) => {}
                Err(err) => {
                    warn!(surface = index, %err, "surface commit failed");
                    first_err.get_or_insert(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(written),
        }
    }
}
