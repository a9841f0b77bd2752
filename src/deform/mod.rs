use bevy::prelude::*;

pub mod body;
pub mod commit;
pub mod impact;
pub mod restore;
pub mod spring;
pub mod surface;
pub mod systems;

pub use body::{DeformableBody, StepReport, SurfaceSinks, is_steppable};
pub use commit::{Bounds, CommitOutcome, GeometryBuffer, GeometrySink, RecordingSink};
pub use impact::{CollisionSource, FalloffCurve, ImpactEvent, ImpactOutcome, Layer, LayerMask};
pub use spring::SpringReport;
pub use surface::{MeshSurface, SurfaceState, VertexState};
pub use systems::{
    CollisionMesh, DeformDisabled, DeformSource, DeformableMesh, ImpactQueue, attach_deformables,
    commit_deformables, step_deformables, surface_from_mesh, sync_surface_transforms,
};

/// Ordering handles for the fixed-tick deformation pipeline. Collision code
/// that fills [`ImpactQueue`]s should run `.before(DeformSystems::Step)`.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeformSystems {
    Attach,
    Step,
    Commit,
}

/// Plug this into your App with `.add_plugins(DeformPlugin)`.
pub struct DeformPlugin;

impl Plugin for DeformPlugin {
    fn build(&self, app: &mut App) {
        app
            // attach → (transforms, impacts + springs + healing) → commit, every fixed tick,
            // so the collider never trails the rendered shape
            .configure_sets(
                FixedUpdate,
                (DeformSystems::Attach, DeformSystems::Step, DeformSystems::Commit).chain(),
            )
            .add_systems(
                FixedUpdate,
                (
                    attach_deformables.in_set(DeformSystems::Attach),
                    (sync_surface_transforms, step_deformables)
                        .chain()
                        .in_set(DeformSystems::Step),
                    commit_deformables.in_set(DeformSystems::Commit),
                ),
            );
    }
}
