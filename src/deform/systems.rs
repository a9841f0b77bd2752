use bevy::camera::primitives::Aabb;
use bevy::mesh::VertexAttributeValues;
use bevy::prelude::*;

use crate::config::DeformConfig;
use crate::deform::body::is_steppable;
use crate::deform::commit::{Bounds, CommitOutcome, GeometryBuffer, GeometrySink};
use crate::deform::impact::{CollisionSource, ImpactEvent};
use crate::deform::surface::MeshSurface;
use crate::error::{DeformError, Result};

/// Request to make an entity deformable. Replaced by [`DeformableMesh`] (or
/// [`DeformDisabled`]) on the next fixed tick.
#[derive(Component, Clone, Debug)]
pub struct DeformSource {
    /// Authoring mesh; cloned, never written to.
    pub mesh: Handle<Mesh>,
    pub config: DeformConfig,
    /// Entity carrying the [`CollisionMesh`] to keep in sync.
    pub collider: Option<Entity>,
}

impl DeformSource {
    pub fn new(mesh: Handle<Mesh>, config: DeformConfig) -> Self {
        Self {
            mesh,
            config,
            collider: None,
        }
    }

    pub fn with_collider(mut self, collider: Entity) -> Self {
        self.collider = Some(collider);
        self
    }
}

/// A live deformable surface and the geometry it writes to.
#[derive(Component, Debug)]
pub struct DeformableMesh {
    pub surface: MeshSurface,
    /// Private clone of the source mesh; render this handle.
    pub mesh: Handle<Mesh>,
    /// Collision geometry. A despawned collider is treated as absent.
    pub collider: Option<Entity>,
}

/// Marks an entity whose deformable setup failed, or whose render mesh was
/// removed later. It is no longer stepped or committed; the rest of the world keeps going.
#[derive(Component, Clone, Debug)]
pub struct DeformDisabled {
    pub reason: DeformError,
}

/// Impacts waiting for the next step, in arrival order. Collision handling pushes here.
#[derive(Component, Clone, Debug, Default)]
pub struct ImpactQueue(pub Vec<ImpactEvent>);

impl ImpactQueue {
    pub fn push(&mut self, event: ImpactEvent) {
        self.0.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl CollisionSource for ImpactQueue {
    fn drain_impacts(&mut self, out: &mut Vec<ImpactEvent>) {
        out.append(&mut self.0);
    }
}

/// Collision-side copy of a deformable surface's geometry.
#[derive(Component, Clone, Debug, Default)]
pub struct CollisionMesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub bounds: Option<Bounds>,
    /// Bumped on every write so colliders can rebuild lazily.
    pub revision: u64,
}

impl GeometrySink for CollisionMesh {
    fn write(&mut self, buffer: &GeometryBuffer<'_>) -> Result<()> {
        self.positions.clear();
        self.positions.extend_from_slice(buffer.positions);
        self.normals.clear();
        self.normals.extend_from_slice(buffer.normals);
        self.bounds = Some(buffer.bounds);
        self.revision += 1;
        Ok(())
    }
}

impl GeometrySink for Mesh {
    fn write(&mut self, buffer: &GeometryBuffer<'_>) -> Result<()> {
        let count = self.count_vertices();
        if buffer.positions.len() != count {
            return Err(DeformError::LengthMismatch {
                expected: count,
                got: buffer.positions.len(),
            });
        }
        let positions: Vec<[f32; 3]> = buffer.positions.iter().map(|p| p.to_array()).collect();
        let normals: Vec<[f32; 3]> = buffer.normals.iter().map(|n| n.to_array()).collect();
        self.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
        self.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
        Ok(())
    }
}

/// Build a surface from a Bevy mesh's positions and (if any) index buffer.
pub fn surface_from_mesh(mesh: &Mesh, config: DeformConfig) -> Result<MeshSurface> {
    let positions: Vec<Vec3> = mesh
        .attribute(Mesh::ATTRIBUTE_POSITION)
        .and_then(VertexAttributeValues::as_float3)
        .ok_or(DeformError::MissingGeometry)?
        .iter()
        .map(|p| Vec3::from_array(*p))
        .collect();
    let indices = mesh
        .indices()
        .map(|indices| indices.iter().map(|i| i as u32).collect());
    MeshSurface::new(&positions, indices, config)
}

/// Turn every new [`DeformSource`] into a [`DeformableMesh`] backed by a private mesh clone.
pub fn attach_deformables(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    q_sources: Query<(Entity, &DeformSource)>,
) {
    for (entity, source) in &q_sources {
        let built = meshes
            .get(&source.mesh)
            .ok_or(DeformError::MissingGeometry)
            .and_then(|mesh| Ok((surface_from_mesh(mesh, source.config.clone())?, mesh.clone())));

        let mut entity_commands = commands.entity(entity);
        entity_commands.remove::<DeformSource>();
        match built {
            Ok((surface, mesh)) => {
                debug!(?entity, vertices = surface.vertex_count(), "deformable mesh attached");
                entity_commands
                    .insert(DeformableMesh {
                        surface,
                        mesh: meshes.add(mesh),
                        collider: source.collider,
                    })
                    .insert_if_new(ImpactQueue::default());
            }
            Err(reason) => {
                warn!(?entity, %reason, "deformable mesh disabled");
                entity_commands.insert(DeformDisabled { reason });
            }
        }
    }
}

/// Keep each surface's world→local mapping in step with its entity.
pub fn sync_surface_transforms(
    mut q_deformables: Query<
        (Entity, &GlobalTransform, &mut DeformableMesh),
        (
            Or<(Changed<GlobalTransform>, Added<DeformableMesh>)>,
            Without<DeformDisabled>,
        ),
    >,
) {
    for (entity, transform, mut deformable) in &mut q_deformables {
        // scaled to zero (hidden, mid animation): impacts keep using the last good mapping
        if let Err(err) = deformable.surface.set_local_to_world(transform.affine()) {
            trace!(?entity, %err, "keeping previous surface transform");
        }
    }
}

/// Ingest queued impacts, integrate springs and heal baselines. Surfaces run in parallel.
pub fn step_deformables(
    time: Res<Time>, // fixed clock in FixedUpdate
    mut q_deformables: Query<(&mut DeformableMesh, &mut ImpactQueue), Without<DeformDisabled>>,
) {
    let dt = time.delta_secs();
    if !is_steppable(dt) {
        // queues stay filled for the next real tick
        return;
    }
    q_deformables
        .par_iter_mut()
        .for_each(|(mut deformable, mut queue)| {
            let report = deformable.surface.step(dt, &queue.0);
            queue.0.clear();
            if report.accepted > 0 {
                trace!(?report, "deformable stepped");
            }
        });
}

/// Write dirty surfaces to their render mesh, collider and culling bounds.
/// Failed writes stay dirty and are retried on the next tick.
pub fn commit_deformables(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut q_deformables: Query<(Entity, &mut DeformableMesh, Option<&mut Aabb>), Without<DeformDisabled>>,
    mut q_colliders: Query<&mut CollisionMesh>,
) {
    for (entity, mut deformable, aabb) in &mut q_deformables {
        if !deformable.surface.is_dirty() {
            continue;
        }
        let DeformableMesh {
            surface,
            mesh,
            collider,
        } = &mut *deformable;

        let Some(render) = meshes.get_mut(&*mesh) else {
            // the handle is strong, so the asset was removed on purpose
            warn!(?entity, "render mesh removed; deformation disabled");
            commands.entity(entity).insert(DeformDisabled {
                reason: DeformError::SinkUnavailable("render mesh asset removed".into()),
            });
            continue;
        };
        let mut collision = collider.and_then(|c| q_colliders.get_mut(c).ok());
        let result = surface.commit(
            &mut *render,
            collision.as_mut().map(|c| &mut **c as &mut dyn GeometrySink),
        );
        match result {
            Ok(CommitOutcome::Written) => {
                let bounds = surface.bounds();
                let fitted = Aabb::from_min_max(bounds.min, bounds.max);
                match aabb {
                    Some(mut aabb) => *aabb = fitted,
                    None => {
                        commands.entity(entity).insert(fitted);
                    }
                }
            }
            Ok(CommitOutcome::Clean) => {}
            Err(err) => warn!(?entity, %err, "deformable commit failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use bevy::ecs::system::RunSystemOnce;

    use super::*;

    #[test]
    fn surface_from_sphere_mesh() {
        let mesh = Mesh::from(Sphere::new(1.0));
        let surface = surface_from_mesh(&mesh, DeformConfig::new()).unwrap();
        assert_eq!(surface.vertex_count(), mesh.count_vertices());
        assert!(surface.indices().is_some());
    }

    #[test]
    fn mesh_sink_round_trip() {
        let mut mesh = Mesh::from(Cuboid::default());
        let mut surface = surface_from_mesh(&mesh, DeformConfig::new()).unwrap();
        surface.reset(); // marks dirty
        surface.commit(&mut mesh, None).unwrap();

        let written = mesh
            .attribute(Mesh::ATTRIBUTE_POSITION)
            .and_then(VertexAttributeValues::as_float3)
            .unwrap();
        let live: Vec<[f32; 3]> = surface.live_positions().map(|p| p.to_array()).collect();
        assert_eq!(written, &live[..]);
    }

    #[test]
    fn mesh_sink_rejects_wrong_length() {
        let mut mesh = Mesh::from(Cuboid::default());
        let buffer = GeometryBuffer {
            positions: &[Vec3::ZERO],
            normals: &[Vec3::Y],
            bounds: Bounds::from_points([Vec3::ZERO]),
        };
        assert!(matches!(
            mesh.write(&buffer),
            Err(DeformError::LengthMismatch { got: 1, .. })
        ));
    }

    #[test]
    fn zero_dt_keeps_queued_impacts() {
        let mut world = World::new();
        world.insert_resource(Time::<()>::default());
        let surface = MeshSurface::new(&[Vec3::ZERO], None, DeformConfig::new()).unwrap();
        let hit = ImpactEvent::new(Vec3::ZERO, Vec3::NEG_Y * 5.0, crate::deform::impact::Layer(0), 0.0);
        let entity = world
            .spawn((
                DeformableMesh {
                    surface,
                    mesh: Handle::default(),
                    collider: None,
                },
                ImpactQueue(vec![hit]),
            ))
            .id();

        world.run_system_once(step_deformables).unwrap();

        assert_eq!(world.get::<ImpactQueue>(entity).unwrap().0, vec![hit]);
        let deformable = world.get::<DeformableMesh>(entity).unwrap();
        assert_eq!(deformable.surface.last_impact_time(), None);
        assert!(!deformable.surface.is_dirty());
    }

    #[test]
    fn impact_queue_drains_in_order() {
        let mut queue = ImpactQueue::default();
        let a = ImpactEvent::new(Vec3::ZERO, Vec3::X, crate::deform::impact::Layer(0), 1.0);
        let b = ImpactEvent::new(Vec3::ZERO, Vec3::Y, crate::deform::impact::Layer(0), 2.0);
        queue.push(a);
        queue.push(b);
        let mut out = Vec::new();
        queue.drain_impacts(&mut out);
        assert!(queue.is_empty());
        assert_eq!(out, vec![a, b]);
    }
}
