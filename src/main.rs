use std::time::Duration;

use bevy::log::LogPlugin;
use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use bevy::transform::TransformPlugin;
use rand::Rng;

use crumple::config::{DEFAULT_FORCE_SCALE, DeformConfig, PHYSICS_HZ};
use crumple::deform::{
    CollisionMesh, DeformPlugin, DeformSource, DeformSystems, DeformableMesh, ImpactEvent,
    ImpactQueue, Layer,
};

/// How many fixed ticks the demo runs for.
const DEMO_TICKS: u32 = 360;
/// A scripted hit lands every this many ticks.
const IMPACT_EVERY: u32 = 45;
/// Relative speed range of the scripted hits (world units per second).
const IMPACT_SPEED: std::ops::Range<f32> = 6.0..18.0;
/// Mass of the thing hitting the panel; turns relative velocity into force.
const HIT_MASS: f32 = 40.0;

#[derive(Resource, Default)]
struct TickCounter(u32);

fn main() {
    let mut app = App::new();
    app
        // Headless: no window, just time, assets, transforms and logs
        .add_plugins((
            MinimalPlugins,
            AssetPlugin::default(),
            TransformPlugin,
            LogPlugin::default(),
        ))
        .init_asset::<Mesh>()
        // Fixed simulation rate, and a virtual clock that advances exactly one tick per update
        .insert_resource(Time::<Fixed>::from_hz(PHYSICS_HZ))
        .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_secs_f64(
            1.0 / PHYSICS_HZ,
        )))
        .init_resource::<TickCounter>()
        .add_plugins(DeformPlugin)
        .add_systems(Startup, spawn_demo_panel)
        // scripted "collisions" feed the queue before the deformation step
        .add_systems(FixedUpdate, scripted_impacts.before(DeformSystems::Step))
        .add_systems(FixedUpdate, report_panels.after(DeformSystems::Commit));

    app.finish();
    app.cleanup();
    for _ in 0..DEMO_TICKS {
        app.update();
    }
}

/// One sphere "panel" with a collider kept in sync.
fn spawn_demo_panel(mut commands: Commands, mut meshes: ResMut<Assets<Mesh>>) {
    let authoring = meshes.add(Mesh::from(Sphere::new(1.0)));
    let collider = commands
        .spawn((Name::new("panel collider"), CollisionMesh::default()))
        .id();

    let config = DeformConfig::new()
        .with_radius(0.6)
        .with_damage_scale(1.0)
        .with_max_deformation(0.35)
        .with_min_impact_speed(2.0)
        .with_cooldown(0.1)
        .with_spring(20.0, 4.0)
        .with_permanence(0.5)
        .with_restore_rate(0.05);

    commands.spawn((
        Name::new("panel"),
        Transform::from_xyz(0.0, 1.0, 0.0),
        DeformSource::new(authoring, config).with_collider(collider),
    ));
}

/// Every `IMPACT_EVERY` ticks hit each panel at a random spot on the unit sphere,
/// driving inward.
fn scripted_impacts(
    time: Res<Time>,
    mut ticks: ResMut<TickCounter>,
    mut q_panels: Query<(&GlobalTransform, &mut ImpactQueue)>,
) {
    ticks.0 += 1;
    if ticks.0 % IMPACT_EVERY != 0 {
        return;
    }

    let mut rng = rand::thread_rng();
    for (transform, mut queue) in &mut q_panels {
        let dir = Vec3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        )
        .try_normalize()
        .unwrap_or(Vec3::Y);
        let contact = transform.transform_point(dir);
        let relative_velocity = -dir * rng.gen_range(IMPACT_SPEED);

        queue.push(ImpactEvent::from_relative_velocity(
            contact,
            relative_velocity,
            HIT_MASS * DEFAULT_FORCE_SCALE,
            Layer(0),
            time.elapsed_secs_f64(),
        ));
    }
}

fn report_panels(
    ticks: Res<TickCounter>,
    q_panels: Query<(&Name, &DeformableMesh)>,
    q_colliders: Query<&CollisionMesh>,
) {
    if ticks.0 % 30 != 0 {
        return;
    }
    for (name, deformable) in &q_panels {
        let surface = &deformable.surface;
        let collider_revision = deformable
            .collider
            .and_then(|c| q_colliders.get(c).ok())
            .map(|c| c.revision);
        info!(
            panel = %name,
            tick = ticks.0,
            state = ?surface.state(),
            max_dent = surface.max_plastic_offset(),
            total_dent = surface.total_plastic_offset(),
            bounds = ?surface.bounds(),
            ?collider_revision,
            "panel status"
        );
    }
}
