//! Impact deformation for meshes.
//!
//! Each vertex of a [`MeshSurface`] springs toward a plastic baseline that
//! impacts push around (clamped to a maximum dent) and that slowly heals back
//! to the original shape. Dirty surfaces are committed to a render sink and an
//! optional collision sink once per tick.
//!
//! The core ([`deform::surface`], [`deform::impact`], [`deform::spring`],
//! [`deform::restore`], [`deform::commit`], [`deform::body`]) only needs
//! vector math; [`DeformPlugin`] drives it from Bevy's fixed timestep.

pub mod config;
pub mod deform;
pub mod error;

pub use config::DeformConfig;
pub use deform::{
    CollisionSource, DeformPlugin, DeformSystems, DeformableBody, GeometrySink, ImpactEvent,
    ImpactOutcome, Layer, LayerMask, MeshSurface, SurfaceState,
};
pub use error::{DeformError, Result};
