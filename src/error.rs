//! Error types for surface creation, configuration and commit.

use thiserror::Error;

pub type Result<T, E = DeformError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeformError {
    /// The source geometry has no vertices (or no position attribute).
    #[error("source geometry has no vertex positions")]
    MissingGeometry,
    /// A source vertex is NaN or infinite.
    #[error("source vertex {index} is not finite")]
    InvalidGeometry { index: usize },
    #[error("triangle index {index} out of range (vertex count: {count})")]
    IndexOutOfRange { index: u32, count: usize },
    #[error("invalid deformation config: {field} = {value}")]
    InvalidConfig { field: &'static str, value: f32 },
    /// A geometry sink could not accept the buffer (asset unloaded, entity gone...).
    #[error("geometry sink unavailable: {0}")]
    SinkUnavailable(String),
    #[error("buffer length {got} does not match vertex count {expected}")]
    LengthMismatch { expected: usize, got: usize },
    /// The local-to-world transform cannot be inverted (zero scale, NaN...).
    #[error("local-to-world transform is not invertible")]
    SingularTransform,
}
