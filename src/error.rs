use thiserror::Error;


/// Failures surfaced by network construction, inference and training.

#[derive(Error, Debug)]
pub enum Error {
  /// The architecture table has no entry of the requested kind
  /// under this name.
  #[error("layer '{0}' has no matching entry in the network table")]
  UnknownLayer(String),

  #[error("shape mismatch for {what}: expected {expected:?}, got {got:?}")]
  ShapeMismatch {
    what: String,
    expected: Vec<usize>,
    got: Vec<usize>,
  },

  #[error("snapshot error: {0}")]
  SnapshotLoad(String),

  #[error("image error: {0}")]
  Image(#[from] image::ImageError),

  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
