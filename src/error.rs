#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("zero-size request")]
  ZeroSize,

  #[error("requested size overflows usize")]
  SizeOverflow,

  #[error("out of memory: requested {requested} bytes, {available} available")]
  OutOfMemory { requested: usize, available: usize },

  #[error("heap break moved by a foreign caller, arena is no longer contiguous")]
  NonContiguous,

  #[error("invalid config: {0}")]
  InvalidConfig(String),

  #[error("memory provider: {0}")]
  Provider(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
