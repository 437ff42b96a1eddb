pub mod normalize;
pub mod reader;
pub mod sanitize;

pub use normalize::Normalizer;
pub use reader::{ChunkReader, ReaderError};
pub use sanitize::Sanitizer;
