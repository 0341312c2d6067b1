//! Streaming `INSERT` tokenizer

mod pattern;
mod scan;
pub mod sql;

pub use pattern::Pattern;
pub use scan::{BlockReader, CharRead, InputStream, Pos, DEFAULT_BLOCK_SIZE};
