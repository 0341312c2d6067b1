//! Streaming conversion of SQL `INSERT` statements to delimited files
#![warn(missing_docs)]

pub mod convert;
pub mod dialect;
// The block reader feeds the tokenizer which feeds the converter.
pub mod lexer;
pub mod writer;

pub use convert::{Converter, Statement};
pub use dialect::Dialect;
pub use fallible_iterator::FallibleIterator;
