use std::error;
use std::fmt;
use std::io;

use super::TokenKind;
use crate::lexer::scan::Pos;

/// Conversion errors
#[non_exhaustive]
#[derive(Debug)]
pub enum Error {
    /// I/O Error
    Io(io::Error),
    /// Not even one block could be read from the input
    EmptyInput,
    /// An expected token did not match at its position
    UnexpectedToken(Box<Diagnostic>),
}

/// Context captured when a token fails to match
#[derive(Debug)]
pub struct Diagnostic {
    /// token being parsed
    pub token: TokenKind,
    /// where the tokenizer stopped, in the dumped block
    pub pos: Pos,
    /// raw content of the resident block
    pub block: String,
}

impl Error {
    pub(crate) fn unexpected(token: TokenKind, pos: Pos, block: String) -> Error {
        Error::UnexpectedToken(Box::new(Diagnostic { token, pos, block }))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(ref err) => err.fmt(f),
            Self::EmptyInput => f.write_str("it is not possible to read at least one data block"),
            Self::UnexpectedToken(d) => write!(f, "error during token {} at {}", d.token, d.pos),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}
