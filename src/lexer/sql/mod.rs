//! Tokenizer of `INSERT INTO t (cols) VALUES (..), (..);` statements.
//!
//! Each operation starts at a cursor in the resident block and either fails or
//! returns the cursor where the next operation starts, possibly in a later block.
use std::fmt;

use bitflags::bitflags;
use log::trace;

use crate::dialect::{is_primitive, Dialect};
use crate::lexer::pattern::Pattern;
use crate::lexer::scan::{BlockReader, CharRead, Pos};

mod error;

pub use error::{Diagnostic, Error};

const INSERT_START_PATTERN: &str = "+INSERT+INTO+";
const LAST_COLUMN_NAME_PATTERN: &str = "*)*VALUES*";
const VALUES_PATTERN: &str = "VALUES*";

/// What follows a list item
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListPosition {
    /// more items follow
    Next,
    /// the list has ended
    End,
}

/// Data extracted by a token
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// table name, column name or row value
    Value(String),
    /// list classification
    Position(ListPosition),
}

/// Token parsing result
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// token does not match
    Failed,
    /// token matches, next one starts at cursor
    Matched(usize),
    /// token matches with some data
    MatchedWith(usize, Payload),
}

impl Outcome {
    /// Cursor after the token, if matched
    pub fn cursor(&self) -> Option<usize> {
        match *self {
            Outcome::Failed => None,
            Outcome::Matched(cursor) | Outcome::MatchedWith(cursor, _) => Some(cursor),
        }
    }

    /// Extracted string, if any
    pub fn into_value(self) -> Option<(usize, String)> {
        match self {
            Outcome::MatchedWith(cursor, Payload::Value(value)) => Some((cursor, value)),
            _ => None,
        }
    }

    /// List classification, if any
    pub fn into_position(self) -> Option<(usize, ListPosition)> {
        match self {
            Outcome::MatchedWith(cursor, Payload::Position(position)) => Some((cursor, position)),
            _ => None,
        }
    }
}

/// Token kinds, named after the operations of the [`Tokenizer`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// `INSERT INTO`
    InsertStart,
    /// table name
    TableName,
    /// `(` or `VALUES`
    ColumnNamesStart,
    /// column name
    ColumnName,
    /// `,` or `) VALUES`
    LookAfterColumnName,
    /// `(`
    RowStart,
    /// row value
    RowValue,
    /// `,` or `)`
    LookAfterRowValue,
    /// `,` or `;`
    LookAfterRow,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

bitflags! {
    /// Characters allowed right after a value
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Stop: u8 {
        /// `,`
        const COMMA = 1;
        /// `(`
        const LP = 1 << 1;
        /// `)`
        const RP = 1 << 2;
        /// first letter of the `VALUES` keyword
        const VALUES = 1 << 3;
    }
}

impl Stop {
    fn admits(self, c: char) -> bool {
        match c {
            ',' => self.contains(Stop::COMMA),
            '(' => self.contains(Stop::LP),
            ')' => self.contains(Stop::RP),
            'V' | 'v' => self.contains(Stop::VALUES),
            _ => false,
        }
    }
}

/// Progress counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParserState {
    inserts_captured: u64,
    last_insert_rows: u64,
    total_rows: u64,
}

impl ParserState {
    /// `INSERT` statements found so far
    pub fn inserts_captured(&self) -> u64 {
        self.inserts_captured
    }
    /// Rows of the current (or last) statement
    pub fn last_insert_rows(&self) -> u64 {
        self.last_insert_rows
    }
    /// Rows of all statements
    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }
}

/// Streaming tokenizer over a [`BlockReader`]
pub struct Tokenizer<R> {
    reader: BlockReader<R>,
    dialect: Dialect,
    insert_start: Pattern,
    last_column_name: Pattern,
    values: Pattern,
    state: ParserState,
}

impl<R: CharRead> Tokenizer<R> {
    /// Constructor
    pub fn new(reader: BlockReader<R>, dialect: Dialect) -> Tokenizer<R> {
        Tokenizer {
            reader,
            dialect,
            insert_start: Pattern::new(INSERT_START_PATTERN),
            last_column_name: Pattern::new(LAST_COLUMN_NAME_PATTERN),
            values: Pattern::new(VALUES_PATTERN),
            state: ParserState::default(),
        }
    }

    /// Counters
    pub fn state(&self) -> &ParserState {
        &self.state
    }

    /// Dialect in use
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Location of `cursor` in the resident block
    pub fn position(&self, cursor: usize) -> Pos {
        self.reader.position(cursor)
    }

    /// Location where the last operation stopped reading, in the resident block
    pub fn stop_position(&self) -> Pos {
        self.reader.last_position()
    }

    /// Copy of the resident block
    pub fn dump(&self) -> String {
        self.reader.dump()
    }

    /// Find the next `INSERT INTO`.
    ///
    /// `Failed` when the input ends first: there are no more statements.
    pub fn insert_start(&mut self, cursor: usize) -> Result<Outcome, Error> {
        let outcome = match self.insert_start.find(&mut self.reader, cursor)? {
            Some(cursor) => {
                self.state.inserts_captured += 1;
                self.state.last_insert_rows = 0;
                Outcome::Matched(cursor)
            }
            None => Outcome::Failed,
        };
        trace!("InsertStart: {outcome:?}");
        Ok(outcome)
    }

    /// Table name, followed by `(` or `VALUES`
    pub fn table_name(&mut self, cursor: usize) -> Result<Outcome, Error> {
        let quote = self.dialect.id_quote;
        self.value(cursor, quote, Stop::LP | Stop::VALUES)
    }

    /// Start of the column list.
    ///
    /// [`ListPosition::Next`] when a column list follows,
    /// [`ListPosition::End`] when there is none and the cursor is already past
    /// `VALUES`.
    pub fn column_names_start(&mut self, cursor: usize) -> Result<Outcome, Error> {
        let Some((cursor, c)) = self.skip_whitespace(cursor)? else {
            return Ok(Outcome::Failed);
        };
        if c == '(' {
            return Ok(Outcome::MatchedWith(
                cursor + 1,
                Payload::Position(ListPosition::Next),
            ));
        }
        Ok(match self.values.match_at(&mut self.reader, cursor)? {
            Some(cursor) => Outcome::MatchedWith(cursor, Payload::Position(ListPosition::End)),
            None => Outcome::Failed,
        })
    }

    /// Column name, followed by `,` or `)`
    pub fn column_name(&mut self, cursor: usize) -> Result<Outcome, Error> {
        let quote = self.dialect.id_quote;
        self.value(cursor, quote, Stop::COMMA | Stop::RP)
    }

    /// `,` (more columns) or `) VALUES` (end of column list)
    pub fn look_after_column_name(&mut self, cursor: usize) -> Result<Outcome, Error> {
        let Some((cursor, c)) = self.skip_whitespace(cursor)? else {
            return Ok(Outcome::Failed);
        };
        if c == ',' {
            return Ok(Outcome::MatchedWith(
                cursor + 1,
                Payload::Position(ListPosition::Next),
            ));
        }
        Ok(
            match self.last_column_name.match_at(&mut self.reader, cursor)? {
                Some(cursor) => Outcome::MatchedWith(cursor, Payload::Position(ListPosition::End)),
                None => Outcome::Failed,
            },
        )
    }

    /// `(` opening a row
    pub fn row_start(&mut self, cursor: usize) -> Result<Outcome, Error> {
        Ok(match self.skip_whitespace(cursor)? {
            Some((cursor, '(')) => Outcome::Matched(cursor + 1),
            _ => Outcome::Failed,
        })
    }

    /// Row value, followed by `,` or `)`
    pub fn row_value(&mut self, cursor: usize) -> Result<Outcome, Error> {
        let quote = self.dialect.value_quote;
        self.value(cursor, quote, Stop::COMMA | Stop::RP)
    }

    /// `,` (more values) or `)` (end of row).
    ///
    /// The end of a row is counted in [`ParserState`].
    pub fn look_after_row_value(&mut self, cursor: usize) -> Result<Outcome, Error> {
        Ok(match self.skip_whitespace(cursor)? {
            Some((cursor, ',')) => {
                Outcome::MatchedWith(cursor + 1, Payload::Position(ListPosition::Next))
            }
            Some((cursor, ')')) => {
                self.state.last_insert_rows += 1;
                self.state.total_rows += 1;
                Outcome::MatchedWith(cursor + 1, Payload::Position(ListPosition::End))
            }
            _ => Outcome::Failed,
        })
    }

    /// `,` (more rows) or `;` (end of statement)
    pub fn look_after_row(&mut self, cursor: usize) -> Result<Outcome, Error> {
        Ok(match self.skip_whitespace(cursor)? {
            Some((cursor, ',')) => {
                Outcome::MatchedWith(cursor + 1, Payload::Position(ListPosition::Next))
            }
            Some((cursor, ';')) => {
                Outcome::MatchedWith(cursor + 1, Payload::Position(ListPosition::End))
            }
            _ => Outcome::Failed,
        })
    }

    /// First non-whitespace character from `cursor`
    fn skip_whitespace(&mut self, mut cursor: usize) -> Result<Option<(usize, char)>, Error> {
        loop {
            match self.reader.peek(cursor)? {
                Some((at, c)) if c.is_whitespace() => cursor = at + 1,
                other => return Ok(other),
            }
        }
    }

    /// Extract one scalar: quoted (optionally prefixed, like `N'..'`) or
    /// primitive, which must be followed by a character of `stop`.
    ///
    /// The cursor of the result points at the stop character.
    fn value(&mut self, cursor: usize, quote: char, stop: Stop) -> Result<Outcome, Error> {
        let Some((mut cursor, first)) = self.skip_whitespace(cursor)? else {
            return Ok(Outcome::Failed);
        };
        cursor += 1;
        let mut value = String::new();
        let quoted = if first == quote {
            true
        } else if first.is_alphanumeric() {
            // alphanumeric run, which may be the prefix of a quoted literal
            value.push(first);
            loop {
                match self.reader.peek(cursor)? {
                    Some((at, c)) if c == quote => {
                        value.clear();
                        cursor = at + 1;
                        break true;
                    }
                    Some((at, c)) if c.is_alphanumeric() => {
                        value.push(c);
                        cursor = at + 1;
                    }
                    Some((at, _)) => {
                        cursor = at;
                        break false;
                    }
                    None => break false,
                }
            }
        } else if is_primitive(first) {
            value.push(first);
            false
        } else {
            return Ok(Outcome::Failed);
        };

        let outcome = if quoted {
            match self.quoted(cursor, quote, &mut value)? {
                Some(cursor) => self.end(cursor, value, stop, false)?,
                None => Outcome::Failed,
            }
        } else {
            let cursor = self.primitive(cursor, &mut value)?;
            self.end(cursor, value, stop, true)?
        };
        trace!("value: {outcome:?}");
        Ok(outcome)
    }

    /// Body of a quoted value, up to and including the closing quote
    fn quoted(
        &mut self,
        mut cursor: usize,
        quote: char,
        value: &mut String,
    ) -> Result<Option<usize>, Error> {
        let escape = self.dialect.escape;
        loop {
            let Some((at, c)) = self.reader.peek(cursor)? else {
                return Ok(None);
            };
            cursor = at + 1;
            if c == quote {
                // a doubled quote stands for itself
                match self.reader.peek(cursor)? {
                    Some((at, c)) if c == quote => {
                        value.push(quote);
                        cursor = at + 1;
                    }
                    Some((at, _)) => return Ok(Some(at)),
                    None => return Ok(Some(cursor)),
                }
            } else if c == escape {
                let Some((at, c)) = self.reader.peek(cursor)? else {
                    return Ok(None);
                };
                value.push(c);
                cursor = at + 1;
            } else {
                value.push(c);
            }
        }
    }

    /// Rest of a primitive value
    fn primitive(&mut self, mut cursor: usize, value: &mut String) -> Result<usize, Error> {
        loop {
            match self.reader.peek(cursor)? {
                Some((at, c)) if is_primitive(c) => {
                    value.push(c);
                    cursor = at + 1;
                }
                Some((at, _)) => return Ok(at),
                None => return Ok(cursor),
            }
        }
    }

    /// Check that the value is followed by a stop character
    fn end(
        &mut self,
        cursor: usize,
        value: String,
        stop: Stop,
        nullable: bool,
    ) -> Result<Outcome, Error> {
        match self.skip_whitespace(cursor)? {
            Some((cursor, c)) if stop.admits(c) => {
                let value = if nullable && value == self.dialect.null_value {
                    String::new()
                } else {
                    value
                };
                Ok(Outcome::MatchedWith(cursor, Payload::Value(value)))
            }
            _ => Ok(Outcome::Failed),
        }
    }
}

impl<R> fmt::Debug for Tokenizer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokenizer")
            .field("reader", &self.reader)
            .field("dialect", &self.dialect)
            .field("state", &self.state)
            .finish()
    }
}
