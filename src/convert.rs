//! Statement-by-statement conversion driver.

use fallible_iterator::FallibleIterator;
use log::{info, warn};

use crate::dialect::Dialect;
use crate::lexer::{BlockReader, CharRead};
use crate::lexer::sql::{Error, ListPosition, Outcome, ParserState, TokenKind, Tokenizer};
use crate::writer::Sink;

/// Summary of a converted `INSERT` statement
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Statement {
    /// statement number, from 1
    pub index: u64,
    /// table name
    pub table: String,
    /// number of columns in the header record (0 when there is no column list)
    pub columns: usize,
    /// number of row records
    pub rows: u64,
}

/// Feeds the records of each `INSERT` statement to a [`Sink`].
///
/// Each call to `next` converts one statement. Conversion stops at the first
/// malformed statement; records already handed to the sink are kept.
pub struct Converter<R, S> {
    tokenizer: Tokenizer<R>,
    sink: S,
    cursor: usize,
    done: bool,
}

impl<R: CharRead, S: Sink> Converter<R, S> {
    /// Read the first block of `input` and prepare the conversion
    pub fn new(
        input: R,
        block_size: usize,
        dialect: Dialect,
        sink: S,
    ) -> Result<Converter<R, S>, Error> {
        let reader = BlockReader::new(input, block_size)?;
        Ok(Converter {
            tokenizer: Tokenizer::new(reader, dialect),
            sink,
            cursor: 0,
            done: false,
        })
    }

    /// Counters
    pub fn state(&self) -> &ParserState {
        self.tokenizer.state()
    }

    /// Output
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Unwrap the output
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Structural failure, located where the tokenizer stopped
    fn unexpected(&self, token: TokenKind) -> Error {
        Error::unexpected(token, self.tokenizer.stop_position(), self.tokenizer.dump())
    }

    fn value(&self, outcome: Outcome, token: TokenKind) -> Result<(usize, String), Error> {
        outcome.into_value().ok_or_else(|| self.unexpected(token))
    }

    fn list_position(
        &self,
        outcome: Outcome,
        token: TokenKind,
    ) -> Result<(usize, ListPosition), Error> {
        outcome.into_position().ok_or_else(|| self.unexpected(token))
    }

    /// Convert the statement whose `INSERT INTO` ends at `cursor`
    fn statement(&mut self, cursor: usize) -> Result<Statement, Error> {
        let outcome = self.tokenizer.table_name(cursor)?;
        let (cursor, table) = self.value(outcome, TokenKind::TableName)?;

        let index = self.tokenizer.state().inserts_captured();
        self.sink.next_insert(index, &table)?;

        let outcome = self.tokenizer.column_names_start(cursor)?;
        let (mut cursor, list) = self.list_position(outcome, TokenKind::ColumnNamesStart)?;
        let mut columns = 0;
        if list == ListPosition::Next {
            loop {
                let outcome = self.tokenizer.column_name(cursor)?;
                let (next, name) = self.value(outcome, TokenKind::ColumnName)?;
                self.sink.write_field(&name)?;
                columns += 1;

                let outcome = self.tokenizer.look_after_column_name(next)?;
                let (next, list) = self.list_position(outcome, TokenKind::LookAfterColumnName)?;
                cursor = next;
                if list == ListPosition::End {
                    self.sink.end_record()?;
                    break;
                }
            }
        }

        loop {
            let outcome = self.tokenizer.row_start(cursor)?;
            cursor = outcome
                .cursor()
                .ok_or_else(|| self.unexpected(TokenKind::RowStart))?;
            loop {
                let outcome = self.tokenizer.row_value(cursor)?;
                let (next, value) = self.value(outcome, TokenKind::RowValue)?;
                self.sink.write_field(&value)?;

                let outcome = self.tokenizer.look_after_row_value(next)?;
                let (next, list) = self.list_position(outcome, TokenKind::LookAfterRowValue)?;
                cursor = next;
                if list == ListPosition::End {
                    self.sink.end_record()?;
                    break;
                }
            }

            let outcome = self.tokenizer.look_after_row(cursor)?;
            let (next, list) = self.list_position(outcome, TokenKind::LookAfterRow)?;
            cursor = next;
            if list == ListPosition::End {
                break;
            }
        }

        self.cursor = cursor;
        let rows = self.tokenizer.state().last_insert_rows();
        info!("INSERT statement #{index} into {table}: {rows} rows");
        Ok(Statement {
            index,
            table,
            columns,
            rows,
        })
    }
}

impl<R: CharRead, S: Sink> FallibleIterator for Converter<R, S> {
    type Item = Statement;
    type Error = Error;

    fn next(&mut self) -> Result<Option<Statement>, Error> {
        if self.done {
            return Ok(None);
        }
        let cursor = match self.tokenizer.insert_start(self.cursor) {
            Ok(Outcome::Matched(cursor)) => cursor,
            Ok(_) => {
                self.done = true;
                self.sink.flush()?;
                return Ok(None);
            }
            Err(err) => {
                self.done = true;
                return Err(err);
            }
        };
        match self.statement(cursor) {
            Ok(statement) => Ok(Some(statement)),
            Err(err) => {
                self.done = true;
                // keep what has been converted so far
                if let Err(e) = self.sink.flush() {
                    warn!("cannot flush output: {e}");
                }
                Err(err)
            }
        }
    }
}
