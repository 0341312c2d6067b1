//! Keyword patterns matched over the block stream.
//!
//! A pattern is literal text compared case-insensitively, with two wildcards:
//! * `*`: zero or more whitespace characters,
//! * `+`: start of input or one or more whitespace characters.
//!
//! Matching is a single forward pass: on mismatch the pattern restarts from
//! its first atom at the offending character. For patterns starting with `+`,
//! a word that repeats the beginning of the first word resumes inside it
//! (`-- INSERT\nINSERT INTO`). There is no general failure function, so this
//! is only suited to short fixed patterns.

use std::fmt;
use std::io;

use log::debug;

use super::scan::{BlockReader, CharRead};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Atom {
    /// ASCII-uppercased literal
    Char(char),
    /// `*`
    Spaces,
    /// `+`
    Separator,
}

/// Compiled pattern
#[derive(Clone, PartialEq, Eq)]
pub struct Pattern {
    atoms: Box<[Atom]>,
}

impl Pattern {
    /// Compile `pattern`
    pub fn new(pattern: &str) -> Pattern {
        debug_assert!(!pattern.is_empty());
        let atoms = pattern
            .chars()
            .map(|c| match c {
                '*' => Atom::Spaces,
                '+' => Atom::Separator,
                c => Atom::Char(c.to_ascii_uppercase()),
            })
            .collect();
        Pattern { atoms }
    }

    /// Scan forward from `cursor` for the first occurrence of the pattern.
    ///
    /// Returns the cursor right after the match (in the block where the match
    /// ended), or `None` if the stream ends first.
    pub fn find<R: CharRead>(
        &self,
        reader: &mut BlockReader<R>,
        cursor: usize,
    ) -> io::Result<Option<usize>> {
        self.run(reader, cursor, false)
    }

    /// Like [`Pattern::find`] but the match must start at `cursor`.
    pub fn match_at<R: CharRead>(
        &self,
        reader: &mut BlockReader<R>,
        cursor: usize,
    ) -> io::Result<Option<usize>> {
        self.run(reader, cursor, true)
    }

    fn run<R: CharRead>(
        &self,
        reader: &mut BlockReader<R>,
        mut cursor: usize,
        anchored: bool,
    ) -> io::Result<Option<usize>> {
        let end = self.atoms.len();
        let mut i = 0;
        // whitespace (or start of input) seen to the left
        let mut spaced = reader.is_first_block() && cursor == 0;
        // no character consumed by the current attempt yet
        let mut fresh = true;
        // first atom of the current word, if it follows a `+`
        let mut word_start = None;
        // literal atoms matched in the current word
        let mut word = 0;
        loop {
            let Some((at, c)) = reader.peek(cursor)? else {
                let matched = self.satisfied_at_end(i, spaced);
                if !matched && i > 1 {
                    debug!(target: "scanner", "end of input inside {self:?}");
                }
                return Ok(matched.then_some(cursor));
            };
            cursor = at;
            match self.atoms[i] {
                Atom::Spaces => {
                    if c.is_whitespace() {
                        cursor += 1;
                        fresh = false;
                    } else {
                        i += 1;
                        word_start = None;
                        if i == end {
                            return Ok(Some(cursor));
                        }
                    }
                    continue;
                }
                Atom::Separator => {
                    if c.is_whitespace() {
                        spaced = true;
                        cursor += 1;
                        fresh = false;
                        continue;
                    }
                    if spaced {
                        spaced = false;
                        i += 1;
                        word_start = Some(i);
                        word = 0;
                        if i == end {
                            return Ok(Some(cursor));
                        }
                        continue;
                    }
                }
                Atom::Char(expected) => {
                    if c.to_ascii_uppercase() == expected {
                        spaced = false;
                        cursor += 1;
                        fresh = false;
                        i += 1;
                        word += 1;
                        if i == end {
                            return Ok(Some(cursor));
                        }
                        continue;
                    }
                }
            }
            // mismatch
            if anchored {
                return Ok(None);
            }
            if let Some(k) = self.resume(word_start, word) {
                // retry the offending character inside the first word
                i = k;
                word_start = Some(1);
                spaced = false;
                continue;
            }
            i = 0;
            word_start = None;
            word = 0;
            if fresh {
                spaced = c.is_whitespace();
                cursor += 1;
            } else {
                // retry the offending character against the first atom
                spaced = false;
                fresh = true;
            }
        }
    }

    /// Atom to resume from when the `word` literals matched from `word_start`
    /// also start the first word of a pattern beginning with `+`
    fn resume(&self, word_start: Option<usize>, word: usize) -> Option<usize> {
        let start = word_start.filter(|&start| start > 1)?;
        if self.atoms[0] != Atom::Separator {
            return None;
        }
        (self.atoms[1..=word] == self.atoms[start..start + word]).then_some(1 + word)
    }

    /// Can the atoms from `i` match the empty end of input?
    fn satisfied_at_end(&self, i: usize, spaced: bool) -> bool {
        self.atoms[i..]
            .iter()
            .enumerate()
            .all(|(k, atom)| match atom {
                Atom::Spaces => true,
                Atom::Separator => k == 0 && spaced,
                Atom::Char(_) => false,
            })
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: String = self
            .atoms
            .iter()
            .map(|atom| match atom {
                Atom::Char(c) => *c,
                Atom::Spaces => '*',
                Atom::Separator => '+',
            })
            .collect();
        f.debug_tuple("Pattern").field(&s).finish()
    }
}
