//! Block-buffered character input.
//!
//! The [`BlockReader`] keeps a single fixed-size block of decoded characters in
//! memory. Reading the next block overwrites the previous one in place: offsets
//! (cursors) are only meaningful for the resident block.

use log::debug;

use std::fmt;
use std::io::{self, Read};

use encoding_rs::{CoderResult, Decoder, Encoding, UTF_8};

use super::sql::Error;

/// Source of decoded characters
pub trait CharRead {
    /// Fill `buf` with the next characters of the stream.
    ///
    /// Returns the number of characters written, `0` only when the stream is
    /// exhausted.
    fn read_chars(&mut self, buf: &mut [char]) -> io::Result<usize>;
}

impl<C: CharRead + ?Sized> CharRead for &mut C {
    fn read_chars(&mut self, buf: &mut [char]) -> io::Result<usize> {
        (**self).read_chars(buf)
    }
}

/// Default block size (in characters)
pub const DEFAULT_BLOCK_SIZE: usize = 16384;

/// Raw bytes read from the inner reader at once.
const RAW_CAPACITY: usize = 8192;

/// Decodes a byte stream into characters under a given encoding.
pub struct InputStream<R> {
    /// The reader provided by the client.
    inner: R,
    decoder: Decoder,
    raw: Box<[u8]>,
    /// Decoded characters not handed out yet, from `pos`
    decoded: String,
    pos: usize,
    eof: bool,
}

impl<R: Read> InputStream<R> {
    /// UTF-8 input
    pub fn new(inner: R) -> InputStream<R> {
        Self::with_encoding(inner, UTF_8)
    }

    /// Input in the specified `encoding` (a leading BOM is skipped)
    pub fn with_encoding(inner: R, encoding: &'static Encoding) -> InputStream<R> {
        InputStream {
            inner,
            decoder: encoding.new_decoder_with_bom_removal(),
            raw: vec![0; RAW_CAPACITY].into_boxed_slice(),
            decoded: String::with_capacity(RAW_CAPACITY),
            pos: 0,
            eof: false,
        }
    }

    /// Decode the next chunk of raw input.
    /// Loops until at least one character is available or the input is exhausted.
    fn fill_decoded(&mut self) -> io::Result<()> {
        self.decoded.clear();
        self.pos = 0;
        while self.decoded.is_empty() && !self.eof {
            let n = loop {
                match self.inner.read(&mut self.raw) {
                    Ok(n) => break n,
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => return Err(e),
                }
            };
            let last = n == 0;
            self.eof = last;
            let mut src = &self.raw[..n];
            loop {
                let (result, read, _) = self.decoder.decode_to_string(src, &mut self.decoded, last);
                src = &src[read..];
                match result {
                    CoderResult::InputEmpty => break,
                    CoderResult::OutputFull => {
                        let additional = self
                            .decoder
                            .max_utf8_buffer_length(src.len())
                            .unwrap_or(src.len() * 3 + 16);
                        self.decoded.reserve(additional.max(16));
                    }
                }
            }
        }
        Ok(())
    }
}

impl<R: Read> CharRead for InputStream<R> {
    fn read_chars(&mut self, buf: &mut [char]) -> io::Result<usize> {
        let mut n = 0;
        while n < buf.len() {
            if self.pos == self.decoded.len() {
                if self.eof {
                    break;
                }
                self.fill_decoded()?;
                continue;
            }
            let mut consumed = 0;
            for c in self.decoded[self.pos..].chars().take(buf.len() - n) {
                buf[n] = c;
                n += 1;
                consumed += c.len_utf8();
            }
            self.pos += consumed;
        }
        Ok(n)
    }
}

/// Location of a token: block sequence number and offset within that block
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pos {
    /// block sequence number (first block is 0)
    pub block: u64,
    /// character offset in the block
    pub offset: usize,
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {}, offset {}", self.block, self.offset)
    }
}

/// Fixed-size character window over a [`CharRead`].
///
/// Holds at most one block: reading a new block invalidates every offset
/// into the previous one. Callers copy out what they need first.
pub struct BlockReader<R> {
    input: R,
    block: Box<[char]>,
    /// number of characters actually filled
    len: usize,
    /// sequence number of the resident block
    seq: u64,
    /// offset of the last character handed out by `peek`
    last: usize,
    eof: bool,
}

impl<R: CharRead> BlockReader<R> {
    /// Wrap `input` and eagerly read the first block.
    ///
    /// Fails with [`Error::EmptyInput`] if not even one character can be read.
    pub fn new(input: R, block_size: usize) -> Result<BlockReader<R>, Error> {
        debug_assert!(block_size > 0);
        let mut reader = BlockReader {
            input,
            block: vec!['\0'; block_size.max(1)].into_boxed_slice(),
            len: 0,
            seq: 0,
            last: 0,
            eof: false,
        };
        if !reader.fill()? {
            return Err(Error::EmptyInput);
        }
        debug!(target: "scanner", "first block: {} chars", reader.len);
        Ok(reader)
    }

    /// Read until the block is full or the stream ends.
    fn fill(&mut self) -> io::Result<bool> {
        let mut n = 0;
        while n < self.block.len() {
            let read = self.input.read_chars(&mut self.block[n..])?;
            if read == 0 {
                break;
            }
            n += read;
        }
        if n == 0 {
            self.eof = true;
            return Ok(false);
        }
        self.len = n;
        Ok(true)
    }

    /// Overwrite the resident block with the next one.
    ///
    /// Returns `false` at end of stream, in which case the resident block is
    /// left untouched.
    pub fn try_read_block(&mut self) -> io::Result<bool> {
        if self.eof || !self.fill()? {
            return Ok(false);
        }
        self.seq += 1;
        debug!(target: "scanner", "block #{}: {} chars", self.seq, self.len);
        Ok(true)
    }

    /// Character at `cursor`, reading the next block when `cursor` is past the
    /// end of the resident one.
    ///
    /// Returns the (possibly rebased) cursor with the character, or `None` at
    /// end of stream.
    pub fn peek(&mut self, cursor: usize) -> io::Result<Option<(usize, char)>> {
        let mut cursor = cursor;
        if cursor >= self.len {
            if !self.try_read_block()? {
                self.last = self.len;
                return Ok(None);
            }
            cursor = 0;
        }
        self.last = cursor;
        Ok(Some((cursor, self.block[cursor])))
    }

    /// Whether the resident block is the first of the stream
    pub fn is_first_block(&self) -> bool {
        self.seq == 0
    }

    /// Sequence number of the resident block
    pub fn block_seq(&self) -> u64 {
        self.seq
    }

    /// Filled part of the resident block
    pub fn block(&self) -> &[char] {
        &self.block[..self.len]
    }

    /// Location of `cursor` in the resident block
    pub fn position(&self, cursor: usize) -> Pos {
        Pos {
            block: self.seq,
            offset: cursor,
        }
    }

    /// Location of the last character looked at by [`BlockReader::peek`].
    ///
    /// At end of stream, the offset is the length of the last block.
    pub fn last_position(&self) -> Pos {
        self.position(self.last)
    }

    /// Copy of the resident block, for diagnostics
    pub fn dump(&self) -> String {
        self.block().iter().collect()
    }
}

impl<R> fmt::Debug for BlockReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockReader")
            .field("capacity", &self.block.len())
            .field("len", &self.len)
            .field("seq", &self.seq)
            .field("last", &self.last)
            .field("eof", &self.eof)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::{BlockReader, CharRead, InputStream, Pos};
    use crate::lexer::sql::Error;
    use encoding_rs::{UTF_16LE, WINDOWS_1251, WINDOWS_1252};
    use std::io::{self, Read};

    /// Hands out one byte per read
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.split_first() {
                Some((b, rest)) if !buf.is_empty() => {
                    buf[0] = *b;
                    self.0 = rest;
                    Ok(1)
                }
                _ => Ok(0),
            }
        }
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "boom"))
        }
    }

    fn read_all<C: CharRead>(mut input: C, chunk: usize) -> String {
        let mut buf = vec!['\0'; chunk];
        let mut s = String::new();
        loop {
            let n = input.read_chars(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            s.extend(&buf[..n]);
        }
        s
    }

    #[test]
    fn test_decode_utf8_split_sequences() {
        let text = "naïve 字 🌍 done";
        let input = InputStream::new(Trickle(text.as_bytes()));
        assert_eq!(text, read_all(input, 3));
    }

    #[test]
    fn test_decode_with_bom() {
        let input = InputStream::new(&b"\xEF\xBB\xBFabc"[..]);
        assert_eq!("abc", read_all(input, 16));
    }

    #[test]
    fn test_decode_single_byte_encodings() {
        let input = InputStream::with_encoding(&b"caf\xE9"[..], WINDOWS_1252);
        assert_eq!("café", read_all(input, 2));
        let input = InputStream::with_encoding(&b"\xCF\xF0\xE8"[..], WINDOWS_1251);
        assert_eq!("При", read_all(input, 1));
    }

    #[test]
    fn test_decode_utf16() {
        let input = InputStream::with_encoding(Trickle(b"h\0i\0"), UTF_16LE);
        assert_eq!("hi", read_all(input, 8));
    }

    #[test]
    fn test_empty_input() {
        let r = BlockReader::new(InputStream::new(&b""[..]), 4);
        assert!(matches!(r, Err(Error::EmptyInput)));
    }

    #[test]
    fn test_io_error() {
        let r = BlockReader::new(InputStream::new(Broken), 4);
        assert!(matches!(r, Err(Error::Io(_))));
    }

    #[test]
    fn test_blocks() {
        let mut r = BlockReader::new(InputStream::new(Trickle(b"abcdefghij")), 4).unwrap();
        assert!(r.is_first_block());
        assert_eq!(0, r.block_seq());
        assert_eq!(['a', 'b', 'c', 'd'], r.block());
        assert!(r.try_read_block().unwrap());
        assert!(!r.is_first_block());
        assert_eq!(['e', 'f', 'g', 'h'], r.block());
        assert!(r.try_read_block().unwrap());
        assert_eq!(2, r.block_seq());
        // short block only at end of stream
        assert_eq!(['i', 'j'], r.block());
        assert!(!r.try_read_block().unwrap());
        assert!(!r.try_read_block().unwrap());
        assert_eq!(2, r.block_seq());
        assert_eq!("ij", r.dump());
    }

    #[test]
    fn test_peek_refills() {
        let mut r = BlockReader::new(InputStream::new(&b"abc"[..]), 2).unwrap();
        assert_eq!(Some((1, 'b')), r.peek(1).unwrap());
        assert_eq!(Some((0, 'c')), r.peek(2).unwrap());
        assert_eq!(1, r.block_seq());
        assert_eq!(None, r.peek(1).unwrap());
        assert_eq!(1, r.block_seq());
    }

    #[test]
    fn test_last_position() {
        let mut r = BlockReader::new(InputStream::new(&b"abcde"[..]), 3).unwrap();
        r.peek(1).unwrap();
        assert_eq!(Pos { block: 0, offset: 1 }, r.last_position());
        // refill rebases the offset into the new block
        r.peek(3).unwrap();
        assert_eq!(Pos { block: 1, offset: 0 }, r.last_position());
        assert_eq!(None, r.peek(2).unwrap());
        assert_eq!(Pos { block: 1, offset: 2 }, r.last_position());
        assert_eq!("de", r.dump());
    }
}
