//! Delimited output: one file per `INSERT` statement.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use encoding_rs::{EncoderResult, Encoding, UTF_16BE, UTF_16LE, UTF_8};
use log::{debug, warn};
use memchr::{memchr, memchr3};

const DELIMITER: char = '|';
const QUOTE: char = '"';
const TERMINATOR: &str = "\r\n";

/// Destination of the extracted records
pub trait Sink {
    /// Start the output of statement number `index` (first is 1)
    fn next_insert(&mut self, index: u64, table: &str) -> io::Result<()>;
    /// Append a field to the current record
    fn write_field(&mut self, value: &str) -> io::Result<()>;
    /// Terminate the current record
    fn end_record(&mut self) -> io::Result<()>;
    /// Flush buffered output
    fn flush(&mut self) -> io::Result<()>;
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn next_insert(&mut self, index: u64, table: &str) -> io::Result<()> {
        (**self).next_insert(index, table)
    }
    fn write_field(&mut self, value: &str) -> io::Result<()> {
        (**self).write_field(value)
    }
    fn end_record(&mut self) -> io::Result<()> {
        (**self).end_record()
    }
    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// `|`-delimited record serializer.
///
/// Fields are buffered until [`RecordWriter::end_record`]: a record that is
/// never terminated is never written.
pub struct RecordWriter<W> {
    out: W,
    encoding: &'static Encoding,
    record: String,
    fields: usize,
}

impl<W: Write> RecordWriter<W> {
    /// Constructor
    pub fn new(out: W, encoding: &'static Encoding) -> RecordWriter<W> {
        RecordWriter {
            out,
            encoding,
            record: String::new(),
            fields: 0,
        }
    }

    /// Append a field to the pending record
    pub fn write_field(&mut self, value: &str) {
        if self.fields > 0 {
            self.record.push(DELIMITER);
        }
        self.fields += 1;
        if needs_quotes(value) {
            self.record.push(QUOTE);
            for c in value.chars() {
                if c == QUOTE {
                    self.record.push(QUOTE);
                }
                self.record.push(c);
            }
            self.record.push(QUOTE);
        } else {
            self.record.push_str(value);
        }
    }

    /// Write the pending record
    pub fn end_record(&mut self) -> io::Result<()> {
        self.record.push_str(TERMINATOR);
        if self.encoding == UTF_8 {
            self.out.write_all(self.record.as_bytes())?;
        } else {
            let bytes = encode(&self.record, self.encoding);
            self.out.write_all(&bytes)?;
        }
        self.record.clear();
        self.fields = 0;
        Ok(())
    }

    /// Flush the underlying writer
    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    /// Underlying writer
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    /// Unwrap the underlying writer, dropping any unterminated record
    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Encode `s` in `encoding`.
///
/// encoding_rs only decodes UTF-16, so both byte orders are handled here.
/// Characters the encoding cannot represent are written as `?`.
fn encode(s: &str, encoding: &'static Encoding) -> Vec<u8> {
    if encoding == UTF_16LE || encoding == UTF_16BE {
        let mut bytes = Vec::with_capacity(s.len() * 2);
        for unit in s.encode_utf16() {
            let pair = if encoding == UTF_16LE {
                unit.to_le_bytes()
            } else {
                unit.to_be_bytes()
            };
            bytes.extend_from_slice(&pair);
        }
        return bytes;
    }
    let mut encoder = encoding.new_encoder();
    let mut bytes = Vec::with_capacity(s.len());
    let mut src = s;
    loop {
        let additional = encoder
            .max_buffer_length_from_utf8_without_replacement(src.len())
            .unwrap_or(src.len() * 4 + 16);
        bytes.reserve(additional);
        let (result, read) =
            encoder.encode_from_utf8_to_vec_without_replacement(src, &mut bytes, true);
        src = &src[read..];
        match result {
            EncoderResult::InputEmpty => return bytes,
            EncoderResult::OutputFull => {}
            EncoderResult::Unmappable(c) => {
                warn!("{c:?} cannot be encoded in {}, written as '?'", encoding.name());
                bytes.push(b'?');
            }
        }
    }
}

fn needs_quotes(value: &str) -> bool {
    let bytes = value.as_bytes();
    memchr3(DELIMITER as u8, QUOTE as u8, b'\n', bytes).is_some()
        || memchr(b'\r', bytes).is_some()
        || value.starts_with(' ')
        || value.ends_with(' ')
}

/// Writes each statement to its own file in a directory:
/// `<index>_<table>_<yyyyMMddHHmmss>.csv`
pub struct DirSink {
    dir: PathBuf,
    encoding: &'static Encoding,
    capacity: usize,
    current: Option<RecordWriter<BufWriter<File>>>,
    paths: Vec<PathBuf>,
}

impl DirSink {
    /// Default output buffer size (in bytes)
    pub const DEFAULT_CAPACITY: usize = 1 << 20;

    /// Output to `dir` (created if missing), buffering `capacity` bytes per file
    pub fn new<P: Into<PathBuf>>(
        dir: P,
        encoding: &'static Encoding,
        capacity: usize,
    ) -> io::Result<DirSink> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(DirSink {
            dir,
            encoding,
            capacity,
            current: None,
            paths: Vec::new(),
        })
    }

    /// Output directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files created so far, in statement order
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    fn current(&mut self) -> io::Result<&mut RecordWriter<BufWriter<File>>> {
        self.current
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no INSERT statement started"))
    }
}

impl Sink for DirSink {
    fn next_insert(&mut self, index: u64, table: &str) -> io::Result<()> {
        self.flush()?;
        let timestamp = Local::now().format("%Y%m%d%H%M%S");
        let path = self
            .dir
            .join(format!("{index}_{}_{timestamp}.csv", file_name(table)));
        debug!("statement #{index}: {}", path.display());
        let file = File::create(&path)?;
        let out = BufWriter::with_capacity(self.capacity, file);
        self.current = Some(RecordWriter::new(out, self.encoding));
        self.paths.push(path);
        Ok(())
    }

    fn write_field(&mut self, value: &str) -> io::Result<()> {
        self.current()?.write_field(value);
        Ok(())
    }

    fn end_record(&mut self) -> io::Result<()> {
        self.current()?.end_record()
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.current {
            Some(ref mut writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

/// Replace characters which are not allowed in file names
fn file_name(table: &str) -> String {
    table
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::{file_name, DirSink, RecordWriter, Sink};
    use encoding_rs::{UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};
    use std::fs;

    fn record(fields: &[&str]) -> String {
        let mut w = RecordWriter::new(Vec::new(), UTF_8);
        for f in fields {
            w.write_field(f);
        }
        w.end_record().unwrap();
        String::from_utf8(w.into_inner()).unwrap()
    }

    #[test]
    fn test_plain_fields() {
        assert_eq!("1|x|\r\n", record(&["1", "x", ""]));
        assert_eq!("\r\n", record(&[]));
    }

    #[test]
    fn test_quoted_fields() {
        assert_eq!("\"a|b\"|\"say \"\"hi\"\"\"\r\n", record(&["a|b", "say \"hi\""]));
        assert_eq!("\"line\nbreak\"|\"cr\r\"\r\n", record(&["line\nbreak", "cr\r"]));
        assert_eq!("\" lead\"|\"trail \"|in side\r\n", record(&[" lead", "trail ", "in side"]));
    }

    #[test]
    fn test_unterminated_record_is_dropped() {
        let mut w = RecordWriter::new(Vec::new(), UTF_8);
        w.write_field("a");
        w.end_record().unwrap();
        w.write_field("partial");
        assert_eq!(b"a\r\n", w.into_inner().as_slice());
    }

    #[test]
    fn test_encoding() {
        let mut w = RecordWriter::new(Vec::new(), WINDOWS_1252);
        w.write_field("café");
        w.end_record().unwrap();
        assert_eq!(b"caf\xE9\r\n", w.get_ref().as_slice());
    }

    #[test]
    fn test_utf16() {
        let mut w = RecordWriter::new(Vec::new(), UTF_16LE);
        w.write_field("ab");
        w.write_field("é");
        w.end_record().unwrap();
        assert_eq!(b"a\0b\0|\0\xE9\0\r\0\n\0", w.get_ref().as_slice());
        let mut w = RecordWriter::new(Vec::new(), UTF_16BE);
        w.write_field("🌍");
        w.end_record().unwrap();
        assert_eq!(b"\xD8\x3C\xDF\x0D\0\r\0\n", w.get_ref().as_slice());
    }

    #[test]
    fn test_unmappable() {
        let mut w = RecordWriter::new(Vec::new(), WINDOWS_1252);
        w.write_field("Привет");
        w.write_field("é");
        w.end_record().unwrap();
        assert_eq!(b"??????|\xE9\r\n", w.get_ref().as_slice());
    }

    #[test]
    fn test_file_name() {
        assert_eq!("db.t1", file_name("db.t1"));
        assert_eq!("a_b_c", file_name("a/b\\c"));
    }

    #[test]
    fn test_dir_sink() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("out");
        let mut sink = DirSink::new(&dir, UTF_8, 16).unwrap();
        assert!(sink.write_field("x").is_err());
        sink.next_insert(1, "t1").unwrap();
        sink.write_field("a").unwrap();
        sink.end_record().unwrap();
        sink.next_insert(2, "t/2").unwrap();
        sink.write_field("b").unwrap();
        sink.end_record().unwrap();
        sink.flush().unwrap();

        let paths = sink.paths().to_vec();
        assert_eq!(2, paths.len());
        let name = paths[1].file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("2_t_2_"), "{name}");
        assert!(name.ends_with(".csv"), "{name}");
        assert_eq!("a\r\n", fs::read_to_string(&paths[0]).unwrap());
        assert_eq!("b\r\n", fs::read_to_string(&paths[1]).unwrap());
    }
}
