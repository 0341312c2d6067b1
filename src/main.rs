use std::fs::File;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::builder::RangedU64ValueParser;
use clap::Parser;
use encoding_rs::Encoding;
use log::debug;

use sql_insert2csv::lexer::sql::Error;
use sql_insert2csv::lexer::{InputStream, DEFAULT_BLOCK_SIZE};
use sql_insert2csv::writer::DirSink;
use sql_insert2csv::{Converter, Dialect, FallibleIterator};

/// SQL INSERT statements to CSV converter.
/// A .sql dump is expected for input.
#[derive(Debug, Parser)]
#[command(name = "insert2csv", version, about)]
struct Args {
    /// Input file path
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Output dir path
    #[arg(short, long, value_name = "DIR")]
    output_dir: PathBuf,

    /// Input encoding (charset)
    #[arg(short = 'c', long, default_value = "utf-8")]
    input_enc: String,

    /// Output encoding (charset)
    #[arg(short = 'C', long, default_value = "utf-8")]
    output_enc: String,

    /// Identifier (table/column name) quote char
    #[arg(short = 'q', long, default_value_t = '`')]
    id_quote: char,

    /// Column value quote char
    #[arg(short = 'Q', long, default_value_t = '\'')]
    val_quote: char,

    /// Escape char
    #[arg(short, long, default_value_t = '\\')]
    escape: char,

    /// Null value string
    #[arg(short, long, default_value = "NULL")]
    null_val: String,

    /// Input buffer size (characters number)
    #[arg(short = 'b', long, default_value_t = DEFAULT_BLOCK_SIZE,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    buffer_input: usize,

    /// Output buffer size (bytes number)
    #[arg(short = 'B', long, default_value_t = DirSink::DEFAULT_CAPACITY,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    buffer_output: usize,

    /// Shows the number of rows in each INSERT statement
    #[arg(short, long)]
    show_rows_count: bool,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn dialect(&self) -> Dialect {
        Dialect {
            id_quote: self.id_quote,
            value_quote: self.val_quote,
            escape: self.escape,
            null_value: self.null_val.clone(),
        }
    }

    /// Initialize logging based on verbosity level
    fn init_logging(&self) {
        let log_level = match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
            .init();
    }
}

fn encoding(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.as_bytes()).with_context(|| format!("unknown encoding: {label}"))
}

fn run(args: &Args) -> Result<()> {
    let started = Instant::now();

    let input_enc = encoding(&args.input_enc)?;
    let output_enc = encoding(&args.output_enc)?;
    let file = File::open(&args.input)
        .with_context(|| format!("cannot open input: {}", args.input.display()))?;
    let sink = DirSink::new(&args.output_dir, output_enc, args.buffer_output).with_context(|| {
        format!("cannot create output dir: {}", args.output_dir.display())
    })?;
    let input = InputStream::with_encoding(file, input_enc);
    let mut converter = Converter::new(input, args.buffer_input, args.dialect(), sink)
        .with_context(|| format!("cannot read input: {}", args.input.display()))?;

    loop {
        let statement = match converter.next() {
            Ok(Some(statement)) => statement,
            Ok(None) => break,
            Err(err) => {
                if let Error::UnexpectedToken(ref diagnostic) = err {
                    debug!("block dump:\n{}", diagnostic.block);
                }
                let index = converter.state().inserts_captured();
                return Err(err).with_context(|| format!("INSERT statement #{index}"));
            }
        };
        if args.show_rows_count {
            println!(
                "INSERT statement #{} done. Rows: {}",
                statement.index, statement.rows
            );
        }
    }
    println!("There are no more INSERT statements.");

    println!(
        "Done. Total rows {}. Time elapsed: {:?}",
        converter.state().total_rows(),
        started.elapsed()
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    args.init_logging();
    debug!("Arguments: {args:?}");
    run(&args)
}

#[cfg(test)]
mod tests {
    use super::Args;
    use clap::{CommandFactory, Parser};

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["insert2csv", "-i", "dump.sql", "-o", "out"]).unwrap();
        let dialect = args.dialect();
        assert_eq!(dialect, sql_insert2csv::Dialect::default());
        assert_eq!(16384, args.buffer_input);
        assert_eq!(1048576, args.buffer_output);
        assert!(!args.show_rows_count);
    }

    #[test]
    fn test_options() {
        let args = Args::try_parse_from([
            "insert2csv", "-i", "dump.sql", "-o", "out", "-q", "\"", "-Q", "\"", "-e", "^", "-n",
            "\\N", "-b", "4", "-s",
        ])
        .unwrap();
        let dialect = args.dialect();
        assert_eq!('"', dialect.id_quote);
        assert_eq!('"', dialect.value_quote);
        assert_eq!('^', dialect.escape);
        assert_eq!("\\N", dialect.null_value);
        assert_eq!(4, args.buffer_input);
        assert!(args.show_rows_count);
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let r = Args::try_parse_from(["insert2csv", "-i", "a", "-o", "b", "-b", "0"]);
        assert!(r.is_err());
    }
}
