use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::str::FromStr;

/// Destination of a router output stream, as named on the command line:
/// `-` or `<out>` for stdout, `<err>` for stderr, `<null>` to discard,
/// anything else is a file path.
///
/// The dry-run command list and `inspect` diagnostics each hold one of
/// these and open short-lived writers on it as they go.
#[derive(Debug, Clone)]
pub enum OutputFile {
    Stdout,
    Stderr,
    Null,
    File {
        path: PathBuf,
        /// Set once the file exists, so later writers append to it
        /// instead of truncating it.
        created: bool,
    },
}

impl OutputFile {
    pub fn file(path: PathBuf) -> Self {
        OutputFile::File {
            path,
            created: false,
        }
    }

    /// Open a writer on this stream. A file target is truncated by the
    /// first writer and appended to by every later one, so repeated
    /// writers produce one continuous stream.
    pub fn writer(&mut self) -> io::Result<Box<dyn Write>> {
        Ok(match self {
            OutputFile::Stdout => Box::new(BufWriter::new(io::stdout())),
            OutputFile::Stderr => Box::new(BufWriter::new(io::stderr())),
            OutputFile::Null => Box::new(io::sink()),
            OutputFile::File { path, created } => {
                let file = if *created {
                    OpenOptions::new().append(true).open(&*path)?
                } else {
                    let file = File::create(&*path)?;
                    *created = true;
                    file
                };
                Box::new(BufWriter::new(file))
            }
        })
    }
}

impl FromStr for OutputFile {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "-" | "<out>" => Ok(OutputFile::Stdout),
            "<err>" => Ok(OutputFile::Stderr),
            "<null>" => Ok(OutputFile::Null),
            _ => Ok(OutputFile::file(PathBuf::from(s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stream_spellings() {
        assert!(matches!(
            "-".parse::<OutputFile>().unwrap(),
            OutputFile::Stdout
        ));
        assert!(matches!(
            "<out>".parse::<OutputFile>().unwrap(),
            OutputFile::Stdout
        ));
        assert!(matches!(
            "<err>".parse::<OutputFile>().unwrap(),
            OutputFile::Stderr
        ));
        assert!(matches!(
            "<null>".parse::<OutputFile>().unwrap(),
            OutputFile::Null
        ));
        assert!(matches!(
            "out.log".parse::<OutputFile>().unwrap(),
            OutputFile::File { .. }
        ));
    }

    #[test]
    fn file_targets_append_after_creation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        let mut out = OutputFile::file(path.clone());
        writeln!(out.writer().unwrap(), "first").unwrap();
        writeln!(out.writer().unwrap(), "second").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "first\nsecond\n"
        );
        // a fresh handle starts the stream over
        let mut fresh = OutputFile::file(path.clone());
        writeln!(fresh.writer().unwrap(), "reset").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "reset\n");
    }
}
