use bstr::ByteSlice;
use camino::Utf8PathBuf;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};

/// Where the text to annotate comes from.
#[derive(Clone, Debug)]
pub enum InputSource {
    /// Text given directly, e.g. as a command line argument.
    Text(String),
    /// Lines piped through standard input.
    Stdin,
    /// Lines read from a file.
    File(Utf8PathBuf),
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Text(_) => write!(f, "<text>"),
            InputSource::Stdin => write!(f, "<stdin>"),
            InputSource::File(path) => write!(f, "{}", path),
        }
    }
}

impl InputSource {
    /// Create an InputSource from a path, where "-" means stdin.
    pub fn from_path(path: Utf8PathBuf) -> Self {
        if path.as_str() == "-" {
            InputSource::Stdin
        } else {
            InputSource::File(path)
        }
    }

    /// Open the source as a sequence of lines.
    pub fn lines(self) -> io::Result<LineSource> {
        match self {
            InputSource::Text(text) => Ok(LineSource::text(text)),
            InputSource::Stdin => Ok(LineSource::reader(io::stdin().lock())),
            InputSource::File(path) => {
                let file = File::open(&path).map_err(|e| {
                    io::Error::new(e.kind(), format!("failed to open file {}: {}", path, e))
                })?;
                Ok(LineSource::reader(BufReader::new(file)))
            }
        }
    }
}

/// Single pass iterator over the lines of an [`InputSource`].
///
/// Every yielded line keeps its `\n` terminator, if it had one, so that
/// writing the lines back out reproduces the input byte for byte.
pub enum LineSource {
    Text { data: Vec<u8>, pos: usize },
    Reader(Box<dyn BufRead>),
}

impl LineSource {
    pub fn text(text: impl Into<String>) -> Self {
        LineSource::Text {
            data: text.into().into_bytes(),
            pos: 0,
        }
    }

    pub fn reader(reader: impl BufRead + 'static) -> Self {
        LineSource::Reader(Box::new(reader))
    }
}

impl Iterator for LineSource {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            LineSource::Text { data, pos } => {
                let line = data[*pos..].lines_with_terminator().next()?;
                *pos += line.len();
                Some(Ok(line.to_vec()))
            }
            LineSource::Reader(reader) => {
                let mut buf = Vec::with_capacity(256);
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => None,
                    Ok(_) => Some(Ok(buf)),
                    Err(e) => Some(Err(e)),
                }
            }
        }
    }
}
