//! Reading the list of benchmark positions.
//!
//! The list is a plain text file with one position descriptor (usually FEN)
//! per line. Descriptors are not interpreted: whatever is on the line is sent
//! to the engine.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::BenchError;

/// Opaque descriptor of a search starting state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Position(String);

impl Position {
    /// Wraps a descriptor.
    #[must_use]
    pub fn new(descriptor: impl Into<String>) -> Self {
        Self(descriptor.into())
    }

    /// The descriptor exactly as it appeared in the source.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file with one position per line.
///
/// Every call to [`PositionSource::positions`] reads the file from the start.
#[derive(Clone, Debug)]
pub struct PositionSource {
    path: PathBuf,
}

impl PositionSource {
    /// Creates a source reading from `path`. The file is not opened yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the position list.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the file and lazily yields its positions in order.
    ///
    /// # Errors
    ///
    /// [`BenchError::SourceUnavailable`] if the file can not be opened.
    pub fn positions(&self) -> Result<Positions, BenchError> {
        let file = File::open(&self.path).map_err(|source| BenchError::SourceUnavailable {
            path: self.path.clone(),
            line: None,
            source,
        })?;
        Ok(Positions {
            path: self.path.clone(),
            reader: BufReader::new(file),
            line: 0,
        })
    }
}

/// Lazy iterator over the positions of a [`PositionSource`]. Blank lines are
/// skipped.
#[derive(Debug)]
pub struct Positions {
    path: PathBuf,
    reader: BufReader<File>,
    line: usize,
}

impl Positions {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut buffer = String::new();
        if self.reader.read_line(&mut buffer)? == 0 {
            return Ok(None);
        }
        self.line += 1;
        if buffer.ends_with('\n') {
            let _newline = buffer.pop();
            if buffer.ends_with('\r') {
                let _carriage_return = buffer.pop();
            }
        }
        Ok(Some(buffer))
    }
}

impl Iterator for Positions {
    type Item = Result<Position, BenchError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.read_line() {
                Ok(None) => return None,
                Ok(Some(line)) if line.is_empty() => continue,
                Ok(Some(line)) => return Some(Ok(Position(line))),
                Err(source) => {
                    return Some(Err(BenchError::SourceUnavailable {
                        path: self.path.clone(),
                        line: Some(self.line + 1),
                        source,
                    }))
                },
            }
        }
    }
}
