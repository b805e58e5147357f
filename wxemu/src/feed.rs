//! Sources of live measurement data.

use std::{
    fs::File,
    io::{BufRead, BufReader, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::EmulatorError;

/// A source of measurement lines.
///
/// `None` means that there is no new measurement this cycle. It is never an error.
pub trait MeasurementFeed: Send {
    /// Get the next measurement line.
    fn next_line(&mut self) -> Option<String>;
}

/// A measurement feed read from a text file, one measurement per line.
///
/// Blank lines and lines starting with `#` are skipped. At the end of the file, the feed starts
/// over from the beginning.
#[derive(Debug)]
pub struct FileFeed {
    path: PathBuf,
    reader: BufReader<File>,
}

impl FileFeed {
    /// Open a feed file.
    ///
    /// A file that cannot be opened is fatal and reported as [`EmulatorError::FeedUnavailable`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EmulatorError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| EmulatorError::FeedUnavailable {
            path: path.clone(),
            source,
        })?;
        Ok(FileFeed {
            path,
            reader: BufReader::new(file),
        })
    }

    fn read_data_line(&mut self) -> std::io::Result<Option<String>> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() && !trimmed.starts_with('#') {
                return Ok(Some(trimmed.to_string()));
            }
        }
    }
}

impl MeasurementFeed for FileFeed {
    fn next_line(&mut self) -> Option<String> {
        let result = match self.read_data_line() {
            Ok(None) => {
                debug!(path = ?self.path, "end of feed, starting over");
                self.reader
                    .seek(SeekFrom::Start(0))
                    .and_then(|_| self.read_data_line())
            }
            other => other,
        };
        match result {
            Ok(line) => line,
            Err(error) => {
                warn!(path = ?self.path, %error, "cannot read measurement feed");
                None
            }
        }
    }
}

/// A measurement feed from a list of lines, e.g., for testing.
#[derive(Debug, Clone, Default)]
pub struct VecFeed {
    lines: Vec<String>,
    next: usize,
    cycle: bool,
}

impl VecFeed {
    /// Create a feed that returns every line once.
    pub fn new<S: Into<String>>(lines: impl IntoIterator<Item = S>) -> Self {
        VecFeed {
            lines: lines.into_iter().map(Into::into).collect(),
            next: 0,
            cycle: false,
        }
    }

    /// Create a feed that starts over after the last line.
    pub fn cycling<S: Into<String>>(lines: impl IntoIterator<Item = S>) -> Self {
        VecFeed {
            cycle: true,
            ..VecFeed::new(lines)
        }
    }
}

impl MeasurementFeed for VecFeed {
    fn next_line(&mut self) -> Option<String> {
        if self.next >= self.lines.len() {
            if !self.cycle || self.lines.is_empty() {
                return None;
            }
            self.next = 0;
        }
        let line = self.lines[self.next].clone();
        self.next += 1;
        Some(line)
    }
}
