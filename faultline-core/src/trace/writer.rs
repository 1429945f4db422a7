//! Serialized line-oriented file writer.
//!
//! One instance is shared by both directions of every live connection and by
//! delayed-dispatch tasks; the mutex gives concurrent callers a total order
//! of lines per file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Append-mode file handle with whole-line writes.
#[derive(Debug)]
pub struct LineWriter {
    file: Mutex<File>,
}

impl LineWriter {
    /// Open (or create) `path` for appending.
    pub fn create(path: &Path) -> std::io::Result<LineWriter> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(LineWriter {
            file: Mutex::new(file),
        })
    }

    /// Write `data` followed by a newline as one atomic unit with respect to
    /// other callers of this writer.
    pub fn write_line(&self, data: &[u8]) -> std::io::Result<()> {
        let mut file = self.file.lock().expect("line writer lock");
        file.write_all(data)?;
        file.write_all(b"\n")?;
        file.flush()
    }
}
