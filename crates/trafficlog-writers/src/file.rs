//! Local file destination
//!
//! Every [`FileWriter::open`] starts a fresh `<name>.log`. A log left over
//! from a previous run is moved aside first, under a name carrying the local
//! time of the rotation:
//!
//! ```text
//! logs/
//!   traffic.log                                  <- current
//!   traffic.2024-06-10-14.03.27.123456789.log    <- previous run
//! ```

use crate::error::{Result, WriterError};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Layout of the rotation suffix
const ROTATION_FORMAT: &str = "%Y-%m-%d-%H.%M.%S.%9f";

/// Append-only traffic log file
#[derive(Debug)]
pub struct FileWriter {
    path: PathBuf,
    file: File,
}

impl FileWriter {
    /// Open `<dir>/<name>.log` for appending.
    ///
    /// Creates `dir` when missing and fails if it exists as something other
    /// than a directory. An existing `<name>.log` is renamed with a timestamp
    /// suffix before the new file is opened.
    pub fn open(dir: impl AsRef<Path>, name: &str) -> Result<Self> {
        let dir = dir.as_ref();
        let path = dir.join(format!("{}.log", name));

        if path.is_file() {
            let rotated = dir.join(format!("{}.{}.log", name, rotation_stamp()));
            if let Err(err) = fs::rename(&path, &rotated) {
                tracing::warn!(
                    from = %path.display(),
                    to = %rotated.display(),
                    error = %err,
                    "Failed to rotate traffic log"
                );
            }
        }

        ensure_dir(dir)?;
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::debug!(path = %path.display(), "Opened traffic log");

        Ok(Self { path, file })
    }

    /// Path of the file being written
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(WriterError::NotADirectory(dir.display().to_string())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dir)?;
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn rotation_stamp() -> String {
    chrono::Local::now().format(ROTATION_FORMAT).to_string()
}
