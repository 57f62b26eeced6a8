use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Deserialize;
use slog_term::{FullFormat, PlainSyncDecorator};

use crate::config::Level;

/// Options for the file transport.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct FileOptions {
    pub level: Level,
    pub filename: PathBuf,
    /// Size in bytes after which the current file is rotated out. `None`
    /// disables rotation.
    pub maxsize: Option<u64>,
    /// How many rotated files to keep around.
    pub max_files: u32,
    /// When set, the live file keeps the base name and backups shift through
    /// the numbered suffixes; otherwise backups keep their number forever and
    /// the oldest gets pruned.
    pub tailable: bool,
    /// Gzip rotated files.
    pub zipped_archive: bool,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            level: Level::default(),
            filename: PathBuf::from("app.log"),
            maxsize: None,
            max_files: 5,
            tailable: true,
            zipped_archive: false,
        }
    }
}

/// An append writer that rotates by size with numbered backups.
pub struct RotatingFileWriter {
    base: PathBuf,
    maxsize: Option<u64>,
    max_files: u32,
    tailable: bool,
    compress: bool,
    file: File,
    size: u64,
    // Next suffix for non-tailable rotation; suffixes keep increasing.
    next_index: u32,
}

impl RotatingFileWriter {
    pub fn open(options: &FileOptions) -> io::Result<Self> {
        if let Some(parent) = options.filename.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&options.filename)?;
        let size = file.metadata().map(|m| m.len()).unwrap_or(0);
        // Pick up the numbering where a previous process left off, so a
        // restart never renames over surviving backups.
        let next_index = if options.tailable {
            1
        } else {
            highest_backup_index(&options.filename) + 1
        };
        Ok(Self {
            base: options.filename.clone(),
            maxsize: options.maxsize,
            max_files: options.max_files.max(1),
            tailable: options.tailable,
            compress: options.zipped_archive,
            file,
            size,
            next_index,
        })
    }

    fn backup_path(&self, index: u32) -> PathBuf {
        let ext = if self.compress { ".gz" } else { "" };
        PathBuf::from(format!("{}.{}{}", self.base.display(), index, ext))
    }

    // Moves the current file to `to`, gzipping it when asked to.
    fn archive_current(&self, to: &PathBuf) -> io::Result<()> {
        if self.compress {
            let mut input = File::open(&self.base)?;
            let out = File::create(to)?;
            let mut encoder = GzEncoder::new(out, Compression::default());
            io::copy(&mut input, &mut encoder)?;
            encoder.finish()?;
            fs::remove_file(&self.base)
        } else {
            fs::rename(&self.base, to)
        }
    }

    fn rotate(&mut self) -> io::Result<()> {
        if self.tailable {
            // Shift the chain so .1 is always the newest backup.
            let oldest = self.backup_path(self.max_files);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for i in (1..self.max_files).rev() {
                let from = self.backup_path(i);
                if from.exists() {
                    fs::rename(&from, self.backup_path(i + 1))?;
                }
            }
            self.archive_current(&self.backup_path(1))?;
        } else {
            self.archive_current(&self.backup_path(self.next_index))?;
            if self.next_index > self.max_files {
                let stale = self.backup_path(self.next_index - self.max_files);
                if stale.exists() {
                    fs::remove_file(&stale)?;
                }
            }
            self.next_index += 1;
        }

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.base)?;
        self.size = 0;
        Ok(())
    }
}

// The highest `<base>.<n>` or `<base>.<n>.gz` suffix present next to the
// base file, or 0 when there is none.
fn highest_backup_index(base: &Path) -> u32 {
    let Some(file_name) = base.file_name().and_then(|n| n.to_str()) else {
        return 0;
    };
    let dir = match base.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    let mut highest = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(rest) = name
            .strip_prefix(file_name)
            .and_then(|rest| rest.strip_prefix('.'))
        else {
            continue;
        };
        let digits = rest.strip_suffix(".gz").unwrap_or(rest);
        if let Ok(index) = digits.parse::<u32>() {
            highest = highest.max(index);
        }
    }
    highest
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(max) = self.maxsize {
            if self.size > 0 && self.size + buf.len() as u64 > max {
                self.rotate()?;
            }
        }
        let written = self.file.write(buf)?;
        self.size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

pub(crate) fn drain(
    options: &FileOptions,
) -> io::Result<FullFormat<PlainSyncDecorator<RotatingFileWriter>>> {
    let writer = RotatingFileWriter::open(options)?;
    Ok(FullFormat::new(PlainSyncDecorator::new(writer)).build())
}
