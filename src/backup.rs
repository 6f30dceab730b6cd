//! Zip archives of a server's save directory.

use crate::config::ServerDescriptor;
use crate::error::{Error, Result};
use chrono::{DateTime, Local};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Timestamp format embedded in archive names.
pub const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Builds the archive file name `{name}_backup_{yyyyMMddHHmmss}.zip`.
///
/// Names only have one-second resolution; two backups of the same server in
/// the same second write to the same file.
pub fn archive_name(server_name: &str, at: &DateTime<Local>) -> String {
    format!(
        "{}_backup_{}.zip",
        server_name,
        at.format(ARCHIVE_TIMESTAMP_FORMAT)
    )
}

/// Writes backups of save directories into one backup root.
#[derive(Debug, Clone)]
pub struct BackupEngine {
    root: PathBuf,
}

impl BackupEngine {
    /// Creates an engine that writes archives under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Archives `server`'s save directory and returns the archive path.
    ///
    /// A failed archive is removed rather than left half-written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backup`] if the save directory is missing or any I/O
    /// step fails.
    #[tracing::instrument(skip(self, server), fields(server = %server.name))]
    pub async fn backup(&self, server: &ServerDescriptor) -> Result<PathBuf> {
        let source = server.save_directory.clone();
        let destination = self.root.join(archive_name(&server.name, &Local::now()));

        tracing::info!(
            source = %source.display(),
            destination = %destination.display(),
            "Creating backup archive"
        );

        let target = destination.clone();
        let files = tokio::task::spawn_blocking(move || archive_directory(&source, &target))
            .await
            .map_err(|e| Error::Backup(format!("Backup task failed: {}", e)))??;

        tracing::info!(files, destination = %destination.display(), "Backup archive written");
        Ok(destination)
    }
}

/// Compresses every file under `source` into a new zip at `destination`.
///
/// Entry names are relative to `source` with `/` separators; empty
/// directories are kept. Returns the number of files written.
pub fn archive_directory(source: &Path, destination: &Path) -> Result<usize> {
    if !source.is_dir() {
        return Err(Error::Backup(format!(
            "Save directory '{}' does not exist",
            source.display()
        )));
    }

    let result = write_archive(source, destination);
    if result.is_err() {
        let _ = std::fs::remove_file(destination);
    }
    result.map_err(|e| {
        tracing::error!(error = %e, destination = %destination.display(), "Backup archive failed");
        Error::Backup(format!("Failed to write '{}': {}", destination.display(), e))
    })
}

fn write_archive(source: &Path, destination: &Path) -> io::Result<usize> {
    let file = File::create(destination)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut files = 0;
    let mut pending = vec![source.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = std::fs::read_dir(&dir)?.collect::<io::Result<Vec<_>>>()?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let path = entry.path();
            let name = entry_name(source, &path);
            if entry.file_type()?.is_dir() {
                zip.add_directory(format!("{}/", name), options)
                    .map_err(io::Error::other)?;
                pending.push(path);
            } else {
                zip.start_file(name, options).map_err(io::Error::other)?;
                let mut input = File::open(&path)?;
                io::copy(&mut input, &mut zip)?;
                files += 1;
            }
        }
    }

    zip.finish().map_err(io::Error::other)?.flush()?;
    Ok(files)
}

fn entry_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
