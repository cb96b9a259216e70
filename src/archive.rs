use crate::project::{parse_project, Project};
use anyhow::{anyhow, bail, Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;
use zip::ZipArchive;

pub const PROJECT_FILE: &str = "project.json";

/// A directory holding `project.json` and the asset payloads. When opened
/// from an `.sb3`, the directory is temporary and removed on drop.
#[derive(Debug)]
pub struct ProjectSource {
    dir: PathBuf,
    _workdir: Option<TempDir>,
}

impl ProjectSource {
    pub fn open(input: &Path) -> Result<Self> {
        if input.is_dir() {
            if !input.join(PROJECT_FILE).is_file() {
                bail!("'{}' does not contain {}.", input.display(), PROJECT_FILE);
            }
            return Ok(Self {
                dir: input.to_path_buf(),
                _workdir: None,
            });
        }
        let workdir = tempfile::Builder::new()
            .prefix("sb3bsl-")
            .tempdir()
            .context("Failed to create a working directory for extraction.")?;
        let count = extract_sb3(input, workdir.path())?;
        debug!(entries = count, dir = %workdir.path().display(), "extracted project archive");
        Ok(Self {
            dir: workdir.path().to_path_buf(),
            _workdir: Some(workdir),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn read_project(&self) -> Result<Project> {
        let path = self.dir.join(PROJECT_FILE);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read '{}'.", path.display()))?;
        parse_project(&text).with_context(|| format!("Invalid project in '{}'.", path.display()))
    }
}

/// Extracts every file entry of an `.sb3` into `dest`. Entries whose path
/// would leave `dest` are rejected.
pub fn extract_sb3(input: &Path, dest: &Path) -> Result<usize> {
    let file =
        fs::File::open(input).with_context(|| format!("Failed to open '{}'.", input.display()))?;
    let mut zip = ZipArchive::new(file)
        .with_context(|| format!("'{}' is not a valid zip/.sb3 file.", input.display()))?;
    if zip.by_name(PROJECT_FILE).is_err() {
        bail!("{} not found in '{}'.", PROJECT_FILE, input.display());
    }

    let mut written = 0usize;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| anyhow!("Archive entry '{}' escapes the extraction directory.", entry.name()))?;
        let path = dest.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&path)
            .with_context(|| format!("Failed to create '{}'.", path.display()))?;
        io::copy(&mut entry, &mut out)?;
        written += 1;
    }
    Ok(written)
}
