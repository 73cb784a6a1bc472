// Licensed under the Apache-2.0 license

//! Filesystem image encoders for asset partitions.
//!
//! Every encoder produces an image of exactly the requested capacity from a
//! directory tree, copying file contents byte for byte. Images are written to
//! a temporary file next to the output and moved into place only once they
//! are complete; on failure any previous file at the output path is removed
//! so a stale or truncated image can never be flashed.

use std::fs;
use std::io::{self, Cursor, Write};
use std::path::{Component, Path, PathBuf};
use std::process::Command;

use fatfs::{Dir, FileSystem, FormatVolumeOptions, FsOptions, ReadWriteSeek};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::error::{BuildError, Result};

pub trait FilesystemImageBuilder {
    /// Encodes `source_dir` into an image of exactly `capacity` bytes at `output`.
    fn build(&self, source_dir: &Path, capacity: u64, output: &Path) -> Result<()>;
}

/// A source tree flattened into the order it must be created in the image.
#[derive(Debug, Default)]
pub(crate) struct SourceTree {
    /// Directories below the root, parents before children.
    pub(crate) dirs: Vec<PathBuf>,
    pub(crate) files: Vec<SourceFile>,
    pub(crate) total_bytes: u64,
}

#[derive(Debug)]
pub(crate) struct SourceFile {
    pub(crate) relative: PathBuf,
    pub(crate) absolute: PathBuf,
}

impl SourceTree {
    pub(crate) fn scan(source_dir: &Path) -> Result<Self> {
        if !source_dir.is_dir() {
            return Err(BuildError::encode(format!(
                "source directory {} does not exist",
                source_dir.display()
            )));
        }

        let mut tree = SourceTree::default();
        for entry in WalkDir::new(source_dir)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                BuildError::encode(format!("scanning {}: {e}", source_dir.display()))
            })?;
            // The root of the tree is the root of the image.
            if entry.depth() == 0 {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(source_dir)
                .map_err(|e| BuildError::encode(e.to_string()))?
                .to_path_buf();
            if entry.file_type().is_dir() {
                tree.dirs.push(relative);
            } else if entry.file_type().is_file() {
                let len = entry
                    .metadata()
                    .map_err(|e| BuildError::encode(format!("{}: {e}", entry.path().display())))?
                    .len();
                tree.total_bytes += len;
                tree.files.push(SourceFile {
                    relative,
                    absolute: entry.path().to_path_buf(),
                });
            }
        }
        Ok(tree)
    }

    pub(crate) fn check_fits(&self, capacity: u64) -> Result<()> {
        if self.total_bytes > capacity {
            return Err(BuildError::encode(format!(
                "{} bytes of content do not fit in a {capacity}-byte image",
                self.total_bytes
            )));
        }
        Ok(())
    }
}

/// Runs `encode` and, if it fails, removes whatever is left at `output`.
fn discard_on_failure(output: &Path, encode: impl FnOnce() -> Result<()>) -> Result<()> {
    let result = encode();
    if result.is_err() {
        match fs::remove_file(output) {
            Ok(()) => debug!("Removed stale image {}", output.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => debug!("Could not remove {}: {e}", output.display()),
        }
    }
    result
}

pub(crate) fn temp_image_for(output: &Path) -> Result<NamedTempFile> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(BuildError::io(format!("creating {}", dir.display())))?;
    NamedTempFile::new_in(dir).map_err(BuildError::io(format!(
        "creating temporary image in {}",
        dir.display()
    )))
}

pub(crate) fn persist_image(image: NamedTempFile, output: &Path) -> Result<()> {
    image
        .persist(output)
        .map_err(|e| BuildError::io(format!("writing {}", output.display()))(e.error))?;
    Ok(())
}

/// Path of a source entry inside the image, `/`-separated.
fn image_path(relative: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or_else(|| {
                BuildError::encode(format!("{} is not a UTF-8 path", relative.display()))
            })?),
            _ => {
                return Err(BuildError::encode(format!(
                    "unexpected path component in {}",
                    relative.display()
                )))
            }
        }
    }
    Ok(parts.join("/"))
}

/// Rejects capacities an encoder cannot fill exactly.
fn check_capacity(capacity: u64, unit: u64, unit_name: &str) -> Result<()> {
    if unit == 0 || capacity == 0 || capacity % unit != 0 {
        return Err(BuildError::encode(format!(
            "capacity {capacity} is not a non-zero multiple of the {unit}-byte {unit_name}"
        )));
    }
    Ok(())
}

/// FAT volumes are formatted with 512-byte sectors.
pub const FAT_SECTOR_SIZE: u64 = 512;

/// In-process encoder producing a FAT volume.
///
/// The device mounts its asset partitions as LittleFS, so FAT images are only
/// useful to host-side tooling that reads the image back. Images meant for
/// flashing come from [`MkLittlefsBuilder`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FatImageBuilder;

impl FatImageBuilder {
    fn encode(&self, tree: &SourceTree, capacity: u64) -> Result<Vec<u8>> {
        let len = usize::try_from(capacity)
            .map_err(|_| BuildError::encode(format!("{capacity} bytes is too large")))?;
        let mut disk = Cursor::new(vec![0u8; len]);
        fatfs::format_volume(&mut disk, FormatVolumeOptions::new()).map_err(|e| {
            BuildError::encode(format!("formatting {capacity}-byte FAT volume: {e}"))
        })?;

        let fs = FileSystem::new(&mut disk, FsOptions::new())
            .map_err(|e| BuildError::encode(format!("mounting FAT volume: {e}")))?;
        copy_tree(&fs.root_dir(), tree)?;
        fs.unmount()
            .map_err(|e| BuildError::encode(format!("flushing FAT volume: {e}")))?;

        Ok(disk.into_inner())
    }
}

fn copy_tree<T: ReadWriteSeek>(root: &Dir<'_, T>, tree: &SourceTree) -> Result<()> {
    for dir in &tree.dirs {
        let path = image_path(dir)?;
        debug!("mkdir {path}");
        root.create_dir(&path)
            .map_err(|e| BuildError::encode(format!("creating directory {path}: {e}")))?;
    }
    for file in &tree.files {
        let path = image_path(&file.relative)?;
        let data = fs::read(&file.absolute).map_err(|e| {
            BuildError::encode(format!("reading {}: {e}", file.absolute.display()))
        })?;
        debug!("write {path} ({} bytes)", data.len());
        let mut image_file = root
            .create_file(&path)
            .map_err(|e| BuildError::encode(format!("creating {path}: {e}")))?;
        image_file
            .truncate()
            .and_then(|_| image_file.write_all(&data))
            .and_then(|_| image_file.flush())
            .map_err(|e| BuildError::encode(format!("writing {path}: {e}")))?;
    }
    Ok(())
}

impl FilesystemImageBuilder for FatImageBuilder {
    fn build(&self, source_dir: &Path, capacity: u64, output: &Path) -> Result<()> {
        discard_on_failure(output, || {
            check_capacity(capacity, FAT_SECTOR_SIZE, "sector size")?;
            let tree = SourceTree::scan(source_dir)?;
            tree.check_fits(capacity)?;
            let bytes = self.encode(&tree, capacity)?;

            let mut image = temp_image_for(output)?;
            image
                .write_all(&bytes)
                .and_then(|_| image.flush())
                .map_err(BuildError::io(format!("writing {}", output.display())))?;
            persist_image(image, output)?;
            info!(
                "Built {capacity}-byte FAT image {} from {} ({} files)",
                output.display(),
                source_dir.display(),
                tree.files.len()
            );
            Ok(())
        })
    }
}

/// Encoder that shells out to `mklittlefs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MkLittlefsBuilder {
    pub tool: PathBuf,
    pub block_size: u64,
    pub page_size: u64,
}

impl Default for MkLittlefsBuilder {
    fn default() -> Self {
        Self {
            tool: PathBuf::from("mklittlefs"),
            block_size: 4096,
            page_size: 256,
        }
    }
}

impl MkLittlefsBuilder {
    pub fn with_tool(tool: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            ..Default::default()
        }
    }

    fn run_tool(&self, source_dir: &Path, capacity: u64, image: &Path) -> Result<()> {
        let tool = self.tool.display();
        debug!(
            "Running {tool} -c {} -b {} -p {} -s {capacity} {}",
            source_dir.display(),
            self.block_size,
            self.page_size,
            image.display()
        );
        let output = Command::new(&self.tool)
            .arg("-c")
            .arg(source_dir)
            .args(["-b", &self.block_size.to_string()])
            .args(["-p", &self.page_size.to_string()])
            .args(["-s", &capacity.to_string()])
            .arg(image)
            .output()
            .map_err(|e| BuildError::encode(format!("failed to run {tool}: {e}")))?;
        if !output.status.success() {
            return Err(BuildError::encode(format!(
                "{tool} failed with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

impl FilesystemImageBuilder for MkLittlefsBuilder {
    fn build(&self, source_dir: &Path, capacity: u64, output: &Path) -> Result<()> {
        discard_on_failure(output, || {
            check_capacity(capacity, self.block_size, "block size")?;
            let tree = SourceTree::scan(source_dir)?;
            tree.check_fits(capacity)?;

            let image = temp_image_for(output)?;
            self.run_tool(source_dir, capacity, image.path())?;
            let produced = fs::metadata(image.path())
                .map_err(BuildError::io(format!("reading {}", image.path().display())))?
                .len();
            if produced != capacity {
                return Err(BuildError::encode(format!(
                    "{} produced {produced} bytes, expected {capacity}",
                    self.tool.display()
                )));
            }
            persist_image(image, output)?;
            info!(
                "Built {capacity}-byte LittleFS image {} from {}",
                output.display(),
                source_dir.display()
            );
            Ok(())
        })
    }
}
