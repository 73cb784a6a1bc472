// Licensed under the Apache-2.0 license

//! Builds one filesystem image per asset partition and registers the fresh
//! ones for flashing.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;

use crate::config::AssetBuildConfig;
use crate::error::{BuildError, Result};
use crate::fs_image::FilesystemImageBuilder;
use crate::partitions::PartitionTable;
use crate::staleness::needs_rebuild;

/// Receives the flash location of every image that was rebuilt.
pub trait ImageRegistry {
    fn register(&mut self, offset: u64, image: &Path);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlashImageEntry {
    /// Hexadecimal flash offset, e.g. `0x210000`.
    pub offset: String,
    pub path: PathBuf,
}

/// Extra images to hand to the flasher alongside the application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlashImageList {
    pub images: Vec<FlashImageEntry>,
}

impl ImageRegistry for FlashImageList {
    fn register(&mut self, offset: u64, image: &Path) {
        self.images.push(FlashImageEntry {
            offset: format!("{offset:#x}"),
            path: image.to_path_buf(),
        });
    }
}

impl FlashImageList {
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.images)
            .map_err(|e| BuildError::Config(format!("serializing flash image list: {e}")))?;
        fs::write(path, json).map_err(BuildError::io(format!("writing {}", path.display())))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetImageJob {
    pub partition: String,
    pub source_dir: PathBuf,
    pub capacity: u64,
    pub output: PathBuf,
    pub flash_offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Built,
    UpToDate,
}

/// Resolves every configured asset against the partition table. Fails on the
/// first partition that the table does not define or whose offset or size
/// cannot be read. Rows no asset refers to are never inspected.
pub fn plan_jobs(config: &AssetBuildConfig, table: &PartitionTable) -> Result<Vec<AssetImageJob>> {
    config
        .assets
        .iter()
        .map(|asset| {
            let entry = table.require(&asset.partition)?;
            Ok(AssetImageJob {
                partition: asset.partition.clone(),
                source_dir: config.source_dir(asset),
                capacity: entry.size()?,
                output: config.image_path(&asset.partition),
                flash_offset: entry.offset()?,
            })
        })
        .collect()
}

/// Rebuilds the stale images among `jobs`. Only images built by this call are
/// registered. The first failure aborts the remaining jobs.
pub fn run_jobs(
    jobs: &[AssetImageJob],
    encoder: &dyn FilesystemImageBuilder,
    registry: &mut dyn ImageRegistry,
    force: bool,
) -> Result<Vec<BuildOutcome>> {
    let mut outcomes = Vec::with_capacity(jobs.len());
    for job in jobs {
        if !force && !needs_rebuild(&job.output, &job.source_dir)? {
            info!(
                "{} is up to date with {}",
                job.output.display(),
                job.source_dir.display()
            );
            outcomes.push(BuildOutcome::UpToDate);
            continue;
        }

        info!(
            "Building {} image ({} bytes at {:#x}) from {}",
            job.partition,
            job.capacity,
            job.flash_offset,
            job.source_dir.display()
        );
        encoder.build(&job.source_dir, job.capacity, &job.output)?;
        registry.register(job.flash_offset, &job.output);
        outcomes.push(BuildOutcome::Built);
    }
    Ok(outcomes)
}

/// Loads the partition table named by `config` and brings every asset image
/// up to date.
pub fn build_asset_images(
    config: &AssetBuildConfig,
    encoder: &dyn FilesystemImageBuilder,
    registry: &mut dyn ImageRegistry,
    force: bool,
) -> Result<Vec<(AssetImageJob, BuildOutcome)>> {
    let table = PartitionTable::load(&config.partition_table_path())?;
    let jobs = plan_jobs(config, &table)?;
    let outcomes = run_jobs(&jobs, encoder, registry, force)?;
    Ok(jobs.into_iter().zip(outcomes).collect())
}
