// Licensed under the Apache-2.0 license

use anyhow::Result;
use fw_builder::{build_asset_images, AssetBuildConfig, BuildOutcome, EncoderKind, FlashImageList};
use std::path::Path;

pub(crate) struct AssetImagesArgs<'a> {
    pub build_dir: &'a Path,
    pub project_dir: &'a Path,
    pub config: Option<&'a Path>,
    pub partition_table: Option<&'a Path>,
    pub encoder: Option<EncoderKind>,
    pub mklittlefs: Option<&'a Path>,
    pub force: bool,
    pub flash_args: Option<&'a Path>,
}

/// Command line flags win over the config file, which wins over the defaults.
fn resolve_config(args: &AssetImagesArgs) -> Result<AssetBuildConfig> {
    let mut config = AssetBuildConfig::new(args.build_dir, args.project_dir);
    if let Some(path) = args.config {
        config = config.with_config_file(path)?;
    }
    if let Some(table) = args.partition_table {
        config.partition_table = Some(table.to_path_buf());
    }
    if let Some(encoder) = args.encoder {
        config.encoder = encoder;
    }
    if let Some(tool) = args.mklittlefs {
        config.mklittlefs.tool = tool.to_path_buf();
    }
    Ok(config)
}

pub(crate) fn asset_images(args: AssetImagesArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    let encoder = config.encoder();
    let mut registry = FlashImageList::default();

    let results = build_asset_images(&config, encoder.as_ref(), &mut registry, args.force)?;
    for (job, outcome) in &results {
        match outcome {
            BuildOutcome::Built => println!(
                "Built {} ({} bytes) for flash offset {:#x}",
                job.output.display(),
                job.capacity,
                job.flash_offset
            ),
            BuildOutcome::UpToDate => println!("{} is up to date", job.output.display()),
        }
    }

    if let Some(path) = args.flash_args {
        registry.write_json(path)?;
        println!(
            "Registered {} image(s) for flashing in {}",
            registry.images.len(),
            path.display()
        );
    }
    Ok(())
}
