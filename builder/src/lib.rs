// Licensed under the Apache-2.0 license

mod assets;
mod config;
mod error;
mod fs_image;
pub mod ota_image;
mod partitions;
mod size;
mod staleness;

pub use assets::{
    build_asset_images, plan_jobs, run_jobs, AssetImageJob, BuildOutcome, FlashImageEntry,
    FlashImageList, ImageRegistry,
};
pub use config::{
    AssetBuildConfig, AssetSpec, EncoderKind, DEFAULT_PARTITION_TABLE, OTA_ASSETS_PARTITION,
    STATIC_ASSETS_PARTITION,
};
pub use error::{BuildError, Result};
pub use fs_image::{FatImageBuilder, FilesystemImageBuilder, MkLittlefsBuilder, FAT_SECTOR_SIZE};
pub use ota_image::{build_header, ota_image_create, ota_image_verify, verify_ota_image, OtaImage};
pub use partitions::{PartitionEntry, PartitionTable};
pub use size::parse_size;
pub use staleness::{needs_rebuild, newest_mtime};
