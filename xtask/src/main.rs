// Licensed under the Apache-2.0 license

use clap::{Parser, Subcommand};
use fw_builder::EncoderKind;
use log::LevelFilter;
use std::path::PathBuf;

mod asset_images;
mod partition_table;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Xtask {
    /// Log debug output
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    xtask: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or verify an OTA bundle
    OtaImage {
        #[command(subcommand)]
        subcommand: OtaImageCommands,
    },
    /// Build filesystem images for the asset partitions
    AssetImages {
        /// Directory the images are written to
        #[arg(long, value_name = "DIR")]
        build_dir: PathBuf,

        /// Directory holding the partition table and the asset trees
        #[arg(long, value_name = "DIR")]
        project_dir: PathBuf,

        /// TOML file overriding the asset list and encoder settings
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Partition table. Relative paths are resolved against the project directory,
        /// absolute paths are used as given. Default: partitions.csv
        #[arg(long, value_name = "CSV")]
        partition_table: Option<PathBuf>,

        /// Filesystem encoder: mklittlefs (default) or fat. FAT images are for host-side
        /// tooling only; the device mounts LittleFS.
        #[arg(long)]
        encoder: Option<EncoderKind>,

        /// Path to the mklittlefs tool
        #[arg(long, value_name = "TOOL")]
        mklittlefs: Option<PathBuf>,

        /// Rebuild every image even when it is up to date
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Write the rebuilt images and their flash offsets to this JSON file
        #[arg(long, value_name = "JSON")]
        flash_args: Option<PathBuf>,
    },
    /// Print the partitions defined in a partition table
    PartitionTable {
        #[arg(value_name = "CSV")]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum OtaImageCommands {
    /// Merge the application and asset images into one OTA bundle
    Create {
        /// Firmware version in semver format (e.g., "1.2.3")
        #[arg(value_name = "VERSION")]
        version: String,

        /// Path to the bundle to write
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        /// Path to the application binary
        #[arg(value_name = "APP_BIN")]
        app: PathBuf,

        /// Path to the OTA assets filesystem image
        #[arg(value_name = "OTA_ASSETS_BIN")]
        ota_assets: PathBuf,

        /// Path to the static assets filesystem image
        #[arg(value_name = "STATIC_ASSETS_BIN")]
        static_assets: Option<PathBuf>,
    },
    /// Verify an existing OTA bundle
    Verify {
        /// Path to the bundle
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn main() {
    // Usage errors exit with 1 rather than clap's default of 2.
    let cli = Xtask::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        std::process::exit(if e.use_stderr() { 1 } else { 0 });
    });

    let _ = simple_logger::SimpleLogger::new()
        .with_level(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .init();

    let result = match &cli.xtask {
        Commands::OtaImage { subcommand } => match subcommand {
            OtaImageCommands::Create {
                version,
                output,
                app,
                ota_assets,
                static_assets,
            } => fw_builder::ota_image_create(
                version,
                output,
                app,
                ota_assets,
                static_assets.as_deref(),
            ),
            OtaImageCommands::Verify { file } => fw_builder::ota_image_verify(file),
        },
        Commands::AssetImages {
            build_dir,
            project_dir,
            config,
            partition_table,
            encoder,
            mklittlefs,
            force,
            flash_args,
        } => asset_images::asset_images(asset_images::AssetImagesArgs {
            build_dir,
            project_dir,
            config: config.as_deref(),
            partition_table: partition_table.as_deref(),
            encoder: *encoder,
            mklittlefs: mklittlefs.as_deref(),
            force: *force,
            flash_args: flash_args.as_deref(),
        }),
        Commands::PartitionTable { file } => partition_table::print(file),
    };
    result.unwrap_or_else(|e| {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    });
}
