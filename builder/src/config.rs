// Licensed under the Apache-2.0 license

//! Build configuration for the asset image step.
//!
//! Built once at startup from the build and project directories, optionally
//! overridden by a TOML file:
//!
//! ```toml
//! partition_table = "partitions.csv"
//! encoder = "mklittlefs"
//!
//! [mklittlefs]
//! tool = "/opt/esp/tools/mklittlefs"
//! block_size = 4096
//! page_size = 256
//!
//! [[assets]]
//! partition = "static_assets"
//! source = "filesystem/static_assets"
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, Result};
use crate::fs_image::{FatImageBuilder, FilesystemImageBuilder, MkLittlefsBuilder};

pub const STATIC_ASSETS_PARTITION: &str = "static_assets";
pub const OTA_ASSETS_PARTITION: &str = "ota_a_assets";
pub const DEFAULT_PARTITION_TABLE: &str = "partitions.csv";

/// A partition to fill with the contents of a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSpec {
    pub partition: String,
    /// Relative paths are resolved against the project directory.
    pub source: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderKind {
    Fat,
    #[default]
    Mklittlefs,
}

impl FromStr for EncoderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fat" => Ok(Self::Fat),
            "mklittlefs" | "littlefs" => Ok(Self::Mklittlefs),
            _ => Err(format!(
                "unknown encoder {s:?}; expected \"fat\" or \"mklittlefs\""
            )),
        }
    }
}

impl fmt::Display for EncoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fat => f.write_str("fat"),
            Self::Mklittlefs => f.write_str("mklittlefs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetBuildConfig {
    pub build_dir: PathBuf,
    pub project_dir: PathBuf,
    /// Defaults to `<project>/partitions.csv`.
    pub partition_table: Option<PathBuf>,
    pub assets: Vec<AssetSpec>,
    pub encoder: EncoderKind,
    pub mklittlefs: MkLittlefsBuilder,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AssetConfigFile {
    partition_table: Option<PathBuf>,
    encoder: Option<EncoderKind>,
    mklittlefs: Option<MkLittlefsBuilder>,
    assets: Option<Vec<AssetSpec>>,
}

impl AssetBuildConfig {
    /// The static assets and OTA assets partitions, filled from
    /// `filesystem/static_assets` and `filesystem/ota_assets`.
    pub fn new(build_dir: impl Into<PathBuf>, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            build_dir: build_dir.into(),
            project_dir: project_dir.into(),
            partition_table: None,
            assets: vec![
                AssetSpec {
                    partition: STATIC_ASSETS_PARTITION.to_string(),
                    source: PathBuf::from("filesystem/static_assets"),
                },
                AssetSpec {
                    partition: OTA_ASSETS_PARTITION.to_string(),
                    source: PathBuf::from("filesystem/ota_assets"),
                },
            ],
            encoder: EncoderKind::default(),
            mklittlefs: MkLittlefsBuilder::default(),
        }
    }

    /// Applies the settings present in a TOML file on top of `self`.
    pub fn with_config_file(self, path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(BuildError::io(format!("reading config {}", path.display())))?;
        let file: AssetConfigFile = toml::from_str(&text)
            .map_err(|e| BuildError::Config(format!("{}: {e}", path.display())))?;
        Ok(self.apply(file))
    }

    pub fn with_config_str(self, text: &str) -> Result<Self> {
        let file: AssetConfigFile =
            toml::from_str(text).map_err(|e| BuildError::Config(e.to_string()))?;
        Ok(self.apply(file))
    }

    fn apply(mut self, file: AssetConfigFile) -> Self {
        if let Some(table) = file.partition_table {
            self.partition_table = Some(table);
        }
        if let Some(encoder) = file.encoder {
            self.encoder = encoder;
        }
        if let Some(mklittlefs) = file.mklittlefs {
            self.mklittlefs = mklittlefs;
        }
        if let Some(assets) = file.assets {
            self.assets = assets;
        }
        self
    }

    pub fn partition_table_path(&self) -> PathBuf {
        match &self.partition_table {
            Some(path) => self.project_dir.join(path),
            None => self.project_dir.join(DEFAULT_PARTITION_TABLE),
        }
    }

    pub fn source_dir(&self, asset: &AssetSpec) -> PathBuf {
        self.project_dir.join(&asset.source)
    }

    pub fn image_path(&self, partition: &str) -> PathBuf {
        self.build_dir.join(format!("{partition}.bin"))
    }

    pub fn encoder(&self) -> Box<dyn FilesystemImageBuilder> {
        match self.encoder {
            EncoderKind::Fat => Box::new(FatImageBuilder),
            EncoderKind::Mklittlefs => Box::new(self.mklittlefs.clone()),
        }
    }
}
