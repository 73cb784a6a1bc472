// Licensed under the Apache-2.0 license

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use log::debug;
use ota_image::{
    parse_bundle, OtaHeader, ABSENT_DIGEST, FIRMWARE_VERSION_LEN, OTA_HEADER_SIZE, SHA256_LEN,
};
use semver::Version;
use sha2::{Digest, Sha256};
use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::IntoBytes;

use crate::error::{BuildError, Result};
use crate::fs_image::{persist_image, temp_image_for};

/// Longest version string that still leaves room for a NUL terminator.
pub const MAX_FIRMWARE_VERSION_LEN: usize = FIRMWARE_VERSION_LEN - 1;

pub fn sha256(data: &[u8]) -> [u8; SHA256_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub fn sha256_hex(digest: &[u8; SHA256_LEN]) -> String {
    hex::encode(digest)
}

/// Parses `version` as a semantic version and returns its canonical form
/// together with the NUL-padded header field.
pub fn parse_firmware_version(version: &str) -> Result<(Version, [u8; FIRMWARE_VERSION_LEN])> {
    let parsed = Version::parse(version).map_err(|e| BuildError::InvalidVersion {
        version: version.to_string(),
        reason: e.to_string(),
    })?;
    let canonical = parsed.to_string();
    if canonical.len() > MAX_FIRMWARE_VERSION_LEN {
        return Err(BuildError::VersionTooLong {
            version: canonical.clone(),
            len: canonical.len(),
            max: MAX_FIRMWARE_VERSION_LEN,
        });
    }
    let mut field = [0u8; FIRMWARE_VERSION_LEN];
    field[..canonical.len()].copy_from_slice(canonical.as_bytes());
    Ok((parsed, field))
}

fn payload_size(what: &'static str, data: &[u8]) -> Result<U32<LittleEndian>> {
    u32::try_from(data.len())
        .map(U32::new)
        .map_err(|_| BuildError::PayloadTooLarge {
            what,
            len: data.len(),
        })
}

/// Builds the header describing `app`, `ota_assets` and the optional
/// `static_assets` payloads. An absent static payload is recorded with size 0
/// and an all-zero digest.
pub fn build_header(
    app: &[u8],
    ota_assets: &[u8],
    static_assets: Option<&[u8]>,
    version: &str,
) -> Result<OtaHeader> {
    let (_, firmware_version) = parse_firmware_version(version)?;

    let (static_assets_size, static_assets_sha256) = match static_assets {
        Some(data) => (payload_size("static assets", data)?, sha256(data)),
        None => (U32::new(0), ABSENT_DIGEST),
    };

    let header = OtaHeader {
        app_size: payload_size("application", app)?,
        app_sha256: sha256(app),
        ota_assets_size: payload_size("OTA assets", ota_assets)?,
        ota_assets_sha256: sha256(ota_assets),
        has_static_assets: static_assets.is_some() as u8,
        reserved: [0; 3],
        static_assets_size,
        static_assets_sha256,
        firmware_version,
    };
    debug!("App SHA-256: {}", sha256_hex(&header.app_sha256));
    debug!("OTA assets SHA-256: {}", sha256_hex(&header.ota_assets_sha256));
    debug!(
        "Static assets SHA-256: {}",
        sha256_hex(&header.static_assets_sha256)
    );
    Ok(header)
}

/// A header and the payloads it describes, ready to be written out.
pub struct OtaImage<'a> {
    header: OtaHeader,
    app: &'a [u8],
    ota_assets: &'a [u8],
    static_assets: Option<&'a [u8]>,
}

impl<'a> OtaImage<'a> {
    pub fn new(
        app: &'a [u8],
        ota_assets: &'a [u8],
        static_assets: Option<&'a [u8]>,
        version: &str,
    ) -> Result<Self> {
        Ok(Self {
            header: build_header(app, ota_assets, static_assets, version)?,
            app,
            ota_assets,
            static_assets,
        })
    }

    pub fn header(&self) -> &OtaHeader {
        &self.header
    }

    pub fn total_len(&self) -> u64 {
        self.header.bundle_len()
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        out.write_all(self.header.as_bytes())?;
        out.write_all(self.app)?;
        out.write_all(self.ota_assets)?;
        if let Some(static_assets) = self.static_assets {
            out.write_all(static_assets)?;
        }
        Ok(())
    }

    /// Writes the bundle next to `output` and renames it into place, so a
    /// failed write never leaves a truncated bundle behind.
    pub fn write_to_file(&self, output: &Path) -> Result<()> {
        let mut file = temp_image_for(output)?;
        self.write_to(file.as_file_mut())
            .and_then(|_| file.as_file_mut().flush())
            .map_err(BuildError::io(format!("writing {}", output.display())))?;
        persist_image(file, output)
    }
}

fn load_input(what: &'static str, path: &Path) -> Result<Vec<u8>> {
    if !path.is_file() {
        return Err(BuildError::MissingInput {
            what,
            path: path.to_path_buf(),
        });
    }
    fs::read(path).map_err(BuildError::io(format!("reading {}", path.display())))
}

pub fn ota_image_create(
    version: &str,
    output: &Path,
    app_path: &Path,
    ota_assets_path: &Path,
    static_assets_path: Option<&Path>,
) -> anyhow::Result<()> {
    // Reject a bad version before touching any file.
    let (parsed, _) = parse_firmware_version(version)?;

    let app = load_input("App binary", app_path)?;
    let ota_assets = load_input("OTA assets binary", ota_assets_path)?;
    let static_assets = static_assets_path
        .map(|path| load_input("Static assets binary", path))
        .transpose()?;

    let image = OtaImage::new(&app, &ota_assets, static_assets.as_deref(), version)?;
    let header = image.header();

    println!("Header size: {} bytes", OTA_HEADER_SIZE);
    println!(
        "App size: {} bytes, SHA-256 {}",
        header.app_size(),
        sha256_hex(&header.app_sha256)
    );
    println!(
        "OTA assets size: {} bytes, SHA-256 {}",
        header.ota_assets_size(),
        sha256_hex(&header.ota_assets_sha256)
    );
    if header.has_static_assets() {
        println!(
            "Static assets size: {} bytes, SHA-256 {}",
            header.static_assets_size(),
            sha256_hex(&header.static_assets_sha256)
        );
    } else {
        println!("Static assets: none");
    }
    println!("Firmware version: {}", parsed);

    image
        .write_to_file(output)
        .with_context(|| format!("Failed to write OTA image {}", output.display()))?;
    println!("Generated merged binary at {}", output.display());
    Ok(())
}

/// Checks a bundle the way the receiving device does: layout, declared
/// lengths, every payload digest and the version string.
pub fn verify_ota_image(image: &[u8]) -> Result<OtaHeader> {
    let bundle = parse_bundle(image).map_err(|e| BuildError::InvalidImage(e.to_string()))?;
    let header = bundle.header;

    if sha256(bundle.app) != header.app_sha256 {
        return Err(BuildError::InvalidImage(
            "application digest mismatch".to_string(),
        ));
    }
    if sha256(bundle.ota_assets) != header.ota_assets_sha256 {
        return Err(BuildError::InvalidImage(
            "OTA assets digest mismatch".to_string(),
        ));
    }
    if let Some(static_assets) = bundle.static_assets {
        if sha256(static_assets) != header.static_assets_sha256 {
            return Err(BuildError::InvalidImage(
                "static assets digest mismatch".to_string(),
            ));
        }
    }

    let version = header
        .firmware_version()
        .ok_or_else(|| BuildError::InvalidImage("firmware version is not UTF-8".to_string()))?;
    Version::parse(version).map_err(|e| {
        BuildError::InvalidImage(format!("firmware version {version:?} is invalid: {e}"))
    })?;
    Ok(header)
}

pub fn ota_image_verify(path: &Path) -> anyhow::Result<()> {
    let data =
        fs::read(path).with_context(|| format!("Failed to read file '{}'", path.display()))?;
    let header = verify_ota_image(&data)?;

    println!("Firmware version: {}", header.firmware_version().unwrap_or(""));
    println!("App size: {} bytes", header.app_size());
    println!("OTA assets size: {} bytes", header.ota_assets_size());
    if header.has_static_assets() {
        println!("Static assets size: {} bytes", header.static_assets_size());
    }
    println!("Image is valid!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ota_image::{FIRMWARE_VERSION_OFFSET, STATIC_ASSETS_SHA256_OFFSET};

    // SHA-256 of "abc".
    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn test_sha256_matches_reference_vector() {
        assert_eq!(sha256_hex(&sha256(b"abc")), ABC_SHA256);
    }

    #[test]
    fn test_header_without_static_assets() {
        let header = build_header(b"APP", b"OTA", None, "1.2.3").unwrap();
        assert_eq!(header.app_size(), 3);
        assert_eq!(header.ota_assets_size(), 3);
        assert!(!header.has_static_assets());
        assert_eq!(header.static_assets_size(), 0);
        assert_eq!(header.static_assets_sha256, ABSENT_DIGEST);
        assert_eq!(header.app_sha256, sha256(b"APP"));
        assert_eq!(header.ota_assets_sha256, sha256(b"OTA"));
        assert_eq!(header.firmware_version(), Some("1.2.3"));

        let bytes = header.as_bytes();
        assert_eq!(bytes.len(), OTA_HEADER_SIZE);
        assert_eq!(&bytes[..4], &3u32.to_le_bytes());
        assert_eq!(&bytes[FIRMWARE_VERSION_OFFSET..FIRMWARE_VERSION_OFFSET + 6], b"1.2.3\0");
        assert!(bytes[FIRMWARE_VERSION_OFFSET + 5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_empty_static_assets_are_still_hashed() {
        let header = build_header(b"APP", b"OTA", Some(b""), "1.0.0").unwrap();
        assert!(header.has_static_assets());
        assert_eq!(header.static_assets_size(), 0);
        assert_eq!(header.static_assets_sha256, sha256(b""));
        assert_ne!(header.static_assets_sha256, ABSENT_DIGEST);
        assert_eq!(
            &header.as_bytes()[STATIC_ASSETS_SHA256_OFFSET..STATIC_ASSETS_SHA256_OFFSET + 32],
            &sha256(b"")
        );
    }

    #[test]
    fn test_version_validation() {
        assert!(matches!(
            build_header(b"A", b"O", None, "not-a-version"),
            Err(BuildError::InvalidVersion { .. })
        ));
        assert!(matches!(
            build_header(b"A", b"O", None, "1.2"),
            Err(BuildError::InvalidVersion { .. })
        ));

        // 19 bytes fits with its terminator, 20 does not.
        let (_, field) = parse_firmware_version("1.2.3-rc.1+build.99").unwrap();
        assert_eq!(&field[..19], b"1.2.3-rc.1+build.99");
        assert_eq!(field[19], 0);
        assert!(matches!(
            parse_firmware_version("1.2.3-rc.1+build.999"),
            Err(BuildError::VersionTooLong { len: 20, max: 19, .. })
        ));
    }

    #[test]
    fn test_write_and_verify_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("out/firmware.bin");
        let image =
            OtaImage::new(b"application", b"ota-fs", Some(b"static-fs"), "2.0.1-beta").unwrap();
        image.write_to_file(&output).unwrap();

        let data = fs::read(&output).unwrap();
        assert_eq!(data.len() as u64, image.total_len());
        assert_eq!(&data[OTA_HEADER_SIZE..OTA_HEADER_SIZE + 11], b"application");
        assert_eq!(&data[data.len() - 9..], b"static-fs");

        let header = verify_ota_image(&data).unwrap();
        assert_eq!(&header, image.header());
        assert_eq!(header.firmware_version(), Some("2.0.1-beta"));
    }

    #[test]
    fn test_verify_rejects_corruption() {
        let image = OtaImage::new(b"APP", b"OTA", None, "1.2.3").unwrap();
        let mut data = Vec::new();
        image.write_to(&mut data).unwrap();

        let mut corrupted = data.clone();
        corrupted[OTA_HEADER_SIZE] ^= 0xff;
        assert!(matches!(
            verify_ota_image(&corrupted),
            Err(BuildError::InvalidImage(msg)) if msg.contains("application")
        ));

        let mut corrupted = data.clone();
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xff;
        assert!(matches!(
            verify_ota_image(&corrupted),
            Err(BuildError::InvalidImage(msg)) if msg.contains("OTA assets")
        ));

        assert!(verify_ota_image(&data[..data.len() - 1]).is_err());
        assert!(verify_ota_image(&data[..10]).is_err());

        let mut bad_version = data.clone();
        bad_version[FIRMWARE_VERSION_OFFSET..FIRMWARE_VERSION_OFFSET + 5]
            .copy_from_slice(b"1.x.3");
        assert!(matches!(
            verify_ota_image(&bad_version),
            Err(BuildError::InvalidImage(msg)) if msg.contains("version")
        ));
    }
}
